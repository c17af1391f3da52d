//! Conditional-compilation behavior: one grammar, different dialects per
//! condition assignment.

use aether::condition::ConditionSet;
use aether::grammar::{Expr, Grammar, GrammarBuilder, Guard};
use aether::parser::Session;

fn parse(grammar: &Grammar, source: &[u8], sigma: ConditionSet) -> aether::parser::ParseResult {
    Session::open(grammar, source, sigma).parse()
}

fn keyword_grammar() -> Grammar {
    let mut builder = GrammarBuilder::new();
    builder.terminal("Ws", "[ ]+").ignorable();
    builder
        .terminal("Kw", "if")
        .when(Guard::Lexical)
        .specializes("Id");
    builder.terminal("Id", "[A-Za-z]+");
    builder
        .rule(
            "S",
            Expr::choice([Expr::terminal("Kw"), Expr::terminal("Id")]),
        )
        .start();
    builder.build().unwrap()
}

#[test]
fn test_conditional_terminal_switches_token() {
    let grammar = keyword_grammar();
    let s = grammar.nonterminal_id("S").unwrap();

    // Keyword admitted: precedence drops Id, only the Kw alternative
    // derives.
    let sigma = grammar.condition_set(["lexical"]).unwrap();
    let result = parse(&grammar, b"if", sigma);
    assert!(result.is_ok());
    assert_eq!(result.bsr.roots_at(s, 0, 2).len(), 1);

    // Keyword masked: the same input is a plain identifier.
    let result = parse(&grammar, b"if", ConditionSet::EMPTY);
    assert!(result.is_ok());
    assert_eq!(result.bsr.roots_at(s, 0, 2).len(), 1);
}

#[test]
fn test_guarded_symbol_is_omitted_when_off() {
    let mut builder = GrammarBuilder::new();
    builder.condition("verbose");
    builder.terminal("A", "a");
    builder.terminal("B", "b");
    builder
        .rule(
            "S",
            Expr::seq([
                Expr::terminal("A"),
                Expr::guarded(Expr::terminal("B"), Guard::name("verbose")),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let on = grammar.condition_set(["verbose"]).unwrap();
    assert!(parse(&grammar, b"ab", on).is_ok());
    assert!(!parse(&grammar, b"a", on).is_ok());

    // Guard off: the symbol is not part of the sequence at all.
    assert!(parse(&grammar, b"a", ConditionSet::EMPTY).is_ok());
    assert!(!parse(&grammar, b"ab", ConditionSet::EMPTY).is_ok());
}

#[test]
fn test_guarded_alternative_admission() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("A", "a");
    builder.terminal("B", "b");
    builder
        .rule(
            "S",
            Expr::choice([
                Expr::terminal("A"),
                Expr::guarded(Expr::terminal("B"), Guard::Syntactic),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let syntactic = grammar.condition_set(["syntactic"]).unwrap();
    assert!(parse(&grammar, b"b", syntactic).is_ok());
    assert!(!parse(&grammar, b"b", ConditionSet::EMPTY).is_ok());
    assert!(parse(&grammar, b"a", ConditionSet::EMPTY).is_ok());
}

#[test]
fn test_guarded_production() {
    let mut builder = GrammarBuilder::new();
    builder.condition("ext");
    builder.terminal("A", "a");
    builder.terminal("B", "b");
    builder
        .rule(
            "S",
            Expr::choice([Expr::terminal("A"), Expr::nonterminal("Ext")]),
        )
        .start();
    builder
        .rule("Ext", Expr::terminal("B"))
        .when(Guard::name("ext"));
    let grammar = builder.build().unwrap();

    assert!(parse(&grammar, b"b", grammar.condition_set(["ext"]).unwrap()).is_ok());
    assert!(!parse(&grammar, b"b", ConditionSet::EMPTY).is_ok());
}

#[test]
fn test_negated_guard() {
    let mut builder = GrammarBuilder::new();
    builder.condition("strict");
    builder.terminal("A", "a");
    builder.terminal("B", "b");
    builder
        .rule(
            "S",
            Expr::choice([
                Expr::terminal("A"),
                Expr::guarded(
                    Expr::terminal("B"),
                    Guard::not(Guard::name("strict")),
                ),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    assert!(parse(&grammar, b"b", ConditionSet::EMPTY).is_ok());
    assert!(!parse(&grammar, b"b", grammar.condition_set(["strict"]).unwrap()).is_ok());
}

#[test]
fn test_condition_monotonicity_without_negation() {
    // Pointwise larger assignments can only admit more derivations when
    // no guard uses negation.
    let mut builder = GrammarBuilder::new();
    builder.condition("x");
    builder.condition("y");
    builder.terminal("A", "a");
    builder
        .rule(
            "S",
            Expr::choice([
                Expr::terminal("A"),
                Expr::guarded(Expr::terminal("A"), Guard::name("x")),
                Expr::guarded(Expr::terminal("A"), Guard::all([Guard::name("x"), Guard::name("y")])),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let assignments = [
        ConditionSet::EMPTY,
        grammar.condition_set(["x"]).unwrap(),
        grammar.condition_set(["x", "y"]).unwrap(),
    ];
    let mut previous: Option<Vec<aether::parser::BsrElement>> = None;
    for sigma in assignments {
        let result = parse(&grammar, b"a", sigma);
        assert!(result.is_ok());
        let elements = result.bsr.elements();
        if let Some(smaller) = previous {
            for element in &smaller {
                assert!(elements.contains(element), "BSR shrank under a larger assignment");
            }
        }
        previous = Some(elements);
    }
}

#[test]
fn test_undefined_condition_name_in_sigma() {
    let grammar = keyword_grammar();
    assert!(grammar.condition_set(["nope"]).is_err());
}
