//! End-to-end scenarios through the session API: iteration folding, left
//! recursion, ordered versus ambiguous choice, on-demand lexing and
//! farthest-error reporting.

use aether::condition::ConditionSet;
use aether::error::ParseError;
use aether::grammar::{Expr, Grammar, GrammarBuilder};
use aether::parser::Session;

fn parse(grammar: &Grammar, source: &[u8]) -> aether::parser::ParseResult {
    Session::open(grammar, source, ConditionSet::EMPTY).parse()
}

#[test]
fn test_iteration_left_fold_chain() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("A", "a");
    builder
        .rule(
            "S",
            Expr::seq([
                Expr::terminal("A"),
                Expr::iteration_left(Expr::terminal("A")),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"aaa");
    assert!(result.is_ok(), "error: {:?}", result.error);

    let s = grammar.nonterminal_id("S").unwrap();
    assert_eq!(result.bsr.roots_at(s, 0, 3).len(), 1);

    let ast = result.ast.unwrap();
    assert_eq!(
        ast.display(&grammar, b"aaa"),
        r#"(S (S (S "a") "a") "a")"#
    );
}

#[test]
fn test_iteration_right_fold_flattens() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("A", "a");
    builder
        .rule(
            "S",
            Expr::seq([Expr::terminal("A"), Expr::iteration(Expr::terminal("A"))]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"aaa");
    assert!(result.is_ok());
    let ast = result.ast.unwrap();
    assert_eq!(ast.display(&grammar, b"aaa"), r#"(S "a" "a" "a")"#);
}

#[test]
fn test_left_recursion_keeps_both_parses() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("N", "n");
    builder.terminal("Plus", "\\+");
    builder
        .rule(
            "E",
            Expr::choice([
                Expr::seq([
                    Expr::nonterminal("E"),
                    Expr::terminal("Plus"),
                    Expr::nonterminal("E"),
                ]),
                Expr::terminal("N"),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"n+n+n");
    assert!(result.is_ok(), "error: {:?}", result.error);

    let e = grammar.nonterminal_id("E").unwrap();
    assert_eq!(result.bsr.roots_at(e, 0, 5).len(), 2);
    assert!(result.forest.is_ambiguous());
}

#[test]
fn test_left_recursion_ordered_choice_is_left_associative() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("N", "n");
    builder.terminal("Plus", "\\+");
    builder
        .rule(
            "E",
            Expr::ordered([
                Expr::seq([
                    Expr::nonterminal("E"),
                    Expr::terminal("Plus"),
                    Expr::nonterminal("E"),
                ]),
                Expr::terminal("N"),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"n+n+n");
    assert!(result.is_ok(), "error: {:?}", result.error);
    assert!(!result.forest.is_ambiguous());

    let ast = result.ast.unwrap();
    assert_eq!(
        ast.display(&grammar, b"n+n+n"),
        r#"(E (E (E "n") (E "n")) (E "n"))"#
    );
}

#[test]
fn test_ignorable_and_on_demand_lexing() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("Ws", "[ ]+").ignorable();
    builder.terminal("A", "a");
    builder.terminal("B", "b");
    builder
        .rule("S", Expr::seq([Expr::terminal("A"), Expr::terminal("B")]))
        .start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"a   b");
    assert!(result.is_ok(), "error: {:?}", result.error);

    let ast = result.ast.unwrap();
    assert_eq!(ast.display(&grammar, b"a   b"), r#"(S "a" "b")"#);

    // Token spans exclude the skipped whitespace.
    let root = ast.root().unwrap();
    let aether::forest::AstNode::Node { children, .. } = ast.node(root) else {
        panic!("expected interior root");
    };
    let spans: Vec<_> = children.iter().map(|&c| ast.node(c).span()).collect();
    assert_eq!(spans[0], aether::text::Span::new(0, 1));
    assert_eq!(spans[1], aether::text::Span::new(4, 5));
}

#[test]
fn test_ambiguity_preserved_by_pipe_collapsed_by_slash() {
    let alternatives = || [Expr::terminal("X"), Expr::terminal("X")];

    let mut builder = GrammarBuilder::new();
    builder.terminal("X", "x");
    builder.rule("S", Expr::choice(alternatives())).start();
    let ambiguous = builder.build().unwrap();

    let result = parse(&ambiguous, b"x");
    assert!(result.is_ok());
    let s = ambiguous.nonterminal_id("S").unwrap();
    assert_eq!(result.bsr.roots_at(s, 0, 1).len(), 2);
    assert!(result.forest.is_ambiguous());

    let mut builder = GrammarBuilder::new();
    builder.terminal("X", "x");
    builder.rule("S", Expr::ordered(alternatives())).start();
    let ordered = builder.build().unwrap();

    let result = parse(&ordered, b"x");
    assert!(result.is_ok());
    assert!(!result.forest.is_ambiguous());
}

#[test]
fn test_farthest_error_with_expected_terminals() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("A", "a");
    builder.terminal("B", "b");
    builder.terminal("C", "c");
    builder
        .rule(
            "S",
            Expr::seq([
                Expr::terminal("A"),
                Expr::terminal("B"),
                Expr::terminal("C"),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"ab!");
    let Some(ParseError::Syntactic { at, expected, .. }) = result.error else {
        panic!("expected syntactic error, got {:?}", result.error);
    };
    assert_eq!(at.line, 1);
    assert_eq!(at.column, 3);
    assert_eq!(expected, vec!["C"]);
}

#[test]
fn test_empty_input_is_not_an_error() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("Ws", "[ \\t\\r\\n]+").ignorable();
    builder.terminal("A", "a");
    builder.rule("S", Expr::terminal("A")).start();
    let grammar = builder.build().unwrap();

    for source in [&b""[..], &b"  \n\t "[..]] {
        let result = parse(&grammar, source);
        assert!(result.is_ok());
        assert!(result.ast.is_none());
        assert!(result.bsr.is_empty());
    }
}

#[test]
fn test_unlexable_input_is_a_lexical_error() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("A", "a");
    builder.rule("S", Expr::terminal("A")).start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"!");
    let Some(ParseError::Lexical { at, .. }) = result.error else {
        panic!("expected lexical error, got {:?}", result.error);
    };
    assert_eq!((at.line, at.column), (1, 1));
}

#[test]
fn test_trailing_input_is_an_error() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("A", "a");
    builder.rule("S", Expr::terminal("A")).start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"aa");
    assert!(!result.is_ok());
    let Some(ParseError::Syntactic { span, .. }) = result.error else {
        panic!("expected syntactic error, got {:?}", result.error);
    };
    assert_eq!(span, aether::text::Span::new(1, 2));
}

#[test]
fn test_optional_both_ways() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("A", "a");
    builder.terminal("B", "b");
    builder
        .rule(
            "S",
            Expr::seq([Expr::terminal("A"), Expr::optional(Expr::terminal("B"))]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let with = parse(&grammar, b"ab");
    assert!(with.is_ok());
    assert_eq!(with.ast.unwrap().display(&grammar, b"ab"), r#"(S "a" "b")"#);

    let without = parse(&grammar, b"a");
    assert!(without.is_ok());
    assert_eq!(without.ast.unwrap().display(&grammar, b"a"), r#"(S "a")"#);
}

#[test]
fn test_punctuation_elision() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("Ws", "[ ]+").ignorable();
    builder.terminal("Id", "[a-z]+");
    builder.terminal("Comma", ",");
    builder
        .rule(
            "List",
            Expr::seq([
                Expr::terminal("Id"),
                Expr::iteration(Expr::seq([
                    Expr::terminal("Comma"),
                    Expr::terminal("Id"),
                ])),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"x, y, z");
    assert!(result.is_ok(), "error: {:?}", result.error);
    assert_eq!(
        result.ast.unwrap().display(&grammar, b"x, y, z"),
        r#"(List "x" "y" "z")"#
    );
}

#[test]
fn test_single_child_chains_collapse() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("N", "[0-9]+");
    builder.rule("Expr", Expr::nonterminal("Term")).start();
    builder.rule("Term", Expr::nonterminal("Factor"));
    builder.rule("Factor", Expr::terminal("N"));
    let grammar = builder.build().unwrap();

    let result = parse(&grammar, b"42");
    assert!(result.is_ok());
    // Expr -> Term -> Factor collapses to the innermost node.
    assert_eq!(
        result.ast.unwrap().display(&grammar, b"42"),
        r#"(Factor "42")"#
    );
}

#[test]
fn test_parse_is_deterministic() {
    let mut builder = GrammarBuilder::new();
    builder.terminal("N", "n");
    builder.terminal("Plus", "\\+");
    builder
        .rule(
            "E",
            Expr::choice([
                Expr::seq([
                    Expr::nonterminal("E"),
                    Expr::terminal("Plus"),
                    Expr::nonterminal("E"),
                ]),
                Expr::terminal("N"),
            ]),
        )
        .start();
    let grammar = builder.build().unwrap();

    let first = parse(&grammar, b"n+n+n+n");
    let second = parse(&grammar, b"n+n+n+n");
    assert_eq!(first.bsr.elements(), second.bsr.elements());
    assert_eq!(
        first.ast.unwrap().display(&grammar, b"n+n+n+n"),
        second.ast.unwrap().display(&grammar, b"n+n+n+n")
    );
}
