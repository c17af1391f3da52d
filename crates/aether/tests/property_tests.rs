//! Property-style invariants: determinism, the cubic BSR bound, lexer
//! longest-match soundness, and total behavior on arbitrary bytes.

use aether::condition::ConditionSet;
use aether::grammar::{Expr, Grammar, GrammarBuilder};
use aether::parser::Session;
use proptest::prelude::*;

fn catalan_grammar() -> Grammar {
    // S: S S | "x" -- the classic worst case for ambiguity.
    let mut builder = GrammarBuilder::new();
    builder.terminal("X", "x");
    builder
        .rule(
            "S",
            Expr::choice([
                Expr::seq([Expr::nonterminal("S"), Expr::nonterminal("S")]),
                Expr::terminal("X"),
            ]),
        )
        .start();
    builder.build().unwrap()
}

fn sum_grammar() -> Grammar {
    let mut builder = GrammarBuilder::new();
    builder.terminal("Ws", "[ ]+").ignorable();
    builder.terminal("N", "[0-9]+");
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
    builder.build().unwrap()
}

proptest! {
    #[test]
    fn test_parse_is_deterministic(count in 1usize..10) {
        let grammar = catalan_grammar();
        let source = "x".repeat(count).into_bytes();
        let first = Session::open(&grammar, &source, ConditionSet::EMPTY).parse();
        let second = Session::open(&grammar, &source, ConditionSet::EMPTY).parse();
        prop_assert!(first.is_ok());
        prop_assert_eq!(first.bsr.elements(), second.bsr.elements());
    }

    #[test]
    fn test_bsr_respects_cubic_bound(count in 1usize..12) {
        let grammar = catalan_grammar();
        let source = "x".repeat(count).into_bytes();
        let result = Session::open(&grammar, &source, ConditionSet::EMPTY).parse();
        prop_assert!(result.is_ok());
        let bound = 4 * grammar.alternative_count() * count * count * count + 16;
        prop_assert!(
            result.bsr.len() <= bound,
            "|Y| = {} exceeds bound {}",
            result.bsr.len(),
            bound
        );
    }

    #[test]
    fn test_every_span_length_derives(count in 1usize..8) {
        let grammar = catalan_grammar();
        let source = "x".repeat(count).into_bytes();
        let result = Session::open(&grammar, &source, ConditionSet::EMPTY).parse();
        prop_assert!(result.is_ok());
        let s = grammar.nonterminal_id("S").unwrap();
        prop_assert!(!result.bsr.roots_at(s, 0, count).is_empty());
    }

    #[test]
    fn test_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        let grammar = sum_grammar();
        let result = Session::open(&grammar, &bytes, ConditionSet::EMPTY).parse();
        // Either outcome is fine; the engine must simply stay total.
        let _ = result.is_ok();
    }

    #[test]
    fn test_sums_parse_and_errors_point_inside(terms in 1usize..6, garbage in proptest::bool::ANY) {
        let grammar = sum_grammar();
        let mut text = "1".to_string();
        for i in 1..terms {
            text.push_str(" + ");
            text.push_str(&i.to_string());
        }
        if garbage {
            text.push_str(" +");
        }
        let source = text.clone().into_bytes();
        let result = Session::open(&grammar, &source, ConditionSet::EMPTY).parse();
        if garbage {
            prop_assert!(!result.is_ok());
            let error = result.error.unwrap();
            if let Some(span) = error.span() {
                prop_assert!(span.start() <= source.len());
            }
        } else {
            prop_assert!(result.is_ok(), "error on {:?}: {:?}", text, result.error);
        }
    }

    #[test]
    fn test_lexer_longest_match_soundness(word in "[a-z]{1,12}") {
        let mut builder = GrammarBuilder::new();
        builder.terminal("Kw", "if").specializes("Id");
        builder.terminal("Id", "[a-z]+");
        builder.rule("S", Expr::choice([
            Expr::terminal("Id"),
            Expr::terminal("Kw"),
        ])).start();
        let grammar = builder.build().unwrap();
        let source = word.clone().into_bytes();
        let result = Session::open(&grammar, &source, ConditionSet::EMPTY).parse();
        prop_assert!(result.is_ok(), "single word must lex as one token");
        let ast = result.ast.unwrap();
        let root = ast.root().unwrap();
        // The token covers the whole word: nothing accepts a longer match.
        prop_assert_eq!(ast.node(root).span(), aether::text::Span::new(0, word.len()));
    }
}
