#![no_main]
use aether::condition::ConditionSet;
use aether::grammar::{Expr, Grammar, GrammarBuilder};
use aether::parser::Session;
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

fn grammar() -> &'static Grammar {
    static GRAMMAR: OnceLock<Grammar> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        let mut builder = GrammarBuilder::new();
        builder.terminal("Ws", "[ \\t\\r\\n]+").ignorable();
        builder.terminal("N", "[0-9]+");
        builder.terminal("Plus", "\\+");
        builder.terminal("LParen", "\\(");
        builder.terminal("RParen", "\\)");
        builder
            .rule(
                "E",
                Expr::choice([
                    Expr::seq([
                        Expr::nonterminal("E"),
                        Expr::terminal("Plus"),
                        Expr::nonterminal("E"),
                    ]),
                    Expr::seq([
                        Expr::terminal("LParen"),
                        Expr::nonterminal("E"),
                        Expr::terminal("RParen"),
                    ]),
                    Expr::terminal("N"),
                ]),
            )
            .start();
        builder.build().expect("static fuzz grammar")
    })
}

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must produce a result or an error, never a panic,
    // and identical runs must agree.
    let first = Session::open(grammar(), data, ConditionSet::EMPTY).parse();
    let second = Session::open(grammar(), data, ConditionSet::EMPTY).parse();
    assert_eq!(first.is_ok(), second.is_ok());
    assert_eq!(first.bsr.len(), second.bsr.len());
});
