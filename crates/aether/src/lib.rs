//! # Aether
//!
//! Runtime engine for front-ends generated from Aether grammars:
//! condition-guarded NFA lexing and generalized recursive-descent parsing
//! of arbitrarily ambiguous, left-recursive context-free grammars.
//!
//! ## Overview
//!
//! The engine consumes an immutable grammar IR and a byte buffer and
//! produces a Binary Subtree Representation (BSR) of every derivation,
//! from which disambiguated trees are extracted:
//!
//! - **Lexing** is on-demand and set-valued: the parser asks for the
//!   token at a byte position; every admitted terminal's NFA runs in
//!   lockstep and the answer (memoized per position) carries all
//!   terminals surviving longest-match and `+`/`-` precedence pruning.
//! - **Parsing** flattens generalized recursive descent into a descriptor
//!   work set with continuation tables, so left recursion terminates and
//!   worst-case time and space stay cubic in the token count.
//! - **Conditions** (`@lexical`, `@syntactic`, `/name` guards) make
//!   single productions polymorphic across dialects: one grammar, one
//!   boolean assignment per session.
//! - **Disambiguation** applies ordered choice (`/`) and longest-match
//!   iteration selection over the BSR, then materializes forest, CST and
//!   AST.
//!
//! ## Quick start
//!
//! ```rust
//! use aether::condition::ConditionSet;
//! use aether::grammar::{Expr, GrammarBuilder};
//! use aether::parser::Session;
//!
//! let mut builder = GrammarBuilder::new();
//! builder.terminal("Ws", "[ \\t\\r\\n]+").ignorable();
//! builder.terminal("Num", "[0-9]+");
//! builder.terminal("Plus", "\\+");
//! builder
//!     .rule(
//!         "Sum",
//!         Expr::seq([
//!             Expr::terminal("Num"),
//!             Expr::iteration_left(Expr::seq([
//!                 Expr::terminal("Plus"),
//!                 Expr::terminal("Num"),
//!             ])),
//!         ]),
//!     )
//!     .start();
//! let grammar = builder.build().expect("well-formed grammar");
//!
//! let source = b"1 + 2 + 3";
//! let result = Session::open(&grammar, source, ConditionSet::EMPTY).parse();
//! assert!(result.is_ok());
//!
//! // `{/X}` folds left: ((1 2) 3).
//! let ast = result.ast.expect("successful parse has an AST");
//! assert_eq!(
//!     ast.display(&grammar, source),
//!     r#"(Sum (Sum (Sum "1") "2") "3")"#
//! );
//! ```
//!
//! ## Modules
//!
//! - [`grammar`] - grammar IR, builder, desugaring, load-time validation
//! - [`condition`] - boolean condition algebra and assignments
//! - [`regex`] - terminal pattern dialect and Thompson NFAs
//! - [`lexer`] - on-demand set-valued tokenization
//! - [`parser`] - sessions, the descriptor engine, the BSR set
//! - [`forest`] - disambiguation, forest, CST and AST extraction
//! - [`error`] - grammar-load and parse-time error taxonomy
//! - [`text`] - byte spans and line/column mapping

pub mod condition;
pub mod error;
pub mod forest;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod regex;
pub mod text;

pub use condition::{Condition, ConditionId, ConditionSet};
pub use error::{GrammarError, ParseError, ParseMetrics, PatternError};
pub use forest::{Ast, AstNode, Forest, ForestNode};
pub use grammar::{
    Expr, Grammar, GrammarBuilder, Guard, NonTerminalId, Separator, SlotId, TerminalId,
};
pub use lexer::Token;
pub use parser::{BsrElement, BsrSet, CancelToken, ParseResult, Session};
pub use text::{LineCol, LineIndex, Span};
