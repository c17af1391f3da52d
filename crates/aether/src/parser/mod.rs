//! # Parser Module
//!
//! Parse sessions over an immutable [`Grammar`].
//!
//! ## Overview
//!
//! A [`Session`] binds a grammar, a source buffer and one condition
//! assignment. [`Session::parse`] drives the descriptor engine to
//! completion and returns a [`ParseResult`] carrying:
//!
//! - the canonical [`BsrSet`] (always, even on failure or cancellation),
//! - the disambiguated [`Forest`](crate::forest::Forest) and
//!   [`Ast`](crate::forest::Ast) on success,
//! - a [`ParseError`] with the farthest position reached and the
//!   terminals expected there on failure,
//! - [`ParseMetrics`] counters.
//!
//! Sessions are single-use and single-threaded; the grammar is freely
//! shared, so sessions may run in parallel. Cooperative cancellation goes
//! through a cloneable [`CancelToken`] checked at every descriptor pop.
//!
//! ```rust
//! use aether::grammar::{Expr, GrammarBuilder};
//! use aether::parser::Session;
//! use aether::condition::ConditionSet;
//!
//! let mut builder = GrammarBuilder::new();
//! builder.terminal("A", "a");
//! builder.rule("S", Expr::terminal("A")).start();
//! let grammar = builder.build().unwrap();
//!
//! let session = Session::open(&grammar, b"a", ConditionSet::EMPTY);
//! let result = session.parse();
//! assert!(result.is_ok());
//! ```

mod bsr;
mod driver;

pub use bsr::{BsrElement, BsrSet};

use crate::condition::ConditionSet;
use crate::error::{ParseError, ParseMetrics};
use crate::forest::{Ast, AstBuilder, Forest, ForestBuilder};
use crate::grammar::Grammar;
use crate::lexer::{Lexed, Lexer};
use crate::text::{LineIndex, Span};
use compact_str::CompactString;
use driver::Driver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable handle that cooperatively stops a running parse.
///
/// The driver checks the flag at each descriptor pop; on cancellation the
/// session returns the partial BSR set with the `cancelled` flag set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Everything one parse produced.
pub struct ParseResult {
    /// Canonical ambiguous output; partial when cancelled.
    pub bsr: BsrSet,
    /// Disambiguated syntax forest; empty unless the parse succeeded.
    pub forest: Forest,
    /// Abstract syntax tree; `None` unless the parse succeeded with at
    /// least one token.
    pub ast: Option<Ast>,
    pub error: Option<ParseError>,
    pub cancelled: bool,
    pub metrics: ParseMetrics,
}

impl ParseResult {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One parse of one source buffer under one condition assignment.
pub struct Session<'g> {
    grammar: &'g Grammar,
    source: &'g [u8],
    conditions: ConditionSet,
    cancel: CancelToken,
}

impl<'g> Session<'g> {
    /// Open a session. The grammar and source are only borrowed; all
    /// mutable state lives inside the session and is released with it.
    #[must_use]
    pub fn open(grammar: &'g Grammar, source: &'g [u8], conditions: ConditionSet) -> Self {
        Self {
            grammar,
            source,
            conditions,
            cancel: CancelToken::default(),
        }
    }

    /// Handle for cancelling this session from another thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the parse to completion (or cancellation) and consume the
    /// session.
    #[must_use]
    pub fn parse(self) -> ParseResult {
        let mut lexer = Lexer::new(self.grammar, self.source, self.conditions);

        // The accepted derivation must start at the first token; leading
        // ignorables are outside every span.
        let origin = match lexer.token_at(0) {
            Lexed::End => {
                // Empty or all-ignorable input derives nothing and is not
                // an error.
                return ParseResult {
                    bsr: BsrSet::new(),
                    forest: Forest::default(),
                    ast: None,
                    error: None,
                    cancelled: false,
                    metrics: self.lexer_metrics(&lexer),
                };
            }
            Lexed::Stuck(at) => {
                return ParseResult {
                    bsr: BsrSet::new(),
                    forest: Forest::default(),
                    ast: None,
                    error: Some(self.lexical_error(at)),
                    cancelled: false,
                    metrics: self.lexer_metrics(&lexer),
                };
            }
            Lexed::Token(token) => token.span().start(),
        };

        let driver = Driver::new(self.grammar, &mut lexer, self.conditions, &self.cancel.flag);
        let outcome = driver.run(origin);
        let mut bsr = outcome.bsr;
        let metrics = outcome.metrics;

        if outcome.cancelled {
            return ParseResult {
                bsr,
                forest: Forest::default(),
                ast: None,
                error: Some(ParseError::Cancelled),
                cancelled: true,
                metrics,
            };
        }

        let start = self.grammar.start_symbol();
        let end = outcome.eoi.map_or(origin, |(_, end)| end);
        if bsr.roots_at(start, origin, end).is_empty() {
            let error = self.failure_error(&mut lexer, outcome.farthest, &outcome.expected, outcome.stuck);
            return ParseResult {
                bsr,
                forest: Forest::default(),
                ast: None,
                error: Some(error),
                cancelled: false,
                metrics,
            };
        }

        // The derivation must also exhaust the token stream.
        match lexer.token_at(end) {
            Lexed::Token(next) => {
                let expected = if outcome.farthest >= end {
                    self.expected_names(&outcome.expected)
                } else {
                    Vec::new()
                };
                let at = self.line_col(next.span().start());
                return ParseResult {
                    bsr,
                    forest: Forest::default(),
                    ast: None,
                    error: Some(ParseError::Syntactic {
                        span: next.span(),
                        at,
                        expected,
                    }),
                    cancelled: false,
                    metrics,
                };
            }
            Lexed::Stuck(at) => {
                return ParseResult {
                    bsr,
                    forest: Forest::default(),
                    ast: None,
                    error: Some(self.lexical_error(at)),
                    cancelled: false,
                    metrics,
                };
            }
            Lexed::End => {}
        }

        bsr.set_accepting((start, origin, end));
        let forest = ForestBuilder::build(self.grammar, &bsr, &mut lexer);
        let ast = AstBuilder::build(self.grammar, &forest);
        ParseResult {
            bsr,
            forest,
            ast: Some(ast),
            error: None,
            cancelled: false,
            metrics,
        }
    }

    fn lexer_metrics(&self, lexer: &Lexer<'_>) -> ParseMetrics {
        ParseMetrics {
            tokens_lexed: lexer.stats.tokens_lexed,
            lexer_cache_hits: lexer.stats.cache_hits,
            ..ParseMetrics::default()
        }
    }

    fn line_col(&self, offset: usize) -> crate::text::LineCol {
        LineIndex::new(self.source).line_col(offset)
    }

    fn lexical_error(&self, at: usize) -> ParseError {
        ParseError::Lexical {
            span: Span::empty(at),
            at: self.line_col(at),
        }
    }

    fn expected_names(&self, expected: &[crate::grammar::TerminalId]) -> Vec<CompactString> {
        let mut names: Vec<CompactString> = expected
            .iter()
            .map(|&t| CompactString::from(self.grammar.terminal(t).name()))
            .collect();
        names.sort_unstable();
        names
    }

    /// Synthesize the error for a parse with no accepting derivation:
    /// the farthest attempted position with the terminals attempted
    /// there, or the farthest unlexable position when nothing was ever
    /// expected.
    fn failure_error(
        &self,
        lexer: &mut Lexer<'_>,
        farthest: usize,
        expected: &[crate::grammar::TerminalId],
        stuck: Option<usize>,
    ) -> ParseError {
        if expected.is_empty() {
            return self.lexical_error(stuck.unwrap_or(farthest));
        }
        let span = match lexer.token_at(farthest) {
            Lexed::Token(token) => token.span(),
            Lexed::End | Lexed::Stuck(_) => Span::empty(farthest),
        };
        ParseError::Syntactic {
            span,
            at: self.line_col(farthest),
            expected: self.expected_names(expected),
        }
    }
}
