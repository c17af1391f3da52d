//! # Error Types
//!
//! Error taxonomy for grammar loading and parse sessions.
//!
//! Three stages can fail, each with its own type:
//!
//! - [`PatternError`]: a terminal's regular expression does not conform to
//!   the pattern grammar. Always wrapped in a [`GrammarError`].
//! - [`GrammarError`]: the grammar IR is inconsistent (dangling names,
//!   precedence cycles, zero or several start symbols). Fatal at load.
//! - [`ParseError`]: a session could not derive the input, or was
//!   cancelled. Lexical failures are only reported when no branch of the
//!   parse search survives past them; this is what makes ambiguous lexing
//!   viable.
//!
//! With the `diagnostics` feature enabled, parse errors derive
//! [`miette::Diagnostic`] and carry labeled source spans.

use crate::text::{LineCol, Span};
use compact_str::CompactString;
use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// Malformed regular expression in a terminal pattern.
///
/// Byte offsets are relative to the pattern string, not the parsed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unexpected end of pattern")]
    UnexpectedEnd,

    #[error("unmatched `)` at byte {at}")]
    UnmatchedCloseParen { at: usize },

    #[error("unclosed group opened at byte {at}")]
    UnclosedGroup { at: usize },

    #[error("invalid escape `\\{escape}` at byte {at}")]
    InvalidEscape { escape: char, at: usize },

    #[error("unclosed bracket expression opened at byte {at}")]
    UnclosedBracket { at: usize },

    #[error("bracket range with reversed bounds at byte {at}")]
    ReversedRange { at: usize },

    #[error("repetition bounds `{{{min},{max}}}` are reversed at byte {at}")]
    ReversedRepeat { min: u32, max: u32, at: usize },

    #[error("malformed repetition bounds at byte {at}")]
    MalformedRepeat { at: usize },

    #[error("quantifier with nothing to repeat at byte {at}")]
    DanglingQuantifier { at: usize },
}

/// Inconsistent grammar IR, rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("condition `{name}` is not declared")]
    UndefinedCondition { name: CompactString },

    #[error("terminal `{name}` is not defined")]
    UndefinedTerminal { name: CompactString },

    #[error("nonterminal `{name}` is not defined")]
    UndefinedNonTerminal { name: CompactString },

    #[error("terminal `{name}` is defined twice")]
    DuplicateTerminal { name: CompactString },

    #[error("nonterminal `{name}` is defined twice")]
    DuplicateNonTerminal { name: CompactString },

    #[error("grammar declares {count} conditions, the maximum is {max}", max = crate::condition::MAX_CONDITIONS)]
    TooManyConditions { count: usize },

    #[error("no start symbol is declared")]
    NoStartSymbol,

    #[error("both `{first}` and `{second}` are declared start symbols")]
    MultipleStartSymbols {
        first: CompactString,
        second: CompactString,
    },

    #[error("terminal precedence cycle: {}", cycle.join(" -> "))]
    PrecedenceCycle { cycle: Vec<CompactString> },

    #[error("malformed pattern for terminal `{name}`")]
    MalformedPattern {
        name: CompactString,
        #[source]
        source: PatternError,
    },

    #[error("pattern for terminal `{name}` matches the empty string")]
    NullablePattern { name: CompactString },
}

/// Failure of a parse session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ParseError {
    /// No admitted terminal matches at a position every surviving parse
    /// attempt must cross.
    #[error("{at}: no terminal matches input")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(aether::lexical_error)))]
    Lexical {
        #[cfg_attr(feature = "diagnostics", label("no terminal matches here"))]
        span: Span,
        at: LineCol,
    },

    /// No derivation of the start symbol covers the input. Reports the
    /// farthest position any descent reached and the terminals that were
    /// admitted there.
    #[error("{at}: expected {}", format_expected(expected))]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(aether::syntactic_error)))]
    Syntactic {
        #[cfg_attr(feature = "diagnostics", label("could not derive past this point"))]
        span: Span,
        at: LineCol,
        expected: Vec<CompactString>,
    },

    /// The session's cancel token was triggered; a partial BSR set is
    /// still available on the parse result.
    #[error("parse cancelled")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(aether::cancelled)))]
    Cancelled,
}

impl ParseError {
    /// The source span this error points at, if any.
    #[must_use]
    pub const fn span(&self) -> Option<Span> {
        match self {
            Self::Lexical { span, .. } | Self::Syntactic { span, .. } => Some(*span),
            Self::Cancelled => None,
        }
    }

    #[must_use]
    pub fn expected(&self) -> &[CompactString] {
        match self {
            Self::Syntactic { expected, .. } => expected,
            Self::Lexical { .. } | Self::Cancelled => &[],
        }
    }
}

fn format_expected(expected: &[CompactString]) -> String {
    match expected {
        [] => "end of input".to_string(),
        [one] => format!("`{one}`"),
        many => {
            let names: Vec<String> = many.iter().map(|n| format!("`{n}`")).collect();
            format!("one of {}", names.join(", "))
        }
    }
}

/// Counters describing the work a parse session performed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseMetrics {
    /// Terminal symbols materialized by the lexer.
    pub tokens_lexed: usize,
    /// Lexer queries answered from the position memo.
    pub lexer_cache_hits: usize,
    /// Descriptors popped from the work set.
    pub descriptors_processed: usize,
    /// Nonterminal calls answered from the popped-set memo.
    pub memo_hits: usize,
    /// BSR elements recorded.
    pub bsr_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntactic_error_display() {
        let err = ParseError::Syntactic {
            span: Span::empty(2),
            at: LineCol { line: 1, column: 3 },
            expected: vec!["c".into()],
        };
        assert_eq!(err.to_string(), "1:3: expected `c`");
    }

    #[test]
    fn test_syntactic_error_display_many() {
        let err = ParseError::Syntactic {
            span: Span::empty(0),
            at: LineCol { line: 1, column: 1 },
            expected: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "1:1: expected one of `a`, `b`");
    }

    #[test]
    fn test_lexical_error_display() {
        let err = ParseError::Lexical {
            span: Span::new(4, 5),
            at: LineCol { line: 2, column: 1 },
        };
        assert_eq!(err.to_string(), "2:1: no terminal matches input");
        assert_eq!(err.span(), Some(Span::new(4, 5)));
    }

    #[test]
    fn test_expected_accessor() {
        assert!(ParseError::Cancelled.expected().is_empty());
        assert!(ParseError::Cancelled.span().is_none());
    }

    #[test]
    fn test_grammar_error_display() {
        let err = GrammarError::PrecedenceCycle {
            cycle: vec!["Kw".into(), "Id".into(), "Kw".into()],
        };
        assert_eq!(
            err.to_string(),
            "terminal precedence cycle: Kw -> Id -> Kw"
        );
    }

    #[test]
    fn test_pattern_error_source() {
        let err = GrammarError::MalformedPattern {
            name: "Num".into(),
            source: PatternError::UnexpectedEnd,
        };
        let source = std::error::Error::source(&err).expect("has source");
        assert_eq!(source.to_string(), "unexpected end of pattern");
    }
}
