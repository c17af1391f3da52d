//! # Lexer Module
//!
//! On-demand, memoized, set-valued lexical analysis.
//!
//! ## Overview
//!
//! The lexer never tokenizes ahead: the parser driver asks for the token
//! at a byte position and the answer is memoized there. One answer is a
//! *set* of terminals — when several admitted terminals accept the same
//! longest prefix, the token carries all survivors and the grammar
//! decides which one a production actually consumes. Disambiguation
//! happens in two steps, mirroring the meta-language's rules:
//!
//! 1. **Longest match**: all admitted NFAs advance in lockstep; only
//!    terminals accepting at the last position where anything accepted
//!    survive.
//! 2. **Precedence prune**: a survivor loses when another survivor beats
//!    it under the transitive `+`/`-` specifier relation.
//!
//! Ignorable terminals (whitespace, comments) are skipped iteratively
//! before matching starts.
//!
//! A position where no admitted terminal matches is *not* an eager error:
//! the lexer reports [`Lexed::Stuck`] and the driver only surfaces it if
//! no parse attempt survives past that position.

use crate::condition::ConditionSet;
use crate::grammar::{Grammar, TerminalId};
use crate::regex::Frontier;
use crate::text::Span;
use hashbrown::HashMap;
use smallvec::SmallVec;

/// A terminal symbol cut from the source.
///
/// `terminals` is the set of admitted terminals that survived longest
/// match and precedence pruning for this span; it is sorted by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub(crate) terminals: SmallVec<[TerminalId; 2]>,
    pub(crate) span: Span,
}

impl Token {
    #[must_use]
    pub fn terminals(&self) -> &[TerminalId] {
        &self.terminals
    }

    #[must_use]
    pub const fn span(&self) -> Span {
        self.span
    }

    /// Whether this token can stand for `terminal`.
    #[must_use]
    pub fn is(&self, terminal: TerminalId) -> bool {
        self.terminals.binary_search(&terminal).is_ok()
    }

    /// The matched source slice.
    #[must_use]
    pub fn text<'s>(&self, source: &'s [u8]) -> &'s [u8] {
        self.span.text(source)
    }
}

/// Answer to a lexer query at one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lexed {
    Token(Token),
    /// End of input (possibly after skipping ignorables).
    End,
    /// No admitted terminal matches at the contained position; candidate
    /// lexical-error site.
    Stuck(usize),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct LexerStats {
    pub tokens_lexed: usize,
    pub cache_hits: usize,
}

/// Session-owned lexer: immutable grammar plus per-session memo tables.
pub(crate) struct Lexer<'g> {
    grammar: &'g Grammar,
    source: &'g [u8],
    /// Terminal admission under the session's conditions, by terminal id.
    admitted: Vec<bool>,
    /// Memoized answers by query position.
    memo: HashMap<usize, Lexed, ahash::RandomState>,
    /// Memoized NFA steps: (terminal, frontier states, byte) -> frontier.
    steps: HashMap<(TerminalId, Box<[u32]>, u8), Frontier, ahash::RandomState>,
    pub(crate) stats: LexerStats,
}

impl<'g> Lexer<'g> {
    pub(crate) fn new(grammar: &'g Grammar, source: &'g [u8], conditions: ConditionSet) -> Self {
        let admitted = grammar
            .terminals()
            .map(|(_, t)| t.condition().eval(conditions))
            .collect();
        Self {
            grammar,
            source,
            admitted,
            memo: HashMap::default(),
            steps: HashMap::default(),
            stats: LexerStats::default(),
        }
    }

    pub(crate) fn is_admitted(&self, terminal: TerminalId) -> bool {
        self.admitted[terminal.index()]
    }

    /// The token at `position`, after skipping ignorables. Memoized.
    pub(crate) fn token_at(&mut self, position: usize) -> Lexed {
        if let Some(hit) = self.memo.get(&position) {
            self.stats.cache_hits += 1;
            return hit.clone();
        }
        let answer = self.lex(position);
        if let Lexed::Token(_) = answer {
            self.stats.tokens_lexed += 1;
        }
        self.memo.insert(position, answer.clone());
        answer
    }

    fn lex(&mut self, position: usize) -> Lexed {
        let mut cursor = position;

        // Skip ignorable matches iteratively, longest first.
        loop {
            if cursor >= self.source.len() {
                return Lexed::End;
            }
            match self.longest_match(cursor, true) {
                Some((end, _)) if end > cursor => cursor = end,
                _ => break,
            }
        }

        match self.longest_match(cursor, false) {
            None => Lexed::Stuck(cursor),
            Some((end, survivors)) => {
                let terminals = self.prune(survivors);
                log::trace!(
                    "lexed {:?} at {}..{}",
                    terminals
                        .iter()
                        .map(|&t| self.grammar.terminal(t).name())
                        .collect::<Vec<_>>(),
                    cursor,
                    end
                );
                Lexed::Token(Token {
                    terminals,
                    span: Span::new(cursor, end),
                })
            }
        }
    }

    /// Run all admitted NFAs of the requested class in lockstep from
    /// `start`; return the longest accept position and its acceptor set.
    fn longest_match(
        &mut self,
        start: usize,
        ignorable: bool,
    ) -> Option<(usize, SmallVec<[TerminalId; 2]>)> {
        let mut live: Vec<(TerminalId, Frontier)> = self
            .grammar
            .terminals()
            .filter(|&(id, t)| t.is_ignorable() == ignorable && self.admitted[id.index()])
            .map(|(id, t)| (id, t.nfa().start_frontier()))
            .collect();

        let mut best: Option<(usize, SmallVec<[TerminalId; 2]>)> = None;
        let mut offset = start;
        while !live.is_empty() && offset < self.source.len() {
            let byte = self.source[offset];
            offset += 1;
            let mut accepted: SmallVec<[TerminalId; 2]> = SmallVec::new();
            live.retain_mut(|(id, frontier)| {
                let next = Self::step_memo(&mut self.steps, self.grammar, *id, frontier, byte);
                if next.is_empty() {
                    return false;
                }
                if next.accepts() {
                    accepted.push(*id);
                }
                *frontier = next;
                true
            });
            if !accepted.is_empty() {
                accepted.sort_unstable();
                best = Some((offset, accepted));
            }
        }
        best
    }

    fn step_memo(
        steps: &mut HashMap<(TerminalId, Box<[u32]>, u8), Frontier, ahash::RandomState>,
        grammar: &Grammar,
        id: TerminalId,
        frontier: &Frontier,
        byte: u8,
    ) -> Frontier {
        let key = (id, Box::from(frontier.states()), byte);
        if let Some(cached) = steps.get(&key) {
            return cached.clone();
        }
        let next = grammar.terminal(id).nfa().step(frontier, byte);
        steps.insert(key, next.clone());
        next
    }

    /// Precedence prune: drop any survivor that some other survivor beats
    /// under the `+`/`-` closure.
    fn prune(&self, survivors: SmallVec<[TerminalId; 2]>) -> SmallVec<[TerminalId; 2]> {
        let kept: SmallVec<[TerminalId; 2]> = survivors
            .iter()
            .copied()
            .filter(|&loser| {
                !survivors
                    .iter()
                    .any(|&winner| self.grammar.wins_tie_against(winner, loser))
            })
            .collect();
        debug_assert!(!kept.is_empty(), "precedence prune emptied a token");
        kept
    }
}
