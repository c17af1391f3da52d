//! The descriptor-driven parsing core.
//!
//! Generalized recursive descent is flattened into an explicit work set of
//! descriptors `(slot, start, position)` so that left-recursive grammars
//! terminate and no parse state lives on the call stack across memoized
//! returns. Three tables persist across the drain:
//!
//! - the *popped* set P: `(nonterminal, start) -> ends` it derived,
//! - the *waiting* lists: continuations parked on `(nonterminal, start)`
//!   call sites, fired again for every new end,
//! - the BSR set Y: every dot advance records one element.
//!
//! Failure of an alternative is the absence of descriptors, never an
//! unwind; the farthest position any terminal was attempted at, and the
//! terminals attempted there, feed error reporting when nothing derives
//! the input.

use super::bsr::{BsrElement, BsrSet};
use crate::condition::ConditionSet;
use crate::error::ParseMetrics;
use crate::grammar::{AltId, Grammar, NonTerminalId, SlotId, SymbolKind, TerminalId};
use crate::lexer::{Lexed, Lexer, Token};
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};

/// A pending unit of work: resume `slot`'s alternative, whose instance
/// began at `start`, with the input at `pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Descriptor {
    slot: SlotId,
    start: usize,
    pos: usize,
}

/// A parked return: when the awaited nonterminal pops a new end `e` from
/// position `k`, the caller resumes at `slot` with element
/// `(slot, start, k, e)`.
#[derive(Debug, Clone, Copy)]
struct Continuation {
    slot: SlotId,
    start: usize,
}

pub(crate) struct DriverOutcome {
    pub bsr: BsrSet,
    pub metrics: ParseMetrics,
    pub cancelled: bool,
    /// Farthest position a terminal was attempted at, with the attempts.
    pub farthest: usize,
    pub expected: SmallVec<[TerminalId; 4]>,
    /// Farthest position the lexer reported as unlexable, if any.
    pub stuck: Option<usize>,
    /// Start and end of the farthest token materialized.
    pub eoi: Option<(usize, usize)>,
}

pub(crate) struct Driver<'g, 's> {
    grammar: &'g Grammar,
    lexer: &'s mut Lexer<'g>,
    cancel: &'s AtomicBool,

    /// Admission masks resolved once against the session's conditions.
    nt_admitted: Vec<bool>,
    alt_admitted: Vec<bool>,
    /// Guard of the symbol after each non-final slot's dot.
    symbol_admitted: Vec<bool>,

    work: Vec<Descriptor>,
    seen: HashSet<Descriptor, ahash::RandomState>,
    popped: HashMap<(NonTerminalId, usize), SmallVec<[usize; 2]>, ahash::RandomState>,
    waiting: HashMap<(NonTerminalId, usize), SmallVec<[Continuation; 2]>, ahash::RandomState>,
    called: HashSet<(NonTerminalId, usize), ahash::RandomState>,
    bsr: BsrSet,

    farthest: usize,
    expected: SmallVec<[TerminalId; 4]>,
    stuck: Option<usize>,
    eoi: Option<(usize, usize)>,

    descriptors_processed: usize,
    memo_hits: usize,
    cancelled: bool,
}

impl<'g, 's> Driver<'g, 's> {
    pub(crate) fn new(
        grammar: &'g Grammar,
        lexer: &'s mut Lexer<'g>,
        conditions: ConditionSet,
        cancel: &'s AtomicBool,
    ) -> Self {
        let nt_admitted: Vec<bool> = grammar
            .nonterminals()
            .map(|(_, nt)| nt.condition().eval(conditions))
            .collect();
        let alt_admitted: Vec<bool> = (0..grammar.alternative_count())
            .map(|i| {
                let alt = grammar.alternative(AltId(i as u32));
                nt_admitted[alt.nonterminal().index()] && alt.condition().eval(conditions)
            })
            .collect();

        let symbol_admitted: Vec<bool> = (0..grammar.slot_count())
            .map(|i| {
                grammar
                    .slot_symbol(SlotId(i as u32))
                    .is_none_or(|symbol| symbol.guard().eval(conditions))
            })
            .collect();

        Self {
            grammar,
            lexer,
            cancel,
            nt_admitted,
            alt_admitted,
            symbol_admitted,
            work: Vec::new(),
            seen: HashSet::default(),
            popped: HashMap::default(),
            waiting: HashMap::default(),
            called: HashSet::default(),
            bsr: BsrSet::new(),
            farthest: 0,
            expected: SmallVec::new(),
            stuck: None,
            eoi: None,
            descriptors_processed: 0,
            memo_hits: 0,
            cancelled: false,
        }
    }

    /// Drain the work set starting from the start symbol at `origin`.
    pub(crate) fn run(mut self, origin: usize) -> DriverOutcome {
        let start = self.grammar.start_symbol();
        self.called.insert((start, origin));
        if self.nt_admitted[start.index()] {
            for &alt_id in self.grammar.nonterminal(start).alternatives() {
                if self.alt_admitted[alt_id.index()] {
                    self.enqueue(self.grammar.alternative(alt_id).first_slot, origin, origin);
                }
            }
        }

        while let Some(descriptor) = self.work.pop() {
            if self.cancel.load(Ordering::Relaxed) {
                self.cancelled = true;
                break;
            }
            self.descriptors_processed += 1;
            self.process(descriptor);
        }

        let metrics = ParseMetrics {
            tokens_lexed: self.lexer.stats.tokens_lexed,
            lexer_cache_hits: self.lexer.stats.cache_hits,
            descriptors_processed: self.descriptors_processed,
            memo_hits: self.memo_hits,
            bsr_size: self.bsr.len(),
        };
        DriverOutcome {
            bsr: self.bsr,
            metrics,
            cancelled: self.cancelled,
            farthest: self.farthest,
            expected: self.expected,
            stuck: self.stuck,
            eoi: self.eoi,
        }
    }

    fn process(&mut self, descriptor: Descriptor) {
        let Descriptor { slot, start, pos } = descriptor;
        if self.grammar.slot_is_final(slot) {
            self.pop(slot, start, pos);
            return;
        }
        if !self.symbol_admitted[slot.index()] {
            // Guard is off under these conditions: the symbol is omitted
            // from the sequence and derives nothing.
            self.record_and_enqueue(slot.advance(), start, pos, pos);
            return;
        }
        let symbol = self.grammar.slot_symbol(slot).expect("non-final slot");
        match symbol.kind() {
            SymbolKind::Terminal(terminal) => self.derive_terminal(slot, start, pos, terminal),
            SymbolKind::NonTerminal(callee) => {
                self.call(callee, slot.advance(), start, pos);
            }
        }
    }

    fn derive_terminal(&mut self, slot: SlotId, start: usize, pos: usize, terminal: TerminalId) {
        if !self.lexer.is_admitted(terminal) {
            return;
        }
        self.note_attempt(pos, terminal);
        match self.lexer.token_at(pos) {
            Lexed::Token(token) => {
                self.note_token(&token);
                if token.is(terminal) {
                    self.record_and_enqueue(slot.advance(), start, pos, token.span().end());
                }
            }
            Lexed::End => {}
            Lexed::Stuck(at) => {
                self.stuck = Some(self.stuck.map_or(at, |prev| prev.max(at)));
            }
        }
    }

    /// Derive nonterminal `callee` at `pos`, parking a continuation for
    /// the caller.
    fn call(&mut self, callee: NonTerminalId, ret_slot: SlotId, ret_start: usize, pos: usize) {
        if !self.nt_admitted[callee.index()] {
            return;
        }
        self.waiting.entry((callee, pos)).or_default().push(Continuation {
            slot: ret_slot,
            start: ret_start,
        });
        if self.called.insert((callee, pos)) {
            for &alt_id in self.grammar.nonterminal(callee).alternatives() {
                if self.alt_admitted[alt_id.index()] {
                    self.enqueue(self.grammar.alternative(alt_id).first_slot, pos, pos);
                }
            }
        } else {
            self.memo_hits += 1;
            if let Some(ends) = self.popped.get(&(callee, pos)) {
                // Fan out to every end already recorded; future ends fire
                // through the parked continuation.
                let ends = ends.clone();
                for end in ends {
                    self.record_and_enqueue(ret_slot, ret_start, pos, end);
                }
            }
        }
    }

    /// An alternative of `slot`'s nonterminal finished deriving
    /// `[start, pos)`.
    fn pop(&mut self, slot: SlotId, start: usize, pos: usize) {
        let nonterminal = self.grammar.slot_nonterminal(slot);
        let alt = self.grammar.slot(slot).alternative();
        if self.grammar.alternative(alt).symbols().is_empty() {
            // Empty alternatives never advance a dot, so their root
            // element is recorded at completion.
            self.bsr.add_root(
                nonterminal,
                BsrElement {
                    slot,
                    start,
                    pivot: start,
                    end: pos,
                },
            );
        }
        let ends = self.popped.entry((nonterminal, start)).or_default();
        if ends.contains(&pos) {
            return;
        }
        ends.push(pos);
        log::trace!(
            "pop {} over {}..{}",
            self.grammar.nonterminal(nonterminal).name(),
            start,
            pos
        );
        if let Some(continuations) = self.waiting.get(&(nonterminal, start)) {
            let continuations = continuations.clone();
            for continuation in continuations {
                self.record_and_enqueue(continuation.slot, continuation.start, start, pos);
            }
        }
    }

    /// Record the BSR element for a dot advance and schedule the advanced
    /// descriptor.
    fn record_and_enqueue(&mut self, slot: SlotId, start: usize, pivot: usize, end: usize) {
        let element = BsrElement {
            slot,
            start,
            pivot,
            end,
        };
        if self.grammar.slot_is_final(slot) {
            self.bsr.add_root(self.grammar.slot_nonterminal(slot), element);
        } else {
            self.bsr.add(element);
        }
        self.enqueue(slot, start, end);
    }

    fn enqueue(&mut self, slot: SlotId, start: usize, pos: usize) {
        let descriptor = Descriptor { slot, start, pos };
        if self.seen.insert(descriptor) {
            self.work.push(descriptor);
        }
    }

    fn note_attempt(&mut self, pos: usize, terminal: TerminalId) {
        if pos > self.farthest {
            self.farthest = pos;
            self.expected.clear();
        }
        if pos == self.farthest && !self.expected.contains(&terminal) {
            self.expected.push(terminal);
        }
    }

    fn note_token(&mut self, token: &Token) {
        let span = token.span();
        if self
            .eoi
            .is_none_or(|(start, _)| span.start() > start)
        {
            self.eoi = Some((span.start(), span.end()));
        }
    }
}
