//! # Grammar Module
//!
//! The immutable grammar IR every parse session runs against.
//!
//! ## Overview
//!
//! A [`Grammar`] is built once from a [`GrammarBuilder`] description and
//! shared read-only across sessions. It holds:
//!
//! - the declared condition names,
//! - the terminal table: one compiled NFA per terminal plus its admission
//!   condition, ignorable flag and precedence edges,
//! - the nonterminal table: productions flattened into alternatives of
//!   plain symbols (iteration, optionals and nested selections are
//!   desugared into synthetic nonterminals at build time),
//! - the slot table: one entry per (alternative, dot) pair, the unit the
//!   parser driver and the BSR set speak in.
//!
//! All cross-references are dense ids into these tables; the IR contains
//! no pointers and no interior mutability.
//!
//! ## Usage
//!
//! ```rust
//! use aether::grammar::{Expr, GrammarBuilder};
//!
//! let mut builder = GrammarBuilder::new();
//! builder.terminal("Ws", "[ \\t\\r\\n]+").ignorable();
//! builder.terminal("Num", "[0-9]+");
//! builder.terminal("Plus", "\\+");
//! builder
//!     .rule(
//!         "Expr",
//!         Expr::choice([
//!             Expr::seq([
//!                 Expr::nonterminal("Expr"),
//!                 Expr::terminal("Plus"),
//!                 Expr::nonterminal("Expr"),
//!             ]),
//!             Expr::terminal("Num"),
//!         ]),
//!     )
//!     .start();
//! let grammar = builder.build().expect("grammar is well-formed");
//! assert_eq!(grammar.terminal_count(), 3);
//! ```

pub mod builder;
pub(crate) mod validate;

pub use builder::{Expr, Grammar, GrammarBuilder, Guard, RuleBuilder, Separator, TerminalBuilder};

use crate::condition::Condition;
use crate::regex::{Nfa, Regex};
use compact_str::CompactString;
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Dense id of a terminal in the grammar's terminal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct TerminalId(pub(crate) u32);

/// Dense id of a nonterminal in the grammar's nonterminal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct NonTerminalId(pub(crate) u32);

/// Dense id of a production alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AltId(pub(crate) u32);

/// Id of a production alternative with a dot position: the unit of BSR
/// bookkeeping. Slots of one alternative are contiguous, dot 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SlotId(pub(crate) u32);

impl TerminalId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl NonTerminalId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl AltId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl SlotId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The slot one symbol further into the same alternative.
    #[must_use]
    pub(crate) const fn advance(self) -> Self {
        Self(self.0 + 1)
    }

    /// The slot one symbol back; only valid when `dot > 0`.
    #[must_use]
    pub(crate) const fn retreat(self) -> Self {
        Self(self.0 - 1)
    }
}

/// A terminal definition: compiled pattern plus lexical metadata.
#[derive(Debug, Clone)]
pub struct Terminal {
    pub(crate) name: CompactString,
    pub(crate) regex: Regex,
    pub(crate) nfa: Nfa,
    pub(crate) condition: Condition,
    pub(crate) ignorable: bool,
    /// Terminals this one refines (`+Name`): it wins ties against them.
    pub(crate) specializes: Vec<TerminalId>,
    /// Terminals this one generalizes (`-Name`): it loses ties to them.
    pub(crate) generalizes: Vec<TerminalId>,
    /// Dropped from the AST when true. Defaults to true for fixed
    /// punctuation literals.
    pub(crate) elidable: bool,
}

impl Terminal {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_ignorable(&self) -> bool {
        self.ignorable
    }

    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    #[must_use]
    pub const fn is_elidable(&self) -> bool {
        self.elidable
    }

    #[must_use]
    pub const fn regex(&self) -> &Regex {
        &self.regex
    }

    #[must_use]
    pub const fn nfa(&self) -> &Nfa {
        &self.nfa
    }
}

/// Why a nonterminal exists: written by the grammar author, or synthesized
/// while desugaring an iteration, optional or nested selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum NonTerminalOrigin {
    Named,
    Iteration { left_fold: bool },
    Optional { left_fold: bool },
    Group,
}

impl NonTerminalOrigin {
    #[must_use]
    pub const fn is_synthetic(self) -> bool {
        !matches!(self, Self::Named)
    }

    #[must_use]
    pub const fn is_iteration(self) -> bool {
        matches!(self, Self::Iteration { .. })
    }
}

/// A nonterminal definition.
#[derive(Debug, Clone)]
pub struct NonTerminal {
    pub(crate) name: CompactString,
    pub(crate) start: bool,
    pub(crate) condition: Condition,
    pub(crate) origin: NonTerminalOrigin,
    pub(crate) alternatives: Vec<AltId>,
}

impl NonTerminal {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_start(&self) -> bool {
        self.start
    }

    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    #[must_use]
    pub const fn origin(&self) -> NonTerminalOrigin {
        self.origin
    }

    #[must_use]
    pub fn alternatives(&self) -> &[AltId] {
        &self.alternatives
    }
}

/// One symbol of an alternative's sequence, with its admission guard.
///
/// A symbol whose guard evaluates false under the session's conditions is
/// omitted from the sequence: the driver steps over it deriving nothing.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub(crate) kind: SymbolKind,
    pub(crate) guard: Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum SymbolKind {
    Terminal(TerminalId),
    NonTerminal(NonTerminalId),
}

impl Symbol {
    #[must_use]
    pub const fn kind(&self) -> SymbolKind {
        self.kind
    }

    #[must_use]
    pub const fn guard(&self) -> &Condition {
        &self.guard
    }
}

/// One alternative of a production.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub(crate) nonterminal: NonTerminalId,
    /// Position within the owning nonterminal's alternative list.
    pub(crate) index: u32,
    /// Alternatives chained by `/` share a group; `|` starts a new group.
    /// Ordered-choice disambiguation applies within a group only.
    pub(crate) ordered_group: u32,
    pub(crate) condition: Condition,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) first_slot: SlotId,
}

impl Alternative {
    #[must_use]
    pub const fn nonterminal(&self) -> NonTerminalId {
        self.nonterminal
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Slot with the dot before symbol `dot`.
    ///
    /// # Panics
    ///
    /// Panics if `dot` exceeds the sequence length.
    #[must_use]
    pub fn slot(&self, dot: usize) -> SlotId {
        assert!(dot <= self.symbols.len());
        SlotId(self.first_slot.0 + u32::try_from(dot).expect("alternative too long"))
    }

    /// Slot with the dot at the end of the sequence.
    #[must_use]
    pub fn final_slot(&self) -> SlotId {
        self.slot(self.symbols.len())
    }
}

/// A slot: an alternative with a dot between its symbols.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub(crate) alternative: AltId,
    pub(crate) dot: u32,
}

impl Slot {
    #[must_use]
    pub const fn alternative(self) -> AltId {
        self.alternative
    }

    #[must_use]
    pub const fn dot(self) -> usize {
        self.dot as usize
    }
}

impl Grammar {
    #[must_use]
    pub fn terminal(&self, id: TerminalId) -> &Terminal {
        &self.terminals[id.index()]
    }

    #[must_use]
    pub fn nonterminal(&self, id: NonTerminalId) -> &NonTerminal {
        &self.nonterminals[id.index()]
    }

    #[must_use]
    pub fn alternative(&self, id: AltId) -> &Alternative {
        &self.alternatives[id.index()]
    }

    #[must_use]
    pub fn slot(&self, id: SlotId) -> Slot {
        self.slots[id.index()]
    }

    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    #[must_use]
    pub fn nonterminal_count(&self) -> usize {
        self.nonterminals.len()
    }

    #[must_use]
    pub fn alternative_count(&self) -> usize {
        self.alternatives.len()
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn start_symbol(&self) -> NonTerminalId {
        self.start
    }

    pub fn terminals(&self) -> impl Iterator<Item = (TerminalId, &Terminal)> {
        self.terminals
            .iter()
            .enumerate()
            .map(|(i, t)| (TerminalId(i as u32), t))
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (NonTerminalId, &NonTerminal)> {
        self.nonterminals
            .iter()
            .enumerate()
            .map(|(i, n)| (NonTerminalId(i as u32), n))
    }

    /// Id of a terminal by name.
    #[must_use]
    pub fn terminal_id(&self, name: &str) -> Option<TerminalId> {
        self.terminals
            .iter()
            .position(|t| t.name == name)
            .map(|i| TerminalId(i as u32))
    }

    /// Id of a nonterminal by name.
    #[must_use]
    pub fn nonterminal_id(&self, name: &str) -> Option<NonTerminalId> {
        self.nonterminals
            .iter()
            .position(|n| n.name == name)
            .map(|i| NonTerminalId(i as u32))
    }

    /// Declared condition names, in declaration order.
    #[must_use]
    pub fn condition_names(&self) -> &[CompactString] {
        &self.condition_names
    }

    #[must_use]
    pub fn condition_id(&self, name: &str) -> Option<crate::condition::ConditionId> {
        self.condition_names
            .iter()
            .position(|n| n == name)
            .map(|i| crate::condition::ConditionId(i as u32))
    }

    /// Build a condition assignment from names.
    ///
    /// # Errors
    ///
    /// Returns [`GrammarError::UndefinedCondition`] for names the grammar
    /// does not declare.
    ///
    /// [`GrammarError::UndefinedCondition`]: crate::error::GrammarError::UndefinedCondition
    pub fn condition_set<'n, I>(
        &self,
        names: I,
    ) -> Result<crate::condition::ConditionSet, crate::error::GrammarError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut set = crate::condition::ConditionSet::EMPTY;
        for name in names {
            let id = self.condition_id(name).ok_or_else(|| {
                crate::error::GrammarError::UndefinedCondition { name: name.into() }
            })?;
            set.insert(id);
        }
        Ok(set)
    }

    /// Whether `winner` beats `loser` on a longest-match tie, under the
    /// transitive closure of the declared precedence edges.
    #[must_use]
    pub fn wins_tie_against(&self, winner: TerminalId, loser: TerminalId) -> bool {
        self.beats_closure[winner.index()]
            .binary_search(&loser)
            .is_ok()
    }

    /// The nonterminal a slot belongs to.
    #[must_use]
    pub fn slot_nonterminal(&self, id: SlotId) -> NonTerminalId {
        self.alternative(self.slot(id).alternative).nonterminal
    }

    /// Whether the dot of `id` sits at the end of its alternative.
    #[must_use]
    pub fn slot_is_final(&self, id: SlotId) -> bool {
        let slot = self.slot(id);
        slot.dot as usize == self.alternative(slot.alternative).symbols.len()
    }

    /// The symbol immediately after the dot, if any.
    #[must_use]
    pub fn slot_symbol(&self, id: SlotId) -> Option<&Symbol> {
        let slot = self.slot(id);
        self.alternative(slot.alternative)
            .symbols
            .get(slot.dot as usize)
    }

    /// The symbol immediately before the dot, if any.
    #[must_use]
    pub fn slot_prev_symbol(&self, id: SlotId) -> Option<&Symbol> {
        let slot = self.slot(id);
        let dot = slot.dot as usize;
        if dot == 0 {
            return None;
        }
        self.alternative(slot.alternative).symbols.get(dot - 1)
    }

    /// Human-readable rendering of a slot, for traces and tests.
    #[must_use]
    pub fn display_slot(&self, id: SlotId) -> String {
        let slot = self.slot(id);
        let alt = self.alternative(slot.alternative);
        let mut out = format!("{} ::=", self.nonterminal(alt.nonterminal).name);
        for (i, symbol) in alt.symbols.iter().enumerate() {
            if i == slot.dot as usize {
                out.push_str(" .");
            }
            out.push(' ');
            match symbol.kind {
                SymbolKind::Terminal(t) => out.push_str(self.terminal(t).name()),
                SymbolKind::NonTerminal(n) => out.push_str(self.nonterminal(n).name()),
            }
        }
        if slot.dot as usize == alt.symbols.len() {
            out.push_str(" .");
        }
        out
    }
}
