//! Binary Subtree Representation: the canonical ambiguous parse output.
//!
//! A BSR element is a quadruple `(slot, start, pivot, end)`: the slot's
//! alternative derives `source[start..end]`, its symbols before the dot
//! minus the last one derive `source[start..pivot]`, and the symbol just
//! before the dot derives `source[pivot..end]`. The set of elements whose
//! slot is the final slot of an alternative of nonterminal `N`, sharing
//! `(start, end)`, enumerates every derivation of `N` over that span.

use crate::grammar::{NonTerminalId, SlotId};
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

/// One BSR quadruple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BsrElement {
    pub slot: SlotId,
    pub start: usize,
    pub pivot: usize,
    pub end: usize,
}

/// The set of BSR elements produced by one parse, with the two indices
/// forest extraction needs: complete derivations by nonterminal span, and
/// prefix derivations by slot span.
#[derive(Debug, Default)]
pub struct BsrSet {
    elements: HashSet<BsrElement, ahash::RandomState>,
    /// `(nonterminal, start, end)` -> final-slot elements: the root
    /// choices for that span.
    roots: HashMap<(NonTerminalId, usize, usize), SmallVec<[BsrElement; 2]>, ahash::RandomState>,
    /// `(slot, start, end)` -> pivots of the elements with that key.
    pivots: HashMap<(SlotId, usize, usize), SmallVec<[usize; 2]>, ahash::RandomState>,
    /// Root span of a successful parse, set by the driver.
    accepting: Option<(NonTerminalId, usize, usize)>,
}

impl BsrSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a prefix element. Returns false if it was already present.
    pub(crate) fn add(&mut self, element: BsrElement) -> bool {
        if !self.elements.insert(element) {
            return false;
        }
        self.pivots
            .entry((element.slot, element.start, element.end))
            .or_default()
            .push(element.pivot);
        true
    }

    /// Record a complete derivation: `slot` must be the final slot of one
    /// of `nonterminal`'s alternatives.
    pub(crate) fn add_root(&mut self, nonterminal: NonTerminalId, element: BsrElement) {
        if !self.add(element) {
            return;
        }
        self.roots
            .entry((nonterminal, element.start, element.end))
            .or_default()
            .push(element);
    }

    pub(crate) fn set_accepting(&mut self, key: (NonTerminalId, usize, usize)) {
        self.accepting = Some(key);
    }

    /// Number of distinct elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn contains(&self, element: &BsrElement) -> bool {
        self.elements.contains(element)
    }

    /// All elements, sorted; the canonical set representation.
    #[must_use]
    pub fn elements(&self) -> Vec<BsrElement> {
        let mut all: Vec<_> = self.elements.iter().copied().collect();
        all.sort_unstable();
        all
    }

    /// Complete derivations of `nonterminal` over `[start, end)`.
    #[must_use]
    pub fn roots_at(
        &self,
        nonterminal: NonTerminalId,
        start: usize,
        end: usize,
    ) -> &[BsrElement] {
        self.roots
            .get(&(nonterminal, start, end))
            .map_or(&[], SmallVec::as_slice)
    }

    /// Pivots of the prefix elements keyed `(slot, start, end)`.
    #[must_use]
    pub fn pivots_at(&self, slot: SlotId, start: usize, end: usize) -> &[usize] {
        self.pivots
            .get(&(slot, start, end))
            .map_or(&[], SmallVec::as_slice)
    }

    /// Span of the accepted start-symbol derivation, when the parse
    /// succeeded.
    #[must_use]
    pub const fn accepting(&self) -> Option<(NonTerminalId, usize, usize)> {
        self.accepting
    }
}
