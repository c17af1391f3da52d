//! Boolean condition algebra gating terminals and production alternatives.
//!
//! A grammar declares a fixed universe of condition names. Every terminal
//! and every production alternative may carry a condition expression over
//! that universe; a parse session supplies one total assignment
//! ([`ConditionSet`]) and the expression decides whether the guarded item
//! participates in that session at all.
//!
//! Evaluation is pure and total: expressions reference conditions by
//! resolved id, so an expression that survived grammar loading can never
//! fail to evaluate.

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of condition names a grammar may declare.
///
/// Assignments are stored as a 64-bit mask; grammars wanting more dialect
/// flags than that are rejected at load time.
pub const MAX_CONDITIONS: usize = 64;

/// Dense id of a declared condition name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ConditionId(pub(crate) u32);

impl ConditionId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A total assignment of truth values to the declared condition names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ConditionSet(u64);

impl ConditionSet {
    /// The assignment with every condition false.
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn contains(self, id: ConditionId) -> bool {
        self.0 & (1 << id.0) != 0
    }

    /// Returns a copy of the assignment with `id` set true.
    #[must_use]
    pub const fn with(self, id: ConditionId) -> Self {
        Self(self.0 | (1 << id.0))
    }

    pub const fn insert(&mut self, id: ConditionId) {
        self.0 |= 1 << id.0;
    }

    /// Pointwise ordering: true iff every condition true in `self` is also
    /// true in `other`.
    #[must_use]
    pub const fn subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }
}

/// Condition expression: a disjunction of conjunctions of possibly-negated
/// atoms, where an atom is a condition name or a parenthesized
/// sub-disjunction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Condition {
    /// Trivially true; the guard of unguarded items.
    Always,
    Atom(ConditionId),
    Not(Box<Condition>),
    /// Conjunction of all operands.
    All(Vec<Condition>),
    /// Disjunction of any operand.
    Any(Vec<Condition>),
}

impl Condition {
    #[must_use]
    pub const fn atom(id: ConditionId) -> Self {
        Self::Atom(id)
    }

    #[must_use]
    pub fn not(cond: Self) -> Self {
        Self::Not(Box::new(cond))
    }

    /// Conjunction. A single operand collapses to itself.
    #[must_use]
    pub fn all<I>(conds: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut vec: Vec<_> = conds.into_iter().collect();
        match vec.len() {
            0 => Self::Always,
            1 => vec.pop().unwrap(),
            _ => Self::All(vec),
        }
    }

    /// Disjunction. A single operand collapses to itself.
    #[must_use]
    pub fn any<I>(conds: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut vec: Vec<_> = conds.into_iter().collect();
        match vec.len() {
            0 => Self::Always,
            1 => vec.pop().unwrap(),
            _ => Self::Any(vec),
        }
    }

    /// Evaluate against an assignment. Pure and total.
    #[must_use]
    pub fn eval(&self, assignment: ConditionSet) -> bool {
        match self {
            Self::Always => true,
            Self::Atom(id) => assignment.contains(*id),
            Self::Not(inner) => !inner.eval(assignment),
            Self::All(conds) => conds.iter().all(|c| c.eval(assignment)),
            Self::Any(conds) => conds.iter().any(|c| c.eval(assignment)),
        }
    }

    /// Whether the expression is free of negation. Negation-free guards
    /// admit monotonically more items as conditions are switched on.
    #[must_use]
    pub fn is_negation_free(&self) -> bool {
        match self {
            Self::Always | Self::Atom(_) => true,
            Self::Not(_) => false,
            Self::All(conds) | Self::Any(conds) => {
                conds.iter().all(Self::is_negation_free)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "true"),
            Self::Atom(id) => write!(f, "c{}", id.0),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::All(conds) => {
                let mut sep = "";
                write!(f, "(")?;
                for cond in conds {
                    write!(f, "{sep}{cond}")?;
                    sep = " && ";
                }
                write!(f, ")")
            }
            Self::Any(conds) => {
                let mut sep = "";
                write!(f, "(")?;
                for cond in conds {
                    write!(f, "{sep}{cond}")?;
                    sep = " || ";
                }
                write!(f, ")")
            }
        }
    }
}
