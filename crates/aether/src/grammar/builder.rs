//! Grammar construction: name resolution, desugaring, and assembly of the
//! immutable IR.

use super::validate;
use super::{
    AltId, Alternative, NonTerminal, NonTerminalId, NonTerminalOrigin, Slot, SlotId, Symbol,
    SymbolKind, Terminal, TerminalId,
};
use crate::condition::{Condition, ConditionId, MAX_CONDITIONS};
use crate::error::GrammarError;
use crate::regex::{Nfa, Regex};
use compact_str::CompactString;
use hashbrown::HashMap;
use lasso::{Rodeo, Spur};

/// The immutable grammar IR. See the [module docs](crate::grammar).
#[derive(Debug, Clone)]
pub struct Grammar {
    pub(crate) condition_names: Vec<CompactString>,
    pub(crate) terminals: Vec<Terminal>,
    pub(crate) nonterminals: Vec<NonTerminal>,
    pub(crate) alternatives: Vec<Alternative>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) start: NonTerminalId,
    /// Per terminal: every terminal it beats on a tie, transitively.
    /// Sorted for binary search.
    pub(crate) beats_closure: Vec<Vec<TerminalId>>,
}

impl Grammar {
    #[must_use]
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::new()
    }
}

/// Separator between two selection arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `|`: both arms survive, ambiguity is preserved.
    Ambiguous,
    /// `/`: the earlier arm that derives anything wins.
    Ordered,
}

/// Condition guard written against condition *names*; resolved to a
/// [`Condition`] over dense ids when the grammar is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Name(CompactString),
    Not(Box<Guard>),
    All(Vec<Guard>),
    Any(Vec<Guard>),
    /// The `@lexical` dialect tag; auto-declares the `lexical` condition.
    Lexical,
    /// The `@syntactic` dialect tag; auto-declares the `syntactic`
    /// condition.
    Syntactic,
}

impl Guard {
    #[must_use]
    pub fn name(name: impl Into<CompactString>) -> Self {
        Self::Name(name.into())
    }

    #[must_use]
    pub fn not(guard: Self) -> Self {
        Self::Not(Box::new(guard))
    }

    #[must_use]
    pub fn all<I: IntoIterator<Item = Self>>(guards: I) -> Self {
        Self::All(guards.into_iter().collect())
    }

    #[must_use]
    pub fn any<I: IntoIterator<Item = Self>>(guards: I) -> Self {
        Self::Any(guards.into_iter().collect())
    }
}

/// Production body expression, written against symbol *names*.
///
/// Iterations, optionals and nested selections are desugared into
/// synthetic nonterminals when the grammar is built, so the runtime IR
/// only ever sees flat alternatives of plain symbols.
#[derive(Debug, Clone)]
pub enum Expr {
    Terminal(CompactString),
    NonTerminal(CompactString),
    Seq(Vec<Expr>),
    Selection {
        arms: Vec<Expr>,
        /// `separators[i]` sits between `arms[i]` and `arms[i + 1]`.
        separators: Vec<Separator>,
    },
    /// `{X}` (right-folded) or `{/X}` (left-folded): zero or more.
    Iteration { expr: Box<Expr>, left_fold: bool },
    /// `[X]` or `[/X]`: zero or one.
    Optional { expr: Box<Expr>, left_fold: bool },
    /// `X` guarded by a condition; omitted when the guard is false.
    Guarded { expr: Box<Expr>, guard: Guard },
}

impl Expr {
    #[must_use]
    pub fn terminal(name: impl Into<CompactString>) -> Self {
        Self::Terminal(name.into())
    }

    #[must_use]
    pub fn nonterminal(name: impl Into<CompactString>) -> Self {
        Self::NonTerminal(name.into())
    }

    /// Sequence. A single item collapses to itself.
    #[must_use]
    pub fn seq<I: IntoIterator<Item = Self>>(items: I) -> Self {
        let mut vec: Vec<_> = items.into_iter().collect();
        if vec.len() == 1 { vec.pop().unwrap() } else { Self::Seq(vec) }
    }

    /// Selection with every arm separated by `|`.
    #[must_use]
    pub fn choice<I: IntoIterator<Item = Self>>(arms: I) -> Self {
        Self::selection_uniform(arms, Separator::Ambiguous)
    }

    /// Selection with every arm separated by `/`.
    #[must_use]
    pub fn ordered<I: IntoIterator<Item = Self>>(arms: I) -> Self {
        Self::selection_uniform(arms, Separator::Ordered)
    }

    /// Selection with explicit separators between arms.
    #[must_use]
    pub fn selection<I: IntoIterator<Item = (Separator, Self)>>(first: Self, rest: I) -> Self {
        let mut arms = vec![first];
        let mut separators = Vec::new();
        for (sep, arm) in rest {
            separators.push(sep);
            arms.push(arm);
        }
        if arms.len() == 1 {
            arms.pop().unwrap()
        } else {
            Self::Selection { arms, separators }
        }
    }

    fn selection_uniform<I: IntoIterator<Item = Self>>(arms: I, sep: Separator) -> Self {
        let arms: Vec<_> = arms.into_iter().collect();
        let mut iter = arms.into_iter();
        let first = iter.next().expect("selection needs at least one arm");
        Self::selection(first, iter.map(|arm| (sep, arm)))
    }

    /// `{X}`: zero or more, right-folded.
    #[must_use]
    pub fn iteration(expr: Self) -> Self {
        Self::Iteration { expr: Box::new(expr), left_fold: false }
    }

    /// `{/X}`: zero or more, left-folded during AST construction.
    #[must_use]
    pub fn iteration_left(expr: Self) -> Self {
        Self::Iteration { expr: Box::new(expr), left_fold: true }
    }

    /// `[X]`: zero or one.
    #[must_use]
    pub fn optional(expr: Self) -> Self {
        Self::Optional { expr: Box::new(expr), left_fold: false }
    }

    /// `[/X]`: zero or one, left-fold flavor.
    #[must_use]
    pub fn optional_left(expr: Self) -> Self {
        Self::Optional { expr: Box::new(expr), left_fold: true }
    }

    #[must_use]
    pub fn guarded(expr: Self, guard: Guard) -> Self {
        Self::Guarded { expr: Box::new(expr), guard }
    }
}

#[derive(Debug, Clone)]
struct TerminalDef {
    name: CompactString,
    pattern: String,
    guard: Option<Guard>,
    ignorable: bool,
    specializes: Vec<CompactString>,
    generalizes: Vec<CompactString>,
    elidable: Option<bool>,
}

#[derive(Debug, Clone)]
struct RuleDef {
    name: CompactString,
    start: bool,
    guard: Option<Guard>,
    body: Expr,
}

/// Builder assembling a [`Grammar`] from terminal and production
/// definitions. All validation happens in [`GrammarBuilder::build`].
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    conditions: Vec<CompactString>,
    terminals: Vec<TerminalDef>,
    rules: Vec<RuleDef>,
}

impl GrammarBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a condition name.
    pub fn condition(&mut self, name: impl Into<CompactString>) -> &mut Self {
        let name = name.into();
        if !self.conditions.contains(&name) {
            self.conditions.push(name);
        }
        self
    }

    /// Define a terminal with a pattern in the restricted POSIX-ERE
    /// dialect. Returns a sub-builder for lexical metadata.
    pub fn terminal(
        &mut self,
        name: impl Into<CompactString>,
        pattern: impl Into<String>,
    ) -> TerminalBuilder<'_> {
        self.terminals.push(TerminalDef {
            name: name.into(),
            pattern: pattern.into(),
            guard: None,
            ignorable: false,
            specializes: Vec::new(),
            generalizes: Vec::new(),
            elidable: None,
        });
        TerminalBuilder {
            def: self.terminals.last_mut().unwrap(),
        }
    }

    /// Define a production. Returns a sub-builder for the start flag and
    /// the static condition.
    pub fn rule(&mut self, name: impl Into<CompactString>, body: Expr) -> RuleBuilder<'_> {
        self.rules.push(RuleDef {
            name: name.into(),
            start: false,
            guard: None,
            body,
        });
        RuleBuilder {
            def: self.rules.last_mut().unwrap(),
        }
    }

    /// Resolve names, desugar, validate, and assemble the IR.
    ///
    /// # Errors
    ///
    /// Any inconsistency in the description is reported as a
    /// [`GrammarError`]; see its variants for the full list of checks.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        let mut ctx = BuildCtx::new(self.conditions);

        // Terminal names first, so precedence edges can resolve forward
        // references.
        for def in &self.terminals {
            ctx.declare_terminal(&def.name)?;
        }
        for def in self.terminals {
            ctx.define_terminal(def)?;
        }

        for def in &self.rules {
            ctx.declare_rule(&def.name, def.start)?;
        }
        if self.rules.is_empty() {
            return Err(GrammarError::NoStartSymbol);
        }
        for def in self.rules {
            ctx.define_rule(def)?;
        }

        ctx.finish()
    }
}

/// Chained configuration of one terminal definition.
pub struct TerminalBuilder<'b> {
    def: &'b mut TerminalDef,
}

impl TerminalBuilder<'_> {
    /// Skip matches of this terminal instead of emitting tokens.
    pub fn ignorable(&mut self) -> &mut Self {
        self.def.ignorable = true;
        self
    }

    /// Admit this terminal only when the guard holds.
    pub fn when(&mut self, guard: Guard) -> &mut Self {
        self.def.guard = Some(guard);
        self
    }

    /// `+Name`: this terminal refines `name` and wins longest-match ties
    /// against it.
    pub fn specializes(&mut self, name: impl Into<CompactString>) -> &mut Self {
        self.def.specializes.push(name.into());
        self
    }

    /// `-Name`: this terminal generalizes `name` and loses longest-match
    /// ties to it.
    pub fn generalizes(&mut self, name: impl Into<CompactString>) -> &mut Self {
        self.def.generalizes.push(name.into());
        self
    }

    /// Override whether tokens of this terminal are dropped from the AST.
    /// The default is true exactly for fixed punctuation literals.
    pub fn elidable(&mut self, elidable: bool) -> &mut Self {
        self.def.elidable = Some(elidable);
        self
    }
}

/// Chained configuration of one production definition.
pub struct RuleBuilder<'b> {
    def: &'b mut RuleDef,
}

impl RuleBuilder<'_> {
    /// Mark this production as the start symbol. Exactly one production
    /// must be marked.
    pub fn start(&mut self) -> &mut Self {
        self.def.start = true;
        self
    }

    /// Admit this production (all its alternatives) only when the guard
    /// holds.
    pub fn when(&mut self, guard: Guard) -> &mut Self {
        self.def.guard = Some(guard);
        self
    }
}

struct BuildCtx {
    rodeo: Rodeo,
    condition_names: Vec<CompactString>,
    condition_ids: HashMap<Spur, ConditionId, ahash::RandomState>,
    terminal_ids: HashMap<Spur, TerminalId, ahash::RandomState>,
    nonterminal_ids: HashMap<Spur, NonTerminalId, ahash::RandomState>,
    terminals: Vec<Terminal>,
    nonterminals: Vec<NonTerminal>,
    alternatives: Vec<Alternative>,
    start: Option<NonTerminalId>,
    /// Synthetic-name counter per owning rule.
    synth_counter: u32,
}

impl BuildCtx {
    fn new(declared_conditions: Vec<CompactString>) -> Self {
        let mut ctx = Self {
            rodeo: Rodeo::default(),
            condition_names: Vec::new(),
            condition_ids: HashMap::default(),
            terminal_ids: HashMap::default(),
            nonterminal_ids: HashMap::default(),
            terminals: Vec::new(),
            nonterminals: Vec::new(),
            alternatives: Vec::new(),
            start: None,
            synth_counter: 0,
        };
        for name in declared_conditions {
            ctx.intern_condition(&name);
        }
        ctx
    }

    fn intern_condition(&mut self, name: &str) -> ConditionId {
        let spur = self.rodeo.get_or_intern(name);
        *self.condition_ids.entry(spur).or_insert_with(|| {
            let id = ConditionId(self.condition_names.len() as u32);
            self.condition_names.push(name.into());
            id
        })
    }

    fn resolve_guard(&mut self, guard: &Guard) -> Result<Condition, GrammarError> {
        match guard {
            Guard::Name(name) => {
                let spur = self.rodeo.get_or_intern(name.as_str());
                let id = self.condition_ids.get(&spur).copied().ok_or_else(|| {
                    GrammarError::UndefinedCondition { name: name.clone() }
                })?;
                Ok(Condition::atom(id))
            }
            // Dialect tags declare their condition on first use.
            Guard::Lexical => Ok(Condition::atom(self.intern_condition("lexical"))),
            Guard::Syntactic => Ok(Condition::atom(self.intern_condition("syntactic"))),
            Guard::Not(inner) => Ok(Condition::not(self.resolve_guard(inner)?)),
            Guard::All(guards) => {
                let conds: Result<Vec<_>, _> =
                    guards.iter().map(|g| self.resolve_guard(g)).collect();
                Ok(Condition::all(conds?))
            }
            Guard::Any(guards) => {
                let conds: Result<Vec<_>, _> =
                    guards.iter().map(|g| self.resolve_guard(g)).collect();
                Ok(Condition::any(conds?))
            }
        }
    }

    fn resolve_opt_guard(&mut self, guard: Option<&Guard>) -> Result<Condition, GrammarError> {
        guard.map_or(Ok(Condition::Always), |g| self.resolve_guard(g))
    }

    fn declare_terminal(&mut self, name: &str) -> Result<(), GrammarError> {
        let spur = self.rodeo.get_or_intern(name);
        // Entries are pushed in declaration order, so the running count is
        // the id.
        let id = TerminalId(self.terminal_ids.len() as u32);
        if self.terminal_ids.insert(spur, id).is_some() {
            return Err(GrammarError::DuplicateTerminal { name: name.into() });
        }
        Ok(())
    }

    fn terminal_ref(&mut self, name: &str) -> Result<TerminalId, GrammarError> {
        let spur = self.rodeo.get_or_intern(name);
        self.terminal_ids
            .get(&spur)
            .copied()
            .ok_or_else(|| GrammarError::UndefinedTerminal { name: name.into() })
    }

    fn nonterminal_ref(&mut self, name: &str) -> Result<NonTerminalId, GrammarError> {
        let spur = self.rodeo.get_or_intern(name);
        self.nonterminal_ids
            .get(&spur)
            .copied()
            .ok_or_else(|| GrammarError::UndefinedNonTerminal { name: name.into() })
    }

    fn define_terminal(&mut self, def: TerminalDef) -> Result<(), GrammarError> {
        let regex = Regex::parse(&def.pattern).map_err(|source| {
            GrammarError::MalformedPattern {
                name: def.name.clone(),
                source,
            }
        })?;
        if regex.is_nullable() {
            return Err(GrammarError::NullablePattern { name: def.name });
        }
        let nfa = Nfa::compile(&regex);
        let condition = self.resolve_opt_guard(def.guard.as_ref())?;
        let specializes = def
            .specializes
            .iter()
            .map(|n| self.terminal_ref(n))
            .collect::<Result<Vec<_>, _>>()?;
        let generalizes = def
            .generalizes
            .iter()
            .map(|n| self.terminal_ref(n))
            .collect::<Result<Vec<_>, _>>()?;
        let elidable = def.elidable.unwrap_or_else(|| default_elidable(&regex));
        self.terminals.push(Terminal {
            name: def.name,
            regex,
            nfa,
            condition,
            ignorable: def.ignorable,
            specializes,
            generalizes,
            elidable,
        });
        Ok(())
    }

    fn declare_rule(&mut self, name: &str, start: bool) -> Result<(), GrammarError> {
        let spur = self.rodeo.get_or_intern(name);
        let id = NonTerminalId(self.nonterminals.len() as u32);
        if self.nonterminal_ids.insert(spur, id).is_some() {
            return Err(GrammarError::DuplicateNonTerminal { name: name.into() });
        }
        if start {
            if let Some(first) = self.start {
                return Err(GrammarError::MultipleStartSymbols {
                    first: self.nonterminals[first.index()].name.clone(),
                    second: name.into(),
                });
            }
            self.start = Some(id);
        }
        self.nonterminals.push(NonTerminal {
            name: name.into(),
            start,
            condition: Condition::Always,
            origin: NonTerminalOrigin::Named,
            alternatives: Vec::new(),
        });
        Ok(())
    }

    fn define_rule(&mut self, def: RuleDef) -> Result<(), GrammarError> {
        let id = self.nonterminal_ref(&def.name)?;
        self.synth_counter = 0;
        self.nonterminals[id.index()].condition = self.resolve_opt_guard(def.guard.as_ref())?;
        self.lower_body(id, &def.name, def.body)
    }

    /// Append a synthetic nonterminal derived while desugaring `base`.
    fn synthesize(&mut self, base: &str, origin: NonTerminalOrigin) -> NonTerminalId {
        let id = NonTerminalId(self.nonterminals.len() as u32);
        let name = CompactString::from(format!("{base}#{}", self.synth_counter));
        self.synth_counter += 1;
        self.nonterminals.push(NonTerminal {
            name,
            start: false,
            condition: Condition::Always,
            origin,
            alternatives: Vec::new(),
        });
        id
    }

    /// Lower a production body into alternatives of `owner`.
    fn lower_body(
        &mut self,
        owner: NonTerminalId,
        base: &str,
        body: Expr,
    ) -> Result<(), GrammarError> {
        let (arms, separators) = match body {
            Expr::Selection { arms, separators } => (arms, separators),
            other => (vec![other], Vec::new()),
        };
        let mut group = 0u32;
        for (i, arm) in arms.into_iter().enumerate() {
            if i > 0 && separators[i - 1] == Separator::Ambiguous {
                group += 1;
            }
            // A guard wrapping a whole arm gates the alternative.
            let (arm, condition) = match arm {
                Expr::Guarded { expr, guard } => {
                    let cond = self.resolve_guard(&guard)?;
                    (*expr, cond)
                }
                other => (other, Condition::Always),
            };
            let symbols = self.lower_seq(base, arm)?;
            self.push_alternative(owner, group, condition, symbols);
        }
        Ok(())
    }

    fn push_alternative(
        &mut self,
        owner: NonTerminalId,
        group: u32,
        condition: Condition,
        symbols: Vec<Symbol>,
    ) {
        let id = AltId(self.alternatives.len() as u32);
        let index = self.nonterminals[owner.index()].alternatives.len() as u32;
        self.alternatives.push(Alternative {
            nonterminal: owner,
            index,
            ordered_group: group,
            condition,
            symbols,
            // Patched once all alternatives exist and slots are laid out.
            first_slot: SlotId(0),
        });
        self.nonterminals[owner.index()].alternatives.push(id);
    }

    /// Lower an expression into a symbol sequence, synthesizing
    /// nonterminals for anything that is not a plain reference.
    fn lower_seq(&mut self, base: &str, expr: Expr) -> Result<Vec<Symbol>, GrammarError> {
        match expr {
            Expr::Terminal(name) => {
                let id = self.terminal_ref(&name)?;
                Ok(vec![Symbol {
                    kind: SymbolKind::Terminal(id),
                    guard: Condition::Always,
                }])
            }
            Expr::NonTerminal(name) => {
                let id = self.nonterminal_ref(&name)?;
                Ok(vec![Symbol {
                    kind: SymbolKind::NonTerminal(id),
                    guard: Condition::Always,
                }])
            }
            Expr::Seq(items) => {
                let mut symbols = Vec::new();
                for item in items {
                    symbols.extend(self.lower_seq(base, item)?);
                }
                Ok(symbols)
            }
            Expr::Guarded { expr, guard } => {
                let condition = self.resolve_guard(&guard)?;
                let mut symbols = self.lower_seq(base, *expr)?;
                match symbols.len() {
                    1 => {
                        let symbol = &mut symbols[0];
                        symbol.guard = Condition::all([
                            std::mem::replace(&mut symbol.guard, Condition::Always),
                            condition,
                        ]);
                        Ok(symbols)
                    }
                    _ => {
                        // Guard over a multi-symbol fragment: wrap it so a
                        // single guarded symbol stands for the whole run.
                        let id = self.synthesize(base, NonTerminalOrigin::Group);
                        self.push_alternative(id, 0, Condition::Always, symbols);
                        Ok(vec![Symbol {
                            kind: SymbolKind::NonTerminal(id),
                            guard: condition,
                        }])
                    }
                }
            }
            Expr::Iteration { expr, left_fold } => {
                let id = self.synthesize(base, NonTerminalOrigin::Iteration { left_fold });
                let mut symbols = self.lower_seq(base, *expr)?;
                symbols.push(Symbol {
                    kind: SymbolKind::NonTerminal(id),
                    guard: Condition::Always,
                });
                // Right-recursive expansion: X I | ε.
                self.push_alternative(id, 0, Condition::Always, symbols);
                self.push_alternative(id, 0, Condition::Always, Vec::new());
                Ok(vec![Symbol {
                    kind: SymbolKind::NonTerminal(id),
                    guard: Condition::Always,
                }])
            }
            Expr::Optional { expr, left_fold } => {
                let id = self.synthesize(base, NonTerminalOrigin::Optional { left_fold });
                let symbols = self.lower_seq(base, *expr)?;
                // Present | absent.
                self.push_alternative(id, 0, Condition::Always, symbols);
                self.push_alternative(id, 0, Condition::Always, Vec::new());
                Ok(vec![Symbol {
                    kind: SymbolKind::NonTerminal(id),
                    guard: Condition::Always,
                }])
            }
            Expr::Selection { .. } => {
                let id = self.synthesize(base, NonTerminalOrigin::Group);
                self.lower_body(id, base, expr)?;
                Ok(vec![Symbol {
                    kind: SymbolKind::NonTerminal(id),
                    guard: Condition::Always,
                }])
            }
        }
    }

    fn finish(self) -> Result<Grammar, GrammarError> {
        let Self {
            condition_names,
            terminals,
            mut nonterminals,
            mut alternatives,
            start,
            ..
        } = self;

        if condition_names.len() > MAX_CONDITIONS {
            return Err(GrammarError::TooManyConditions {
                count: condition_names.len(),
            });
        }
        let start = start.ok_or(GrammarError::NoStartSymbol)?;

        let beats_closure = validate::precedence_closure(&terminals)?;

        // Lay out slots: dots of one alternative are contiguous.
        let mut slots = Vec::new();
        for (i, alt) in alternatives.iter_mut().enumerate() {
            alt.first_slot = SlotId(slots.len() as u32);
            for dot in 0..=alt.symbols.len() {
                slots.push(Slot {
                    alternative: AltId(i as u32),
                    dot: dot as u32,
                });
            }
        }

        // Keep alternative lists in declaration order; ids already are.
        for nt in &mut nonterminals {
            nt.alternatives.sort_unstable();
        }

        Ok(Grammar {
            condition_names,
            terminals,
            nonterminals,
            alternatives,
            slots,
            start,
            beats_closure,
        })
    }
}

/// Default AST elision: fixed literals made only of non-alphanumeric
/// bytes (punctuation).
fn default_elidable(regex: &Regex) -> bool {
    fn literal_bytes(regex: &Regex, out: &mut Vec<u8>) -> bool {
        match regex {
            Regex::Byte(byte) => {
                out.push(*byte);
                true
            }
            Regex::Seq(items) => items.iter().all(|item| literal_bytes(item, out)),
            _ => false,
        }
    }
    let mut bytes = Vec::new();
    literal_bytes(regex, &mut bytes)
        && !bytes.is_empty()
        && bytes.iter().all(|b| !b.is_ascii_alphanumeric())
}
