//! # Forest Module
//!
//! Materialization of syntax trees from the BSR set.
//!
//! ## Overview
//!
//! The BSR set is read as a binary-branching grammar: for each span the
//! final-slot elements enumerate the derivation choices, and each choice
//! splits recursively at its pivot. Extraction applies the meta-language's
//! disambiguation rules on the way:
//!
//! 1. **Ordered choice**: within a `/`-chained group of alternatives only
//!    the earliest one with any derivation survives; `|` groups all
//!    survive and become explicit [ambiguity nodes](ForestNode::Ambiguous).
//! 2. **Longest match**: when several pivots split the same element and
//!    the symbol bounded by the pivot is an iteration or optional, the
//!    split that extends it furthest survives (greedy, left first).
//!
//! What remains is the syntax forest ([`Forest`]): a node arena with
//! shared subtrees and explicit ambiguity. The CST is the forest read
//! with the first choice taken at every ambiguity node; [`Ast`] further
//! collapses synthetic nonterminals, folds `{/X}` chains left, drops
//! elidable punctuation tokens and hoists single-child chains.

use crate::grammar::{
    AltId, Grammar, NonTerminalId, NonTerminalOrigin, SlotId, SymbolKind, TerminalId,
};
use crate::lexer::{Lexed, Lexer};
use crate::parser::BsrElement;
use crate::parser::BsrSet;
use crate::text::Span;
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

/// Arena index of a forest node.
pub type NodeIdx = usize;

/// The syntax forest: every surviving derivation of the accepted span,
/// with subtree sharing and explicit ambiguity.
#[derive(Debug, Default)]
pub struct Forest {
    nodes: Vec<ForestNode>,
    root: Option<NodeIdx>,
}

#[derive(Debug)]
pub enum ForestNode {
    /// A consumed token.
    Leaf { terminal: TerminalId, span: Span },
    /// One derivation of a nonterminal span through one alternative.
    Interior {
        nonterminal: NonTerminalId,
        alternative: AltId,
        span: Span,
        children: SmallVec<[NodeIdx; 4]>,
    },
    /// Several derivations of the same span survive disambiguation.
    /// Choices are ordered by alternative index.
    Ambiguous {
        nonterminal: NonTerminalId,
        span: Span,
        choices: SmallVec<[NodeIdx; 2]>,
    },
}

impl Forest {
    #[must_use]
    pub const fn root(&self) -> Option<NodeIdx> {
        self.root
    }

    #[must_use]
    pub fn node(&self, idx: NodeIdx) -> &ForestNode {
        &self.nodes[idx]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any ambiguity survived disambiguation.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| matches!(node, ForestNode::Ambiguous { .. }))
    }

    /// Resolve an index to its first concrete derivation, skipping
    /// ambiguity nodes. This is the CST reading of the forest.
    #[must_use]
    pub fn first_choice(&self, mut idx: NodeIdx) -> NodeIdx {
        while let ForestNode::Ambiguous { choices, .. } = &self.nodes[idx] {
            idx = choices[0];
        }
        idx
    }

    /// Render one tree (first choices) as an s-expression, tokens as
    /// their source text. Meant for tests and debugging.
    #[must_use]
    pub fn display(&self, grammar: &Grammar, source: &[u8]) -> String {
        match self.root {
            None => "()".to_string(),
            Some(root) => {
                let mut out = String::new();
                self.display_node(grammar, source, self.first_choice(root), &mut out);
                out
            }
        }
    }

    fn display_node(&self, grammar: &Grammar, source: &[u8], idx: NodeIdx, out: &mut String) {
        match &self.nodes[idx] {
            ForestNode::Leaf { span, .. } => {
                out.push('"');
                out.push_str(&String::from_utf8_lossy(span.text(source)));
                out.push('"');
            }
            ForestNode::Interior {
                nonterminal,
                children,
                ..
            } => {
                out.push('(');
                out.push_str(grammar.nonterminal(*nonterminal).name());
                for &child in children {
                    out.push(' ');
                    self.display_node(grammar, source, self.first_choice(child), out);
                }
                out.push(')');
            }
            ForestNode::Ambiguous { choices, .. } => {
                self.display_node(grammar, source, self.first_choice(choices[0]), out);
            }
        }
    }
}

/// How to pick among several pivots for one element set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PivotRule {
    /// Left-bounded symbol is an iteration/optional (or the alternative
    /// is `/`-chained): the earlier symbols extend greedily.
    Largest,
    /// Plain ambiguity; every split survives.
    All,
}

enum Derived {
    Node(NodeIdx),
    /// Zero-width slot: a guard-omitted symbol. No child.
    Absent,
    /// No derivation exists (broken cycle or pruned branch); the whole
    /// candidate children-list is dropped.
    Failed,
}

pub(crate) struct ForestBuilder<'g, 's> {
    grammar: &'g Grammar,
    bsr: &'s BsrSet,
    lexer: &'s mut Lexer<'g>,
    nodes: Vec<ForestNode>,
    memo: HashMap<(NonTerminalId, usize, usize), Option<NodeIdx>, ahash::RandomState>,
    active: HashSet<(NonTerminalId, usize, usize), ahash::RandomState>,
}

impl<'g, 's> ForestBuilder<'g, 's> {
    pub(crate) fn build(
        grammar: &'g Grammar,
        bsr: &'s BsrSet,
        lexer: &'s mut Lexer<'g>,
    ) -> Forest {
        let Some((nonterminal, start, end)) = bsr.accepting() else {
            return Forest::default();
        };
        let mut builder = Self {
            grammar,
            bsr,
            lexer,
            nodes: Vec::new(),
            memo: HashMap::default(),
            active: HashSet::default(),
        };
        let root = builder.nonterminal_node(nonterminal, start, end);
        Forest {
            nodes: builder.nodes,
            root,
        }
    }

    fn push(&mut self, node: ForestNode) -> NodeIdx {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Node for every surviving derivation of `nonterminal` over
    /// `[start, end)`; shared through the memo table.
    fn nonterminal_node(
        &mut self,
        nonterminal: NonTerminalId,
        start: usize,
        end: usize,
    ) -> Option<NodeIdx> {
        let key = (nonterminal, start, end);
        if let Some(&cached) = self.memo.get(&key) {
            return cached;
        }
        if !self.active.insert(key) {
            // A derivation that requires its own span has no finite tree.
            return None;
        }

        let elements = self.ordered_choice(self.bsr.roots_at(nonterminal, start, end));
        let mut choices: SmallVec<[NodeIdx; 2]> = SmallVec::new();
        for element in elements {
            let alternative = self.grammar.slot(element.slot).alternative();
            for children in self.prefix_lists(element) {
                choices.push(self.push(ForestNode::Interior {
                    nonterminal,
                    alternative,
                    span: Span::new(start, end),
                    children: children.into(),
                }));
            }
        }

        self.active.remove(&key);
        let result = match choices.len() {
            0 => None,
            1 => Some(choices[0]),
            _ => Some(self.push(ForestNode::Ambiguous {
                nonterminal,
                span: Span::new(start, end),
                choices,
            })),
        };
        self.memo.insert(key, result);
        result
    }

    /// Apply ordered choice across root elements, then the longest-match
    /// pivot rule within each slot's element run.
    fn ordered_choice(&self, roots: &[BsrElement]) -> Vec<BsrElement> {
        let mut winner_per_group: HashMap<u32, u32, ahash::RandomState> = HashMap::default();
        for element in roots {
            let alt = self
                .grammar
                .alternative(self.grammar.slot(element.slot).alternative());
            winner_per_group
                .entry(alt.ordered_group)
                .and_modify(|index| *index = (*index).min(alt.index))
                .or_insert(alt.index);
        }
        let mut kept: Vec<BsrElement> = roots
            .iter()
            .filter(|element| {
                let alt = self
                    .grammar
                    .alternative(self.grammar.slot(element.slot).alternative());
                winner_per_group[&alt.ordered_group] == alt.index
            })
            .copied()
            .collect();
        kept.sort_unstable_by_key(|element| {
            let alt = self
                .grammar
                .alternative(self.grammar.slot(element.slot).alternative());
            (alt.index, element.pivot)
        });

        // Longest-match over same-slot pivot runs.
        let mut pruned: Vec<BsrElement> = Vec::with_capacity(kept.len());
        let mut i = 0;
        while i < kept.len() {
            let mut j = i + 1;
            while j < kept.len() && kept[j].slot == kept[i].slot {
                j += 1;
            }
            match self.pivot_rule(kept[i].slot) {
                PivotRule::All => pruned.extend_from_slice(&kept[i..j]),
                PivotRule::Largest => pruned.push(kept[j - 1]),
            }
            i = j;
        }
        pruned
    }

    /// Longest-match rule for elements at `slot` (dot at position `d`):
    /// the pivot bounds symbol `d-2` on the right and symbol `d-1` on the
    /// left; whichever is an iteration/optional gets greedy priority,
    /// left one first.
    ///
    /// Alternatives living in a `/`-chained group additionally resolve
    /// any remaining split ambiguity greedily (earlier symbols longest):
    /// ordered choice promises a single parse, so pivots must not fan
    /// out either.
    fn pivot_rule(&self, slot: SlotId) -> PivotRule {
        let dot = self.grammar.slot(slot).dot();
        if dot >= 2 && self.greedy_before_dot(slot.retreat()) {
            return PivotRule::Largest;
        }
        if self.in_ordered_chain(slot) {
            return PivotRule::Largest;
        }
        PivotRule::All
    }

    /// Whether `slot`'s alternative shares its ordered group with another
    /// alternative, i.e. was actually chained by `/`.
    fn in_ordered_chain(&self, slot: SlotId) -> bool {
        let alt = self.grammar.alternative(self.grammar.slot(slot).alternative());
        self.grammar
            .nonterminal(alt.nonterminal())
            .alternatives()
            .iter()
            .filter(|&&other| {
                self.grammar.alternative(other).ordered_group == alt.ordered_group
            })
            .count()
            > 1
    }

    /// Whether the symbol just before `slot`'s dot is an
    /// iteration/optional-origin nonterminal.
    fn greedy_before_dot(&self, slot: SlotId) -> bool {
        self.grammar
            .slot_prev_symbol(slot)
            .is_some_and(|symbol| match symbol.kind() {
                SymbolKind::NonTerminal(nt) => matches!(
                    self.grammar.nonterminal(nt).origin(),
                    NonTerminalOrigin::Iteration { .. } | NonTerminalOrigin::Optional { .. }
                ),
                SymbolKind::Terminal(_) => false,
            })
    }

    /// Children lists for the prefix derivation ending at `element`.
    /// Multiple lists mean surviving split ambiguity.
    fn prefix_lists(&mut self, element: BsrElement) -> SmallVec<[Vec<NodeIdx>; 2]> {
        let dot = self.grammar.slot(element.slot).dot();
        if dot == 0 {
            // Empty alternative.
            return SmallVec::from_iter([Vec::new()]);
        }
        let right = match self.symbol_child(element.slot, element.pivot, element.end) {
            Derived::Failed => return SmallVec::new(),
            Derived::Absent => None,
            Derived::Node(idx) => Some(idx),
        };
        if dot == 1 {
            return SmallVec::from_iter([right.into_iter().collect()]);
        }

        let prev = element.slot.retreat();
        let mut pivots: Vec<usize> = self
            .bsr
            .pivots_at(prev, element.start, element.pivot)
            .to_vec();
        pivots.sort_unstable();
        pivots.dedup();
        match self.pivot_rule(prev) {
            PivotRule::All => {}
            PivotRule::Largest => {
                if let Some(&last) = pivots.last() {
                    pivots = vec![last];
                }
            }
        }

        let mut lists: SmallVec<[Vec<NodeIdx>; 2]> = SmallVec::new();
        for pivot in pivots {
            let sub = BsrElement {
                slot: prev,
                start: element.start,
                pivot,
                end: element.pivot,
            };
            for mut list in self.prefix_lists(sub) {
                list.extend(right);
                lists.push(list);
            }
        }
        lists
    }

    /// Child for the symbol just before `slot`'s dot, spanning
    /// `[from, to)`.
    fn symbol_child(&mut self, slot: SlotId, from: usize, to: usize) -> Derived {
        let symbol = self.grammar.slot_prev_symbol(slot).expect("dot > 0");
        match symbol.kind() {
            SymbolKind::Terminal(terminal) => {
                if from == to {
                    // Guard-omitted terminal.
                    return Derived::Absent;
                }
                match self.lexer.token_at(from) {
                    Lexed::Token(token) => {
                        let span = token.span();
                        Derived::Node(self.push(ForestNode::Leaf { terminal, span }))
                    }
                    // The driver only records spans it actually lexed.
                    Lexed::End | Lexed::Stuck(_) => Derived::Failed,
                }
            }
            SymbolKind::NonTerminal(nonterminal) => {
                if from == to && self.bsr.roots_at(nonterminal, from, to).is_empty() {
                    // Guard-omitted nonterminal, as opposed to a genuine
                    // empty derivation.
                    return Derived::Absent;
                }
                match self.nonterminal_node(nonterminal, from, to) {
                    Some(idx) => Derived::Node(idx),
                    None => Derived::Failed,
                }
            }
        }
    }
}

/// Arena index of an AST node.
pub type AstIdx = usize;

/// The abstract syntax tree: synthetic nonterminals spliced away,
/// left-fold iterations folded, punctuation elided, single-child chains
/// hoisted.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
    root: Option<AstIdx>,
}

#[derive(Debug)]
pub enum AstNode {
    Token {
        terminal: TerminalId,
        span: Span,
    },
    Node {
        nonterminal: NonTerminalId,
        span: Span,
        children: SmallVec<[AstIdx; 4]>,
    },
}

impl AstNode {
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Token { span, .. } | Self::Node { span, .. } => *span,
        }
    }
}

impl Ast {
    #[must_use]
    pub const fn root(&self) -> Option<AstIdx> {
        self.root
    }

    #[must_use]
    pub fn node(&self, idx: AstIdx) -> &AstNode {
        &self.nodes[idx]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render as an s-expression, tokens as their source text.
    #[must_use]
    pub fn display(&self, grammar: &Grammar, source: &[u8]) -> String {
        match self.root {
            None => "()".to_string(),
            Some(root) => {
                let mut out = String::new();
                self.display_node(grammar, source, root, &mut out);
                out
            }
        }
    }

    fn display_node(&self, grammar: &Grammar, source: &[u8], idx: AstIdx, out: &mut String) {
        match &self.nodes[idx] {
            AstNode::Token { span, .. } => {
                out.push('"');
                out.push_str(&String::from_utf8_lossy(span.text(source)));
                out.push('"');
            }
            AstNode::Node {
                nonterminal,
                children,
                ..
            } => {
                out.push('(');
                out.push_str(grammar.nonterminal(*nonterminal).name());
                for &child in children {
                    out.push(' ');
                    self.display_node(grammar, source, child, out);
                }
                out.push(')');
            }
        }
    }
}

pub(crate) struct AstBuilder<'g, 'f> {
    grammar: &'g Grammar,
    forest: &'f Forest,
    nodes: Vec<AstNode>,
}

impl<'g, 'f> AstBuilder<'g, 'f> {
    pub(crate) fn build(grammar: &'g Grammar, forest: &'f Forest) -> Ast {
        let mut builder = Self {
            grammar,
            forest,
            nodes: Vec::new(),
        };
        let root = forest.root().map(|root| {
            let idx = forest.first_choice(root);
            match forest.node(idx) {
                ForestNode::Leaf { terminal, span } => builder.push(AstNode::Token {
                    terminal: *terminal,
                    span: *span,
                }),
                _ => builder.named_node(idx),
            }
        });
        Ast {
            nodes: builder.nodes,
            root,
        }
    }

    fn push(&mut self, node: AstNode) -> AstIdx {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn span_of(&self, children: &[AstIdx], fallback: Span) -> Span {
        match (children.first(), children.last()) {
            (Some(&first), Some(&last)) => Span::new(
                self.nodes[first].span().start(),
                self.nodes[last].span().end(),
            ),
            _ => fallback,
        }
    }

    /// Build the node for a user-written nonterminal derivation.
    fn named_node(&mut self, idx: NodeIdx) -> AstIdx {
        let ForestNode::Interior {
            nonterminal,
            span,
            children,
            ..
        } = self.forest.node(idx)
        else {
            unreachable!("named_node expects an interior derivation");
        };
        let mut current: Vec<AstIdx> = Vec::new();
        let child_list: Vec<NodeIdx> = children.to_vec();
        for child in child_list {
            self.walk(*nonterminal, *span, child, &mut current);
        }
        // Hoist single-child chains of nonterminal nodes.
        if current.len() == 1 && matches!(self.nodes[current[0]], AstNode::Node { .. }) {
            return current[0];
        }
        let node_span = self.span_of(&current, *span);
        self.push(AstNode::Node {
            nonterminal: *nonterminal,
            span: node_span,
            children: current.into(),
        })
    }

    /// Splice one forest child into `current`, in the context of the
    /// nearest named ancestor.
    fn walk(
        &mut self,
        parent: NonTerminalId,
        parent_span: Span,
        idx: NodeIdx,
        current: &mut Vec<AstIdx>,
    ) {
        let idx = self.forest.first_choice(idx);
        match self.forest.node(idx) {
            ForestNode::Leaf { terminal, span } => {
                if !self.grammar.terminal(*terminal).is_elidable() {
                    current.push(self.push(AstNode::Token {
                        terminal: *terminal,
                        span: *span,
                    }));
                }
            }
            ForestNode::Interior {
                nonterminal,
                children,
                ..
            } => match self.grammar.nonterminal(*nonterminal).origin() {
                NonTerminalOrigin::Named => current.push(self.named_node(idx)),
                NonTerminalOrigin::Iteration { left_fold: true } => {
                    self.fold_left(parent, parent_span, idx, current);
                }
                // Groups, optionals and right-fold iterations splice
                // transparently; right-fold chains flatten through the
                // recursive tail.
                NonTerminalOrigin::Group
                | NonTerminalOrigin::Optional { .. }
                | NonTerminalOrigin::Iteration { left_fold: false } => {
                    let child_list: Vec<NodeIdx> = children.to_vec();
                    for child in child_list {
                        self.walk(parent, parent_span, child, current);
                    }
                }
            },
            ForestNode::Ambiguous { .. } => unreachable!("first_choice resolves ambiguity"),
        }
    }

    /// Left-fold an iteration chain against the named parent: each chain
    /// level wraps everything accumulated so far in a fresh parent node.
    fn fold_left(
        &mut self,
        parent: NonTerminalId,
        parent_span: Span,
        idx: NodeIdx,
        current: &mut Vec<AstIdx>,
    ) {
        let idx = self.forest.first_choice(idx);
        let ForestNode::Interior {
            nonterminal,
            children,
            ..
        } = self.forest.node(idx)
        else {
            return;
        };
        let chain_nt = *nonterminal;
        let child_list: Vec<NodeIdx> = children.to_vec();

        // The recursive tail is a trailing child deriving the same
        // synthetic nonterminal.
        let (items, tail) = match child_list.split_last() {
            Some((&last, init)) => {
                let resolved = self.forest.first_choice(last);
                let is_tail = matches!(
                    self.forest.node(resolved),
                    ForestNode::Interior { nonterminal, .. } if *nonterminal == chain_nt
                );
                if is_tail {
                    (init.to_vec(), Some(resolved))
                } else {
                    (child_list.clone(), None)
                }
            }
            None => (Vec::new(), None),
        };

        let mut level: Vec<AstIdx> = Vec::new();
        for item in items {
            self.walk(parent, parent_span, item, &mut level);
        }
        if !level.is_empty() && current.is_empty() {
            // Nothing accumulated yet: the first level seeds the fold.
            *current = level;
        } else if !level.is_empty() {
            let folded_children: Vec<AstIdx> = std::mem::take(current);
            let span = self.span_of(&folded_children, parent_span);
            let acc = if folded_children.len() == 1
                && matches!(self.nodes[folded_children[0]], AstNode::Node { .. })
            {
                folded_children[0]
            } else {
                self.push(AstNode::Node {
                    nonterminal: parent,
                    span,
                    children: folded_children.into(),
                })
            };
            let mut next: Vec<AstIdx> = vec![acc];
            next.extend(level);
            let span = self.span_of(&next, parent_span);
            let folded = self.push(AstNode::Node {
                nonterminal: parent,
                span,
                children: next.into(),
            });
            *current = vec![folded];
        }
        if let Some(tail) = tail {
            self.fold_left(parent, parent_span, tail, current);
        }
    }
}
