//! Load-time validation of the terminal precedence relation.
//!
//! `+Name` and `-Name` specifiers induce a "beats on tie" relation between
//! terminals. The relation must be a strict partial order: its transitive
//! closure is computed here once per grammar, and any cycle is rejected
//! with the offending terminal names spelled out.

use super::{Terminal, TerminalId};
use crate::error::GrammarError;
use std::collections::BTreeSet;

/// Compute the per-terminal tie-break closure.
///
/// Entry `i` lists every terminal that terminal `i` beats, transitively,
/// sorted for binary search.
pub(crate) fn precedence_closure(
    terminals: &[Terminal],
) -> Result<Vec<Vec<TerminalId>>, GrammarError> {
    let n = terminals.len();
    let mut beats: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, terminal) in terminals.iter().enumerate() {
        // `+U`: i refines U and wins against it.
        for u in &terminal.specializes {
            beats[i].push(u.index());
        }
        // `-U`: i generalizes U, so U wins against i.
        for u in &terminal.generalizes {
            beats[u.index()].push(i);
        }
    }
    for row in &mut beats {
        row.sort_unstable();
        row.dedup();
    }

    if let Some(cycle) = find_cycle(&beats) {
        return Err(GrammarError::PrecedenceCycle {
            cycle: cycle
                .into_iter()
                .map(|i| terminals[i].name.clone())
                .collect(),
        });
    }

    // Acyclic, so plain reachability. Terminals are few; a DFS per node
    // with memoized results is enough.
    let mut closure: Vec<Option<BTreeSet<usize>>> = vec![None; n];
    for i in 0..n {
        close(i, &beats, &mut closure);
    }
    Ok(closure
        .into_iter()
        .map(|set| {
            set.expect("closed above")
                .into_iter()
                .map(|i| TerminalId(i as u32))
                .collect()
        })
        .collect())
}

fn close(node: usize, beats: &[Vec<usize>], closure: &mut Vec<Option<BTreeSet<usize>>>) {
    if closure[node].is_some() {
        return;
    }
    // Mark before recursing; the graph is acyclic so the placeholder is
    // never observed.
    closure[node] = Some(BTreeSet::new());
    let mut set = BTreeSet::new();
    for &next in &beats[node] {
        set.insert(next);
        close(next, beats, closure);
        set.extend(closure[next].as_ref().expect("closed above"));
    }
    closure[node] = Some(set);
}

/// Iterative three-color DFS; returns one cycle as a node path
/// `v0 -> v1 -> ... -> v0` when the relation is not acyclic.
fn find_cycle(beats: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    let mut color = vec![Color::White; beats.len()];
    for root in 0..beats.len() {
        if color[root] != Color::White {
            continue;
        }
        let mut path: Vec<usize> = Vec::new();
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        color[root] = Color::Grey;
        path.push(root);
        while let Some(&mut (node, ref mut edge)) = stack.last_mut() {
            let next = if *edge < beats[node].len() {
                let next = beats[node][*edge];
                *edge += 1;
                Some(next)
            } else {
                None
            };
            match next {
                None => {
                    color[node] = Color::Black;
                    path.pop();
                    stack.pop();
                }
                Some(next) => match color[next] {
                    Color::Grey => {
                        let from = path.iter().position(|&p| p == next).expect("grey on path");
                        let mut cycle: Vec<usize> = path[from..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Color::White => {
                        color[next] = Color::Grey;
                        path.push(next);
                        stack.push((next, 0));
                    }
                    Color::Black => {}
                },
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use crate::error::GrammarError;
    use crate::grammar::{Expr, GrammarBuilder};

    #[test]
    fn test_specializes_beats_target() {
        let mut builder = GrammarBuilder::new();
        builder.terminal("Id", "[a-z]+");
        builder.terminal("Kw", "if").specializes("Id");
        builder.rule("S", Expr::terminal("Id")).start();
        let grammar = builder.build().unwrap();
        let id = grammar.terminal_id("Id").unwrap();
        let kw = grammar.terminal_id("Kw").unwrap();
        assert!(grammar.wins_tie_against(kw, id));
        assert!(!grammar.wins_tie_against(id, kw));
    }

    #[test]
    fn test_generalizes_loses_to_target() {
        let mut builder = GrammarBuilder::new();
        builder.terminal("Any", ".").generalizes("Quote");
        builder.terminal("Quote", "'");
        builder.rule("S", Expr::terminal("Any")).start();
        let grammar = builder.build().unwrap();
        let any = grammar.terminal_id("Any").unwrap();
        let quote = grammar.terminal_id("Quote").unwrap();
        assert!(grammar.wins_tie_against(quote, any));
        assert!(!grammar.wins_tie_against(any, quote));
    }

    #[test]
    fn test_closure_is_transitive() {
        let mut builder = GrammarBuilder::new();
        builder.terminal("A", "a");
        builder.terminal("B", "b").specializes("A");
        builder.terminal("C", "c").specializes("B");
        builder.rule("S", Expr::terminal("A")).start();
        let grammar = builder.build().unwrap();
        let a = grammar.terminal_id("A").unwrap();
        let c = grammar.terminal_id("C").unwrap();
        assert!(grammar.wins_tie_against(c, a));
        assert!(!grammar.wins_tie_against(a, c));
    }

    #[test]
    fn test_direct_cycle_rejected() {
        let mut builder = GrammarBuilder::new();
        builder.terminal("A", "a").specializes("B");
        builder.terminal("B", "b").specializes("A");
        builder.rule("S", Expr::terminal("A")).start();
        let Err(GrammarError::PrecedenceCycle { cycle }) = builder.build() else {
            panic!("expected precedence cycle");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.len() >= 3);
    }

    #[test]
    fn test_cross_specifier_cycle_rejected() {
        // A beats B via `+B`; B beats A via A's `-B`... spelled with both
        // specifier kinds crossing each other.
        let mut builder = GrammarBuilder::new();
        builder.terminal("A", "a").specializes("B").generalizes("B");
        builder.terminal("B", "b");
        builder.rule("S", Expr::terminal("A")).start();
        assert!(matches!(
            builder.build(),
            Err(GrammarError::PrecedenceCycle { .. })
        ));
    }

    #[test]
    fn test_self_cycle_rejected() {
        let mut builder = GrammarBuilder::new();
        builder.terminal("A", "a").specializes("A");
        builder.rule("S", Expr::terminal("A")).start();
        assert!(matches!(
            builder.build(),
            Err(GrammarError::PrecedenceCycle { .. })
        ));
    }
}
