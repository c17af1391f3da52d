//! Thompson NFA construction and lockstep simulation.
//!
//! Each terminal pattern compiles to its own [`Nfa`]. The lexer advances
//! every admitted terminal's [`Frontier`] in lockstep, one input byte at a
//! time, so longest-match selection across all terminals falls out of the
//! last step at which any frontier accepted.

use super::{ClassSet, Regex};
use smallvec::{SmallVec, smallvec};

/// Patch target of a not-yet-connected transition.
const DANGLING: u32 = u32::MAX;

#[derive(Debug, Clone)]
enum Test {
    Byte(u8),
    Any,
    Class(ClassSet),
}

impl Test {
    fn matches(&self, byte: u8) -> bool {
        match self {
            Self::Byte(expect) => byte == *expect,
            Self::Any => true,
            Self::Class(set) => set.matches(byte),
        }
    }
}

#[derive(Debug, Clone)]
struct State {
    eps: SmallVec<[u32; 2]>,
    /// At most one consuming transition per state; Thompson construction
    /// guarantees this shape.
    edge: Option<(Test, u32)>,
    accept: bool,
}

/// A compiled pattern automaton.
#[derive(Debug, Clone)]
pub struct Nfa {
    states: Vec<State>,
    start: u32,
}

/// The epsilon-closed set of live states at one input position.
///
/// State ids are kept sorted so a frontier can serve as a memoization key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frontier {
    states: SmallVec<[u32; 8]>,
    accepting: bool,
}

impl Frontier {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether any live state is accepting.
    #[must_use]
    pub const fn accepts(&self) -> bool {
        self.accepting
    }

    /// Sorted live state ids; stable across identical runs.
    #[must_use]
    pub fn states(&self) -> &[u32] {
        &self.states
    }
}

/// Dangling transitions of a fragment under construction.
#[derive(Debug)]
enum Out {
    /// Successor is appended to this state's epsilon list.
    Eps(u32),
    /// Successor replaces this state's dangling edge target.
    Edge(u32),
}

#[derive(Debug)]
struct Fragment {
    start: u32,
    outs: SmallVec<[Out; 4]>,
}

#[derive(Default)]
struct Builder {
    states: Vec<State>,
}

impl Builder {
    fn state(&mut self) -> u32 {
        let id = u32::try_from(self.states.len()).expect("NFA too large");
        self.states.push(State {
            eps: SmallVec::new(),
            edge: None,
            accept: false,
        });
        id
    }

    fn connect(&mut self, outs: &[Out], target: u32) {
        for out in outs {
            match *out {
                Out::Eps(state) => self.states[state as usize].eps.push(target),
                Out::Edge(state) => {
                    let edge = self.states[state as usize]
                        .edge
                        .as_mut()
                        .expect("dangling out on edge-less state");
                    debug_assert_eq!(edge.1, DANGLING);
                    edge.1 = target;
                }
            }
        }
    }

    fn epsilon(&mut self) -> Fragment {
        let state = self.state();
        Fragment {
            start: state,
            outs: smallvec![Out::Eps(state)],
        }
    }

    fn consuming(&mut self, test: Test) -> Fragment {
        let state = self.state();
        self.states[state as usize].edge = Some((test, DANGLING));
        Fragment {
            start: state,
            outs: smallvec![Out::Edge(state)],
        }
    }

    fn chain(&mut self, fragments: Vec<Fragment>) -> Fragment {
        let mut iter = fragments.into_iter();
        let Some(first) = iter.next() else {
            return self.epsilon();
        };
        let start = first.start;
        let mut outs = first.outs;
        for next in iter {
            self.connect(&outs, next.start);
            outs = next.outs;
        }
        Fragment { start, outs }
    }

    fn fragment(&mut self, regex: &Regex) -> Fragment {
        match regex {
            Regex::Empty => self.epsilon(),
            Regex::Byte(byte) => self.consuming(Test::Byte(*byte)),
            Regex::Any => self.consuming(Test::Any),
            Regex::Class(set) => self.consuming(Test::Class(set.clone())),
            Regex::Seq(items) => {
                let fragments = items.iter().map(|item| self.fragment(item)).collect();
                self.chain(fragments)
            }
            Regex::Alt(items) => {
                let fork = self.state();
                let mut outs = SmallVec::new();
                for item in items {
                    let branch = self.fragment(item);
                    self.states[fork as usize].eps.push(branch.start);
                    outs.extend(branch.outs);
                }
                Fragment { start: fork, outs }
            }
            Regex::Repeat { inner, min, max } => {
                let mut copies = Vec::new();
                for _ in 0..*min {
                    let copy = self.fragment(inner);
                    copies.push(copy);
                }
                match max {
                    None => {
                        // Loop hub: enter the body any number of times,
                        // exit through the hub's successor edge.
                        let hub = self.state();
                        let body = self.fragment(inner);
                        self.states[hub as usize].eps.push(body.start);
                        self.connect(&body.outs, hub);
                        copies.push(Fragment {
                            start: hub,
                            outs: smallvec![Out::Eps(hub)],
                        });
                    }
                    Some(max) => {
                        for _ in *min..*max {
                            let bypass = self.state();
                            let body = self.fragment(inner);
                            self.states[bypass as usize].eps.push(body.start);
                            let mut outs = body.outs;
                            outs.push(Out::Eps(bypass));
                            copies.push(Fragment {
                                start: bypass,
                                outs,
                            });
                        }
                    }
                }
                self.chain(copies)
            }
        }
    }
}

impl Nfa {
    /// Compile a regular expression tree.
    #[must_use]
    pub fn compile(regex: &Regex) -> Self {
        let mut builder = Builder::default();
        let fragment = builder.fragment(regex);
        let accept = builder.state();
        builder.states[accept as usize].accept = true;
        builder.connect(&fragment.outs, accept);
        Self {
            states: builder.states,
            start: fragment.start,
        }
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Frontier before any byte is consumed.
    #[must_use]
    pub fn start_frontier(&self) -> Frontier {
        self.close(std::iter::once(self.start))
    }

    /// Advance a frontier over one byte.
    #[must_use]
    pub fn step(&self, frontier: &Frontier, byte: u8) -> Frontier {
        let moved = frontier.states.iter().filter_map(|&id| {
            let (test, target) = self.states[id as usize].edge.as_ref()?;
            test.matches(byte).then_some(*target)
        });
        self.close(moved)
    }

    /// Longest match starting at `start`; returns the end offset of the
    /// last accepting step, if any.
    #[must_use]
    pub fn run(&self, text: &[u8], start: usize) -> Option<usize> {
        let mut frontier = self.start_frontier();
        let mut last_accept = frontier.accepts().then_some(start);
        for (i, &byte) in text[start..].iter().enumerate() {
            if frontier.is_empty() {
                break;
            }
            frontier = self.step(&frontier, byte);
            if frontier.accepts() {
                last_accept = Some(start + i + 1);
            }
        }
        last_accept
    }

    fn close<I: Iterator<Item = u32>>(&self, seeds: I) -> Frontier {
        let mut seen = vec![false; self.states.len()];
        let mut stack: SmallVec<[u32; 8]> = SmallVec::new();
        for seed in seeds {
            if !std::mem::replace(&mut seen[seed as usize], true) {
                stack.push(seed);
            }
        }
        let mut states: SmallVec<[u32; 8]> = SmallVec::new();
        let mut accepting = false;
        while let Some(id) = stack.pop() {
            states.push(id);
            let state = &self.states[id as usize];
            accepting |= state.accept;
            for &next in &state.eps {
                if !std::mem::replace(&mut seen[next as usize], true) {
                    stack.push(next);
                }
            }
        }
        states.sort_unstable();
        Frontier { states, accepting }
    }
}
