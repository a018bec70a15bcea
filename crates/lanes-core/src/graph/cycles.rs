//! Cycle detection for deliverable dependencies.
//!
//! # Overview
//!
//! Each deliverable names at most one dependency, so the graph is a set of
//! chains. A cycle makes every deliverable on it permanently gated (each
//! waits on the next to complete). Nothing upstream prevents one; the
//! gateway checks before writing a new edge, and [`find_all_cycles`]
//! reports cycles that arrived through the change feed from other clients.
//!
//! # Design
//!
//! - **Chain walk**: adding `from → to` closes a cycle exactly when the
//!   chain starting at `to` reaches `from`.
//! - **Bounded**: the walk stops after `max_depth` hops. A chain longer than
//!   that is reported as [`CycleCheck::TooDeep`] so the caller can decide.
//! - **Colored DFS** for the whole-graph scan.

#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn
)]

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::dependency::DependencyGraph;

// ---------------------------------------------------------------------------
// CycleWarning
// ---------------------------------------------------------------------------

/// A dependency edge that closes (or arrived closing) a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleWarning {
    /// The deliverable ids forming the loop, starting and ending at
    /// `edge_from`. Adding A→B where B→C→A exists gives `["A", "B", "C", "A"]`.
    pub cycle_path: Vec<String>,

    /// The deliverable gaining the dependency.
    pub edge_from: String,

    /// The deliverable it would depend on.
    pub edge_to: String,
}

impl CycleWarning {
    /// Number of distinct deliverables in the cycle.
    pub fn cycle_len(&self) -> usize {
        self.cycle_path.len().saturating_sub(1)
    }

    pub fn is_self_loop(&self) -> bool {
        self.edge_from == self.edge_to
    }

    pub fn is_mutual(&self) -> bool {
        self.cycle_len() == 2
    }
}

impl fmt::Display for CycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_self_loop() {
            write!(
                f,
                "dependency cycle: '{}' depends on itself",
                self.edge_from
            )
        } else if self.is_mutual() {
            write!(
                f,
                "dependency cycle: '{}' and '{}' depend on each other",
                self.edge_from, self.edge_to
            )
        } else {
            write!(
                f,
                "dependency cycle ({} deliverables): {}",
                self.cycle_len(),
                self.cycle_path.join(" → ")
            )
        }
    }
}

/// Result of checking one new edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCheck {
    Acyclic,
    Cycle(CycleWarning),
    /// The chain from the target is longer than the walk bound.
    TooDeep { max_depth: usize },
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Check whether making `from` depend on `to` closes a cycle.
///
/// The existing edge out of `from` (if any) is ignored, since the new edge
/// replaces it.
pub fn detect_cycle_on_add(graph: &DependencyGraph, from: &str, to: &str, max_depth: usize) -> CycleCheck {
    if from == to {
        return CycleCheck::Cycle(CycleWarning {
            cycle_path: vec![from.to_string(), from.to_string()],
            edge_from: from.to_string(),
            edge_to: to.to_string(),
        });
    }

    let mut path = vec![from.to_string(), to.to_string()];
    let mut seen: HashSet<&str> = HashSet::from([to]);
    let mut current = to;
    for _ in 0..max_depth {
        let Some(next) = graph.dependency_of(current) else {
            return CycleCheck::Acyclic;
        };
        if next == from {
            path.push(from.to_string());
            return CycleCheck::Cycle(CycleWarning {
                cycle_path: path,
                edge_from: from.to_string(),
                edge_to: to.to_string(),
            });
        }
        // A pre-existing loop further down the chain that `from` is not on.
        if !seen.insert(next) {
            return CycleCheck::Acyclic;
        }
        path.push(next.to_string());
        current = next;
    }

    if graph.dependency_of(current).is_some() {
        CycleCheck::TooDeep { max_depth }
    } else {
        CycleCheck::Acyclic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Every cycle currently in the graph, each reported once.
pub fn find_all_cycles(graph: &DependencyGraph) -> Vec<CycleWarning> {
    let mut color: HashMap<&str, Color> = graph.nodes().map(|n| (n, Color::White)).collect();
    let mut warnings = Vec::new();

    for start in graph.nodes() {
        if color.get(start) != Some(&Color::White) {
            continue;
        }
        // Out-degree is at most one, so the DFS is a walk.
        let mut stack: Vec<&str> = Vec::new();
        let mut node = start;
        loop {
            color.insert(node, Color::Gray);
            stack.push(node);
            let Some(next) = graph.dependency_of(node) else {
                break;
            };
            match color.get(next).copied().unwrap_or(Color::Black) {
                Color::White => node = next,
                Color::Gray => {
                    let begin = stack.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle_path: Vec<String> =
                        stack[begin..].iter().map(|n| (*n).to_string()).collect();
                    cycle_path.push(next.to_string());
                    warnings.push(CycleWarning {
                        cycle_path,
                        edge_from: node.to_string(),
                        edge_to: next.to_string(),
                    });
                    break;
                }
                Color::Black => break,
            }
        }
        for n in stack {
            color.insert(n, Color::Black);
        }
    }

    warnings
}

pub fn has_cycles(graph: &DependencyGraph) -> bool {
    !find_all_cycles(graph).is_empty()
}
