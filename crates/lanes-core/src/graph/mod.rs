//! Relationships between deliverables.
//!
//! ## Submodules
//!
//! - [`dependency`]: the dependency graph and the content-edit gate.
//! - [`cycles`]: cycle detection on add and whole-graph scans.

pub mod cycles;
pub mod dependency;

pub use cycles::{CycleCheck, CycleWarning, detect_cycle_on_add, find_all_cycles};
pub use dependency::{DependencyGate, DependencyGraph};
