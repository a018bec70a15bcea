//! Deliverable dependency graph and the content-edit gate.
//!
//! A deliverable may name one other deliverable (on any task) that has to
//! be `Completed` before its content can be edited. The graph is rebuilt
//! from the store whenever it is needed; it is small and the store is the
//! only source of truth.

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::{BTreeMap, HashMap};

use crate::model::DeliverableStatus;
use crate::store::BoardStore;

/// Whether a deliverable's content may be edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyGate {
    Open,
    /// Waiting on `depends_on`, currently in `status`.
    Blocked {
        depends_on: String,
        status: DeliverableStatus,
    },
}

impl DependencyGate {
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// deliverable id → the deliverable it depends on.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    depends_on: BTreeMap<String, String>,
    status: HashMap<String, DeliverableStatus>,
}

impl DependencyGraph {
    pub fn from_store(store: &BoardStore) -> Self {
        let mut graph = Self::default();
        for deliverable in store.deliverables() {
            graph.status.insert(deliverable.id.clone(), deliverable.status);
            if let Some(dep) = &deliverable.dependency_deliverable_id {
                graph.depends_on.insert(deliverable.id.clone(), dep.clone());
            }
        }
        graph
    }

    /// Build directly from `(id, depends_on)` edges. Every node reads as
    /// `Not Started`.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut graph = Self::default();
        for (from, to) in edges {
            graph.depends_on.insert(from.to_string(), to.to_string());
            graph.status.entry(from.to_string()).or_default();
            graph.status.entry(to.to_string()).or_default();
        }
        graph
    }

    pub fn dependency_of(&self, id: &str) -> Option<&str> {
        self.depends_on.get(id).map(String::as_str)
    }

    /// Every deliverable with an outgoing edge, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.depends_on.keys().map(String::as_str)
    }

    /// The edit gate for `id`.
    ///
    /// A dependency that no longer exists (deleted deliverable, dangling
    /// reference) leaves the gate open.
    pub fn gate(&self, id: &str) -> DependencyGate {
        let Some(dep) = self.depends_on.get(id) else {
            return DependencyGate::Open;
        };
        match self.status.get(dep) {
            Some(DeliverableStatus::Completed) | None => DependencyGate::Open,
            Some(status) => DependencyGate::Blocked {
                depends_on: dep.clone(),
                status: *status,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Deliverable, Task};

    fn store_with(deliverables: Vec<Deliverable>) -> BoardStore {
        let mut task = Task::new("x", "Host");
        task.id = "t".into();
        task.deliverables = deliverables;
        let mut store = BoardStore::new();
        store.update_tasks(|_| vec![task]);
        store
    }

    fn deliverable(id: &str, status: DeliverableStatus, dep: Option<&str>) -> Deliverable {
        let mut d = Deliverable::new("t", id);
        d.id = id.to_string();
        d.status = status;
        d.dependency_deliverable_id = dep.map(String::from);
        d
    }

    #[test]
    fn gate_blocks_until_dependency_completed() {
        let store = store_with(vec![
            deliverable("spec", DeliverableStatus::InProgress, None),
            deliverable("impl", DeliverableStatus::NotStarted, Some("spec")),
        ]);
        let graph = DependencyGraph::from_store(&store);
        assert_eq!(
            graph.gate("impl"),
            DependencyGate::Blocked {
                depends_on: "spec".into(),
                status: DeliverableStatus::InProgress,
            }
        );
        assert!(graph.gate("spec").is_open());

        let store = store_with(vec![
            deliverable("spec", DeliverableStatus::Completed, None),
            deliverable("impl", DeliverableStatus::NotStarted, Some("spec")),
        ]);
        assert!(DependencyGraph::from_store(&store).gate("impl").is_open());
    }

    #[test]
    fn approved_dependency_still_blocks() {
        let store = store_with(vec![
            deliverable("spec", DeliverableStatus::Approved, None),
            deliverable("impl", DeliverableStatus::NotStarted, Some("spec")),
        ]);
        assert!(!DependencyGraph::from_store(&store).gate("impl").is_open());
    }

    #[test]
    fn dangling_dependency_is_open() {
        let store = store_with(vec![deliverable("impl", DeliverableStatus::NotStarted, Some("gone"))]);
        assert!(DependencyGraph::from_store(&store).gate("impl").is_open());
    }

    #[test]
    fn edges_record_one_dependency_each() {
        let graph = DependencyGraph::from_edges([("b", "a"), ("c", "a"), ("d", "c")]);
        assert_eq!(graph.dependency_of("d"), Some("c"));
        assert_eq!(graph.dependency_of("a"), None);
        assert_eq!(graph.nodes().collect::<Vec<_>>(), ["b", "c", "d"]);
    }
}
