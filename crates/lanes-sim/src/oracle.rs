//! Convergence oracle.
//!
//! After the final flush and a full drain of the feed, every client's
//! store must describe the same board as storage: same ids, same field
//! values, no duplicates. Display order is not compared;
//! array position is client-local.

use std::collections::{BTreeMap, BTreeSet};

use lanes_core::BoardStore;
use lanes_core::model::{Entity, Row, Table};
use serde::Serialize;

use crate::client::ClientId;

/// Order-free view of a store. Orphans (tasks whose column is gone,
/// contents whose deliverable is gone) are left out on both sides: a
/// refetch never loads them, and a live client may or may not have seen
/// them depending on delivery timing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub rows: BTreeMap<Table, BTreeMap<String, Row>>,
}

impl Snapshot {
    #[must_use]
    pub fn of(store: &BoardStore) -> Self {
        fn index<'a, T: Entity + 'a>(items: impl Iterator<Item = &'a T>) -> BTreeMap<String, Row> {
            items.map(|e| (e.id().to_string(), e.to_row())).collect()
        }

        let columns: BTreeSet<&str> = store.columns().iter().map(|c| c.id.as_str()).collect();
        let tasks = store
            .tasks()
            .iter()
            .filter(|t| columns.contains(t.column_id.as_str()));
        let deliverables: Vec<_> = tasks.clone().flat_map(|t| t.deliverables.iter()).collect();
        let deliverable_ids: BTreeSet<&str> = deliverables.iter().map(|d| d.id.as_str()).collect();
        let contents = store
            .contents()
            .iter()
            .filter(|c| deliverable_ids.contains(c.deliverable_id.as_str()));

        let mut rows = BTreeMap::new();
        rows.insert(Table::Projects, index(store.project().into_iter()));
        rows.insert(Table::Columns, index(store.columns().iter()));
        rows.insert(Table::Tasks, index(tasks));
        rows.insert(Table::Deliverables, index(deliverables.into_iter()));
        rows.insert(Table::DeliverableContents, index(contents));
        Self { rows }
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }
}

/// Diagnostic for a single failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// The client lacks an entity storage has.
    Missing { client: ClientId, table: Table, id: String },
    /// The client holds an entity storage does not.
    Extra { client: ClientId, table: Table, id: String },
    /// Same id, different fields.
    FieldMismatch {
        client: ClientId,
        table: Table,
        id: String,
        fields: Vec<String>,
    },
    /// An id appears twice in one of the client's collections.
    Duplicate { client: ClientId, table: Table, id: String },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { client, table, id } => {
                write!(f, "Missing: client {client} lacks {table} {id}")
            }
            Self::Extra { client, table, id } => {
                write!(f, "Extra: client {client} holds {table} {id} that storage does not")
            }
            Self::FieldMismatch {
                client,
                table,
                id,
                fields,
            } => write!(f, "FieldMismatch: client {client} {table} {id} differs in {fields:?}"),
            Self::Duplicate { client, table, id } => {
                write!(f, "Duplicate: client {client} holds {table} {id} twice")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }
}

pub struct ConvergenceOracle;

impl ConvergenceOracle {
    /// Compare every client against storage truth.
    #[must_use]
    pub fn check_all<'a>(
        truth: &BoardStore,
        clients: impl IntoIterator<Item = (ClientId, &'a BoardStore)>,
    ) -> OracleResult {
        let expected = Snapshot::of(truth);
        let mut violations = Vec::new();
        for (client, store) in clients {
            violations.extend(Self::check_duplicates(client, store));
            violations.extend(Self::check_client(client, &expected, &Snapshot::of(store)));
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_duplicates(client: ClientId, store: &BoardStore) -> Vec<InvariantViolation> {
        store
            .duplicate_ids()
            .into_iter()
            .map(|(table, id)| InvariantViolation::Duplicate { client, table, id })
            .collect()
    }

    #[must_use]
    pub fn check_client(client: ClientId, expected: &Snapshot, actual: &Snapshot) -> Vec<InvariantViolation> {
        let empty = BTreeMap::new();
        let mut violations = Vec::new();
        for table in Table::ALL {
            let want = expected.rows.get(&table).unwrap_or(&empty);
            let have = actual.rows.get(&table).unwrap_or(&empty);

            for (id, row) in want {
                match have.get(id) {
                    None => violations.push(InvariantViolation::Missing {
                        client,
                        table,
                        id: id.clone(),
                    }),
                    Some(local) if local != row => {
                        let fields = differing_fields(row, local);
                        violations.push(InvariantViolation::FieldMismatch {
                            client,
                            table,
                            id: id.clone(),
                            fields,
                        });
                    }
                    Some(_) => {}
                }
            }
            for id in have.keys().filter(|id| !want.contains_key(*id)) {
                violations.push(InvariantViolation::Extra {
                    client,
                    table,
                    id: id.clone(),
                });
            }
        }
        violations
    }
}

fn differing_fields(a: &Row, b: &Row) -> Vec<String> {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    keys.into_iter()
        .filter(|k| a.get(*k) != b.get(*k))
        .cloned()
        .collect()
}
