//! The storage capability and its in-memory implementation.
//!
//! The board never talks to a datastore directly. Everything it needs is
//! the five calls on [`Storage`]: filtered select, single-row insert and
//! update, filtered delete, and a per-table change-feed subscription.
//! There are no multi-row transactions; a cascade is a sequence of calls.
//!
//! [`MemoryStorage`] is a cloneable handle onto shared tables. It backs the
//! demo mode, the test-suite, and the simulator, where several boards share
//! one instance and observe each other's writes through the feed.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::ErrorCode;
use crate::model::{Entity, Row, Table, new_id, row_str};
use crate::model::{Deliverable, DeliverableContent, Column, Project, Task};
use crate::realtime::{ChangeEvent, Subscription};
use crate::store::BoardStore;

/// A row predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq { column, value } => row.get(column) == Some(value),
            Self::In { column, values } => row.get(column).is_some_and(|v| values.contains(v)),
        }
    }
}

/// A failed storage call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("{table} write rejected: {reason}")]
    Rejected { table: Table, reason: String },
    #[error("{table} row not found: {id}")]
    NotFound { table: Table, id: String },
    #[error("{table} row could not be decoded: {reason}")]
    Decode { table: Table, reason: String },
}

impl StorageError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable(_) => ErrorCode::StorageUnavailable,
            Self::Rejected { .. } => ErrorCode::RemoteWriteRejected,
            Self::NotFound { .. } => ErrorCode::RemoteRowNotFound,
            Self::Decode { .. } => ErrorCode::InternalUnexpected,
        }
    }
}

/// What the board needs from a datastore.
pub trait Storage {
    /// Rows of `table` matching every filter. No order is promised.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the datastore cannot be reached.
    fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, StorageError>;

    /// Insert one row and return it as stored (ids and timestamps filled).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the write is rejected or the datastore
    /// cannot be reached.
    fn insert(&self, table: Table, row: Row) -> Result<Row, StorageError>;

    /// Shallow-merge `patch` into the row with `id` and return the result.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for an unknown id, or any other
    /// [`StorageError`] on rejection.
    fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row, StorageError>;

    /// Delete every row matching all filters and return how many went.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on rejection or when the datastore cannot
    /// be reached.
    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize, StorageError>;

    /// Subscribe to changes on `table`, optionally narrowed by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the feed cannot be opened.
    fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription, StorageError>;
}

/// Select rows and decode them as `T`.
///
/// # Errors
///
/// Returns [`StorageError`] from the select, or [`StorageError::Decode`]
/// when a row does not decode.
pub fn select_as<T: Entity, S: Storage + ?Sized>(
    storage: &S,
    filters: &[Filter],
) -> Result<Vec<T>, StorageError> {
    storage
        .select(T::TABLE, filters)?
        .iter()
        .map(|row| {
            T::from_row(row).map_err(|e| StorageError::Decode {
                table: T::TABLE,
                reason: e.to_string(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Subscriber {
    id: u64,
    table: Table,
    filter: Option<Filter>,
    tx: Sender<ChangeEvent>,
}

#[derive(Debug, Clone, Copy)]
enum Clock {
    System,
    Logical { base: DateTime<Utc>, ticks: i64 },
}

#[derive(Debug)]
struct Inner {
    tables: BTreeMap<Table, Vec<Row>>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    fail_next: usize,
    failing_tables: Vec<Table>,
    reverse_select: bool,
    clock: Clock,
    writes: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            subscribers: Vec::new(),
            next_subscriber: 0,
            fail_next: 0,
            failing_tables: Vec::new(),
            reverse_select: false,
            clock: Clock::System,
            writes: 0,
        }
    }
}

impl Inner {
    fn now(&mut self) -> DateTime<Utc> {
        match &mut self.clock {
            Clock::System => Utc::now(),
            Clock::Logical { base, ticks } => {
                *ticks += 1;
                *base + Duration::seconds(*ticks)
            }
        }
    }

    fn check_write(&mut self, table: Table) -> Result<(), StorageError> {
        if self.failing_tables.contains(&table) {
            return Err(StorageError::Rejected {
                table,
                reason: "injected failure".into(),
            });
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(StorageError::Unavailable("injected failure".into()));
        }
        self.writes += 1;
        Ok(())
    }

    fn emit(&self, table: Table, event: &ChangeEvent, full_row: &Row) {
        for sub in &self.subscribers {
            if sub.table != table {
                continue;
            }
            if sub.filter.as_ref().is_some_and(|f| !f.matches(full_row)) {
                continue;
            }
            // A receiver that is gone is released on the next unsubscribe.
            let _ = sub.tx.send(event.clone());
        }
    }

    fn remove_where(&mut self, table: Table, filters: &[Filter]) -> Vec<Row> {
        let rows = self.tables.entry(table).or_default();
        let mut removed = Vec::new();
        rows.retain(|row| {
            if filters.iter().all(|f| f.matches(row)) {
                removed.push(row.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Delete rows and everything that references them, emitting a DELETE
    /// for each row removed. Children go first.
    fn cascade_delete(&mut self, table: Table, filters: &[Filter]) -> usize {
        let removed = self.remove_where(table, filters);
        let ids: Vec<Value> = removed
            .iter()
            .filter_map(|r| r.get("id").cloned())
            .collect();

        if !ids.is_empty() {
            let child = match table {
                Table::Projects => Some((Table::Columns, "project_id")),
                Table::Columns => Some((Table::Tasks, "column_id")),
                Table::Tasks => Some((Table::Deliverables, "task_id")),
                Table::Deliverables => Some((Table::DeliverableContents, "deliverable_id")),
                Table::DeliverableContents => None,
            };
            if let Some((child_table, key)) = child {
                self.cascade_delete(child_table, &[Filter::is_in(key, ids)]);
            }
        }

        for row in &removed {
            let mut old = Row::new();
            if let Some(id) = row.get("id") {
                old.insert("id".into(), id.clone());
            }
            self.emit(table, &ChangeEvent::delete(table, old), row);
        }
        removed.len()
    }
}

/// In-memory [`Storage`] shared by every clone of the handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose timestamps advance one second per write from `base`,
    /// for reproducible runs.
    #[must_use]
    pub fn with_logical_clock(base: DateTime<Utc>) -> Self {
        let storage = Self::new();
        if let Ok(mut inner) = storage.inner.lock() {
            inner.clock = Clock::Logical { base, ticks: 0 };
        }
        storage
    }

    /// Seed tables from a store snapshot. No events are emitted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the handle is poisoned.
    pub fn seed(&self, store: &BoardStore) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let tables = &mut inner.tables;
        if let Some(project) = store.project() {
            tables.entry(Table::Projects).or_default().push(project.to_row());
        }
        tables
            .entry(Table::Columns)
            .or_default()
            .extend(store.columns().iter().map(Entity::to_row));
        tables
            .entry(Table::Tasks)
            .or_default()
            .extend(store.tasks().iter().map(Entity::to_row));
        tables
            .entry(Table::Deliverables)
            .or_default()
            .extend(store.deliverables().map(Entity::to_row));
        tables
            .entry(Table::DeliverableContents)
            .or_default()
            .extend(store.contents().iter().map(Entity::to_row));
        Ok(())
    }

    /// A storage handle pre-seeded from `store`.
    ///
    /// # Errors
    ///
    /// See [`MemoryStorage::seed`].
    pub fn from_snapshot(store: &BoardStore) -> Result<Self, StorageError> {
        let storage = Self::new();
        storage.seed(store)?;
        Ok(storage)
    }

    /// Fail the next `count` writes with [`StorageError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next = count;
        }
    }

    /// Reject every write to `table` until turned off.
    pub fn set_table_failing(&self, table: Table, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_tables.retain(|t| *t != table);
            if failing {
                inner.failing_tables.push(table);
            }
        }
    }

    /// Return `select` results in reverse insertion order.
    pub fn set_reverse_select(&self, reverse: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.reverse_select = reverse;
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.subscribers.len())
    }

    /// Number of writes accepted so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.lock().map_or(0, |inner| inner.writes)
    }

    /// Assemble the stored truth into a store, in insertion order with
    /// columns sorted by `order_position`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Decode`] when a stored row does not decode.
    pub fn to_store(&self) -> Result<BoardStore, StorageError> {
        let projects: Vec<Project> = select_as(self, &[])?;
        let columns: Vec<Column> = select_as(self, &[])?;
        let mut tasks: Vec<Task> = select_as(self, &[])?;
        let deliverables: Vec<Deliverable> = select_as(self, &[])?;
        let contents: Vec<DeliverableContent> = select_as(self, &[])?;

        for deliverable in deliverables {
            if let Some(task) = tasks.iter_mut().find(|t| t.id == deliverable.task_id) {
                task.deliverables.push(deliverable);
            }
        }

        let mut store = BoardStore::new();
        store.update_project(|_| projects.into_iter().next());
        store.update_columns(|_| crate::realtime::merge::sort_by_order_position(columns));
        store.update_tasks(|_| tasks);
        store.update_contents(|_| contents);
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".into()))
    }
}

impl Storage for MemoryStorage {
    fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, StorageError> {
        let inner = self.lock()?;
        let mut rows: Vec<Row> = inner
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if inner.reverse_select {
            rows.reverse();
        }
        trace!(%table, rows = rows.len(), "select");
        Ok(rows)
    }

    fn insert(&self, table: Table, mut row: Row) -> Result<Row, StorageError> {
        let mut inner = self.lock()?;
        inner.check_write(table)?;

        let id = match row_str(&row, "id").filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let id = new_id();
                row.insert("id".into(), Value::String(id.clone()));
                id
            }
        };

        let rows = inner.tables.entry(table).or_default();
        if rows.iter().any(|r| row_str(r, "id") == Some(id.as_str())) {
            return Err(StorageError::Rejected {
                table,
                reason: format!("duplicate key: id {id}"),
            });
        }
        if table == Table::DeliverableContents {
            let deliverable_id = row_str(&row, "deliverable_id");
            if rows.iter().any(|r| row_str(r, "deliverable_id") == deliverable_id) {
                return Err(StorageError::Rejected {
                    table,
                    reason: "duplicate key: deliverable_id".into(),
                });
            }
        }

        let now = Value::String(inner.now().to_rfc3339());
        row.entry("created_at").or_insert_with(|| now.clone());
        row.entry("updated_at").or_insert(now);

        inner.tables.entry(table).or_default().push(row.clone());
        inner.emit(table, &ChangeEvent::insert(table, row.clone()), &row);
        debug!(%table, id = %id, "insert");
        Ok(row)
    }

    fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row, StorageError> {
        let mut inner = self.lock()?;
        inner.check_write(table)?;
        let now = Value::String(inner.now().to_rfc3339());

        let rows = inner.tables.entry(table).or_default();
        let Some(row) = rows.iter_mut().find(|r| row_str(r, "id") == Some(id)) else {
            return Err(StorageError::NotFound {
                table,
                id: id.to_string(),
            });
        };
        for (key, value) in patch {
            if key != "id" {
                row.insert(key, value);
            }
        }
        row.insert("updated_at".into(), now);
        let updated = row.clone();

        let mut old = Row::new();
        old.insert("id".into(), Value::String(id.to_string()));
        inner.emit(table, &ChangeEvent::update(table, updated.clone(), Some(old)), &updated);
        debug!(%table, id, "update");
        Ok(updated)
    }

    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize, StorageError> {
        let mut inner = self.lock()?;
        inner.check_write(table)?;
        let removed = inner.cascade_delete(table, filters);
        debug!(%table, removed, "delete");
        Ok(removed)
    }

    fn subscribe(&self, table: Table, filter: Option<Filter>) -> Result<Subscription, StorageError> {
        let mut inner = self.lock()?;
        let (tx, rx) = mpsc::channel();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push(Subscriber {
            id,
            table,
            filter,
            tx,
        });
        drop(inner);

        let shared = Arc::clone(&self.inner);
        Ok(Subscription::new(table, rx, move || {
            if let Ok(mut inner) = shared.lock() {
                inner.subscribers.retain(|s| s.id != id);
            }
        }))
    }
}
