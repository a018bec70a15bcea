//! Optimistic Mutation Gateway.
//!
//! Every storage-mutating action goes through [`Gateway::apply`]:
//!
//! 1. validate against the current store, failing before anything changes;
//! 2. apply the new local state synchronously;
//! 3. queue a [`WriteBatch`] of remote writes, children before parents.
//!
//! [`Gateway::flush`] later issues the queued batches in order. A failed
//! write is logged and recorded as a [`Notification`]; the local state is
//! left as it is and the rest of that batch is skipped. The realtime feed
//! (or a refetch) is what eventually brings the two sides back together.

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::VecDeque;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::drag::array_move;
use crate::drag::reorder::move_to_end;
use crate::error::{BoardError, ErrorCode};
use crate::graph::{CycleCheck, DependencyGraph, detect_cycle_on_add};
use crate::model::{
    Column, Deliverable, DeliverableContent, DeliverableStatus, Entity, Priority, Row, Table, Task,
    row_str,
};
use crate::realtime::{ChangeEvent, apply_change, overlay};
use crate::storage::{Filter, Storage, StorageError};
use crate::store::BoardStore;

/// Left or right along the column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliverablePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliverableStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub column_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(column_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            title: title.into(),
            description: None,
            priority: Priority::default(),
            due_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeliverable {
    pub task_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: DeliverableStatus,
    pub due_date: Option<NaiveDate>,
    pub depends_on: Option<String>,
}

impl NewDeliverable {
    pub fn new(task_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            title: title.into(),
            description: None,
            status: DeliverableStatus::default(),
            due_date: None,
            depends_on: None,
        }
    }
}

/// Every local action that writes to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AddColumn { title: String, description: Option<String> },
    UpdateColumn { id: String, patch: ColumnPatch },
    /// Deletes the column and every task in it.
    DeleteColumn { id: String },
    /// Column drop commit.
    MoveColumn { id: String, to_index: usize },
    AddTask(NewTask),
    UpdateTask { id: String, patch: TaskPatch },
    DeleteTask { id: String },
    /// Move to the end of another column.
    MoveTask { id: String, column_id: String },
    ShiftTask { id: String, direction: Direction },
    /// Task drop commit; local order is already final.
    CommitTaskDrop { id: String, from_column: String },
    AddDeliverable(NewDeliverable),
    UpdateDeliverable { id: String, patch: DeliverablePatch },
    DeleteDeliverable { id: String },
    SetDependency { id: String, depends_on: Option<String> },
    UpsertContent { deliverable_id: String, content: String },
    UpdateProject { patch: ProjectPatch },
}

impl Mutation {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AddColumn { .. } => "add column",
            Self::UpdateColumn { .. } => "update column",
            Self::DeleteColumn { .. } => "delete column",
            Self::MoveColumn { .. } => "move column",
            Self::AddTask(_) => "add task",
            Self::UpdateTask { .. } => "update task",
            Self::DeleteTask { .. } => "delete task",
            Self::MoveTask { .. } => "move task",
            Self::ShiftTask { .. } => "shift task",
            Self::CommitTaskDrop { .. } => "drop task",
            Self::AddDeliverable(_) => "add deliverable",
            Self::UpdateDeliverable { .. } => "update deliverable",
            Self::DeleteDeliverable { .. } => "delete deliverable",
            Self::SetDependency { .. } => "set dependency",
            Self::UpsertContent { .. } => "save content",
            Self::UpdateProject { .. } => "update project",
        }
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// One remote write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert { table: Table, row: Row },
    Update { table: Table, id: String, patch: Row },
    Delete { table: Table, filters: Vec<Filter> },
}

impl WriteOp {
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => *table,
        }
    }

    /// Replace every occurrence of id `from` with `to`.
    fn remap(&mut self, from: &str, to: &str) {
        let swap = |value: &mut Value| {
            if value.as_str() == Some(from) {
                *value = Value::String(to.to_string());
            }
        };
        match self {
            Self::Insert { row, .. } => row.values_mut().for_each(swap),
            Self::Update { id, patch, .. } => {
                if id == from {
                    *id = to.to_string();
                }
                patch.values_mut().for_each(swap);
            }
            Self::Delete { filters, .. } => {
                for filter in filters {
                    match filter {
                        Filter::Eq { value, .. } => swap(value),
                        Filter::In { values, .. } => values.iter_mut().for_each(swap),
                    }
                }
            }
        }
    }
}

/// The remote writes of one mutation, issued in order.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub label: &'static str,
    pub ops: Vec<WriteOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Warning,
    Error,
}

/// A transient user-facing message (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Counts from one [`Gateway::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub batches: usize,
    pub writes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub remapped: usize,
}

/// Validation and write behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    pub reject_cycles: bool,
    pub max_dependency_depth: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            reject_cycles: true,
            max_dependency_depth: 64,
        }
    }
}

#[derive(Debug, Default)]
pub struct Gateway {
    outbox: VecDeque<WriteBatch>,
    notifications: Vec<Notification>,
    options: GatewayOptions,
}

impl Gateway {
    #[must_use]
    pub fn new(options: GatewayOptions) -> Self {
        Self {
            outbox: VecDeque::new(),
            notifications: Vec::new(),
            options,
        }
    }

    #[must_use]
    pub fn pending(&self) -> &VecDeque<WriteBatch> {
        &self.outbox
    }

    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Take and clear the recorded notifications.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, level: Level, code: ErrorCode, message: String) {
        self.notifications.push(Notification {
            level,
            code,
            message,
        });
    }

    fn queue(&mut self, label: &'static str, ops: Vec<WriteOp>) {
        if ops.is_empty() {
            return;
        }
        debug!(label, ops = ops.len(), "queued write batch");
        self.outbox.push_back(WriteBatch { label, ops });
    }

    /// Apply `mutations` in order against a scratch copy of `store`.
    ///
    /// The copy replaces `store` only when every mutation succeeds. On the
    /// first failure the store, the outbox and the notifications are left
    /// exactly as they were.
    ///
    /// # Errors
    ///
    /// Returns the first mutation's [`BoardError`].
    pub fn apply_all(
        &mut self,
        store: &mut BoardStore,
        mutations: Vec<Mutation>,
    ) -> Result<Vec<Option<String>>, BoardError> {
        let queued = self.outbox.len();
        let notified = self.notifications.len();
        let mut scratch = store.clone();
        let mut created = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match self.apply(&mut scratch, mutation) {
                Ok(id) => created.push(id),
                Err(err) => {
                    self.outbox.truncate(queued);
                    self.notifications.truncate(notified);
                    return Err(err);
                }
            }
        }
        *store = scratch;
        Ok(created)
    }

    /// Validate, apply locally, and queue the remote writes for `mutation`.
    ///
    /// Returns the id of the entity created, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError`] when validation fails. The store is untouched
    /// and nothing is queued in that case.
    #[allow(clippy::too_many_lines)]
    pub fn apply(&mut self, store: &mut BoardStore, mutation: Mutation) -> Result<Option<String>, BoardError> {
        let label = mutation.label();
        match mutation {
            Mutation::AddColumn { title, description } => {
                let title = non_empty("title", title)?;
                let mut column = Column::new(store.project().map(|p| p.id.clone()), title);
                column.description = description;
                column.order_position = Some(i64::try_from(store.columns().len()).unwrap_or(i64::MAX));
                let id = column.id.clone();
                let row = column.to_row();
                store.update_columns(|mut columns| {
                    columns.push(column);
                    columns
                });
                self.queue(label, vec![WriteOp::Insert { table: Table::Columns, row }]);
                Ok(Some(id))
            }
            Mutation::UpdateColumn { id, patch } => {
                let column = store.column(&id).ok_or_else(|| BoardError::ColumnNotFound(id.clone()))?;
                if let Some(title) = &patch.title {
                    non_empty("title", title.clone())?;
                }
                let patch = patch_row(&patch);
                let updated = overlay(column, &patch)?;
                store.update_columns(|columns| replace_by_id(columns, updated));
                self.queue(label, vec![WriteOp::Update { table: Table::Columns, id, patch }]);
                Ok(None)
            }
            Mutation::DeleteColumn { id } => {
                if store.column(&id).is_none() {
                    return Err(BoardError::ColumnNotFound(id));
                }
                let doomed: Vec<String> = store
                    .tasks_in_column(&id)
                    .flat_map(|t| t.deliverables.iter().map(|d| d.id.clone()))
                    .collect();
                store.update_tasks(|tasks| tasks.into_iter().filter(|t| t.column_id != id).collect());
                store.update_columns(|columns| columns.into_iter().filter(|c| c.id != id).collect());
                drop_contents(store, &doomed);
                self.queue(
                    label,
                    vec![
                        WriteOp::Delete {
                            table: Table::Tasks,
                            filters: vec![Filter::eq("column_id", id.clone())],
                        },
                        WriteOp::Delete {
                            table: Table::Columns,
                            filters: vec![Filter::eq("id", id)],
                        },
                    ],
                );
                Ok(None)
            }
            Mutation::MoveColumn { id, to_index } => {
                let from = store.column_index(&id).ok_or_else(|| BoardError::ColumnNotFound(id.clone()))?;
                let to_index = to_index.min(store.columns().len().saturating_sub(1));
                let mut ops = Vec::new();
                store.update_columns(|mut columns| {
                    array_move(&mut columns, from, to_index);
                    for (index, column) in columns.iter_mut().enumerate() {
                        let position = i64::try_from(index).unwrap_or(i64::MAX);
                        if column.order_position != Some(position) {
                            column.order_position = Some(position);
                            let mut patch = Row::new();
                            patch.insert("order_position".into(), position.into());
                            ops.push(WriteOp::Update {
                                table: Table::Columns,
                                id: column.id.clone(),
                                patch,
                            });
                        }
                    }
                    columns
                });
                self.queue(label, ops);
                Ok(None)
            }
            Mutation::AddTask(new) => {
                if store.column(&new.column_id).is_none() {
                    return Err(BoardError::ColumnNotFound(new.column_id));
                }
                let mut task = Task::new(new.column_id, non_empty("title", new.title)?);
                task.description = new.description;
                task.priority = new.priority;
                task.due_date = new.due_date;
                let id = task.id.clone();
                let row = task.to_row();
                store.update_tasks(|mut tasks| {
                    tasks.push(task);
                    tasks
                });
                self.queue(label, vec![WriteOp::Insert { table: Table::Tasks, row }]);
                Ok(Some(id))
            }
            Mutation::UpdateTask { id, patch } => {
                let task = store.task(&id).ok_or_else(|| BoardError::TaskNotFound(id.clone()))?;
                if let Some(title) = &patch.title {
                    non_empty("title", title.clone())?;
                }
                if let Some(column_id) = &patch.column_id {
                    if store.column(column_id).is_none() {
                        return Err(BoardError::ColumnNotFound(column_id.clone()));
                    }
                }
                if patch == TaskPatch::default() {
                    return Ok(None);
                }
                let patch = patch_row(&patch);
                let updated = overlay(task, &patch)?;
                store.update_tasks(|tasks| replace_by_id(tasks, updated));
                self.queue(label, vec![WriteOp::Update { table: Table::Tasks, id, patch }]);
                Ok(None)
            }
            Mutation::DeleteTask { id } => {
                let task = store.task(&id).ok_or_else(|| BoardError::TaskNotFound(id.clone()))?;
                let doomed: Vec<String> = task.deliverables.iter().map(|d| d.id.clone()).collect();
                store.update_tasks(|tasks| tasks.into_iter().filter(|t| t.id != id).collect());
                drop_contents(store, &doomed);
                self.queue(
                    label,
                    vec![WriteOp::Delete {
                        table: Table::Tasks,
                        filters: vec![Filter::eq("id", id)],
                    }],
                );
                Ok(None)
            }
            Mutation::MoveTask { id, column_id } => {
                self.move_task(store, label, &id, &column_id)?;
                Ok(None)
            }
            Mutation::ShiftTask { id, direction } => {
                let task = store.task(&id).ok_or_else(|| BoardError::TaskNotFound(id.clone()))?;
                let current = store
                    .column_index(&task.column_id)
                    .ok_or_else(|| BoardError::ColumnNotFound(task.column_id.clone()))?;
                let target = match direction {
                    Direction::Left => current.checked_sub(1),
                    Direction::Right => Some(current + 1),
                };
                let column_id = target
                    .and_then(|i| store.columns().get(i))
                    .map(|c| c.id.clone())
                    .ok_or(BoardError::NoAdjacentColumn(direction))?;
                self.move_task(store, label, &id, &column_id)?;
                Ok(None)
            }
            Mutation::CommitTaskDrop { id, from_column } => {
                let task = store.task(&id).ok_or_else(|| BoardError::TaskNotFound(id.clone()))?;
                if task.column_id != from_column {
                    let mut patch = Row::new();
                    patch.insert("column_id".into(), task.column_id.clone().into());
                    self.queue(label, vec![WriteOp::Update { table: Table::Tasks, id, patch }]);
                }
                Ok(None)
            }
            Mutation::AddDeliverable(new) => {
                if store.task(&new.task_id).is_none() {
                    return Err(BoardError::TaskNotFound(new.task_id));
                }
                if let Some(dep) = &new.depends_on {
                    if store.deliverable(dep).is_none() {
                        return Err(BoardError::DeliverableNotFound(dep.clone()));
                    }
                }
                let mut deliverable = Deliverable::new(&new.task_id, non_empty("title", new.title)?);
                deliverable.description = new.description;
                deliverable.status = new.status;
                deliverable.due_date = new.due_date;
                deliverable.dependency_deliverable_id = new.depends_on;
                let id = deliverable.id.clone();
                let row = deliverable.to_row();
                let task_id = new.task_id;
                store.update_tasks(|mut tasks| {
                    if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
                        task.deliverables.push(deliverable);
                    }
                    tasks
                });
                self.queue(label, vec![WriteOp::Insert { table: Table::Deliverables, row }]);
                Ok(Some(id))
            }
            Mutation::UpdateDeliverable { id, patch } => {
                let deliverable = store
                    .deliverable(&id)
                    .ok_or_else(|| BoardError::DeliverableNotFound(id.clone()))?;
                if let Some(title) = &patch.title {
                    non_empty("title", title.clone())?;
                }
                if patch == DeliverablePatch::default() {
                    return Ok(None);
                }
                let patch = patch_row(&patch);
                let updated = overlay(deliverable, &patch)?;
                store.update_tasks(|tasks| replace_deliverable(tasks, updated));
                self.queue(label, vec![WriteOp::Update { table: Table::Deliverables, id, patch }]);
                Ok(None)
            }
            Mutation::DeleteDeliverable { id } => {
                if store.deliverable(&id).is_none() {
                    return Err(BoardError::DeliverableNotFound(id));
                }
                store.update_tasks(|mut tasks| {
                    for task in &mut tasks {
                        task.deliverables.retain(|d| d.id != id);
                    }
                    tasks
                });
                drop_contents(store, std::slice::from_ref(&id));
                self.queue(
                    label,
                    vec![WriteOp::Delete {
                        table: Table::Deliverables,
                        filters: vec![Filter::eq("id", id)],
                    }],
                );
                Ok(None)
            }
            Mutation::SetDependency { id, depends_on } => {
                let deliverable = store
                    .deliverable(&id)
                    .ok_or_else(|| BoardError::DeliverableNotFound(id.clone()))?;
                if let Some(dep) = &depends_on {
                    if store.deliverable(dep).is_none() {
                        return Err(BoardError::DeliverableNotFound(dep.clone()));
                    }
                    self.check_cycle(store, &id, dep)?;
                }
                let mut updated = deliverable.clone();
                updated.dependency_deliverable_id.clone_from(&depends_on);
                store.update_tasks(|tasks| replace_deliverable(tasks, updated));
                let mut patch = Row::new();
                patch.insert(
                    "dependency_deliverable_id".into(),
                    depends_on.map_or(Value::Null, Value::String),
                );
                self.queue(label, vec![WriteOp::Update { table: Table::Deliverables, id, patch }]);
                Ok(None)
            }
            Mutation::UpsertContent { deliverable_id, content } => {
                if store.deliverable(&deliverable_id).is_none() {
                    return Err(BoardError::DeliverableNotFound(deliverable_id));
                }
                if let Some(existing) = store.content(&deliverable_id) {
                    let id = existing.id.clone();
                    let body = content.clone();
                    store.update_contents(|mut contents| {
                        if let Some(c) = contents.iter_mut().find(|c| c.id == id) {
                            c.content = body;
                        }
                        contents
                    });
                    let mut patch = Row::new();
                    patch.insert("content".into(), content.into());
                    self.queue(label, vec![WriteOp::Update { table: Table::DeliverableContents, id, patch }]);
                    Ok(None)
                } else {
                    let record = DeliverableContent::new(&deliverable_id, content);
                    let id = record.id.clone();
                    let row = record.to_row();
                    store.update_contents(|mut contents| {
                        contents.push(record);
                        contents
                    });
                    self.queue(label, vec![WriteOp::Insert { table: Table::DeliverableContents, row }]);
                    Ok(Some(id))
                }
            }
            Mutation::UpdateProject { patch } => {
                let project = store.project().ok_or(BoardError::ProjectNotLoaded)?;
                if let Some(name) = &patch.name {
                    non_empty("name", name.clone())?;
                }
                let id = project.id.clone();
                let patch = patch_row(&patch);
                let updated = overlay(project, &patch)?;
                store.update_project(|_| Some(updated));
                self.queue(label, vec![WriteOp::Update { table: Table::Projects, id, patch }]);
                Ok(None)
            }
        }
    }

    fn move_task(&mut self, store: &mut BoardStore, label: &'static str, id: &str, column_id: &str) -> Result<(), BoardError> {
        let task = store.task(id).ok_or_else(|| BoardError::TaskNotFound(id.to_string()))?;
        if store.column(column_id).is_none() {
            return Err(BoardError::ColumnNotFound(column_id.to_string()));
        }
        if task.column_id == column_id {
            return Ok(());
        }
        store.update_tasks(|mut tasks| {
            if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
                task.column_id = column_id.to_string();
            }
            move_to_end(&mut tasks, id);
            tasks
        });
        let mut patch = Row::new();
        patch.insert("column_id".into(), column_id.into());
        self.queue(
            label,
            vec![WriteOp::Update {
                table: Table::Tasks,
                id: id.to_string(),
                patch,
            }],
        );
        Ok(())
    }

    fn check_cycle(&mut self, store: &BoardStore, from: &str, to: &str) -> Result<(), BoardError> {
        let graph = DependencyGraph::from_store(store);
        match detect_cycle_on_add(&graph, from, to, self.options.max_dependency_depth) {
            CycleCheck::Acyclic => Ok(()),
            CycleCheck::Cycle(warning) if self.options.reject_cycles => Err(BoardError::Cycle(warning)),
            CycleCheck::Cycle(warning) => {
                warn!(%warning, "dependency cycle accepted");
                self.notify(Level::Warning, ErrorCode::CycleDetected, warning.to_string());
                Ok(())
            }
            CycleCheck::TooDeep { max_depth } if self.options.reject_cycles => Err(BoardError::invalid(
                "dependency_deliverable_id",
                format!("dependency chain is longer than {max_depth}"),
            )),
            CycleCheck::TooDeep { max_depth } => {
                warn!(from, to, max_depth, "dependency chain too deep to check");
                Ok(())
            }
        }
    }

    /// Issue every queued batch, oldest first.
    ///
    /// Never fails: write errors become notifications.
    pub fn flush<S: Storage + ?Sized>(&mut self, store: &mut BoardStore, storage: &S) -> FlushReport {
        let mut report = FlushReport::default();
        while let Some(mut batch) = self.outbox.pop_front() {
            report.batches += 1;
            let mut index = 0;
            while index < batch.ops.len() {
                let op = batch.ops[index].clone();
                match issue(storage, &op) {
                    Ok(stored) => {
                        report.writes += 1;
                        if let (WriteOp::Insert { table, row }, Some(stored)) = (&op, stored) {
                            if let Some((from, to)) = self.reconcile_insert(store, *table, row, stored) {
                                for later in &mut batch.ops[index + 1..] {
                                    later.remap(&from, &to);
                                }
                                report.remapped += 1;
                            }
                        }
                    }
                    Err(err) => {
                        let skipped = batch.ops.len() - index - 1;
                        error!(batch = batch.label, table = %op.table(), %err, skipped, "remote write failed");
                        self.notify(
                            Level::Error,
                            err.code(),
                            format!("Could not {}: {err}", batch.label),
                        );
                        report.failures += 1;
                        report.skipped += skipped;
                        break;
                    }
                }
                index += 1;
            }
        }
        report
    }

    /// Fold server-assigned fields of a successful insert back into the
    /// store. Returns `(local_id, server_id)` when the storage assigned a new id.
    fn reconcile_insert(&mut self, store: &mut BoardStore, table: Table, sent: &Row, stored: Row) -> Option<(String, String)> {
        let local = row_str(sent, "id")?.to_string();
        let server = row_str(&stored, "id")?.to_string();
        if !holds(store, table, &local) {
            // Deleted locally before the write went out; its delete is queued.
            return None;
        }
        let remap = (local != server).then(|| {
            remap_store(store, table, &local, &server);
            for batch in &mut self.outbox {
                for op in &mut batch.ops {
                    op.remap(&local, &server);
                }
            }
            debug!(%table, local = %local, server = %server, "remapped optimistic id");
            (local, server)
        });
        // Only what the server filled in or changed; fields sent as-is may
        // have been edited locally since and their own writes are queued.
        let patch: Row = stored
            .into_iter()
            .filter(|(key, value)| key == "id" || sent.get(key) != Some(value))
            .collect();
        if let Err(err) = apply_change(store, &ChangeEvent::update(table, patch, None)) {
            warn!(%table, %err, "stored row did not reconcile");
        }
        remap
    }
}

fn issue<S: Storage + ?Sized>(storage: &S, op: &WriteOp) -> Result<Option<Row>, StorageError> {
    match op {
        WriteOp::Insert { table, row } => storage.insert(*table, row.clone()).map(Some),
        WriteOp::Update { table, id, patch } => storage.update(*table, id, patch.clone()).map(Some),
        WriteOp::Delete { table, filters } => storage.delete(*table, filters).map(|_| None),
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, BoardError> {
    if value.trim().is_empty() {
        Err(BoardError::invalid(field, "must not be empty"))
    } else {
        Ok(value)
    }
}

fn patch_row(patch: &impl Serialize) -> Row {
    match serde_json::to_value(patch) {
        Ok(Value::Object(map)) => map,
        _ => Row::new(),
    }
}

fn replace_by_id<T: Entity>(mut items: Vec<T>, updated: T) -> Vec<T> {
    if let Some(slot) = items.iter_mut().find(|item| item.id() == updated.id()) {
        *slot = updated;
    }
    items
}

fn replace_deliverable(mut tasks: Vec<Task>, updated: Deliverable) -> Vec<Task> {
    if let Some(slot) = tasks
        .iter_mut()
        .flat_map(|t| t.deliverables.iter_mut())
        .find(|d| d.id == updated.id)
    {
        *slot = updated;
    }
    tasks
}

fn drop_contents(store: &mut BoardStore, deliverable_ids: &[String]) {
    if deliverable_ids.is_empty() {
        return;
    }
    store.update_contents(|contents| {
        contents
            .into_iter()
            .filter(|c| !deliverable_ids.contains(&c.deliverable_id))
            .collect()
    });
}

fn holds(store: &BoardStore, table: Table, id: &str) -> bool {
    match table {
        Table::Projects => store.project().is_some_and(|p| p.id == id),
        Table::Columns => store.column(id).is_some(),
        Table::Tasks => store.task(id).is_some(),
        Table::Deliverables => store.deliverable(id).is_some(),
        Table::DeliverableContents => store.contents().iter().any(|c| c.id == id),
    }
}

/// Rename an entity and every reference to it.
pub fn remap_store(store: &mut BoardStore, table: Table, from: &str, to: &str) {
    let rename = |value: &mut String| {
        if value == from {
            *value = to.to_string();
        }
    };
    match table {
        Table::Projects => {
            store.update_project(|project| {
                project.map(|mut p| {
                    rename(&mut p.id);
                    p
                })
            });
            store.update_columns(|mut columns| {
                for c in &mut columns {
                    if let Some(project_id) = c.project_id.as_mut() {
                        rename(project_id);
                    }
                }
                columns
            });
        }
        Table::Columns => {
            store.update_columns(|mut columns| {
                columns.iter_mut().for_each(|c| rename(&mut c.id));
                columns
            });
            store.update_tasks(|mut tasks| {
                tasks.iter_mut().for_each(|t| rename(&mut t.column_id));
                tasks
            });
        }
        Table::Tasks => store.update_tasks(|mut tasks| {
            for task in &mut tasks {
                if task.id == from {
                    task.set_id(to.to_string());
                }
            }
            tasks
        }),
        Table::Deliverables => {
            store.update_tasks(|mut tasks| {
                for d in tasks.iter_mut().flat_map(|t| t.deliverables.iter_mut()) {
                    rename(&mut d.id);
                    if let Some(dep) = d.dependency_deliverable_id.as_mut() {
                        rename(dep);
                    }
                }
                tasks
            });
            store.update_contents(|mut contents| {
                contents.iter_mut().for_each(|c| rename(&mut c.deliverable_id));
                contents
            });
        }
        Table::DeliverableContents => store.update_contents(|mut contents| {
            contents.iter_mut().for_each(|c| rename(&mut c.id));
            contents
        }),
    }
}
