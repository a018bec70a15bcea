//! Fold change-feed events into the Entity Store.
//!
//! # Merge rules
//!
//! - **INSERT** appends only when no entity with that id exists. When one
//!   does (an optimistic insert racing its own echo), the payload is merged
//!   over the existing entry in place, so the two collapse to one entry and
//!   the server's fields win.
//! - **UPDATE** shallow-merges the payload over the entry with the same id.
//!   Fields the payload does not carry (a task's client-side
//!   `deliverables`) survive. Unknown ids are ignored.
//! - **DELETE** removes the entry with `old.id`.
//!
//! Inserts append at the end; updates and deletes work in place by id
//! lookup, so no unrelated entity ever changes position. Replaying an event
//! yields the same state.
//!
//! Deliverables live inside their task. Their events are routed to the task
//! named by `task_id` and folded into that task's array with the same rules.

use tracing::debug;

use crate::model::{Column, Deliverable, DeliverableContent, Entity, Project, Row, Table, Task};
use crate::store::BoardStore;

use super::event::{Change, ChangeEvent, ChangeKind, MergeError};

/// What a merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    Merged,
    Removed,
    Ignored(IgnoreReason),
}

impl MergeOutcome {
    /// Whether the store changed (or may have changed) as a result.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// UPDATE or DELETE for an id the store does not hold.
    UnknownId,
    /// Deliverable event whose task is not on the board (yet).
    UnknownParent,
    /// Row of a different project: its project event, or a column, task,
    /// deliverable or content row that hangs off another project's column.
    OtherProject,
}

/// Shallow-merge `patch` over `existing`, key by key.
///
/// # Errors
///
/// Returns [`MergeError::Decode`] when the merged row no longer decodes as
/// `T` (for example a patch setting `title` to a number).
pub fn overlay<T: Entity>(existing: &T, patch: &Row) -> Result<T, MergeError> {
    let mut merged = match serde_json::to_value(existing) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => Row::new(),
        Err(e) => {
            return Err(MergeError::Decode {
                table: T::TABLE,
                reason: e.to_string(),
            });
        }
    };
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    T::from_row(&merged).map_err(|e| MergeError::Decode {
        table: T::TABLE,
        reason: e.to_string(),
    })
}

/// Fold one typed change into a collection.
///
/// Shaped `(prev) -> next` so it can run inside a store setter. On error the
/// collection comes back untouched.
pub fn fold<T: Entity>(mut items: Vec<T>, change: &Change<T>) -> (Vec<T>, Result<MergeOutcome, MergeError>) {
    let position = items.iter().position(|item| item.id() == change.id());
    let outcome = match (change, position) {
        (Change::Insert { entity, .. }, None) => {
            items.push(entity.clone());
            Ok(MergeOutcome::Appended)
        }
        (Change::Insert { row: patch, .. } | Change::Update { patch, .. }, Some(idx)) => {
            match overlay(&items[idx], patch) {
                Ok(merged) => {
                    items[idx] = merged;
                    Ok(MergeOutcome::Merged)
                }
                Err(e) => Err(e),
            }
        }
        (Change::Update { .. } | Change::Delete { .. }, None) => {
            Ok(MergeOutcome::Ignored(IgnoreReason::UnknownId))
        }
        (Change::Delete { .. }, Some(idx)) => {
            items.remove(idx);
            Ok(MergeOutcome::Removed)
        }
    };
    (items, outcome)
}

/// Apply one change-feed event to the store.
///
/// # Errors
///
/// Returns [`MergeError`] for malformed payloads. The store is unchanged in
/// that case.
pub fn apply_change(store: &mut BoardStore, event: &ChangeEvent) -> Result<MergeOutcome, MergeError> {
    let outcome = match event.table {
        Table::Projects => apply_project(store, event),
        Table::Columns => apply_column(store, event),
        Table::Tasks => {
            let change = event.decode::<Task>()?;
            let mut outcome = Ok(MergeOutcome::Ignored(IgnoreReason::UnknownId));
            store.update_tasks(|prev| {
                let (next, result) = fold(prev, &change);
                outcome = result;
                next
            });
            outcome
        }
        Table::Deliverables => {
            let change = event.decode::<Deliverable>()?;
            let parent_hint = event.field("task_id").map(str::to_string);
            let mut outcome = Ok(MergeOutcome::Ignored(IgnoreReason::UnknownParent));
            store.update_tasks(|prev| {
                let (next, result) = fold_deliverable(prev, &change, parent_hint.as_deref());
                outcome = result;
                next
            });
            outcome
        }
        Table::DeliverableContents => apply_content(store, event),
    }?;

    debug!(
        table = %event.table,
        kind = %event.kind,
        id = event.row_id().unwrap_or("?"),
        ?outcome,
        "merged change event"
    );
    Ok(outcome)
}

fn apply_project(store: &mut BoardStore, event: &ChangeEvent) -> Result<MergeOutcome, MergeError> {
    let change = event.decode::<Project>()?;
    let current_id = store.project().map(|p| p.id.clone());
    if current_id.as_deref().is_some_and(|id| id != change.id()) {
        return Ok(MergeOutcome::Ignored(IgnoreReason::OtherProject));
    }

    let mut outcome = Ok(MergeOutcome::Ignored(IgnoreReason::UnknownId));
    store.update_project(|prev| {
        let items: Vec<Project> = prev.into_iter().collect();
        let (mut next, result) = fold(items, &change);
        outcome = result;
        next.pop()
    });
    outcome
}

fn apply_column(store: &mut BoardStore, event: &ChangeEvent) -> Result<MergeOutcome, MergeError> {
    let change = event.decode::<Column>()?;
    let before = store.column(change.id()).and_then(|c| c.order_position);

    let mut outcome = Ok(MergeOutcome::Ignored(IgnoreReason::UnknownId));
    store.update_columns(|prev| {
        let (next, result) = fold(prev, &change);
        outcome = result;
        next
    });

    // A column's position is the one field whose change is allowed to move
    // it; re-sort stably so ties keep their current relative order.
    if event.kind == ChangeKind::Update {
        let after = store.column(change.id()).and_then(|c| c.order_position);
        if after != before {
            store.update_columns(sort_by_order_position);
        }
    }
    outcome
}

/// Stable sort by `order_position`; columns without one keep their place
/// after every positioned column.
#[must_use]
pub fn sort_by_order_position(mut columns: Vec<Column>) -> Vec<Column> {
    columns.sort_by_key(|c| c.order_position.map_or((1, 0), |p| (0, p)));
    columns
}

fn apply_content(store: &mut BoardStore, event: &ChangeEvent) -> Result<MergeOutcome, MergeError> {
    let change = event.decode::<DeliverableContent>()?;

    // Contents upsert by deliverable: an optimistic row created under a
    // client id and the server's row for the same deliverable are the same
    // logical entry.
    let mut outcome = Ok(MergeOutcome::Ignored(IgnoreReason::UnknownId));
    store.update_contents(|mut prev| {
        if let Change::Insert { entity, row } = &change {
            let same_deliverable = prev
                .iter()
                .position(|c| c.id != entity.id && c.deliverable_id == entity.deliverable_id);
            if let Some(idx) = same_deliverable {
                match overlay(&prev[idx], row) {
                    Ok(merged) => {
                        prev[idx] = merged;
                        outcome = Ok(MergeOutcome::Merged);
                    }
                    Err(e) => outcome = Err(e),
                }
                return prev;
            }
        }
        let (next, result) = fold(prev, &change);
        outcome = result;
        next
    });
    outcome
}

/// Fold a deliverable change into the task that holds (or should hold) it.
///
/// `parent_hint` is the `task_id` carried by the payload. A DELETE without
/// one removes the deliverable from whichever task holds it. An UPDATE that
/// changes `task_id` moves the deliverable to the end of its new task.
pub fn fold_deliverable(
    mut tasks: Vec<Task>,
    change: &Change<Deliverable>,
    parent_hint: Option<&str>,
) -> (Vec<Task>, Result<MergeOutcome, MergeError>) {
    let id = change.id();
    let holder = tasks
        .iter()
        .enumerate()
        .find_map(|(ti, t)| t.deliverables.iter().position(|d| d.id == id).map(|di| (ti, di)));
    let parent_index = |tasks: &[Task], task_id: &str| tasks.iter().position(|t| t.id == task_id);

    let outcome = match (change, holder) {
        (Change::Insert { entity, .. }, None) => match parent_index(&tasks, &entity.task_id) {
            Some(ti) => {
                tasks[ti].deliverables.push(entity.clone());
                Ok(MergeOutcome::Appended)
            }
            None => Ok(MergeOutcome::Ignored(IgnoreReason::UnknownParent)),
        },
        (Change::Insert { row: patch, .. } | Change::Update { patch, .. }, Some((ti, di))) => {
            match overlay(&tasks[ti].deliverables[di], patch) {
                Ok(merged) if merged.task_id == tasks[ti].id => {
                    tasks[ti].deliverables[di] = merged;
                    Ok(MergeOutcome::Merged)
                }
                // Moving under a task not loaded yet: keep it where it is
                // so the caller can park the event for the new parent.
                Ok(merged) => match parent_index(&tasks, &merged.task_id) {
                    Some(target) => {
                        tasks[ti].deliverables.remove(di);
                        tasks[target].deliverables.push(merged);
                        Ok(MergeOutcome::Merged)
                    }
                    None => Ok(MergeOutcome::Ignored(IgnoreReason::UnknownParent)),
                },
                Err(e) => Err(e),
            }
        }
        (Change::Update { .. }, None) => {
            let parent_known = parent_hint.is_some_and(|p| parent_index(&tasks, p).is_some());
            if parent_known {
                Ok(MergeOutcome::Ignored(IgnoreReason::UnknownId))
            } else {
                Ok(MergeOutcome::Ignored(IgnoreReason::UnknownParent))
            }
        }
        (Change::Delete { .. }, Some((ti, di))) => {
            tasks[ti].deliverables.remove(di);
            Ok(MergeOutcome::Removed)
        }
        (Change::Delete { .. }, None) => match parent_hint {
            Some(p) if parent_index(&tasks, p).is_none() => {
                Ok(MergeOutcome::Ignored(IgnoreReason::UnknownParent))
            }
            _ => Ok(MergeOutcome::Ignored(IgnoreReason::UnknownId)),
        },
    };
    (tasks, outcome)
}
