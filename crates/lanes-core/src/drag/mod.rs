//! Drag Reorder Engine.
//!
//! A gesture is `pick_up`, any number of `drag_over`, then `drop` or
//! `cancel`. While it runs, the engine rewrites the store directly so the
//! board shows the tentative order; nothing reaches storage until the drop
//! commit goes through the gateway.
//!
//! | dragged | hovering | effect                                              |
//! |---------|----------|-----------------------------------------------------|
//! | task    | task     | same column: array move; other column: reassign and land just before the hovered task |
//! | task    | column   | reassign `column_id`, keep array position           |
//! | column  | anything | nothing until drop                                  |

pub mod announce;
pub mod reorder;
pub mod state;

use thiserror::Error;
use tracing::{debug, trace};

use crate::error::ErrorCode;
use crate::store::BoardStore;

pub use announce::{Announcement, describe};
pub use reorder::{OverMove, array_move};
pub use state::{ActiveDrag, DragItem, DragState, DragTarget, TaskSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragError {
    #[error("no drag in progress")]
    NotActive,
    #[error("a drag is already in progress for {0:?}")]
    AlreadyActive(DragItem),
    #[error("{0:?} is not on the board")]
    UnknownItem(DragItem),
    #[error("drag target {0:?} is not on the board")]
    TargetMissing(DragTarget),
    #[error("dragged {0:?} was removed during the gesture")]
    ItemVanished(DragItem),
}

impl DragError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotActive => ErrorCode::DragNotActive,
            Self::AlreadyActive(_) => ErrorCode::DragAlreadyActive,
            Self::UnknownItem(_) | Self::TargetMissing(_) | Self::ItemVanished(_) => {
                ErrorCode::DragTargetMissing
            }
        }
    }
}

/// What a drop asks the gateway to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropCommit {
    MoveColumn { id: String, to_index: usize },
    /// The task's local position is final; `from_column` is where it was
    /// picked up, so the gateway can tell whether `column_id` changed.
    Task { id: String, from_column: String },
}

/// Result of ending a gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropResult {
    pub commit: Option<DropCommit>,
    pub announcement: Announcement,
}

#[derive(Debug, Clone, Default)]
pub struct DragEngine {
    state: DragState,
    debounce_per_tick: bool,
}

impl DragEngine {
    #[must_use]
    pub const fn new(debounce_per_tick: bool) -> Self {
        Self {
            state: DragState::Idle,
            debounce_per_tick,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &DragState {
        &self.state
    }

    #[must_use]
    pub const fn active(&self) -> Option<&ActiveDrag> {
        match &self.state {
            DragState::Idle => None,
            DragState::Dragging(active) => Some(active),
        }
    }

    #[must_use]
    pub const fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// Idle → Dragging.
    ///
    /// # Errors
    ///
    /// [`DragError::AlreadyActive`] mid-gesture, [`DragError::UnknownItem`]
    /// when the entity is not in the store.
    pub fn pick_up(&mut self, store: &BoardStore, item: DragItem) -> Result<Announcement, DragError> {
        if let DragState::Dragging(active) = &self.state {
            return Err(DragError::AlreadyActive(active.item.clone()));
        }

        let (picked_up_column, snapshot) = match &item {
            DragItem::Column(id) => {
                if store.column(id).is_none() {
                    return Err(DragError::UnknownItem(item));
                }
                (None, None)
            }
            DragItem::Task(id) => {
                let Some(index) = store.task_index(id) else {
                    return Err(DragError::UnknownItem(item));
                };
                let tasks = store.tasks();
                let column_id = tasks[index].column_id.clone();
                let snapshot = TaskSnapshot {
                    column_id: column_id.clone(),
                    index,
                    successor: tasks.get(index + 1).map(|t| t.id.clone()),
                };
                (Some(column_id), Some(snapshot))
            }
        };

        debug!(item = ?item, "drag started");
        self.state = DragState::Dragging(ActiveDrag {
            item: item.clone(),
            picked_up_column,
            snapshot,
            last_tick: None,
            over: None,
        });
        Ok(Announcement::PickedUp { item })
    }

    /// Dragging → Dragging. Returns `None` when the event was debounced.
    ///
    /// # Errors
    ///
    /// [`DragError::NotActive`] when idle, [`DragError::TargetMissing`] for
    /// a target that is not in the store, [`DragError::ItemVanished`] (and
    /// the gesture ends) when the dragged task was removed meanwhile.
    pub fn drag_over(
        &mut self,
        store: &mut BoardStore,
        target: DragTarget,
        tick: u64,
    ) -> Result<Option<Announcement>, DragError> {
        let debounce = self.debounce_per_tick;
        let DragState::Dragging(active) = &mut self.state else {
            return Err(DragError::NotActive);
        };
        if debounce && active.last_tick == Some(tick) {
            trace!(tick, "drag-over debounced");
            return Ok(None);
        }
        if !target_exists(store, &target) {
            return Err(DragError::TargetMissing(target));
        }
        if let DragItem::Task(id) = &active.item {
            if store.task(id).is_none() {
                let item = active.item.clone();
                self.state = DragState::Idle;
                return Err(DragError::ItemVanished(item));
            }
        }

        apply_over(store, &active.item, &target);
        active.last_tick = Some(tick);
        active.over = Some(target.clone());
        Ok(Some(Announcement::Over {
            item: active.item.clone(),
            target,
        }))
    }

    /// Dragging → Idle, producing the commit for the gateway.
    ///
    /// A drop without a target is a cancel. A drop on a target other than
    /// the last one processed applies that target first.
    ///
    /// # Errors
    ///
    /// [`DragError::NotActive`] when idle.
    pub fn drop(&mut self, store: &mut BoardStore, target: Option<DragTarget>) -> Result<DropResult, DragError> {
        let Some(target) = target else {
            let announcement = self.cancel(store)?;
            return Ok(DropResult {
                commit: None,
                announcement,
            });
        };
        let DragState::Dragging(active) = std::mem::take(&mut self.state) else {
            return Err(DragError::NotActive);
        };

        let target_present = target_exists(store, &target);
        if target_present && active.over.as_ref() != Some(&target) {
            apply_over(store, &active.item, &target);
        }

        let commit = match (&active.item, &target) {
            (DragItem::Column(id), DragItem::Column(over)) => store
                .column_index(over)
                .filter(|_| store.column(id).is_some())
                .map(|to_index| DropCommit::MoveColumn {
                    id: id.clone(),
                    to_index,
                }),
            (DragItem::Column(_), DragItem::Task(_)) => None,
            (DragItem::Task(id), _) => match (&active.picked_up_column, store.task(id)) {
                (Some(from_column), Some(_)) => Some(DropCommit::Task {
                    id: id.clone(),
                    from_column: from_column.clone(),
                }),
                _ => None,
            },
        };

        debug!(item = ?active.item, ?commit, "drag dropped");
        Ok(DropResult {
            commit,
            announcement: Announcement::Dropped {
                item: active.item,
                target: Some(target),
            },
        })
    }

    /// Dragging → Idle, restoring the task to where it was picked up.
    ///
    /// # Errors
    ///
    /// [`DragError::NotActive`] when idle.
    pub fn cancel(&mut self, store: &mut BoardStore) -> Result<Announcement, DragError> {
        let DragState::Dragging(active) = std::mem::take(&mut self.state) else {
            return Err(DragError::NotActive);
        };
        if let (DragItem::Task(id), Some(snapshot)) = (&active.item, &active.snapshot) {
            store.update_tasks(|mut tasks| {
                reorder::restore_position(
                    &mut tasks,
                    id,
                    &snapshot.column_id,
                    snapshot.index,
                    snapshot.successor.as_deref(),
                );
                tasks
            });
        }
        debug!(item = ?active.item, "drag cancelled");
        Ok(Announcement::Cancelled { item: active.item })
    }
}

fn target_exists(store: &BoardStore, target: &DragTarget) -> bool {
    match target {
        DragItem::Column(id) => store.column(id).is_some(),
        DragItem::Task(id) => store.task(id).is_some(),
    }
}

fn apply_over(store: &mut BoardStore, item: &DragItem, target: &DragTarget) {
    let DragItem::Task(active) = item else {
        return;
    };
    store.update_tasks(|mut tasks| {
        let outcome = match target {
            DragItem::Task(over) => reorder::move_task_over_task(&mut tasks, active, over),
            DragItem::Column(column_id) => {
                if reorder::move_task_to_column(&mut tasks, active, column_id) {
                    OverMove::AcrossColumns
                } else {
                    OverMove::None
                }
            }
        };
        trace!(task = active.as_str(), ?target, ?outcome, "drag-over applied");
        tasks
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Task};

    fn store() -> BoardStore {
        let mut store = BoardStore::new();
        store.update_columns(|_| {
            ["X", "Y", "Z"]
                .iter()
                .map(|id| {
                    let mut c = Column::new(None, *id);
                    c.id = (*id).to_string();
                    c
                })
                .collect()
        });
        store.update_tasks(|_| {
            [("a", "X"), ("b", "X"), ("t", "X"), ("u", "Y"), ("v", "Y")]
                .iter()
                .map(|(id, col)| {
                    let mut t = Task::new(*col, *id);
                    t.id = (*id).to_string();
                    t
                })
                .collect()
        });
        store
    }

    fn view(store: &BoardStore, column: &str) -> Vec<String> {
        store.tasks_in_column(column).map(|t| t.id.clone()).collect()
    }

    #[test]
    fn cross_column_drag_lands_before_hovered_task() {
        let mut store = store();
        let mut engine = DragEngine::new(true);
        engine.pick_up(&store, DragItem::Task("t".into())).expect("pick up");
        engine
            .drag_over(&mut store, DragItem::Task("u".into()), 1)
            .expect("over");
        assert_eq!(view(&store, "Y"), ["t", "u", "v"]);

        let result = engine.drop(&mut store, Some(DragItem::Task("u".into()))).expect("drop");
        assert_eq!(
            result.commit,
            Some(DropCommit::Task {
                id: "t".into(),
                from_column: "X".into()
            })
        );
        assert!(!engine.is_dragging());
    }

    #[test]
    fn middle_task_dragged_onto_first_of_another_column() {
        let mut store = BoardStore::new();
        store.update_columns(|_| {
            ["X", "Y"]
                .iter()
                .map(|id| {
                    let mut c = Column::new(None, *id);
                    c.id = (*id).to_string();
                    c
                })
                .collect()
        });
        store.update_tasks(|_| {
            [("a", "X"), ("t", "X"), ("b", "X"), ("u", "Y"), ("v", "Y")]
                .iter()
                .map(|(id, col)| {
                    let mut t = Task::new(*col, *id);
                    t.id = (*id).to_string();
                    t
                })
                .collect()
        });
        assert_eq!(store.task_position("t"), Some((1, 3)));
        assert_eq!(store.task_position("u"), Some((0, 2)));

        let mut engine = DragEngine::new(true);
        engine.pick_up(&store, DragItem::Task("t".into())).expect("pick up");
        engine
            .drag_over(&mut store, DragItem::Task("u".into()), 1)
            .expect("over");
        engine.drop(&mut store, Some(DragItem::Task("u".into()))).expect("drop");

        assert_eq!(store.task("t").map(|t| t.column_id.as_str()), Some("Y"));
        assert_eq!(view(&store, "Y"), ["t", "u", "v"]);
        assert_eq!(view(&store, "X"), ["a", "b"]);
    }

    #[test]
    fn same_tick_is_debounced() {
        let mut store = store();
        let mut engine = DragEngine::new(true);
        engine.pick_up(&store, DragItem::Task("a".into())).expect("pick up");
        assert!(engine.drag_over(&mut store, DragItem::Task("b".into()), 7).expect("over").is_some());
        let before = store.clone();
        assert!(engine.drag_over(&mut store, DragItem::Task("t".into()), 7).expect("over").is_none());
        assert_eq!(store, before);

        let mut undebounced = DragEngine::new(false);
        let mut store = self::store();
        undebounced.pick_up(&store, DragItem::Task("a".into())).expect("pick up");
        undebounced.drag_over(&mut store, DragItem::Task("b".into()), 7).expect("over");
        assert!(undebounced.drag_over(&mut store, DragItem::Task("t".into()), 7).expect("over").is_some());
    }

    #[test]
    fn cancel_restores_column_and_position() {
        let mut store = store();
        let original = store.clone();
        let mut engine = DragEngine::new(true);
        engine.pick_up(&store, DragItem::Task("b".into())).expect("pick up");
        engine.drag_over(&mut store, DragItem::Task("v".into()), 1).expect("over");
        engine.drag_over(&mut store, DragItem::Column("Z".into()), 2).expect("over");
        assert_eq!(store.task("b").map(|t| t.column_id.as_str()), Some("Z"));

        engine.cancel(&mut store).expect("cancel");
        assert_eq!(store, original);
    }

    #[test]
    fn drop_without_target_cancels() {
        let mut store = store();
        let original = store.clone();
        let mut engine = DragEngine::new(true);
        engine.pick_up(&store, DragItem::Task("a".into())).expect("pick up");
        engine.drag_over(&mut store, DragItem::Task("u".into()), 1).expect("over");
        let result = engine.drop(&mut store, None).expect("drop");
        assert_eq!(result.commit, None);
        assert!(matches!(result.announcement, Announcement::Cancelled { .. }));
        assert_eq!(store, original);
    }

    #[test]
    fn column_drag_changes_nothing_until_drop() {
        let mut store = store();
        let original = store.clone();
        let mut engine = DragEngine::new(true);
        engine.pick_up(&store, DragItem::Column("X".into())).expect("pick up");
        engine.drag_over(&mut store, DragItem::Column("Z".into()), 1).expect("over");
        assert_eq!(store, original);
        let result = engine.drop(&mut store, Some(DragItem::Column("Z".into()))).expect("drop");
        assert_eq!(
            result.commit,
            Some(DropCommit::MoveColumn {
                id: "X".into(),
                to_index: 2
            })
        );
    }

    #[test]
    fn state_errors() {
        let mut store = store();
        let mut engine = DragEngine::new(true);
        assert_eq!(engine.cancel(&mut store), Err(DragError::NotActive));
        assert_eq!(
            engine.pick_up(&store, DragItem::Task("nope".into())),
            Err(DragError::UnknownItem(DragItem::Task("nope".into())))
        );
        engine.pick_up(&store, DragItem::Task("a".into())).expect("pick up");
        assert!(matches!(
            engine.pick_up(&store, DragItem::Task("b".into())),
            Err(DragError::AlreadyActive(_))
        ));
        assert_eq!(
            engine.drag_over(&mut store, DragItem::Column("W".into()), 1),
            Err(DragError::TargetMissing(DragItem::Column("W".into())))
        );
    }

    #[test]
    fn vanished_task_ends_the_gesture() {
        let mut store = store();
        let mut engine = DragEngine::new(true);
        engine.pick_up(&store, DragItem::Task("a".into())).expect("pick up");
        store.update_tasks(|tasks| tasks.into_iter().filter(|t| t.id != "a").collect());
        assert_eq!(
            engine.drag_over(&mut store, DragItem::Task("u".into()), 1),
            Err(DragError::ItemVanished(DragItem::Task("a".into())))
        );
        assert!(!engine.is_dragging());
    }
}
