//! A simulated board client: one open [`Board`] plus a random action
//! picker.
//!
//! Clients never read each other's state. Everything they learn about the
//! rest of the world arrives through [`SimClient::deliver`].

use lanes_core::board::Board;
use lanes_core::config::LanesConfig;
use lanes_core::drag::DragItem;
use lanes_core::gateway::{
    DeliverablePatch, Direction, FlushReport, Mutation, NewDeliverable, NewTask, TaskPatch,
};
use lanes_core::model::{DeliverableStatus, Priority};
use lanes_core::realtime::{ChangeEvent, MergeOutcome};
use lanes_core::storage::MemoryStorage;
use lanes_core::tools::{ADD_TASKS, ToolCall};
use lanes_core::{BoardError, BoardStore};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Stable identifier for a simulated client.
pub type ClientId = usize;

const STATUSES: [DeliverableStatus; 5] = [
    DeliverableStatus::NotStarted,
    DeliverableStatus::InProgress,
    DeliverableStatus::Completed,
    DeliverableStatus::Approved,
    DeliverableStatus::Rejected,
];

/// The kinds of thing a client does in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AddTask,
    RenameTask,
    Reprioritize,
    ShiftTask,
    DeleteTask,
    DragTask,
    CancelDrag,
    DragColumn,
    AddColumn,
    DeleteColumn,
    AddDeliverable,
    SetStatus,
    SetDependency,
    WriteContent,
    DeleteDeliverable,
    ToolAddTasks,
}

impl Action {
    /// Weighted table; column churn is rare.
    const WEIGHTED: [Self; 24] = [
        Self::AddTask,
        Self::AddTask,
        Self::AddTask,
        Self::RenameTask,
        Self::RenameTask,
        Self::Reprioritize,
        Self::ShiftTask,
        Self::ShiftTask,
        Self::DeleteTask,
        Self::DragTask,
        Self::DragTask,
        Self::DragTask,
        Self::CancelDrag,
        Self::DragColumn,
        Self::AddColumn,
        Self::DeleteColumn,
        Self::AddDeliverable,
        Self::AddDeliverable,
        Self::SetStatus,
        Self::SetStatus,
        Self::SetDependency,
        Self::WriteContent,
        Self::DeleteDeliverable,
        Self::ToolAddTasks,
    ];
}

/// What happened when a client acted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied,
    /// Validation refused it; nothing changed.
    Rejected { code: String },
    /// Nothing to act on.
    Skipped,
}

#[derive(Debug)]
pub struct SimClient {
    id: ClientId,
    board: Board<MemoryStorage>,
    counter: u64,
}

impl SimClient {
    /// Open a board on the shared storage. The client's feed is driven by
    /// the simulator, so the board does not subscribe itself.
    ///
    /// # Errors
    ///
    /// Whatever [`Board::open`] returns.
    pub fn open(id: ClientId, storage: MemoryStorage, project_id: &str, mut config: LanesConfig) -> Result<Self, BoardError> {
        config.sync.realtime = false;
        Ok(Self {
            id,
            board: Board::open(storage, project_id, config)?,
            counter: 0,
        })
    }

    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub const fn board(&self) -> &Board<MemoryStorage> {
        &self.board
    }

    #[must_use]
    pub const fn store(&self) -> &BoardStore {
        self.board.store()
    }

    /// Pick and perform one action.
    pub fn act(&mut self, rng: &mut crate::rng::DeterministicRng) -> (Action, ActionOutcome) {
        let action = rng
            .pick(&Action::WEIGHTED)
            .copied()
            .unwrap_or(Action::AddTask);
        let outcome = match self.perform(action, rng) {
            Ok(true) => ActionOutcome::Applied,
            Ok(false) => ActionOutcome::Skipped,
            Err(err) => ActionOutcome::Rejected {
                code: err.code().code().to_string(),
            },
        };
        (action, outcome)
    }

    pub fn flush(&mut self) -> FlushReport {
        self.board.flush()
    }

    /// Hand a feed event to the board. `None` when the payload was
    /// malformed and dropped.
    pub fn deliver(&mut self, event: ChangeEvent) -> Option<MergeOutcome> {
        self.board.apply_change(event).ok()
    }

    /// Number of events parked on unknown tasks.
    #[must_use]
    pub const fn parked(&self) -> usize {
        self.board.parked().len()
    }

    /// Throw away local state and reload from storage.
    ///
    /// # Errors
    ///
    /// Whatever [`Board::refetch`] returns.
    pub fn refetch(&mut self) -> Result<(), BoardError> {
        self.board.refetch()
    }

    fn finish_drag(&mut self, target: DragItem, cancel: bool) -> Result<(), BoardError> {
        self.board.drag_over(target.clone(), 1)?;
        if cancel {
            self.board.cancel_drag()?;
        } else {
            self.board.drop_on(Some(target))?;
        }
        Ok(())
    }

    fn title(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix} c{}-{}", self.id, self.counter)
    }

    #[allow(clippy::too_many_lines)]
    fn perform(&mut self, action: Action, rng: &mut crate::rng::DeterministicRng) -> Result<bool, BoardError> {
        let store = self.board.store();
        let column_ids: Vec<String> = store.columns().iter().map(|c| c.id.clone()).collect();
        let task_ids: Vec<String> = store.tasks().iter().map(|t| t.id.clone()).collect();
        let deliverable_ids: Vec<String> = store.deliverables().map(|d| d.id.clone()).collect();

        let mutation = match action {
            Action::AddTask => {
                let Some(column) = rng.pick(&column_ids).cloned() else {
                    return Ok(false);
                };
                let mut task = NewTask::new(column, self.title("Task"));
                task.priority = rng.pick(&Priority::ALL).copied().unwrap_or_default();
                Mutation::AddTask(task)
            }
            Action::RenameTask => {
                let Some(id) = rng.pick(&task_ids).cloned() else {
                    return Ok(false);
                };
                Mutation::UpdateTask {
                    id,
                    patch: TaskPatch {
                        title: Some(self.title("Renamed")),
                        ..TaskPatch::default()
                    },
                }
            }
            Action::Reprioritize => {
                let Some(id) = rng.pick(&task_ids).cloned() else {
                    return Ok(false);
                };
                Mutation::UpdateTask {
                    id,
                    patch: TaskPatch {
                        priority: rng.pick(&Priority::ALL).copied(),
                        ..TaskPatch::default()
                    },
                }
            }
            Action::ShiftTask => {
                let Some(id) = rng.pick(&task_ids).cloned() else {
                    return Ok(false);
                };
                let direction = if rng.hit_rate_percent(50) {
                    Direction::Left
                } else {
                    Direction::Right
                };
                Mutation::ShiftTask { id, direction }
            }
            Action::DeleteTask => {
                let Some(id) = rng.pick(&task_ids).cloned() else {
                    return Ok(false);
                };
                Mutation::DeleteTask { id }
            }
            Action::DragTask | Action::CancelDrag => {
                let (Some(active), Some(over)) = (rng.pick(&task_ids).cloned(), rng.pick(&task_ids).cloned())
                else {
                    return Ok(false);
                };
                let target = if active == over {
                    match rng.pick(&column_ids) {
                        Some(column) => DragItem::Column(column.clone()),
                        None => return Ok(false),
                    }
                } else {
                    DragItem::Task(over)
                };
                self.board.pick_up(DragItem::Task(active))?;
                let finished = self.finish_drag(target, action == Action::CancelDrag);
                if finished.is_err() && self.board.drag().is_dragging() {
                    let _ = self.board.cancel_drag();
                }
                finished?;
                return Ok(true);
            }
            Action::DragColumn => {
                let (Some(active), Some(over)) = (rng.pick(&column_ids).cloned(), rng.pick(&column_ids).cloned())
                else {
                    return Ok(false);
                };
                self.board.pick_up(DragItem::Column(active))?;
                self.board.drop_on(Some(DragItem::Column(over)))?;
                return Ok(true);
            }
            Action::AddColumn => {
                if column_ids.len() >= 6 {
                    return Ok(false);
                }
                Mutation::AddColumn {
                    title: self.title("Column"),
                    description: None,
                }
            }
            Action::DeleteColumn => {
                if column_ids.len() <= 2 {
                    return Ok(false);
                }
                let Some(id) = rng.pick(&column_ids).cloned() else {
                    return Ok(false);
                };
                Mutation::DeleteColumn { id }
            }
            Action::AddDeliverable => {
                let Some(task_id) = rng.pick(&task_ids).cloned() else {
                    return Ok(false);
                };
                let mut new = NewDeliverable::new(task_id, self.title("Deliverable"));
                if rng.hit_rate_percent(30) {
                    new.depends_on = rng.pick(&deliverable_ids).cloned();
                }
                Mutation::AddDeliverable(new)
            }
            Action::SetStatus => {
                let Some(id) = rng.pick(&deliverable_ids).cloned() else {
                    return Ok(false);
                };
                Mutation::UpdateDeliverable {
                    id,
                    patch: DeliverablePatch {
                        status: rng.pick(&STATUSES).copied(),
                        ..DeliverablePatch::default()
                    },
                }
            }
            Action::SetDependency => {
                let Some(id) = rng.pick(&deliverable_ids).cloned() else {
                    return Ok(false);
                };
                let depends_on = if rng.hit_rate_percent(25) {
                    None
                } else {
                    rng.pick(&deliverable_ids).cloned()
                };
                Mutation::SetDependency { id, depends_on }
            }
            Action::WriteContent => {
                let Some(deliverable_id) = rng.pick(&deliverable_ids).cloned() else {
                    return Ok(false);
                };
                Mutation::UpsertContent {
                    deliverable_id,
                    content: format!("<p>{}</p>", self.title("Notes")),
                }
            }
            Action::DeleteDeliverable => {
                let Some(id) = rng.pick(&deliverable_ids).cloned() else {
                    return Ok(false);
                };
                Mutation::DeleteDeliverable { id }
            }
            Action::ToolAddTasks => {
                let Some(column) = rng.pick(&column_ids).cloned() else {
                    return Ok(false);
                };
                let call = ToolCall {
                    name: ADD_TASKS.to_string(),
                    arguments: json!({
                        "tasks": [
                            { "title": self.title("Suggested"), "column": column, "priority": "HIGH" },
                            { "title": self.title("Suggested"), "column": column },
                        ]
                    }),
                };
                self.board.call_tool(&call)?;
                return Ok(true);
            }
        };

        self.board.mutate(mutation)?;
        Ok(true)
    }
}
