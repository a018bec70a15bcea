use serde::{Deserialize, Serialize};

/// The entity being dragged, or the entity under the pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum DragItem {
    Column(String),
    Task(String),
}

impl DragItem {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Column(id) | Self::Task(id) => id,
        }
    }

    #[must_use]
    pub const fn is_task(&self) -> bool {
        matches!(self, Self::Task(_))
    }
}

/// Drop and hover targets share the dragged entity's shape.
pub type DragTarget = DragItem;

/// Where a task was before the gesture started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub column_id: String,
    /// Index in the flat task array.
    pub index: usize,
    /// The task right after it in the flat array, if any.
    pub successor: Option<String>,
}

/// An in-flight gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDrag {
    pub item: DragItem,
    /// Column the task was picked up from. `None` for column drags.
    pub picked_up_column: Option<String>,
    pub snapshot: Option<TaskSnapshot>,
    /// Last pointer tick that produced a recomputation.
    pub last_tick: Option<u64>,
    /// Last target processed.
    pub over: Option<DragTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(ActiveDrag),
}
