//! Screen-reader announcements for drag gestures.
//!
//! Positions are 1-indexed and read from the same store state the move
//! was computed against, so what is announced is what is shown.

use crate::store::BoardStore;

use super::state::{DragItem, DragTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    PickedUp { item: DragItem },
    Over { item: DragItem, target: DragTarget },
    Dropped { item: DragItem, target: Option<DragTarget> },
    Cancelled { item: DragItem },
}

impl Announcement {
    #[must_use]
    pub const fn item(&self) -> &DragItem {
        match self {
            Self::PickedUp { item }
            | Self::Over { item, .. }
            | Self::Dropped { item, .. }
            | Self::Cancelled { item } => item,
        }
    }
}

fn task_place(store: &BoardStore, task_id: &str) -> Option<String> {
    let task = store.task(task_id)?;
    let (position, count) = store.task_position(task_id)?;
    let column = store
        .column(&task.column_id)
        .map_or("an unknown column", |c| c.title.as_str());
    Some(format!(
        "Task {} is at position {} of {} in column {column}.",
        task.title,
        position + 1,
        count
    ))
}

fn column_place(store: &BoardStore, column_id: &str, index: Option<usize>) -> Option<String> {
    let column = store.column(column_id)?;
    let index = index.or_else(|| store.column_index(column_id))?;
    Some(format!(
        "Column {} is at position {} of {}.",
        column.title,
        index + 1,
        store.columns().len()
    ))
}

fn place(store: &BoardStore, item: &DragItem) -> String {
    let described = match item {
        DragItem::Task(id) => task_place(store, id),
        DragItem::Column(id) => column_place(store, id, None),
    };
    described.unwrap_or_else(|| "The item is no longer on the board.".to_string())
}

/// Render an announcement as text.
#[must_use]
pub fn describe(store: &BoardStore, announcement: &Announcement) -> String {
    match announcement {
        Announcement::PickedUp { item } => format!("Picked up. {}", place(store, item)),
        Announcement::Over { item, target } => match (item, target) {
            (DragItem::Column(id), DragItem::Column(over)) => {
                let title = store.column(id).map_or("", |c| c.title.as_str());
                match store.column_index(over) {
                    Some(index) => format!(
                        "Column {title} is over position {} of {}.",
                        index + 1,
                        store.columns().len()
                    ),
                    None => "The target column is no longer on the board.".to_string(),
                }
            }
            _ => place(store, item),
        },
        Announcement::Dropped { item, target } => match (item, target) {
            (DragItem::Column(id), Some(DragItem::Column(over))) => {
                let index = store.column_index(over);
                format!(
                    "Dropped. {}",
                    column_place(store, id, index)
                        .unwrap_or_else(|| "The item is no longer on the board.".to_string())
                )
            }
            _ => format!("Dropped. {}", place(store, item)),
        },
        Announcement::Cancelled { item } => {
            format!("Dragging was cancelled. {}", place(store, item))
        }
    }
}
