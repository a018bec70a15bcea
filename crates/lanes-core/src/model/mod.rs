//! Board entities and the row boundary they cross on the way to storage.
//!
//! Storage speaks loosely-typed rows (`serde_json` objects); everything
//! above the storage boundary works with the typed structs in this module.
//! The [`Entity`] trait ties each struct to its table and gives the merge
//! engine a uniform way to read ids and convert to and from rows.

pub mod column;
pub mod content;
pub mod date;
pub mod deliverable;
pub mod project;
pub mod task;

use std::{fmt, str::FromStr};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use column::Column;
pub use content::DeliverableContent;
pub use deliverable::{Deliverable, DeliverableStatus};
pub use project::Project;
pub use task::{Priority, Task};

/// A storage row: one JSON object keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// The tables the board reads, writes and subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Projects,
    Columns,
    Tasks,
    Deliverables,
    DeliverableContents,
}

impl Table {
    /// Every table, parents before children.
    pub const ALL: [Self; 5] = [
        Self::Projects,
        Self::Columns,
        Self::Tasks,
        Self::Deliverables,
        Self::DeliverableContents,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Columns => "columns",
            Self::Tasks => "tasks",
            Self::Deliverables => "deliverables",
            Self::DeliverableContents => "deliverable_contents",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "projects" => Ok(Self::Projects),
            "columns" => Ok(Self::Columns),
            "tasks" => Ok(Self::Tasks),
            "deliverables" => Ok(Self::Deliverables),
            "deliverable_contents" => Ok(Self::DeliverableContents),
            _ => Err(ParseEnumError {
                expected: "table",
                got: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

/// A typed board entity stored as one row of [`Entity::TABLE`].
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned {
    const TABLE: Table;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// The row written to storage. Client-side-only fields are stripped.
    fn to_row(&self) -> Row {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Row::new(),
        }
    }

    /// Decode a storage row.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when a field is missing or has the
    /// wrong shape.
    fn from_row(row: &Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row.clone()))
    }
}

/// Generate a client-side id for an optimistic insert.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read a string field from a row, treating non-strings as absent.
#[must_use]
pub fn row_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}
