use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{Entity, ParseEnumError, Table, new_id};

/// Review lifecycle of a deliverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeliverableStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Approved,
    Rejected,
}

impl DeliverableStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliverableStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "notstarted" | "todo" => Ok(Self::NotStarted),
            "inprogress" | "doing" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseEnumError {
                expected: "deliverable status",
                got: s.to_string(),
            }),
        }
    }
}

/// A sub-unit of a task with its own status and optional dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: String,
    pub task_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: DeliverableStatus,
    #[serde(
        default,
        deserialize_with = "super::date::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<NaiveDate>,
    /// Another deliverable (any task) that must be `Completed` before this
    /// one's content can be edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_deliverable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Deliverable {
    /// A new deliverable with a client-generated id.
    #[must_use]
    pub fn new(task_id: &str, title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            task_id: task_id.to_string(),
            title: title.into(),
            description: None,
            status: DeliverableStatus::default(),
            due_date: None,
            dependency_deliverable_id: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Deliverable {
    const TABLE: Table = Table::Deliverables;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
