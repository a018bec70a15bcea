use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{Deliverable, Entity, ParseEnumError, Row, Table, new_id};

/// Task priority, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" | "critical" => Ok(Self::Urgent),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

/// A unit of work that belongs to exactly one column.
///
/// `deliverables` is attached client-side from the `deliverables` table; no
/// `tasks` row carries it, so it is never written back and survives every
/// shallow merge of a task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub column_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "super::date::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deliverables: Vec<Deliverable>,
}

impl Task {
    /// A new task with a client-generated id.
    #[must_use]
    pub fn new(column_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            column_id: column_id.into(),
            title: title.into(),
            description: None,
            due_date: None,
            priority: Priority::default(),
            created_at: None,
            updated_at: None,
            deliverables: Vec::new(),
        }
    }

    #[must_use]
    pub fn deliverable(&self, id: &str) -> Option<&Deliverable> {
        self.deliverables.iter().find(|d| d.id == id)
    }
}

impl Entity for Task {
    const TABLE: Table = Table::Tasks;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        for deliverable in &mut self.deliverables {
            deliverable.task_id.clone_from(&id);
        }
        self.id = id;
    }

    fn to_row(&self) -> Row {
        let mut row = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Row::new(),
        };
        row.remove("deliverables");
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert_eq!(" urgent ".parse::<Priority>(), Ok(Priority::Urgent));
        assert!("p0".parse::<Priority>().is_err());
    }

    #[test]
    fn row_omits_client_side_deliverables() {
        let mut task = Task::new("col-1", "Write docs");
        task.deliverables.push(Deliverable::new(&task.id, "Outline"));
        let row = task.to_row();
        assert!(!row.contains_key("deliverables"));
        assert_eq!(row["priority"], "medium");
    }

    #[test]
    fn missing_priority_defaults_to_medium() {
        let row: Row = serde_json::from_str(r#"{"id":"t","column_id":"c","title":"x"}"#)
            .expect("row json");
        let task = Task::from_row(&row).expect("decode");
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.deliverables.is_empty());
    }

    #[test]
    fn set_id_rewrites_embedded_deliverables() {
        let mut task = Task::new("col-1", "Ship");
        task.deliverables.push(Deliverable::new(&task.id, "Build"));
        task.set_id("server-id".into());
        assert_eq!(task.deliverables[0].task_id, "server-id");
    }
}
