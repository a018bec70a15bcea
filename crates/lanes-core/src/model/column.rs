use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, Table, new_id};

/// A named lane on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Written on reorder commits; absent for columns that were never moved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Column {
    /// A new column with a client-generated id.
    #[must_use]
    pub fn new(project_id: Option<String>, title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            project_id,
            title: title.into(),
            description: None,
            order_position: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Column {
    const TABLE: Table = Table::Columns;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
