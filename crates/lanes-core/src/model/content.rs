use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, Table, new_id};

/// Rich-text body of a deliverable. At most one row per deliverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableContent {
    pub id: String,
    pub deliverable_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeliverableContent {
    #[must_use]
    pub fn new(deliverable_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            deliverable_id: deliverable_id.to_string(),
            content: content.into(),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for DeliverableContent {
    const TABLE: Table = Table::DeliverableContents;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
