//! Change-feed payloads and their typed decoding.
//!
//! The upstream feed delivers `{eventType, new, old}` objects per table.
//! Inserts carry only `new`, deletes only `old`, updates both (with `old`
//! often reduced to the primary key). Empty objects are treated as absent.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::model::{Entity, Row, Table, row_str};

/// The kind of row change, decoded from the feed's `eventType` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        })
    }
}

/// One change-feed event for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub new: Option<Row>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub old: Option<Row>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<Row>, D::Error>
where
    D: Deserializer<'de>,
{
    let row: Option<Row> = Option::deserialize(deserializer)?;
    Ok(row.filter(|r| !r.is_empty()))
}

impl ChangeEvent {
    #[must_use]
    pub const fn insert(table: Table, new: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
            new: Some(new),
            old: None,
        }
    }

    #[must_use]
    pub const fn update(table: Table, new: Row, old: Option<Row>) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            new: Some(new),
            old,
        }
    }

    #[must_use]
    pub const fn delete(table: Table, old: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// The id of the row this event is about.
    #[must_use]
    pub fn row_id(&self) -> Option<&str> {
        let row = match self.kind {
            ChangeKind::Insert | ChangeKind::Update => self.new.as_ref(),
            ChangeKind::Delete => self.old.as_ref(),
        }?;
        row_str(row, "id")
    }

    /// A field read from `new`, falling back to `old`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.new
            .as_ref()
            .and_then(|r| row_str(r, key))
            .or_else(|| self.old.as_ref().and_then(|r| row_str(r, key)))
    }

    /// Decode into a typed change for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError`] when the event targets another table, lacks the
    /// row its kind requires, lacks an id, or (for inserts) does not decode
    /// into `T`.
    pub fn decode<T: Entity>(&self) -> Result<Change<T>, MergeError> {
        if self.table != T::TABLE {
            return Err(MergeError::WrongTable {
                expected: T::TABLE,
                got: self.table,
            });
        }

        let (side, row) = match self.kind {
            ChangeKind::Insert | ChangeKind::Update => ("new", self.new.as_ref()),
            ChangeKind::Delete => ("old", self.old.as_ref()),
        };
        let row = row.ok_or(MergeError::MissingRow {
            table: self.table,
            kind: self.kind,
            side,
        })?;
        let id = row_str(row, "id")
            .filter(|id| !id.is_empty())
            .ok_or(MergeError::MissingId {
                table: self.table,
                kind: self.kind,
            })?
            .to_string();

        match self.kind {
            ChangeKind::Insert => {
                let entity = T::from_row(row).map_err(|e| MergeError::Decode {
                    table: self.table,
                    reason: e.to_string(),
                })?;
                Ok(Change::Insert {
                    entity,
                    row: row.clone(),
                })
            }
            ChangeKind::Update => Ok(Change::Update {
                id,
                patch: row.clone(),
            }),
            ChangeKind::Delete => Ok(Change::Delete { id }),
        }
    }
}

/// A decoded change for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    /// `row` is the raw payload; it is what gets merged over an existing
    /// entry so that server fields win, including explicit nulls.
    Insert { entity: T, row: Row },
    Update { id: String, patch: Row },
    Delete { id: String },
}

impl<T: Entity> Change<T> {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Insert { entity, .. } => entity.id(),
            Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// A change-feed event that could not be applied. The event is dropped;
/// nothing else in the store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("{got} event routed to the {expected} merge")]
    WrongTable { expected: Table, got: Table },
    #[error("{table} {kind} event has no `{side}` row")]
    MissingRow {
        table: Table,
        kind: ChangeKind,
        side: &'static str,
    },
    #[error("{table} {kind} event row has no id")]
    MissingId { table: Table, kind: ChangeKind },
    #[error("{table} row could not be decoded: {reason}")]
    Decode { table: Table, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test rows must be objects"),
        }
    }

    #[test]
    fn parses_feed_payload_with_empty_old() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "table": "tasks",
            "eventType": "INSERT",
            "new": {"id": "t1", "column_id": "c1", "title": "Write"},
            "old": {}
        }))
        .expect("payload parses");
        assert_eq!(event.kind, ChangeKind::Insert);
        assert!(event.old.is_none());
        assert_eq!(event.row_id(), Some("t1"));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let parsed = serde_json::from_value::<ChangeEvent>(json!({
            "table": "tasks",
            "eventType": "TRUNCATE",
            "new": null,
            "old": null
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn decode_requires_row_and_id() {
        let event = ChangeEvent {
            table: Table::Tasks,
            kind: ChangeKind::Delete,
            new: None,
            old: None,
        };
        assert_eq!(
            event.decode::<Task>(),
            Err(MergeError::MissingRow {
                table: Table::Tasks,
                kind: ChangeKind::Delete,
                side: "old",
            })
        );

        let event = ChangeEvent::update(Table::Tasks, row(json!({"title": "x"})), None);
        assert_eq!(
            event.decode::<Task>(),
            Err(MergeError::MissingId {
                table: Table::Tasks,
                kind: ChangeKind::Update,
            })
        );
    }

    #[test]
    fn insert_decode_validates_shape() {
        let event = ChangeEvent::insert(Table::Tasks, row(json!({"id": "t1", "title": 4})));
        assert!(matches!(
            event.decode::<Task>(),
            Err(MergeError::Decode { table: Table::Tasks, .. })
        ));
    }

    #[test]
    fn decode_rejects_other_tables() {
        let event = ChangeEvent::delete(Table::Columns, row(json!({"id": "c1"})));
        assert_eq!(
            event.decode::<Task>(),
            Err(MergeError::WrongTable {
                expected: Table::Tasks,
                got: Table::Columns,
            })
        );
    }
}
