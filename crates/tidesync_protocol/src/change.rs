//! Change records stored in the log.

use crate::messages::ChangeResponse;
use crate::path::RecordPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position of a change within its partition.
///
/// Tidemarks are assigned by the change log in arrival order, start at 1 and
/// are strictly increasing within one [`PartitionKey`]. Values taken from
/// different partitions are not comparable.
pub type Tidemark = i64;

/// The partition a change belongs to: one application, one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Owning application.
    pub app_id: Uuid,
    /// Caller-chosen group name.
    pub group: String,
}

impl PartitionKey {
    /// Creates a partition key.
    pub fn new(app_id: Uuid, group: impl Into<String>) -> Self {
        Self {
            app_id,
            group: group.into(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.app_id, self.group)
    }
}

/// A validated edit waiting to be sequenced by the change log.
///
/// The application is supplied separately at append time; the group selects
/// the partition within that application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChange {
    /// Server-generated change identifier.
    pub id: Uuid,
    /// Group (partition within the application).
    pub group: String,
    /// Edited record.
    pub record_id: Uuid,
    /// Optional type tag of the record, passed through untouched.
    pub entity: Option<String>,
    /// Edited property.
    pub property: String,
    /// New value. `None` clears the field.
    pub value: Option<String>,
    /// When the client made the edit, in server time.
    pub client_modified: DateTime<Utc>,
    /// Device that reported the edit, if known.
    pub device_id: Option<Uuid>,
}

impl NewChange {
    /// Creates a change for `path` in `group`.
    pub fn new(
        group: impl Into<String>,
        path: RecordPath,
        value: Option<String>,
        client_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            group: group.into(),
            record_id: path.record_id,
            entity: None,
            property: path.property,
            value,
            client_modified,
            device_id: None,
        }
    }

    /// Sets the entity tag.
    pub fn with_entity(mut self, entity: Option<String>) -> Self {
        self.entity = entity;
        self
    }

    /// Sets the reporting device.
    pub fn with_device(mut self, device_id: Option<Uuid>) -> Self {
        self.device_id = device_id;
        self
    }

    /// Returns the partition this change goes to under `app_id`.
    pub fn partition_key(&self, app_id: Uuid) -> PartitionKey {
        PartitionKey::new(app_id, self.group.clone())
    }

    /// Stamps the change with its partition position.
    pub fn sequence(self, app_id: Uuid, tidemark: Tidemark) -> Change {
        Change {
            id: self.id,
            app_id,
            group: self.group,
            record_id: self.record_id,
            entity: self.entity,
            property: self.property,
            value: self.value,
            client_modified: self.client_modified,
            device_id: self.device_id,
            tidemark,
        }
    }
}

/// An appended, immutable change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Server-generated change identifier.
    pub id: Uuid,
    /// Owning application.
    pub app_id: Uuid,
    /// Group (partition within the application).
    pub group: String,
    /// Edited record.
    pub record_id: Uuid,
    /// Optional type tag of the record.
    pub entity: Option<String>,
    /// Edited property.
    pub property: String,
    /// New value. `None` clears the field.
    pub value: Option<String>,
    /// When the client made the edit, in server time.
    pub client_modified: DateTime<Utc>,
    /// Device that reported the edit, if known.
    pub device_id: Option<Uuid>,
    /// Position within the partition.
    pub tidemark: Tidemark,
}

impl Change {
    /// Returns the partition key of this change.
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.app_id, self.group.clone())
    }

    /// Returns the record path of this change.
    pub fn path(&self) -> RecordPath {
        RecordPath::new(self.record_id, self.property.clone())
    }

    /// Reduces the change to the shape returned by pulls.
    pub fn to_response(&self) -> ChangeResponse {
        ChangeResponse {
            path: self.property.clone(),
            value: self.value.clone(),
            modified: self.client_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> NewChange {
        let modified = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        NewChange::new(
            "people",
            RecordPath::new(Uuid::new_v4(), "name"),
            Some("Neil".into()),
            modified,
        )
    }

    #[test]
    fn sequence_keeps_fields() {
        let app_id = Uuid::new_v4();
        let device = Uuid::new_v4();
        let new = sample()
            .with_entity(Some("Person".into()))
            .with_device(Some(device));
        let record_id = new.record_id;

        let change = new.sequence(app_id, 7);
        assert_eq!(change.tidemark, 7);
        assert_eq!(change.app_id, app_id);
        assert_eq!(change.record_id, record_id);
        assert_eq!(change.entity.as_deref(), Some("Person"));
        assert_eq!(change.device_id, Some(device));
        assert_eq!(change.partition_key(), PartitionKey::new(app_id, "people"));
    }

    #[test]
    fn response_shape_uses_property_as_path() {
        let change = sample().sequence(Uuid::new_v4(), 1);
        let response = change.to_response();
        assert_eq!(response.path, "name");
        assert_eq!(response.value.as_deref(), Some("Neil"));
        assert_eq!(response.modified, change.client_modified);
    }

    #[test]
    fn partition_key_display() {
        let app_id = Uuid::nil();
        let key = PartitionKey::new(app_id, "g");
        assert_eq!(key.to_string(), format!("{app_id}-g"));
    }
}
