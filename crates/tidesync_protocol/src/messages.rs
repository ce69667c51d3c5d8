//! Wire messages for the sync endpoint.
//!
//! A single request can push changes, pull groups, or both. Every slot except
//! the application credentials is optional. Missing credentials deserialize to
//! the nil UUID so the engine, not the decoder, decides which error to report.

use crate::change::Tidemark;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest client-reported age honoured, in milliseconds (about 1000 years).
const MAX_AGE_MILLIS: f64 = 1000.0 * 365.25 * 24.0 * 60.0 * 60.0 * 1000.0;

/// A sync request from a client device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Application the request is for.
    #[serde(default)]
    pub app_id: Uuid,
    /// Access key issued to the application.
    #[serde(default)]
    pub app_api_access_key: Uuid,
    /// Reporting device, if the client identifies itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Uuid>,
    /// Edits to append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<ChangeRequest>>,
    /// Groups to pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupRequest>>,
}

impl SyncRequest {
    /// Creates a request carrying only credentials.
    pub fn new(app_id: Uuid, app_api_access_key: Uuid) -> Self {
        Self {
            app_id,
            app_api_access_key,
            ..Self::default()
        }
    }

    /// Sets the reporting device.
    pub fn with_device(mut self, device_id: Uuid) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Adds an edit to push.
    pub fn with_change(mut self, change: ChangeRequest) -> Self {
        self.changes.get_or_insert_with(Vec::new).push(change);
        self
    }

    /// Adds a group to pull.
    pub fn with_group(mut self, group: impl Into<String>, tidemark: Option<Tidemark>) -> Self {
        self.groups.get_or_insert_with(Vec::new).push(GroupRequest {
            group: group.into(),
            tidemark,
        });
        self
    }

    /// Returns the device id, treating the nil UUID as absent.
    pub fn device(&self) -> Option<Uuid> {
        self.device_id.filter(|id| !id.is_nil())
    }
}

/// One edit reported by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Group the edit belongs to.
    #[serde(default)]
    pub group: String,
    /// `<record-id>/<property>` path.
    #[serde(default)]
    pub path: String,
    /// New value; `null` clears the field.
    #[serde(default)]
    pub value: Option<String>,
    /// Seconds elapsed on the client since the edit.
    #[serde(default, rename = "secondsAgo", skip_serializing_if = "Option::is_none")]
    pub seconds_ago: Option<f64>,
    /// Milliseconds elapsed on the client since the edit. Wins over `secondsAgo`.
    #[serde(default, rename = "millisecondsAgo", skip_serializing_if = "Option::is_none")]
    pub milliseconds_ago: Option<f64>,
    /// Optional type tag of the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl ChangeRequest {
    /// Creates an edit of `path` in `group`.
    pub fn new(group: impl Into<String>, path: impl Into<String>, value: Option<String>) -> Self {
        Self {
            group: group.into(),
            path: path.into(),
            value,
            ..Self::default()
        }
    }

    /// Sets the age in seconds.
    pub fn seconds_ago(mut self, seconds: f64) -> Self {
        self.seconds_ago = Some(seconds);
        self
    }

    /// Sets the age in milliseconds.
    pub fn milliseconds_ago(mut self, millis: f64) -> Self {
        self.milliseconds_ago = Some(millis);
        self
    }

    /// Sets the entity tag.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Returns how long ago the edit happened, according to the client.
    pub fn age(&self) -> TimeDelta {
        let millis = match (self.milliseconds_ago, self.seconds_ago) {
            (Some(ms), _) => ms,
            (None, Some(secs)) => secs * 1000.0,
            (None, None) => 0.0,
        };
        let millis = if millis.is_finite() {
            millis.clamp(-MAX_AGE_MILLIS, MAX_AGE_MILLIS)
        } else {
            0.0
        };
        TimeDelta::try_milliseconds(millis.round() as i64).unwrap_or(TimeDelta::zero())
    }

    /// Converts the client-relative age into an absolute timestamp.
    pub fn modified_at(&self, received: DateTime<Utc>) -> DateTime<Utc> {
        received.checked_sub_signed(self.age()).unwrap_or(received)
    }
}

/// A group to pull, with the last tidemark the client has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRequest {
    /// Group name.
    #[serde(default)]
    pub group: String,
    /// Last tidemark seen; `null` pulls from the beginning.
    #[serde(default)]
    pub tidemark: Option<Tidemark>,
}

/// Response to a sync request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Whether the request was processed.
    pub success: bool,
    /// Exactly one message on failure, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// Pulled groups, present only when groups were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupResponse>>,
}

impl SyncResponse {
    /// Creates a successful response.
    pub fn success(groups: Option<Vec<GroupResponse>>) -> Self {
        Self {
            success: true,
            errors: None,
            groups,
        }
    }

    /// Creates a failed response with a single error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: Some(vec![message.into()]),
            groups: None,
        }
    }

    /// Returns the first error message, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map(String::as_str)
    }
}

/// Changes pulled for one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupResponse {
    /// Echoed group name.
    pub group: String,
    /// Tidemark of the last change returned, or the requested tidemark when
    /// nothing new was found.
    pub tidemark: Option<Tidemark>,
    /// Changes in ascending tidemark order, not collapsed per path.
    pub changes: Vec<ChangeResponse>,
}

/// Public shape of a pulled change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResponse {
    /// Property that was edited.
    pub path: String,
    /// Value written.
    pub value: Option<String>,
    /// When the client made the edit.
    pub modified: DateTime<Utc>,
}
