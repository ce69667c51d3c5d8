//! Path codec for `<record-id>/<property>` change paths.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Separator between the record id and the property name.
pub const PATH_SEPARATOR: char = '/';

/// A parsed change path: the record being edited and the field within it.
///
/// The wire form is `"<record-id>/<property>"` with exactly one separator.
/// The record id must parse as a UUID and the property must be a non-blank
/// token.
///
/// # Example
///
/// ```
/// use tidesync_protocol::RecordPath;
///
/// let path = RecordPath::parse("0b6a5cfa-3a41-4f9d-9f1c-5d1f7e1c2a10/name").unwrap();
/// assert_eq!(path.property, "name");
/// assert!(RecordPath::parse("bad format").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPath {
    /// Identifier of the edited record.
    pub record_id: Uuid,
    /// Field path within the record (may itself contain dots).
    pub property: String,
}

impl RecordPath {
    /// Creates a path from its parts.
    pub fn new(record_id: Uuid, property: impl Into<String>) -> Self {
        Self {
            record_id,
            property: property.into(),
        }
    }

    /// Parses the wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPath`] if the input has no separator,
    /// more than one separator, an id that is not a UUID, or a blank property.
    pub fn parse(path: &str) -> ProtocolResult<Self> {
        let (id, property) = path
            .split_once(PATH_SEPARATOR)
            .ok_or_else(|| ProtocolError::malformed_path(path))?;

        if id.is_empty() || property.trim().is_empty() || property.contains(PATH_SEPARATOR) {
            return Err(ProtocolError::malformed_path(path));
        }

        let record_id = Uuid::parse_str(id).map_err(|_| ProtocolError::malformed_path(path))?;

        Ok(Self::new(record_id, property))
    }
}

impl FromStr for RecordPath {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.record_id, PATH_SEPARATOR, self.property)
    }
}
