#![forbid(unsafe_code)]

//! Collaborator traits the mapper consumes but does not implement: schema
//! validation, index preparation and change notification.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DriverError, ValidationError};
use crate::model::Props;

/// Change notifications emitted by the mapper.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ModelEvent {
    /// A node was created. Args: the created node.
    Created,
    /// A node was updated. Args: the updated node.
    Updated,
    /// A node was removed. Args: the node id.
    Removed,
    /// A relationship was created. Args: the relationship.
    RelationshipCreated,
    /// A relationship was removed. Args: the relationship id.
    RelationshipRemoved,
}

impl ModelEvent {
    /// Stable event name.
    pub fn as_str(self) -> &'static str {
        match self {
            ModelEvent::Created => "created",
            ModelEvent::Updated => "updated",
            ModelEvent::Removed => "removed",
            ModelEvent::RelationshipCreated => "relationship_created",
            ModelEvent::RelationshipRemoved => "relationship_removed",
        }
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget receiver of change notifications.
pub trait EventSink: Send + Sync {
    /// Delivers `event` with its payload. Must not fail.
    fn notify(&self, event: ModelEvent, args: &[Value]);
}

/// Node schema the mapper delegates validation and index management to.
#[async_trait]
pub trait Schema: EventSink {
    /// Label given to every node created through this schema.
    fn label(&self) -> &str;

    /// Validates `data` and returns its sanitized form.
    async fn validate(&self, data: Props) -> Result<Props, ValidationError>;

    /// Whether index or constraint definitions still need to be applied.
    fn has_pending_indexes(&self) -> bool {
        false
    }

    /// Applies pending index and constraint definitions. Must be idempotent.
    async fn ensure_indexes(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
