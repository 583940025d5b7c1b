//! Notifications emitted by producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::value::{Payload, Value};

/// Maximum accepted trigger identifier length.
pub const MAX_TRIGGER_ID_LEN: usize = 256;

/// Unique identifier for a notification.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Create a new random notification id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An emitted event instance: a trigger identifier plus payload.
///
/// Notifications are immutable once built; the builder methods consume
/// `self`.
///
/// ```
/// use kyrohook::Notification;
///
/// let n = Notification::new("order.created")
///     .with_param("status", "paid")
///     .with_param("amount", 10);
///
/// assert_eq!(n.trigger_id(), "order.created");
/// assert_eq!(n.payload().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    id: NotificationId,
    trigger_id: String,
    #[serde(default)]
    payload: Payload,
    timestamp: DateTime<Utc>,
}

impl Notification {
    /// Create a notification with an empty payload.
    #[must_use]
    pub fn new(trigger_id: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(),
            trigger_id: trigger_id.into(),
            payload: Payload::new(),
            timestamp: Utc::now(),
        }
    }

    /// Replace the whole payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set one payload entry.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn id(&self) -> NotificationId {
        self.id
    }

    #[must_use]
    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Reject notifications that cannot be matched.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let trigger = self.trigger_id.trim();
        if trigger.is_empty() {
            return Err(ValidationError::EmptyTriggerId);
        }
        if trigger.len() > MAX_TRIGGER_ID_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "trigger_id".to_string(),
                max_length: MAX_TRIGGER_ID_LEN,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_rejects_blank_trigger() {
        assert_eq!(
            Notification::new("  ").validate(),
            Err(ValidationError::EmptyTriggerId)
        );
    }

    #[test]
    fn notification_rejects_oversized_trigger() {
        let n = Notification::new("x".repeat(MAX_TRIGGER_ID_LEN + 1));
        assert!(matches!(
            n.validate(),
            Err(ValidationError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn notification_ids_are_unique() {
        let a = Notification::new("t");
        let b = Notification::new("t");
        assert_ne!(a.id(), b.id());
        assert!(a.validate().is_ok());
    }
}
