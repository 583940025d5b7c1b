//! Webhook subscription records.
//!
//! A `Webhook` is read-only from the core's point of view. Its credentials
//! live in `protected_secret`/`protected_callback`; the plaintext `secret`
//! and `callback` fields are filled in by the registry only after a match
//! and are never serialized.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protect::{ProtectError, SecretProtector};
use crate::value::{Payload, Value};

/// Unique identifier for a webhook subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookId(Uuid);

impl WebhookId {
    /// Create a new random webhook id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Raw bytes, used for stable lane sharding.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WebhookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-webhook rule: a trigger identifier plus optional payload constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub trigger_id: String,
    /// `None` or empty means the trigger match alone is sufficient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Payload>,
}

impl Filter {
    /// Filter on a trigger only.
    #[must_use]
    pub fn trigger(trigger_id: impl Into<String>) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            parameters: None,
        }
    }

    /// Add a payload constraint.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters
            .get_or_insert_with(Payload::new)
            .insert(key.into(), value.into());
        self
    }

    /// True when the filter places no constraint on the payload.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.parameters.as_ref().map_or(true, Payload::is_empty)
    }
}

/// A persisted subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    #[serde(default)]
    pub is_paused: bool,
    /// Empty means the webhook receives every notification.
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub protected_secret: String,
    pub protected_callback: String,
    #[serde(skip)]
    pub secret: Option<String>,
    #[serde(skip)]
    pub callback: Option<String>,
}

impl Webhook {
    /// Build a record from plaintext credentials, protecting them the way the
    /// registration side does before persisting.
    ///
    /// The returned record carries only the protected forms.
    pub fn protected(
        secret: &str,
        callback: &str,
        filters: Vec<Filter>,
        protector: &dyn SecretProtector,
    ) -> Result<Self, ProtectError> {
        Ok(Self {
            id: WebhookId::new(),
            is_paused: false,
            filters,
            protected_secret: protector.protect(secret)?,
            protected_callback: protector.protect(callback)?,
            secret: None,
            callback: None,
        })
    }

    /// Builder-style pause flag.
    #[must_use]
    pub fn paused(mut self, is_paused: bool) -> Self {
        self.is_paused = is_paused;
        self
    }

    /// True once the registry has unprotected the credentials.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.secret.is_some() && self.callback.is_some()
    }

    /// Drop the plaintext credentials.
    pub fn clear_credentials(&mut self) {
        self.secret = None;
        self.callback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protect::AesGcmProtector;

    #[test]
    fn filter_without_parameters_is_unconstrained() {
        assert!(Filter::trigger("a").is_unconstrained());

        let mut empty = Filter::trigger("a");
        empty.parameters = Some(Payload::new());
        assert!(empty.is_unconstrained());

        assert!(!Filter::trigger("a").with_param("k", 1).is_unconstrained());
    }

    #[test]
    fn protected_webhook_carries_no_plaintext() {
        let protector = AesGcmProtector::new([7u8; 32]);
        let hook = Webhook::protected("s3cret", "https://example.com/hook", Vec::new(), &protector)
            .unwrap();

        assert!(!hook.has_credentials());
        assert_ne!(hook.protected_secret, "s3cret");
        assert_ne!(hook.protected_callback, "https://example.com/hook");
        assert_eq!(protector.unprotect(&hook.protected_secret).unwrap(), "s3cret");
    }

    #[test]
    fn transient_credentials_are_not_serialized() {
        let mut hook = Webhook {
            id: WebhookId::new(),
            is_paused: false,
            filters: vec![Filter::trigger("order.created")],
            protected_secret: "ps".to_string(),
            protected_callback: "pc".to_string(),
            secret: Some("plain".to_string()),
            callback: Some("https://example.com".to_string()),
        };

        let json = serde_json::to_string(&hook).unwrap();
        assert!(!json.contains("plain"));
        assert!(!json.contains("https://example.com"));

        let back: Webhook = serde_json::from_str(&json).unwrap();
        assert!(back.secret.is_none());
        assert!(back.callback.is_none());

        hook.clear_credentials();
        assert!(!hook.has_credentials());
    }
}
