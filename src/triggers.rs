//! Trigger catalog.
//!
//! Enumerates the trigger identifiers a host application can emit so that
//! registration front-ends can offer them. Dispatch never consults it: a
//! notification for an unlisted trigger is still matched and delivered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::notification::MAX_TRIGGER_ID_LEN;

/// A trigger a host can emit.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TriggerDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Source of known triggers.
pub trait TriggerCatalog: Send + Sync {
    /// All known triggers, ordered by id.
    fn available_triggers(&self) -> Vec<TriggerDescriptor>;

    /// True if `trigger_id` is a known trigger.
    fn contains(&self, trigger_id: &str) -> bool {
        self.available_triggers().iter().any(|t| t.id == trigger_id)
    }
}

/// Fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticTriggerCatalog {
    triggers: BTreeMap<String, TriggerDescriptor>,
}

impl StaticTriggerCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trigger, replacing any previous descriptor with the same id.
    pub fn register(&mut self, descriptor: TriggerDescriptor) -> Result<(), ValidationError> {
        let id = descriptor.id.trim();
        if id.is_empty() {
            return Err(ValidationError::EmptyTriggerId);
        }
        if id.len() > MAX_TRIGGER_ID_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "trigger_id".to_string(),
                max_length: MAX_TRIGGER_ID_LEN,
            });
        }
        self.triggers.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    /// Builder form of `register`.
    pub fn with(mut self, descriptor: TriggerDescriptor) -> Result<Self, ValidationError> {
        self.register(descriptor)?;
        Ok(self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl TriggerCatalog for StaticTriggerCatalog {
    fn available_triggers(&self) -> Vec<TriggerDescriptor> {
        self.triggers.values().cloned().collect()
    }

    fn contains(&self, trigger_id: &str) -> bool {
        self.triggers.contains_key(trigger_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_triggers_in_id_order() {
        let catalog = StaticTriggerCatalog::new()
            .with(TriggerDescriptor::new("user.created").with_description("A user signed up"))
            .unwrap()
            .with(TriggerDescriptor::new("order.paid"))
            .unwrap();

        let ids: Vec<_> = catalog.available_triggers().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["order.paid", "user.created"]);
        assert!(catalog.contains("order.paid"));
        assert!(!catalog.contains("order.refunded"));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn register_replaces_and_validates() {
        let mut catalog = StaticTriggerCatalog::new();
        catalog.register(TriggerDescriptor::new("a")).unwrap();
        catalog
            .register(TriggerDescriptor::new("a").with_description("second"))
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.available_triggers()[0].description.as_deref(),
            Some("second")
        );

        assert_eq!(
            catalog.register(TriggerDescriptor::new("  ")),
            Err(ValidationError::EmptyTriggerId)
        );
        assert!(catalog
            .register(TriggerDescriptor::new("x".repeat(MAX_TRIGGER_ID_LEN + 1)))
            .is_err());
    }

    #[test]
    fn default_contains_uses_listing() {
        struct Fixed;
        impl TriggerCatalog for Fixed {
            fn available_triggers(&self) -> Vec<TriggerDescriptor> {
                vec![TriggerDescriptor::new("ping")]
            }
        }
        assert!(Fixed.contains("ping"));
        assert!(!Fixed.contains("pong"));
    }
}
