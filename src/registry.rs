//! Webhook registry: the read-only query surface used at dispatch time.
//!
//! The registry narrows the store's coarse candidate set with the full
//! two-tier matcher and only then unprotects credentials. Records rejected
//! by either tier are never decrypted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{HookError, HookResult};
use crate::matcher;
use crate::notification::Notification;
use crate::protect::SecretProtector;
use crate::storage::WebhookStore;
use crate::webhook::Webhook;

/// Query surface over persisted webhook subscriptions.
pub struct WebhookRegistry {
    store: Arc<dyn WebhookStore>,
    protector: Arc<dyn SecretProtector>,
    corrupted_records: AtomicU64,
}

impl WebhookRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>, protector: Arc<dyn SecretProtector>) -> Self {
        Self {
            store,
            protector,
            corrupted_records: AtomicU64::new(0),
        }
    }

    /// Webhooks that should receive `notification`, with credentials
    /// unprotected.
    ///
    /// # Errors
    /// - `HookError::Validation` if the notification is malformed.
    /// - `HookError::Storage` if the candidate query fails.
    ///
    /// A webhook whose credentials cannot be unprotected is skipped and
    /// reported; it does not fail the call.
    pub async fn get_applicable_webhooks(
        &self,
        notification: &Notification,
    ) -> HookResult<Vec<Webhook>> {
        notification.validate()?;

        let candidates = self.store.find_candidates(notification.trigger_id()).await?;

        let mut out = Vec::new();
        for mut webhook in candidates {
            // Backends may over-select; re-check both invariants here.
            if webhook.is_paused || !matcher::matches(&webhook, notification) {
                continue;
            }

            match self.unprotect(&mut webhook) {
                Ok(()) => out.push(webhook),
                Err(err) => {
                    self.corrupted_records.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        target: "kyrohook::registry",
                        webhook_id = %webhook.id,
                        notification_id = %notification.id(),
                        trigger_id = notification.trigger_id(),
                        error = %err,
                        "Skipping webhook with undecryptable credentials"
                    );
                }
            }
        }

        tracing::debug!(
            target: "kyrohook::registry",
            notification_id = %notification.id(),
            trigger_id = notification.trigger_id(),
            matched = out.len(),
            "Resolved applicable webhooks"
        );

        Ok(out)
    }

    /// Number of matched webhooks dropped because their credentials could not
    /// be unprotected.
    #[must_use]
    pub fn corrupted_records(&self) -> u64 {
        self.corrupted_records.load(Ordering::Relaxed)
    }

    fn unprotect(&self, webhook: &mut Webhook) -> HookResult<()> {
        let corrupt = |field: &str, reason: String| HookError::DataCorruption {
            webhook_id: webhook.id,
            reason: format!("{field}: {reason}"),
        };

        let secret = self
            .protector
            .unprotect(&webhook.protected_secret)
            .map_err(|e| corrupt("secret", e.to_string()))?;
        let callback = self
            .protector
            .unprotect(&webhook.protected_callback)
            .map_err(|e| corrupt("callback", e.to_string()))?;

        webhook.secret = Some(secret);
        webhook.callback = Some(callback);
        Ok(())
    }
}

impl std::fmt::Debug for WebhookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRegistry")
            .field("corrupted_records", &self.corrupted_records())
            .finish_non_exhaustive()
    }
}
