//! Abstract storage traits for kyrohook.
//!
//! The core never writes registrations; it only needs a query that returns
//! the active webhooks that could match a trigger. Backends are free to
//! over-select, the registry re-applies the full match in memory.

use async_trait::async_trait;
use thiserror::Error;

use crate::webhook::{Webhook, WebhookId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Webhook not found.
    #[error("Webhook not found: {0}")]
    WebhookNotFound(WebhookId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Query capability over persisted webhook registrations.
///
/// # Contract
/// - Never return paused webhooks.
/// - Return every non-paused webhook whose filter list is empty or contains
///   a filter with exactly `trigger_id`. Extra rows are tolerated.
/// - Returned records carry protected credentials only.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Coarse candidate query for one trigger identifier.
    async fn find_candidates(&self, trigger_id: &str) -> Result<Vec<Webhook>, StorageError>;
}
