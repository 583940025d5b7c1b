//! # kyrohook - Webhook notifications for in-process event producers
//!
//! kyrohook lets an application emit named events and have them delivered,
//! asynchronously and signed, to every registered webhook whose filters
//! match.
//!
//! ## Core Concepts
//!
//! - **Notification**: a trigger id plus a key/value payload
//! - **Webhook**: a subscription with protected secret and callback, a paused
//!   flag, and filters
//! - **Filter**: a trigger id and optional parameter constraints, matched in
//!   two tiers (trigger, then parameters)
//! - **Registry**: resolves applicable webhooks and unprotects credentials
//!   only for matches
//! - **Dispatcher**: per-webhook FIFO lanes with retry and backoff
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kyrohook::{
//!     AesGcmProtector, DispatcherConfig, Filter, InMemoryWebhookStore, Notification,
//!     NotificationDispatcher, Webhook, WebhookRegistry,
//! };
//!
//! let protector = Arc::new(AesGcmProtector::from_base64_key(&key)?);
//! let store = Arc::new(InMemoryWebhookStore::new());
//! store.insert(Webhook::protected(
//!     "shared-secret",
//!     "https://example.com/hooks/orders",
//!     vec![Filter::trigger("order.created").with_param("status", "paid")],
//!     protector.as_ref(),
//! )?)?;
//!
//! let registry = Arc::new(WebhookRegistry::new(store, protector));
//! let dispatcher = NotificationDispatcher::new(DispatcherConfig::default(), registry)?;
//! dispatcher
//!     .dispatch(Notification::new("order.created").with_param("status", "paid"))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod notification;
pub mod value;
pub mod webhook;

// Matching, protection and lookup
pub mod matcher;
pub mod protect;
pub mod registry;
pub mod signature;
pub mod storage;
pub mod triggers;

// Delivery
pub mod dispatch;

pub use error::{DeliveryError, HookError, HookResult, ValidationError};
pub use notification::{Notification, NotificationId};
pub use value::{Payload, Value};
pub use webhook::{Filter, Webhook, WebhookId};

pub use protect::{AesGcmProtector, ProtectError, SecretProtector};
pub use registry::WebhookRegistry;
pub use signature::{compute_signature, verify_signature};
pub use storage::{InMemoryWebhookStore, StorageError, WebhookStore};
pub use triggers::{StaticTriggerCatalog, TriggerCatalog, TriggerDescriptor};

pub use dispatch::{
    DeliveryOutcome, DeliveryReport, DeliveryReports, DispatchStats, DispatchSummary,
    DispatcherConfig, HttpWebhookSender, NotificationDispatcher, RetryPolicy, SenderConfig,
    WebhookSender,
};
