//! Registration storage for kyrohook.
//!
//! The `WebhookStore` trait is the query seam consumed by the registry.
//! `InMemoryWebhookStore` is the embedded/reference backend.

mod memory;
mod traits;

pub use memory::InMemoryWebhookStore;
pub use traits::{StorageError, WebhookStore};
