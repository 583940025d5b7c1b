//! In-memory storage backend.
//!
//! Thread-safe reference implementation of `WebhookStore`, intended for
//! embedded usage and tests. Webhooks are kept ordered by id so candidate
//! queries are deterministic, and a trigger index stands in for the database
//! index a persistent backend would use for the trigger tier.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::storage::traits::{StorageError, WebhookStore};
use crate::webhook::{Webhook, WebhookId};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct WebhookState {
    by_id: BTreeMap<WebhookId, Webhook>,
    by_trigger: HashMap<String, BTreeSet<WebhookId>>,
    // Webhooks with no filters receive every notification.
    wildcard: BTreeSet<WebhookId>,
}

impl WebhookState {
    fn add_index(&mut self, webhook: &Webhook) {
        if webhook.filters.is_empty() {
            self.wildcard.insert(webhook.id);
            return;
        }
        for filter in &webhook.filters {
            self.by_trigger
                .entry(filter.trigger_id.clone())
                .or_default()
                .insert(webhook.id);
        }
    }

    fn remove_index(&mut self, webhook: &Webhook) {
        self.wildcard.remove(&webhook.id);
        for filter in &webhook.filters {
            if let Some(set) = self.by_trigger.get_mut(&filter.trigger_id) {
                set.remove(&webhook.id);
                if set.is_empty() {
                    self.by_trigger.remove(&filter.trigger_id);
                }
            }
        }
    }
}

/// Thread-safe in-memory webhook store.
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    state: RwLock<WebhookState>,
}

impl InMemoryWebhookStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new webhook. Plaintext credentials are stripped before storing.
    pub fn insert(&self, mut webhook: Webhook) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("webhook.insert"))?;
        if state.by_id.contains_key(&webhook.id) {
            return Err(StorageError::DuplicateKey(webhook.id.to_string()));
        }

        webhook.clear_credentials();
        state.add_index(&webhook);
        state.by_id.insert(webhook.id, webhook);
        Ok(())
    }

    /// Get a webhook by id, as persisted.
    pub fn get(&self, id: WebhookId) -> Result<Option<Webhook>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("webhook.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    /// Replace an existing webhook, re-indexing its filters.
    pub fn update(&self, mut webhook: Webhook) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("webhook.update"))?;
        let prev = state
            .by_id
            .get(&webhook.id)
            .cloned()
            .ok_or(StorageError::WebhookNotFound(webhook.id))?;

        webhook.clear_credentials();
        state.remove_index(&prev);
        state.add_index(&webhook);
        state.by_id.insert(webhook.id, webhook);
        Ok(())
    }

    /// Pause or resume a webhook.
    pub fn set_paused(&self, id: WebhookId, is_paused: bool) -> Result<(), StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("webhook.set_paused"))?;
        let hook = state
            .by_id
            .get_mut(&id)
            .ok_or(StorageError::WebhookNotFound(id))?;
        hook.is_paused = is_paused;
        Ok(())
    }

    /// Delete a webhook.
    pub fn remove(&self, id: WebhookId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("webhook.remove"))?;
        let prev = state
            .by_id
            .remove(&id)
            .ok_or(StorageError::WebhookNotFound(id))?;
        state.remove_index(&prev);
        Ok(())
    }

    /// Number of stored webhooks, paused included.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("webhook.len"))?;
        Ok(state.by_id.len())
    }

    /// True when no webhooks are stored.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn find_candidates(&self, trigger_id: &str) -> Result<Vec<Webhook>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("webhook.find_candidates"))?;

        let mut ids: BTreeSet<WebhookId> = state.wildcard.clone();
        if let Some(set) = state.by_trigger.get(trigger_id) {
            ids.extend(set.iter().copied());
        }

        Ok(ids
            .into_iter()
            .filter_map(|id| state.by_id.get(&id))
            .filter(|w| !w.is_paused)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::Filter;

    fn hook(filters: Vec<Filter>) -> Webhook {
        Webhook {
            id: WebhookId::new(),
            is_paused: false,
            filters,
            protected_secret: "ps".to_string(),
            protected_callback: "pc".to_string(),
            secret: None,
            callback: None,
        }
    }

    #[tokio::test]
    async fn candidates_use_trigger_index_and_wildcards() {
        let store = InMemoryWebhookStore::new();
        let wildcard = hook(Vec::new());
        let created = hook(vec![Filter::trigger("order.created").with_param("status", "paid")]);
        let deleted = hook(vec![Filter::trigger("order.deleted")]);

        store.insert(wildcard.clone()).unwrap();
        store.insert(created.clone()).unwrap();
        store.insert(deleted.clone()).unwrap();

        let found: BTreeSet<_> = store
            .find_candidates("order.created")
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert!(found.contains(&wildcard.id));
        assert!(found.contains(&created.id));
        assert!(!found.contains(&deleted.id));

        let unknown = store.find_candidates("user.created").await.unwrap();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].id, wildcard.id);
    }

    #[tokio::test]
    async fn paused_webhooks_are_not_candidates() {
        let store = InMemoryWebhookStore::new();
        let w = hook(Vec::new());
        store.insert(w.clone()).unwrap();
        store.set_paused(w.id, true).unwrap();
        assert!(store.find_candidates("t").await.unwrap().is_empty());

        store.set_paused(w.id, false).unwrap();
        assert_eq!(store.find_candidates("t").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_and_remove_reindex() {
        let store = InMemoryWebhookStore::new();
        let mut w = hook(vec![Filter::trigger("a")]);
        store.insert(w.clone()).unwrap();
        assert!(matches!(store.insert(w.clone()), Err(StorageError::DuplicateKey(_))));

        w.filters = vec![Filter::trigger("b")];
        store.update(w.clone()).unwrap();
        assert!(store.find_candidates("a").await.unwrap().is_empty());
        assert_eq!(store.find_candidates("b").await.unwrap().len(), 1);

        store.remove(w.id).unwrap();
        assert!(store.find_candidates("b").await.unwrap().is_empty());
        assert!(store.is_empty().unwrap());
        assert!(matches!(store.remove(w.id), Err(StorageError::WebhookNotFound(_))));
    }

    #[tokio::test]
    async fn candidate_order_is_stable() {
        let store = InMemoryWebhookStore::new();
        for _ in 0..8 {
            store.insert(hook(vec![Filter::trigger("t")])).unwrap();
        }
        let a: Vec<_> = store.find_candidates("t").await.unwrap().into_iter().map(|w| w.id).collect();
        let b: Vec<_> = store.find_candidates("t").await.unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn insert_strips_plaintext_credentials() {
        let store = InMemoryWebhookStore::new();
        let mut w = hook(Vec::new());
        w.secret = Some("plain".to_string());
        w.callback = Some("https://example.com".to_string());
        store.insert(w.clone()).unwrap();
        let stored = store.get(w.id).unwrap().unwrap();
        assert!(!stored.has_credentials());
    }
}
