use crate::backend::{DocumentStore, FieldFilter, Snapshot, Subscription};
use crate::error::BackendResult;
use crate::model::{Item, UserId};

use super::view::total_quantity;

/// Field holding an item's owner in stored documents.
pub const OWNER_FIELD: &str = "userId";

/// Live projection of the current user's items. Each snapshot from the
/// store replaces the whole list.
#[derive(Debug)]
pub struct ItemFeed {
    collection: String,
    owner: Option<UserId>,
    subscription: Option<Subscription<Snapshot>>,
    items: Vec<Item>,
    total: f64,
}

impl ItemFeed {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            owner: None,
            subscription: None,
            items: Vec::new(),
            total: 0.0,
        }
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn ids(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| item.id.as_str().to_string())
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id.as_str() == id)
    }

    /// Points the feed at `owner`. An absent or empty owner tears the
    /// subscription down; the same owner keeps the existing one.
    pub fn follow(&mut self, store: &dyn DocumentStore, owner: Option<&UserId>) -> BackendResult<()> {
        match owner.filter(|owner| !owner.is_empty()) {
            None => {
                self.unsubscribe();
                Ok(())
            }
            Some(owner) if self.is_active() && self.owner.as_ref() == Some(owner) => Ok(()),
            Some(owner) => self.subscribe(store, owner),
        }
    }

    pub fn subscribe(&mut self, store: &dyn DocumentStore, owner: &UserId) -> BackendResult<()> {
        self.unsubscribe();
        if owner.is_empty() {
            return Ok(());
        }
        let filter = FieldFilter::field_equals(OWNER_FIELD, owner.as_str());
        let subscription = store.live_query(&self.collection, filter).map_err(|err| {
            tracing::error!(?err, owner = %owner, "subscribing to items failed");
            err
        })?;
        tracing::debug!(owner = %owner, collection = %self.collection, "item feed subscribed");
        self.owner = Some(owner.clone());
        self.subscription = Some(subscription);
        self.poll();
        Ok(())
    }

    pub fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            drop(subscription);
            tracing::debug!(owner = ?self.owner, "item feed torn down");
        }
        self.owner = None;
        self.items.clear();
        self.total = 0.0;
    }

    /// Applies the newest queued snapshot, if any. Returns whether the list
    /// was replaced.
    pub fn poll(&mut self) -> bool {
        let latest = match &self.subscription {
            Some(subscription) => subscription.drain_latest(),
            None => None,
        };
        match latest {
            Some(snapshot) => {
                self.apply_snapshot(&snapshot);
                true
            }
            None => false,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let mut items = Vec::with_capacity(snapshot.len());
        for document in &snapshot.documents {
            let item = match Item::from_document(document) {
                Ok(item) => item,
                Err(err) => {
                    tracing::warn!(?err, id = %document.id, "skipping undecodable item");
                    continue;
                }
            };
            if self.owner.as_ref() != Some(&item.owner_id) {
                tracing::warn!(id = %document.id, owner = %item.owner_id, "dropping item owned by another user");
                continue;
            }
            items.push(item);
        }
        self.total = total_quantity(&items);
        self.items = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Document, Fields, MemoryDocumentStore};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn snapshot_replaces_list_and_total() -> anyhow::Result<()> {
        let store = MemoryDocumentStore::new();
        store.seed("items", fields(json!({"name": "milk", "quantity": 2, "userId": "u1"})));
        store.seed("items", fields(json!({"name": "tea", "quantity": 9, "userId": "u2"})));

        let mut feed = ItemFeed::new("items");
        feed.subscribe(&store, &UserId::new("u1"))?;
        assert_eq!(feed.items().len(), 1);
        assert_eq!(feed.total(), 2.0);

        store.create("items", fields(json!({"name": "bread", "quantity": "3", "userId": "u1"})))?;
        assert!(feed.poll());
        assert_eq!(feed.items().len(), 2);
        assert_eq!(feed.total(), 5.0);
        assert!(!feed.poll());
        Ok(())
    }

    #[test]
    fn empty_owner_tears_down_subscription() -> anyhow::Result<()> {
        let store = MemoryDocumentStore::new();
        store.seed("items", fields(json!({"name": "milk", "quantity": 2, "userId": "u1"})));
        let mut feed = ItemFeed::new("items");
        feed.follow(&store, Some(&UserId::new("u1")))?;
        assert_eq!(store.observer_count(), 1);

        feed.follow(&store, Some(&UserId::new("")))?;
        assert!(!feed.is_active());
        assert!(feed.items().is_empty());
        assert_eq!(store.observer_count(), 0);

        store.create("items", fields(json!({"name": "jam", "quantity": 1, "userId": "u1"})))?;
        assert!(!feed.poll());
        assert!(feed.items().is_empty());
        Ok(())
    }

    #[test]
    fn following_same_owner_keeps_subscription() -> anyhow::Result<()> {
        let store = MemoryDocumentStore::new();
        let mut feed = ItemFeed::new("items");
        let owner = UserId::new("u1");
        feed.follow(&store, Some(&owner))?;
        feed.follow(&store, Some(&owner))?;
        assert_eq!(store.observer_count(), 1);

        feed.follow(&store, Some(&UserId::new("u2")))?;
        assert_eq!(feed.owner(), Some(&UserId::new("u2")));
        assert_eq!(store.observer_count(), 1);
        Ok(())
    }

    #[test]
    fn undecodable_and_foreign_documents_are_skipped() {
        let mut feed = ItemFeed::new("items");
        feed.owner = Some(UserId::new("u1"));
        feed.apply_snapshot(&Snapshot {
            documents: vec![
                Document {
                    id: "a".into(),
                    fields: fields(json!({"quantity": 1, "userId": "u1"})),
                },
                Document {
                    id: "b".into(),
                    fields: fields(json!({"name": "tea", "quantity": 1, "userId": "u9"})),
                },
                Document {
                    id: "c".into(),
                    fields: fields(json!({"name": "oats", "quantity": "4", "userId": "u1"})),
                },
            ],
        });
        assert_eq!(feed.ids(), vec!["c".to_string()]);
        assert_eq!(feed.total(), 4.0);
    }
}
