use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use super::{validate_id, ChangeFeed, StoreError};
use crate::models::{ChangeEvent, OperationType, UpdateOutcome, WardrobeItem};
use crate::traits::RecordStore;

/// Process-local store, used by tests and for dry runs.
#[derive(Debug)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, WardrobeItem>>,
    feed: ChangeFeed,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MemoryStore {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            feed: ChangeFeed::new(feed_capacity),
        }
    }

    /// Seed items without emitting change events.
    pub async fn seed(&self, items: impl IntoIterator<Item = WardrobeItem>) {
        let mut map = self.items.write().await;
        for item in items {
            map.insert(item.id.clone(), item);
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<WardrobeItem>, StoreError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn upsert(&self, item: WardrobeItem) -> Result<OperationType, StoreError> {
        validate_id(&item.id)?;
        let op = {
            let mut map = self.items.write().await;
            match map.insert(item.id.clone(), item.clone()) {
                Some(_) => OperationType::Replace,
                None => OperationType::Insert,
            }
        };
        let event = match op {
            OperationType::Insert => ChangeEvent::insert(item),
            _ => ChangeEvent {
                operation_type: op,
                ..ChangeEvent::update(item)
            },
        };
        self.feed.publish(event);
        Ok(op)
    }

    async fn set_embedding(
        &self,
        id: &str,
        embedding: &[f32],
    ) -> Result<UpdateOutcome, StoreError> {
        let updated = {
            let mut map = self.items.write().await;
            match map.get_mut(id) {
                None => {
                    return Ok(UpdateOutcome {
                        matched: false,
                        modified: false,
                    })
                }
                Some(item) if item.caption_embedding.is_some() => {
                    return Ok(UpdateOutcome {
                        matched: true,
                        modified: false,
                    })
                }
                Some(item) => {
                    item.caption_embedding = Some(embedding.to_vec());
                    item.clone()
                }
            }
        };
        self.feed.publish(ChangeEvent::update(updated));
        Ok(UpdateOutcome {
            matched: true,
            modified: true,
        })
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.items.read().await.len())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_embedding_only_once() {
        let store = MemoryStore::default();
        store.seed([WardrobeItem::new("a", "wool coat")]).await;

        let first = store.set_embedding("a", &[0.1, 0.2]).await.unwrap();
        assert!(first.matched && first.modified);

        let second = store.set_embedding("a", &[9.9]).await.unwrap();
        assert!(second.matched && !second.modified);

        let item = store.get("a").await.unwrap().unwrap();
        assert_eq!(item.caption_embedding, Some(vec![0.1, 0.2]));
        assert_eq!(item.caption.as_deref(), Some("wool coat"));
    }

    #[tokio::test]
    async fn test_set_embedding_unknown_id() {
        let store = MemoryStore::default();
        let outcome = store.set_embedding("missing", &[1.0]).await.unwrap();
        assert!(!outcome.matched && !outcome.modified);
    }

    #[tokio::test]
    async fn test_writes_are_published() {
        let store = MemoryStore::default();
        let mut rx = store.subscribe();

        let op = store.upsert(WardrobeItem::new("a", "hat")).await.unwrap();
        assert_eq!(op, OperationType::Insert);
        let op = store.upsert(WardrobeItem::new("a", "red hat")).await.unwrap();
        assert_eq!(op, OperationType::Replace);
        store.set_embedding("a", &[1.0]).await.unwrap();

        let ops: Vec<_> = (0..3)
            .map(|_| rx.try_recv().unwrap().operation_type)
            .collect();
        assert_eq!(
            ops,
            vec![
                OperationType::Insert,
                OperationType::Replace,
                OperationType::Update
            ]
        );
    }

    #[tokio::test]
    async fn test_rejects_blank_id() {
        let store = MemoryStore::default();
        let err = store.upsert(WardrobeItem::new(" ", "x")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
