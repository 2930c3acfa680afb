use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::debug;

use super::{validate_id, ChangeFeed, StoreError};
use crate::models::{ChangeEvent, OperationType, UpdateOutcome, WardrobeItem};
use crate::traits::RecordStore;

const WARDROBE_TREE: &str = "wardrobe";
const CAS_MAX_ATTEMPTS: u32 = 16;

/// Persistent store backed by an embedded sled database.
#[derive(Debug)]
pub struct SledStore {
    db: sled::Db,
    items: sled::Tree,
    feed: ChangeFeed,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>, feed_capacity: usize) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let items = db.open_tree(WARDROBE_TREE)?;
        Ok(Self {
            db,
            items,
            feed: ChangeFeed::new(feed_capacity),
        })
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(raw: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

#[async_trait]
impl RecordStore for SledStore {
    async fn get(&self, id: &str) -> Result<Option<WardrobeItem>, StoreError> {
        match self.items.get(id.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, item: WardrobeItem) -> Result<OperationType, StoreError> {
        validate_id(&item.id)?;
        let previous = self
            .items
            .insert(item.id.as_bytes(), Self::serialize(&item)?)?;

        let op = if previous.is_some() {
            OperationType::Replace
        } else {
            OperationType::Insert
        };
        self.feed.publish(ChangeEvent {
            operation_type: op,
            ..ChangeEvent::insert(item)
        });
        Ok(op)
    }

    async fn set_embedding(
        &self,
        id: &str,
        embedding: &[f32],
    ) -> Result<UpdateOutcome, StoreError> {
        for attempt in 1..=CAS_MAX_ATTEMPTS {
            let Some(current) = self.items.get(id.as_bytes())? else {
                return Ok(UpdateOutcome {
                    matched: false,
                    modified: false,
                });
            };

            let mut item: WardrobeItem = Self::deserialize(&current)?;
            if item.caption_embedding.is_some() {
                return Ok(UpdateOutcome {
                    matched: true,
                    modified: false,
                });
            }
            item.caption_embedding = Some(embedding.to_vec());
            let next = Self::serialize(&item)?;

            let cas = self
                .items
                .compare_and_swap(id.as_bytes(), Some(current), Some(next))?;

            if cas.is_ok() {
                self.feed.publish(ChangeEvent::update(item));
                return Ok(UpdateOutcome {
                    matched: true,
                    modified: true,
                });
            }
            debug!(id, attempt, "Concurrent write on wardrobe item, retrying CAS");
        }

        Err(StoreError::CasRetryExhausted {
            key: id.to_string(),
            attempts: CAS_MAX_ATTEMPTS,
        })
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.items.len())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
