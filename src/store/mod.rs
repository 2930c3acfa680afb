//! Record stores for wardrobe items.
//!
//! Both implementations publish every write they perform on a broadcast
//! [`ChangeFeed`], which is what the worker subscribes to when it runs
//! against its own store instead of an external change stream.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::ChangeEvent;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CAS retry exhausted after {attempts} attempts: key={key}")]
    CasRetryExhausted { key: String, attempts: u32 },
    #[error("validation error: {0}")]
    Validation(String),
}

/// Broadcast channel of change events emitted by a store.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

pub(crate) fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::Validation("item id must not be empty".to_string()));
    }
    Ok(())
}
