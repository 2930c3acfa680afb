//! Caption embedding cache with LFU eviction.
//!
//! Identical captions embedded with the same model yield the same vector, so
//! a hit saves a billed provider call. A cache of size zero is disabled.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct Entries {
    vectors: HashMap<String, Vec<f32>>,
    access_count: HashMap<String, u64>,
}

/// A thread-safe LFU-based embedding cache.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    entries: Arc<RwLock<Entries>>,
    max_size: usize,
}

impl EmbeddingCache {
    /// Create a new cache with the specified maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            max_size,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_size > 0
    }

    /// Generate a cache key from text and model.
    ///
    /// Model and text are hashed as separate fields split by a NUL byte, so
    /// a `:` in a model name cannot make two pairs collide.
    pub fn generate_key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get an embedding from the cache.
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let embedding = entries.vectors.get(key).cloned()?;
        *entries.access_count.entry(key.to_string()).or_insert(0) += 1;
        Some(embedding)
    }

    /// Insert an embedding into the cache.
    pub fn insert(&self, key: String, value: Vec<f32>) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.vectors.len() >= self.max_size && !entries.vectors.contains_key(&key) {
            Self::evict_lfu(&mut entries);
        }

        entries.vectors.insert(key.clone(), value);
        entries.access_count.insert(key, 1);
    }

    /// Evict the least frequently used item.
    fn evict_lfu(entries: &mut Entries) {
        let lfu_key = entries
            .access_count
            .iter()
            .min_by_key(|(_, &count)| count)
            .map(|(key, _)| key.clone());
        if let Some(key) = lfu_key {
            entries.vectors.remove(&key);
            entries.access_count.remove(&key);
        }
    }

    /// Get cache statistics as (entries, capacity).
    pub fn stats(&self) -> (usize, usize) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        (entries.vectors.len(), self.max_size)
    }

    /// Clear the cache.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.vectors.clear();
        entries.access_count.clear();
    }
}
