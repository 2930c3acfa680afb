//! Dead-letter queue for events whose enrichment failed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::ChangeEvent;
use crate::traits::DeadLetterSink;

/// A change event that could not be enriched, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: ChangeEvent,
    pub code: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Bounded in-memory queue. When full, the oldest letter is dropped.
#[derive(Debug)]
pub struct InMemoryDeadLetterQueue {
    letters: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
}

impl InMemoryDeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            letters: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryDeadLetterQueue {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterQueue {
    async fn push(&self, letter: DeadLetter) {
        let mut letters = self.letters.lock().await;
        if letters.len() >= self.capacity {
            if let Some(dropped) = letters.pop_front() {
                warn!(
                    id = dropped.event.record_id().unwrap_or("<unknown>"),
                    "Dead-letter queue full, dropping oldest entry"
                );
            }
        }
        letters.push_back(letter);
    }

    async fn list(&self) -> Vec<DeadLetter> {
        self.letters.lock().await.iter().cloned().collect()
    }

    async fn drain(&self) -> Vec<DeadLetter> {
        self.letters.lock().await.drain(..).collect()
    }

    async fn len(&self) -> usize {
        self.letters.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WardrobeItem;

    fn letter(id: &str) -> DeadLetter {
        DeadLetter {
            event: ChangeEvent::insert(WardrobeItem::new(id, "caption")),
            code: "PROVIDER_STATUS".to_string(),
            error: "boom".to_string(),
            attempts: 1,
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_oldest_dropped_when_full() {
        let queue = InMemoryDeadLetterQueue::new(2);
        queue.push(letter("a")).await;
        queue.push(letter("b")).await;
        queue.push(letter("c")).await;

        let ids: Vec<_> = queue
            .list()
            .await
            .iter()
            .map(|l| l.event.record_id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_drain_empties_queue() {
        let queue = InMemoryDeadLetterQueue::default();
        queue.push(letter("a")).await;
        assert_eq!(queue.drain().await.len(), 1);
        assert_eq!(queue.len().await, 0);
    }
}
