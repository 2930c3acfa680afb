//! Services module.

pub mod cache;
pub mod dead_letter;
pub mod listener;
pub mod rate_limiter;
pub mod retry;
pub mod worker;

pub use cache::EmbeddingCache;
pub use dead_letter::{DeadLetter, InMemoryDeadLetterQueue};
pub use listener::{run_change_feed, spawn_change_feed};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use worker::EnrichmentWorker;
