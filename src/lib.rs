//! Wardrobe Enricher - Library Entry Point
//!
//! Listens for wardrobe item changes, embeds captions through a remote
//! embedding provider and writes the vector back onto the same record.

pub mod clients;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;
pub mod traits;

// Re-export commonly used types
pub use clients::HuggingFaceClient;
pub use config::Config;
pub use credentials::{ApiCredential, EnvCredentialSource, StaticCredentialSource};
pub use error::EnrichmentError;
pub use models::{ChangeEvent, EnrichmentOutcome, WardrobeItem};
pub use services::EnrichmentWorker;
pub use store::{MemoryStore, SledStore};
pub use traits::{ChangeListener, CredentialSource, EmbeddingClient, RecordStore};
