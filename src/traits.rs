//! Seams between the worker and the outside world.
//!
//! The worker never reaches for ambient host state: the credential source,
//! embedding provider, record store and dead-letter sink are all handed to it
//! through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::credentials::ApiCredential;
use crate::error::EnrichmentError;
use crate::models::{ChangeEvent, EnrichmentOutcome, OperationType, UpdateOutcome, WardrobeItem};
use crate::services::DeadLetter;
use crate::store::StoreError;

/// Request for generating an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The text to embed.
    pub text: String,
    /// The model to use (provider-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl EmbeddingRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }
}

/// Response containing the generated embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vector.
    pub embedding: Vec<f32>,
    /// The dimension of the embedding.
    pub dimension: usize,
    /// The model used to generate the embedding.
    pub model: String,
}

/// Trait for embedding providers reached over the network.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(
        &self,
        request: EmbeddingRequest,
        credential: &ApiCredential,
    ) -> Result<EmbeddingResponse, EnrichmentError>;

    /// Get the embedding dimension for a model, if known.
    fn get_dimension(&self, model: &str) -> Option<usize>;

    /// Get the provider name.
    fn provider_name(&self) -> &str;

    /// Get the model used when a request names none.
    fn default_model(&self) -> &str;
}

/// Resolves the provider credential at invocation time.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` means the secret is simply not provisioned.
    async fn resolve(&self) -> Result<Option<ApiCredential>, EnrichmentError>;
}

/// Storage holding wardrobe items.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<WardrobeItem>, StoreError>;

    /// Insert or replace an item, reporting which of the two happened.
    async fn upsert(&self, item: WardrobeItem) -> Result<OperationType, StoreError>;

    /// Set `caption_embedding` on the record `id` if it has none yet.
    ///
    /// No other field is touched.
    async fn set_embedding(&self, id: &str, embedding: &[f32])
        -> Result<UpdateOutcome, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Subscribe to the change feed of this store's own writes.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Something that reacts to change events.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    /// Handle one event. Never fails: failures are part of the outcome.
    async fn on_change(&self, event: ChangeEvent) -> EnrichmentOutcome;
}

/// Destination for events whose enrichment failed for good.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn push(&self, letter: DeadLetter);

    async fn list(&self) -> Vec<DeadLetter>;

    /// Remove and return every stored letter.
    async fn drain(&self) -> Vec<DeadLetter>;

    async fn len(&self) -> usize;
}
