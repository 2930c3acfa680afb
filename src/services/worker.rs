//! Enrichment worker.
//!
//! Takes one change event at a time: applies the eligibility guard, resolves
//! the provider credential, fetches the caption embedding (rate limited,
//! retried on transient failures, optionally cached) and writes it back with
//! a conditional single-field update. Nothing escapes [`EnrichmentWorker::handle`];
//! failures are logged, counted and dead-lettered.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::credentials::ApiCredential;
use crate::error::EnrichmentError;
use crate::models::{
    CacheStats, ChangeEvent, Eligibility, EnrichmentOutcome, SkipReason, WorkerStatsSnapshot,
};
use crate::services::{
    DeadLetter, EmbeddingCache, InMemoryDeadLetterQueue, RateLimiter, RetryPolicy,
};
use crate::traits::{
    ChangeListener, CredentialSource, DeadLetterSink, EmbeddingClient, EmbeddingRequest,
    RecordStore,
};

#[derive(Debug, Default)]
struct WorkerStats {
    events_received: AtomicU64,
    replayed: AtomicU64,
    skipped: AtomicU64,
    enriched: AtomicU64,
    unchanged: AtomicU64,
    failed: AtomicU64,
    provider_calls: AtomicU64,
    cache_hits: AtomicU64,
}

impl WorkerStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            enriched: self.enriched.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}

/// Failure carried out of the pipeline together with the attempts it took.
struct Failure {
    error: EnrichmentError,
    attempts: u32,
}

impl Failure {
    fn new(error: impl Into<EnrichmentError>, attempts: u32) -> Self {
        Self {
            error: error.into(),
            attempts,
        }
    }
}

/// Caption embedding worker.
pub struct EnrichmentWorker {
    credentials: Arc<dyn CredentialSource>,
    client: Arc<dyn EmbeddingClient>,
    store: Arc<dyn RecordStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    cache: EmbeddingCache,
    model: String,
    expected_dimension: Option<usize>,
    stats: WorkerStats,
}

impl EnrichmentWorker {
    /// Create a worker with no rate limit, no retries and no cache.
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        client: Arc<dyn EmbeddingClient>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let model = client.default_model().to_string();
        let expected_dimension = client.get_dimension(&model);
        Self {
            credentials,
            client,
            store,
            dead_letters: Arc::new(InMemoryDeadLetterQueue::default()),
            rate_limiter: RateLimiter::unlimited(),
            retry: RetryPolicy::none(),
            cache: EmbeddingCache::disabled(),
            model,
            expected_dimension,
            stats: WorkerStats::default(),
        }
    }

    /// Create a worker tuned from service configuration.
    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialSource>,
        client: Arc<dyn EmbeddingClient>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        info!(
            "Initializing enrichment worker with {} ({})",
            client.provider_name(),
            config.embedding_model
        );
        Self::new(credentials, client, store)
            .with_model(config.embedding_model.clone())
            .with_rate_limiter(RateLimiter::new(
                config.rate_limit_per_second,
                config.rate_limit_burst,
            ))
            .with_retry_policy(config.retry_policy())
            .with_cache(EmbeddingCache::new(config.cache_size))
            .with_dead_letters(Arc::new(InMemoryDeadLetterQueue::new(
                config.dead_letter_capacity,
            )))
    }

    /// Embed with `model`; resets the expected dimension to the model's.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.expected_dimension = self.client.get_dimension(&self.model);
        self
    }

    pub fn with_expected_dimension(mut self, dimension: Option<usize>) -> Self {
        self.expected_dimension = dimension;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    pub fn expected_dimension(&self) -> Option<usize> {
        self.expected_dimension
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterSink> {
        &self.dead_letters
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        let (entries, capacity) = self.cache.stats();
        CacheStats { entries, capacity }
    }

    /// Handle one change event end to end.
    pub async fn handle(&self, event: ChangeEvent) -> EnrichmentOutcome {
        WorkerStats::bump(&self.stats.events_received);
        self.process(event).await
    }

    /// Re-handle every dead-lettered event against the record's current state.
    pub async fn replay_dead_letters(&self) -> Vec<EnrichmentOutcome> {
        let letters = self.dead_letters.drain().await;
        info!(count = letters.len(), "Replaying dead-lettered events");

        let mut outcomes = Vec::with_capacity(letters.len());
        for letter in letters {
            WorkerStats::bump(&self.stats.replayed);
            let outcome = match self.refresh(letter.event).await {
                Some(event) => self.process(event).await,
                None => self.skip(SkipReason::RecordGone),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn process(&self, event: ChangeEvent) -> EnrichmentOutcome {
        let Some(item) = event.full_document.as_ref() else {
            debug!(op = ?event.operation_type, "Change event without document, ignoring");
            return self.skip(SkipReason::NoDocument);
        };

        match item.eligibility() {
            Eligibility::MissingCaption => return self.skip(SkipReason::MissingCaption),
            Eligibility::AlreadyEmbedded => return self.skip(SkipReason::AlreadyEmbedded),
            Eligibility::Eligible => {}
        }

        let Some(id) = event.record_id().map(str::to_string) else {
            warn!(op = ?event.operation_type, "Change event without record identifier, ignoring");
            return self.skip(SkipReason::NoIdentifier);
        };
        let caption = item.caption.clone().unwrap_or_default();

        match self.enrich(&id, &caption).await {
            Ok(outcome) => outcome,
            Err(failure) => self.fail(event, id, failure).await,
        }
    }

    /// Reload the record behind a dead-lettered event. `None` when the
    /// record no longer exists.
    async fn refresh(&self, event: ChangeEvent) -> Option<ChangeEvent> {
        let Some(id) = event.record_id() else {
            return Some(event);
        };
        match self.store.get(id).await {
            Ok(Some(current)) => Some(ChangeEvent::update(current)),
            Ok(None) => {
                info!(id, "Dead-lettered record no longer exists, dropping");
                None
            }
            Err(e) => {
                warn!(id, error = %e, "Could not reload record for replay, using stored event");
                Some(event)
            }
        }
    }

    async fn enrich(&self, id: &str, caption: &str) -> Result<EnrichmentOutcome, Failure> {
        let credential = match self.credentials.resolve().await {
            Ok(Some(credential)) => credential,
            Ok(None) => return Err(Failure::new(EnrichmentError::MissingCredential, 0)),
            Err(e) => return Err(Failure::new(e, 0)),
        };

        let cache_key = EmbeddingCache::generate_key(caption, &self.model);
        let (embedding, cached, attempts) = match self.cache.get(&cache_key) {
            Some(embedding) => {
                WorkerStats::bump(&self.stats.cache_hits);
                debug!(id, "Caption embedding served from cache");
                (embedding, true, 0)
            }
            None => {
                let (embedding, attempts) = self.fetch_embedding(caption, &credential).await?;
                self.cache.insert(cache_key, embedding.clone());
                (embedding, false, attempts)
            }
        };

        let dimension = embedding.len();
        let update = self
            .store
            .set_embedding(id, &embedding)
            .await
            .map_err(|e| Failure::new(e, attempts))?;

        info!(
            id,
            matched = update.matched,
            modified = update.modified,
            dimension,
            "Caption embedding update finished"
        );
        match self.store.count().await {
            Ok(total) => info!(total, "Wardrobe collection size"),
            Err(e) => warn!(error = %e, "Could not count wardrobe collection"),
        }

        if update.modified {
            WorkerStats::bump(&self.stats.enriched);
            Ok(EnrichmentOutcome::Enriched {
                id: id.to_string(),
                dimension,
                cached,
            })
        } else {
            WorkerStats::bump(&self.stats.unchanged);
            Ok(EnrichmentOutcome::Unchanged {
                id: id.to_string(),
                matched: update.matched,
            })
        }
    }

    /// Call the provider, honouring the rate limit and retry policy.
    async fn fetch_embedding(
        &self,
        caption: &str,
        credential: &ApiCredential,
    ) -> Result<(Vec<f32>, u32), Failure> {
        let request = EmbeddingRequest {
            text: caption.to_string(),
            model: Some(self.model.clone()),
        };

        let mut retry = 0;
        loop {
            let waited = self.rate_limiter.acquire().await;
            if !waited.is_zero() {
                debug!(waited_ms = waited.as_millis() as u64, "Rate limiter held provider call");
            }

            WorkerStats::bump(&self.stats.provider_calls);
            let attempts = retry + 1;
            match self.client.embed(request.clone(), credential).await {
                Ok(response) => {
                    if let Some(expected) = self.expected_dimension {
                        if response.dimension != expected {
                            return Err(Failure::new(
                                EnrichmentError::DimensionMismatch {
                                    expected,
                                    actual: response.dimension,
                                },
                                attempts,
                            ));
                        }
                    }
                    return Ok((response.embedding, attempts));
                }
                Err(e) if e.is_retryable() && self.retry.should_retry(retry) => {
                    let delay = self.retry.delay(retry);
                    warn!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Embedding call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(Failure::new(e, attempts)),
            }
        }
    }

    fn skip(&self, reason: SkipReason) -> EnrichmentOutcome {
        WorkerStats::bump(&self.stats.skipped);
        debug!(?reason, "Item not eligible for enrichment");
        EnrichmentOutcome::skipped(reason)
    }

    async fn fail(&self, event: ChangeEvent, id: String, failure: Failure) -> EnrichmentOutcome {
        WorkerStats::bump(&self.stats.failed);
        let Failure { error, attempts } = failure;
        let code = error.code();

        match &error {
            EnrichmentError::MissingCredential => {
                error!(id = %id, "Embedding credential not found, record left untouched")
            }
            _ => error!(id = %id, attempts, code, error = %error, "Error generating embedding"),
        }

        self.dead_letters
            .push(DeadLetter {
                event,
                code: code.to_string(),
                error: error.to_string(),
                attempts,
                failed_at: Utc::now(),
            })
            .await;

        EnrichmentOutcome::Failed {
            id,
            code: code.to_string(),
            error: error.to_string(),
            attempts,
        }
    }
}

#[async_trait]
impl ChangeListener for EnrichmentWorker {
    async fn on_change(&self, event: ChangeEvent) -> EnrichmentOutcome {
        self.handle(event).await
    }
}
