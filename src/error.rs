//! Error types for the enrichment pipeline.

use thiserror::Error;

use crate::store::StoreError;

/// Failure while enriching a single wardrobe item.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("embedding credential is not configured")]
    MissingCredential,

    #[error("credential source failed: {0}")]
    CredentialSource(String),

    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("embedding provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("record store failed: {0}")]
    Store(#[from] StoreError),
}

impl EnrichmentError {
    /// Whether a later attempt has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Short machine-readable code used in logs and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::CredentialSource(_) => "CREDENTIAL_SOURCE_FAILED",
            Self::Transport(_) => "TRANSPORT_FAILED",
            Self::Status { .. } => "PROVIDER_STATUS",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Store(_) => "STORE_FAILED",
        }
    }
}
