//! Credential sources for the embedding provider.

use async_trait::async_trait;
use std::fmt;

use crate::error::EnrichmentError;
use crate::traits::CredentialSource;

/// Bearer token for the embedding provider. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(***)")
    }
}

/// Reads the credential from an environment variable on every call, so a
/// secret provisioned after startup is picked up without a restart.
#[derive(Debug, Clone)]
pub struct EnvCredentialSource {
    var_name: String,
}

impl EnvCredentialSource {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }

    pub fn var_name(&self) -> &str {
        &self.var_name
    }
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn resolve(&self) -> Result<Option<ApiCredential>, EnrichmentError> {
        match std::env::var(&self.var_name) {
            Ok(value) if !value.trim().is_empty() => Ok(Some(ApiCredential::new(value.trim()))),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(EnrichmentError::CredentialSource(format!(
                "{}: {}",
                self.var_name, e
            ))),
        }
    }
}

/// Fixed credential, or a fixed absence of one.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    credential: Option<ApiCredential>,
}

impl StaticCredentialSource {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            credential: Some(ApiCredential::new(secret)),
        }
    }

    pub fn missing() -> Self {
        Self { credential: None }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn resolve(&self) -> Result<Option<ApiCredential>, EnrichmentError> {
        Ok(self.credential.clone())
    }
}
