//! HuggingFace embedding client.
//!
//! Talks to the Inference API feature-extraction pipeline (or a dedicated
//! inference endpoint) for sentence-transformers models. One caption goes
//! out as `{"inputs": "<caption>"}` and one vector comes back.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::credentials::ApiCredential;
use crate::error::EnrichmentError;
use crate::traits::{EmbeddingClient, EmbeddingRequest, EmbeddingResponse};

pub const HF_INFERENCE_API_BASE: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// HuggingFace API embedding request.
#[derive(Debug, Serialize)]
struct HuggingFaceRequest<'a> {
    inputs: &'a str,
}

/// HuggingFace embedding client.
#[derive(Debug, Clone)]
pub struct HuggingFaceClient {
    client: Client,
    base_url: String,
    dedicated_endpoint: Option<String>,
    model: String,
}

impl Default for HuggingFaceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HuggingFaceClient {
    /// Create a client for the public Inference API.
    pub fn new() -> Self {
        Self::with_base_url(HF_INFERENCE_API_BASE.to_string())
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            dedicated_endpoint: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client posting straight to a dedicated inference endpoint.
    pub fn with_endpoint(endpoint_url: String) -> Self {
        Self {
            dedicated_endpoint: Some(endpoint_url),
            ..Self::new()
        }
    }

    /// Use `model` when a request names none.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Replace the HTTP client, e.g. with one carrying a request timeout.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Get the URL for embedding requests.
    fn get_embedding_url(&self, model: &str) -> String {
        if let Some(ref endpoint) = self.dedicated_endpoint {
            endpoint.clone()
        } else {
            format!("{}/pipeline/feature-extraction/{}", self.base_url, model)
        }
    }

    /// Generate the embedding for one text.
    async fn generate_embedding(
        &self,
        model: &str,
        text: &str,
        credential: &ApiCredential,
    ) -> Result<Vec<f32>, EnrichmentError> {
        let url = self.get_embedding_url(model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .header("Content-Type", "application/json")
            .json(&HuggingFaceRequest { inputs: text })
            .send()
            .await?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "HuggingFace responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| EnrichmentError::MalformedResponse(format!("not JSON: {}", e)))?;

        parse_embedding(raw)
    }
}

/// Parse one sentence embedding out of a feature-extraction response.
///
/// Accepts a flat vector, a vector wrapped in single-element arrays, or
/// per-token vectors which get mean pooled.
pub fn parse_embedding(response: Value) -> Result<Vec<f32>, EnrichmentError> {
    match response {
        Value::Array(items) if items.iter().all(Value::is_number) => {
            if items.is_empty() {
                return Err(EnrichmentError::MalformedResponse(
                    "empty embedding".to_string(),
                ));
            }
            to_floats(&items)
        }
        Value::Array(mut items) if items.len() == 1 => parse_embedding(items.remove(0)),
        Value::Array(tokens) if tokens.iter().all(Value::is_array) => mean_pool_tokens(&tokens),
        Value::Object(map) => match map.get("error") {
            Some(error) => Err(EnrichmentError::MalformedResponse(format!(
                "provider error: {}",
                error
            ))),
            None => Err(EnrichmentError::MalformedResponse(
                "unexpected object in response".to_string(),
            )),
        },
        other => Err(EnrichmentError::MalformedResponse(format!(
            "unexpected response format: {}",
            type_name(&other)
        ))),
    }
}

fn to_floats(values: &[Value]) -> Result<Vec<f32>, EnrichmentError> {
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                EnrichmentError::MalformedResponse(format!("non-numeric component: {}", v))
            })
        })
        .collect()
}

/// Mean pool token embeddings to get a single sentence embedding.
fn mean_pool_tokens(tokens: &[Value]) -> Result<Vec<f32>, EnrichmentError> {
    let token_embeddings = tokens
        .iter()
        .map(|t| match t {
            Value::Array(values) => to_floats(values),
            _ => Err(EnrichmentError::MalformedResponse(
                "token embedding is not an array".to_string(),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let dim = token_embeddings.first().map(Vec::len).unwrap_or(0);
    if dim == 0 {
        return Err(EnrichmentError::MalformedResponse(
            "no token embeddings to pool".to_string(),
        ));
    }
    if token_embeddings.iter().any(|t| t.len() != dim) {
        return Err(EnrichmentError::MalformedResponse(
            "token embeddings differ in length".to_string(),
        ));
    }

    let num_tokens = token_embeddings.len() as f32;
    let mut pooled = vec![0.0f32; dim];
    for token in &token_embeddings {
        for (acc, &val) in pooled.iter_mut().zip(token) {
            *acc += val;
        }
    }
    for val in &mut pooled {
        *val /= num_tokens;
    }

    Ok(pooled)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl EmbeddingClient for HuggingFaceClient {
    async fn embed(
        &self,
        request: EmbeddingRequest,
        credential: &ApiCredential,
    ) -> Result<EmbeddingResponse, EnrichmentError> {
        let model = request.model.as_deref().unwrap_or(self.model.as_str());

        let embedding = self
            .generate_embedding(model, &request.text, credential)
            .await?;

        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: model.to_string(),
        })
    }

    fn get_dimension(&self, model: &str) -> Option<usize> {
        match model {
            "sentence-transformers/all-MiniLM-L6-v2" => Some(384),
            "sentence-transformers/all-MiniLM-L12-v2" => Some(384),
            "sentence-transformers/all-mpnet-base-v2" => Some(768),
            "BAAI/bge-small-en-v1.5" => Some(384),
            "BAAI/bge-base-en-v1.5" => Some(768),
            "BAAI/bge-large-en-v1.5" => Some(1024),
            _ => None,
        }
    }

    fn provider_name(&self) -> &str {
        "huggingface"
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_vector() {
        let v = parse_embedding(json!([0.1, 0.2, 0.3])).unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_wrapped_vector() {
        let v = parse_embedding(json!([[0.5, -0.5]])).unwrap();
        assert_eq!(v, vec![0.5, -0.5]);
    }

    #[test]
    fn test_token_embeddings_are_mean_pooled() {
        let v = parse_embedding(json!([[1.0, 0.0], [0.0, 1.0], [2.0, 2.0]])).unwrap();
        assert!((v[0] - 1.0).abs() < 1e-6);
        assert!((v[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        for bad in [
            json!([]),
            json!({"error": "Model is currently loading"}),
            json!("nope"),
            json!([0.1, "x"]),
            json!([[1.0, 2.0], [1.0]]),
        ] {
            assert!(matches!(
                parse_embedding(bad),
                Err(EnrichmentError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn test_embedding_url() {
        let client = HuggingFaceClient::with_base_url("http://hf.local/".to_string());
        assert_eq!(
            client.get_embedding_url(DEFAULT_MODEL),
            "http://hf.local/pipeline/feature-extraction/sentence-transformers/all-MiniLM-L6-v2"
        );

        let dedicated = HuggingFaceClient::with_endpoint("http://endpoint/embed".to_string());
        assert_eq!(dedicated.get_embedding_url(DEFAULT_MODEL), "http://endpoint/embed");
    }

    #[test]
    fn test_dimension_lookup() {
        let client = HuggingFaceClient::new();
        assert_eq!(client.get_dimension(DEFAULT_MODEL), Some(384));
        assert_eq!(client.get_dimension("BAAI/bge-large-en-v1.5"), Some(1024));
        assert_eq!(client.get_dimension("unknown/model"), None);
    }
}
