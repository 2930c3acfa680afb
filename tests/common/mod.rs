#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::util::ServiceExt;

use wardrobe_enricher::config::Config;
use wardrobe_enricher::credentials::{ApiCredential, StaticCredentialSource};
use wardrobe_enricher::error::EnrichmentError;
use wardrobe_enricher::handlers::{self, AppState};
use wardrobe_enricher::services::EnrichmentWorker;
use wardrobe_enricher::store::MemoryStore;
use wardrobe_enricher::traits::{EmbeddingClient, EmbeddingRequest, EmbeddingResponse};

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Vector(Vec<f32>),
    Status(u16),
    Malformed,
}

/// Embedding client that replays scripted replies and records every call.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Vec<f32>>,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    credentials: Mutex<Vec<String>>,
}

impl ScriptedClient {
    /// Always answers with `vector`.
    pub fn always(vector: Vec<f32>) -> Self {
        Self {
            fallback: Some(vector),
            ..Self::default()
        }
    }

    /// Answers with `replies` in order, then with `fallback` if any.
    pub fn scripted(replies: Vec<Reply>, fallback: Option<Vec<f32>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingClient for ScriptedClient {
    async fn embed(
        &self,
        request: EmbeddingRequest,
        credential: &ApiCredential,
    ) -> Result<EmbeddingResponse, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(request.text.clone());
        self.credentials
            .lock()
            .unwrap()
            .push(credential.expose().to_string());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone().map(Reply::Vector))
            .unwrap_or(Reply::Malformed);

        match reply {
            Reply::Vector(embedding) => Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model: request.model.unwrap_or_else(|| "scripted".to_string()),
            }),
            Reply::Status(status) => Err(EnrichmentError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            Reply::Malformed => Err(EnrichmentError::MalformedResponse(
                "scripted garbage".to_string(),
            )),
        }
    }

    fn get_dimension(&self, _model: &str) -> Option<usize> {
        None
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

pub struct Harness {
    pub client: Arc<ScriptedClient>,
    pub store: Arc<MemoryStore>,
    pub worker: Arc<EnrichmentWorker>,
}

pub fn harness(client: ScriptedClient) -> Harness {
    harness_with(client, StaticCredentialSource::new("hf_test_token"), |w| w)
}

pub fn harness_with(
    client: ScriptedClient,
    credentials: StaticCredentialSource,
    tune: impl FnOnce(EnrichmentWorker) -> EnrichmentWorker,
) -> Harness {
    let client = Arc::new(client);
    let store = Arc::new(MemoryStore::default());
    let worker = EnrichmentWorker::new(Arc::new(credentials), client.clone(), store.clone());
    Harness {
        client,
        store,
        worker: Arc::new(tune(worker)),
    }
}

pub fn app(worker: Arc<EnrichmentWorker>) -> Router {
    handlers::router(Arc::new(AppState {
        worker,
        config: Config::default(),
    }))
}

pub async fn request(app: &Router, method: Method, path: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(path);

    let req = if let Some(payload) = body {
        builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("empty body")
    };

    app.clone().oneshot(req).await.expect("oneshot response")
}

pub async fn response_json(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body bytes");

    let json = if bytes.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice::<Value>(&bytes).expect("parse json body")
    };

    (status, json)
}
