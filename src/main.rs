//! Wardrobe Enricher - Main Entry Point
//!
//! Serves the change-event webhook and drains the local store's change feed
//! into the enrichment worker.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wardrobe_enricher::config::Config;
use wardrobe_enricher::credentials::EnvCredentialSource;
use wardrobe_enricher::handlers::{self, AppState};
use wardrobe_enricher::services::{spawn_change_feed, EnrichmentWorker};
use wardrobe_enricher::store::SledStore;
use wardrobe_enricher::traits::RecordStore;
use wardrobe_enricher::HuggingFaceClient;

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry RUST_LOG, so load it before the subscriber reads it
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_directives()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    config.validate()?;

    info!("Starting Wardrobe Enricher v{}", env!("CARGO_PKG_VERSION"));
    info!("Embedding model: {}", config.embedding_model);
    info!(
        "Rate limit: {}/s (burst {}), retries: {}",
        config.rate_limit_per_second, config.rate_limit_burst, config.max_retries
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("building HTTP client")?;
    let client = match &config.hf_endpoint_url {
        Some(endpoint) => HuggingFaceClient::with_endpoint(endpoint.clone()),
        None => HuggingFaceClient::with_base_url(config.hf_api_base.clone()),
    }
    .with_model(config.embedding_model.clone())
    .with_http_client(http);

    let store = Arc::new(
        SledStore::open(&config.store_path, config.change_feed_capacity)
            .with_context(|| format!("opening store at {}", config.store_path))?,
    );
    info!("Record store opened at {} ({} items)", config.store_path, store.count().await?);

    let credentials = Arc::new(EnvCredentialSource::new(config.credential_env_var.clone()));
    if std::env::var(credentials.var_name()).is_err() {
        tracing::warn!(
            "{} is not set; events will be dead-lettered until it is",
            credentials.var_name()
        );
    }

    let worker = Arc::new(EnrichmentWorker::from_config(
        &config,
        credentials,
        Arc::new(client),
        store.clone(),
    ));

    let feed = spawn_change_feed(worker.clone(), store.subscribe());

    let state = Arc::new(AppState {
        worker,
        config: config.clone(),
    });

    let app = handlers::router(state)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let host: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("invalid HOST {}", config.host))?;
    let addr = SocketAddr::from((host, config.port));
    info!("Wardrobe Enricher listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.abort();
    store.flush().await?;
    info!("Shut down cleanly");

    Ok(())
}

/// Log filter from `RUST_LOG`, read after `.env` has been loaded.
fn log_directives() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "wardrobe_enricher=info,tower_http=debug".into())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_comes_from_dotenv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "RUST_LOG=wardrobe_enricher=trace\n").unwrap();

        dotenvy::from_path_override(&path).unwrap();

        assert_eq!(log_directives(), "wardrobe_enricher=trace");
    }
}
