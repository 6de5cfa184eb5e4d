//! survey-ingest: Survey webhook ingestion service
//!
//! Accepts webhook deliveries, stores each response once, and keeps CSAT/NPS
//! buckets current in the same transaction.
//!
//! ## Architecture
//! ```text
//! [Survey platform] -> POST /webhook -> [IngestService] -> [SQLite/Postgres]
//!                                             |
//!                                             v
//!                                  responses + answers + buckets
//! ```
//!
//! ## Configuration
//! - `config.yaml`, `--config <path>`, or SURVEY_INGEST_CONFIG
//! - SURVEY_INGEST__SECTION__KEY environment overrides
//! - SURVEY_INGEST_LOG: tracing filter (default: info)
//! - SURVEY_INGEST_LOG_FORMAT: `json` for structured output

use tracing::{error, info, warn};

use survey_ingest::aggregation::MetricAggregator;
use survey_ingest::config::Config;
use survey_ingest::handlers::{serve, AppState, SignatureVerifier};
use survey_ingest::services::IngestService;
use survey_ingest::storage::init_storage;
use survey_ingest::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config_path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let store = init_storage(&config.storage).await.map_err(|e| {
        error!(error = %e, "Failed to initialize response store");
        e
    })?;

    let verifier = match config.ingest.signing_secret.as_deref() {
        Some(secret) => Some(
            SignatureVerifier::new(secret.as_bytes())
                .map_err(|e| format!("Invalid ingest.signing_secret: {e}"))?,
        ),
        None => {
            warn!("No ingest.signing_secret configured; webhook signatures are not verified");
            None
        }
    };

    let aggregator = MetricAggregator::new(config.ingest.bucket_granularity);
    let ingest = IngestService::new(store, aggregator, config.ingest.request_timeout());
    info!(
        granularity = ?config.ingest.bucket_granularity,
        timeout = ?config.ingest.request_timeout(),
        "Ingestion pipeline ready"
    );

    serve(
        AppState::new(ingest, verifier),
        &config.server.bind_address(),
        config.ingest.max_body_bytes,
        shutdown_signal(),
    )
    .await?;

    info!("survey-ingest stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, draining in-flight deliveries");
}
