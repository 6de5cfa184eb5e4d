//! survey-ingest-replay: Metric bucket drift check
//!
//! Replays every stored response through the aggregator and compares the
//! result with the stored buckets. Read-only. Exits non-zero on drift.
//!
//! Uses the same configuration sources as `survey-ingest`; the configured
//! `ingest.bucket_granularity` must match the one the buckets were written with.

use std::process::ExitCode;

use tracing::{error, info};

use survey_ingest::aggregation::MetricAggregator;
use survey_ingest::config::Config;
use survey_ingest::services::verify_buckets;
use survey_ingest::storage::init_storage;
use survey_ingest::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "Replay failed");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the stored buckets match the replay.
async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let config_path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref())?;
    let store = init_storage(&config.storage).await?;
    let aggregator = MetricAggregator::new(config.ingest.bucket_granularity);

    let report = verify_buckets(store.as_ref(), &aggregator).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_clean() {
        info!(responses = report.responses, "No drift");
    }
    Ok(report.is_clean())
}
