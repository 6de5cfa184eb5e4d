//! Ingestion pipeline configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::aggregation::BucketGranularity;

/// Ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Width of metric buckets.
    pub bucket_granularity: BucketGranularity,
    /// Upper bound on handling one delivery, decode through commit. Failure
    /// audit rows are written in the background under the same bound.
    pub request_timeout_ms: u64,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Shared secret for webhook signatures. Verification is off when unset.
    pub signing_secret: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bucket_granularity: BucketGranularity::Day,
            request_timeout_ms: 10_000,
            max_body_bytes: 1024 * 1024,
            signing_secret: None,
        }
    }
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
