//! Bucket drift verification.
//!
//! Metric buckets are a materialized view of the stored responses. Replaying
//! every response through the aggregator must reproduce the stored buckets
//! exactly; anything else is drift. Verification is read-only.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregation::{BucketKey, MetricAggregator, MetricBucket};
use crate::interfaces::{ResponseStore, StorageError};

/// A bucket whose stored counters differ from the replayed ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketMismatch {
    pub expected: MetricBucket,
    pub stored: MetricBucket,
}

/// Differences between stored buckets and a replay of stored responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriftReport {
    /// Responses replayed.
    pub responses: usize,
    /// Buckets read from the store.
    pub stored_buckets: usize,
    /// Replayed buckets with no stored row.
    pub missing: Vec<MetricBucket>,
    /// Stored rows no response accounts for.
    pub unexpected: Vec<MetricBucket>,
    pub mismatched: Vec<BucketMismatch>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }
}

/// Replay stored responses and compare against stored buckets.
///
/// `aggregator` must use the granularity the buckets were written with.
pub async fn verify_buckets(
    store: &dyn ResponseStore,
    aggregator: &MetricAggregator,
) -> Result<DriftReport, StorageError> {
    let responses = store.list_responses().await?;
    let expected = aggregator.replay(&responses);

    let stored: BTreeMap<BucketKey, MetricBucket> = store
        .list_buckets(None)
        .await?
        .into_iter()
        .map(|bucket| (bucket.key.clone(), bucket))
        .collect();

    let mut report = DriftReport {
        responses: responses.len(),
        stored_buckets: stored.len(),
        ..Default::default()
    };

    for (key, bucket) in &expected {
        match stored.get(key) {
            None => report.missing.push(bucket.clone()),
            Some(row) if row != bucket => report.mismatched.push(BucketMismatch {
                expected: bucket.clone(),
                stored: row.clone(),
            }),
            Some(_) => {}
        }
    }
    report.unexpected = stored
        .into_iter()
        .filter(|(key, _)| !expected.contains_key(key))
        .map(|(_, bucket)| bucket)
        .collect();

    if report.is_clean() {
        info!(
            responses = report.responses,
            buckets = report.stored_buckets,
            "Buckets match replay"
        );
    } else {
        warn!(
            missing = report.missing.len(),
            unexpected = report.unexpected.len(),
            mismatched = report.mismatched.len(),
            "Bucket drift detected"
        );
    }

    Ok(report)
}
