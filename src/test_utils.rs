//! Test utilities and mock implementations.
//!
//! This module provides an in-memory response store with failure injection,
//! plus helpers for building stores and payloads in tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::aggregation::{BucketKey, MetricBucket};
use crate::interfaces::response_store::{
    Result as StorageResult, LOG_STATUS_ERROR, LOG_STATUS_RECEIVED,
};
use crate::interfaces::{AppendOutcome, IngestLogEntry, ResponseStore, StorageError, StoredResponse};
use crate::model::SurveyResponse;

/// Mock response store that keeps everything in memory.
#[derive(Default)]
pub struct MockResponseStore {
    responses: RwLock<Vec<StoredResponse>>,
    buckets: RwLock<BTreeMap<BucketKey, MetricBucket>>,
    log: RwLock<Vec<IngestLogEntry>>,
    /// When set, `append` fails with a database error of this retryability.
    fail_on_append: RwLock<Option<bool>>,
    /// When set, `append` sleeps this long before doing anything.
    append_delay: RwLock<Option<Duration>>,
}

impl MockResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, retryable: Option<bool>) {
        *self.fail_on_append.write().await = retryable;
    }

    pub async fn set_append_delay(&self, delay: Option<Duration>) {
        *self.append_delay.write().await = delay;
    }

    /// Overwrite a stored bucket, bypassing the fold.
    pub async fn put_bucket(&self, bucket: MetricBucket) {
        self.buckets.write().await.insert(bucket.key.clone(), bucket);
    }

    pub async fn response_count(&self) -> usize {
        self.responses.read().await.len()
    }

    async fn push_log(&self, event_id: &str, status: &str, message: &str) {
        self.log.write().await.push(IngestLogEntry {
            event_id: event_id.to_string(),
            status: status.to_string(),
            message: message.to_string(),
            logged_at: Utc::now().to_rfc3339(),
        });
    }
}

#[async_trait]
impl ResponseStore for MockResponseStore {
    async fn init_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn append(
        &self,
        response: &SurveyResponse,
        contributions: &[MetricBucket],
        received_at: DateTime<Utc>,
    ) -> StorageResult<AppendOutcome> {
        let delay = *self.append_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = *self.fail_on_append.read().await;
        if let Some(retryable) = failure {
            return Err(StorageError::Database {
                source: sqlx::Error::Protocol("injected failure".to_string()),
                retryable,
            });
        }

        let mut responses = self.responses.write().await;
        if responses
            .iter()
            .any(|stored| stored.response.event_id == response.event_id)
        {
            return Ok(AppendOutcome::Duplicate);
        }
        responses.push(StoredResponse {
            response: response.clone(),
            received_at,
        });

        let mut buckets = self.buckets.write().await;
        let mut touched = Vec::with_capacity(contributions.len());
        for delta in contributions {
            let bucket = buckets
                .entry(delta.key.clone())
                .or_insert_with_key(|k| MetricBucket::empty(k.clone()));
            bucket.merge(delta);
            touched.push(bucket.clone());
        }
        drop(buckets);
        drop(responses);

        self.push_log(&response.event_id, LOG_STATUS_RECEIVED, "").await;
        Ok(AppendOutcome::Stored { buckets: touched })
    }

    async fn log_failure(&self, event_id: &str, message: &str) -> StorageResult<()> {
        self.push_log(event_id, LOG_STATUS_ERROR, message).await;
        Ok(())
    }

    async fn get_response(&self, event_id: &str) -> StorageResult<Option<StoredResponse>> {
        Ok(self
            .responses
            .read()
            .await
            .iter()
            .find(|stored| stored.response.event_id == event_id)
            .cloned())
    }

    async fn list_responses(&self) -> StorageResult<Vec<SurveyResponse>> {
        Ok(self
            .responses
            .read()
            .await
            .iter()
            .map(|stored| stored.response.clone())
            .collect())
    }

    async fn get_bucket(&self, key: &BucketKey) -> StorageResult<Option<MetricBucket>> {
        Ok(self.buckets.read().await.get(key).cloned())
    }

    async fn list_buckets(&self, survey_id: Option<&str>) -> StorageResult<Vec<MetricBucket>> {
        Ok(self
            .buckets
            .read()
            .await
            .values()
            .filter(|bucket| survey_id.map_or(true, |id| bucket.key.survey_id == id))
            .cloned()
            .collect())
    }

    async fn ingest_log(&self, event_id: &str) -> StorageResult<Vec<IngestLogEntry>> {
        Ok(self
            .log
            .read()
            .await
            .iter()
            .filter(|entry| entry.event_id == event_id)
            .cloned()
            .collect())
    }
}

/// In-memory SQLite store with the schema applied.
#[cfg(feature = "sqlite")]
pub async fn sqlite_store() -> Arc<crate::storage::SqliteResponseStore> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("failed to create in-memory pool");

    let store = Arc::new(crate::storage::SqliteResponseStore::new(pool));
    store.init_schema().await.expect("failed to init schema");
    store
}

/// Webhook body with one answer per `(question_id, type, value)`.
pub fn payload(event_id: &str, submitted_at: &str, answers: &[(&str, &str, serde_json::Value)]) -> Vec<u8> {
    let answers: Vec<_> = answers
        .iter()
        .map(|(question_id, kind, value)| {
            serde_json::json!({"question_id": question_id, "type": kind, "value": value})
        })
        .collect();
    serde_json::json!({
        "event_id": event_id,
        "survey_id": "support",
        "submitted_at": submitted_at,
        "answers": answers,
    })
    .to_string()
    .into_bytes()
}
