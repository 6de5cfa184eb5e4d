//! Webhook ingestion pipeline.
//!
//! Decode, fold, and persist one delivery. A delivery ends in exactly one of:
//! - `Persisted`: first sighting of the event; response and buckets committed together
//! - `Deduplicated`: the event was already stored; nothing changed
//! - `Rejected`: the payload can never succeed; the source must not retry
//! - `Failed`: nothing was committed; the source should redeliver


use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregation::{MetricAggregator, MetricBucket};
use crate::decoder::{self, DecodeError};
use crate::interfaces::{AppendOutcome, ResponseStore, StorageError};
use crate::model::UnsupportedQuestionType;

/// Terminal success states of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// First delivery of the event.
    Persisted {
        event_id: String,
        survey_id: String,
        /// Buckets touched by this response, as they stand after the fold.
        buckets: Vec<MetricBucket>,
        /// Answers stored but excluded from aggregation.
        unsupported: Vec<UnsupportedQuestionType>,
    },
    /// Redelivery of an already stored event.
    Deduplicated { event_id: String },
}

impl IngestOutcome {
    pub fn event_id(&self) -> &str {
        match self {
            Self::Persisted { event_id, .. } | Self::Deduplicated { event_id } => event_id,
        }
    }
}

/// Errors that end a delivery without a stored response.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Rejected payload: {0}")]
    Rejected(#[from] DecodeError),

    #[error("Store failure: {0}")]
    Failed(#[from] StorageError),

    #[error("Delivery not committed within {0:?}")]
    TimedOut(Duration),
}

impl IngestError {
    /// Whether a redelivery of the same payload may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected(_) => false,
            Self::Failed(e) => e.is_retryable(),
            Self::TimedOut(_) => true,
        }
    }
}

/// Runs the ingestion pipeline against a response store.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn ResponseStore>,
    aggregator: MetricAggregator,
    timeout: Duration,
}

impl IngestService {
    pub fn new(store: Arc<dyn ResponseStore>, aggregator: MetricAggregator, timeout: Duration) -> Self {
        Self {
            store,
            aggregator,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    pub fn aggregator(&self) -> &MetricAggregator {
        &self.aggregator
    }

    /// Ingest one raw webhook body.
    ///
    /// One deadline, set on entry, bounds the whole call. Expiry drops the
    /// in-flight transaction, which rolls it back. Failure audit rows are
    /// written in the background and never extend the call.
    pub async fn ingest(&self, raw: &[u8]) -> Result<IngestOutcome, IngestError> {
        let deadline = Instant::now() + self.timeout;

        let response = match decoder::decode(raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, outcome = "rejected", "Rejected delivery");
                return Err(e.into());
            }
        };

        let unsupported = response.unsupported_answers();
        for answer in &unsupported {
            warn!(
                event_id = %response.event_id,
                question_id = %answer.question_id,
                declared_type = %answer.declared_type,
                "Unsupported question type; answer stored without aggregation"
            );
        }

        let contributions = self.aggregator.contributions(&response);
        debug!(
            event_id = %response.event_id,
            buckets = contributions.len(),
            "Decoded delivery"
        );

        let append = self.store.append(&response, &contributions, Utc::now());
        let outcome = match tokio::time::timeout_at(deadline, append).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(
                    event_id = %response.event_id,
                    retryable = e.is_retryable(),
                    error = %e,
                    outcome = "failed",
                    "Failed to store delivery"
                );
                self.record_failure(&response.event_id, e.to_string());
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    event_id = %response.event_id,
                    timeout = ?self.timeout,
                    outcome = "failed",
                    "Timed out storing delivery"
                );
                self.record_failure(&response.event_id, "timed out before commit".to_string());
                return Err(IngestError::TimedOut(self.timeout));
            }
        };

        match outcome {
            AppendOutcome::Stored { buckets } => {
                info!(
                    event_id = %response.event_id,
                    survey_id = %response.survey_id,
                    answers = response.answers.len(),
                    buckets = buckets.len(),
                    outcome = "persisted",
                    "Stored delivery"
                );
                Ok(IngestOutcome::Persisted {
                    event_id: response.event_id,
                    survey_id: response.survey_id,
                    buckets,
                    unsupported,
                })
            }
            AppendOutcome::Duplicate => {
                info!(
                    event_id = %response.event_id,
                    survey_id = %response.survey_id,
                    outcome = "deduplicated",
                    "Duplicate delivery acknowledged"
                );
                Ok(IngestOutcome::Deduplicated {
                    event_id: response.event_id,
                })
            }
        }
    }

    /// Best-effort audit row for a failed attempt, bounded by its own timeout.
    fn record_failure(&self, event_id: &str, message: String) {
        let store = Arc::clone(&self.store);
        let timeout = self.timeout;
        let event_id = event_id.to_string();
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.log_failure(&event_id, &message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event_id = %event_id, error = %e, "Failed to record ingest failure")
                }
                Err(_) => warn!(event_id = %event_id, "Timed out recording ingest failure"),
            }
        });
    }
}
