//! Response storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::aggregation::{BucketKey, MetricBucket};
use crate::model::SurveyResponse;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error (retryable={retryable}): {source}")]
    Database {
        #[source]
        source: sqlx::Error,
        retryable: bool,
    },

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt stored row: {0}")]
    Corrupt(String),

    #[error("Storage backend not available: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Connectivity loss, pool exhaustion, lock contention and serialization
    /// failures are retryable. Schema and constraint problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database { retryable, .. } => *retryable,
            Self::Migration(_) | Self::Corrupt(_) | Self::Unavailable(_) => false,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(source: sqlx::Error) -> Self {
        let retryable = crate::storage::helpers::is_retryable(&source);
        StorageError::Database { source, retryable }
    }
}

/// Result of appending a response.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// First delivery. Carries the bucket rows as they stand after the fold.
    Stored { buckets: Vec<MetricBucket> },
    /// The `event_id` was already recorded; nothing was written.
    Duplicate,
}

/// A response as persisted, with the server-side receive time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub response: SurveyResponse,
    pub received_at: DateTime<Utc>,
}

/// One row of the processing audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestLogEntry {
    pub event_id: String,
    pub status: String,
    pub message: String,
    pub logged_at: String,
}

/// Log status written with every successful append.
pub const LOG_STATUS_RECEIVED: &str = "received";
/// Log status written best-effort after a failed append.
pub const LOG_STATUS_ERROR: &str = "error";

/// Interface for response persistence.
///
/// Implementations:
/// - `SqliteResponseStore`: SQLite storage
/// - `PostgresResponseStore`: PostgreSQL storage
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Apply pending schema migrations.
    async fn init_schema(&self) -> Result<()>;

    /// Append a response and fold its bucket contributions atomically.
    ///
    /// The response row, its answers, every bucket delta in `contributions`,
    /// and a `received` log row commit in one transaction. A repeated
    /// `event_id` is detected by the unique constraint and yields
    /// [`AppendOutcome::Duplicate`] with nothing written.
    async fn append(
        &self,
        response: &SurveyResponse,
        contributions: &[MetricBucket],
        received_at: DateTime<Utc>,
    ) -> Result<AppendOutcome>;

    /// Record a failed ingestion attempt outside any transaction.
    async fn log_failure(&self, event_id: &str, message: &str) -> Result<()>;

    /// Retrieve one stored response.
    async fn get_response(&self, event_id: &str) -> Result<Option<StoredResponse>>;

    /// Retrieve every stored response, oldest first.
    async fn list_responses(&self) -> Result<Vec<SurveyResponse>>;

    /// Retrieve one bucket.
    async fn get_bucket(&self, key: &BucketKey) -> Result<Option<MetricBucket>>;

    /// Retrieve buckets, optionally restricted to one survey.
    async fn list_buckets(&self, survey_id: Option<&str>) -> Result<Vec<MetricBucket>>;

    /// Retrieve the processing log for an event, oldest first.
    async fn ingest_log(&self, event_id: &str) -> Result<Vec<IngestLogEntry>>;
}
