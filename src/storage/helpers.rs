//! Shared storage helper functions.
//!
//! Error classification, timestamp formatting, and row decoding used by every
//! SQL backend.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::{ColumnIndex, Decode, Row, Type};

use crate::aggregation::{BucketKey, MetricBucket};
use crate::interfaces::response_store::{IngestLogEntry, Result, StorageError};
use crate::model::{Answer, QuestionType, ScoreKind, SurveyResponse};

/// SQLite primary result codes for lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`).
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// PostgreSQL SQLSTATEs that clear up on their own.
const PG_RETRYABLE_STATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57P01", // admin_shutdown
    "57P02", // crash_shutdown
    "57P03", // cannot_connect_now
];

/// Whether the error came from a uniqueness constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => matches!(db_err.kind(), ErrorKind::UniqueViolation),
        _ => false,
    }
}

/// Classify a driver error as transient (retryable) or persistent.
pub fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => is_retryable_database(db_err.as_ref()),
        _ => false,
    }
}

/// Result codes are read according to the backend that raised them.
fn is_retryable_database(db_err: &dyn DatabaseError) -> bool {
    let Some(code) = db_err.code() else {
        return false;
    };

    #[cfg(feature = "sqlite")]
    if db_err
        .try_downcast_ref::<sqlx::sqlite::SqliteError>()
        .is_some()
    {
        return is_retryable_sqlite_code(&code);
    }

    #[cfg(feature = "postgres")]
    if db_err
        .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
        .is_some()
    {
        return is_retryable_pg_code(&code);
    }

    false
}

/// SQLite reports extended result codes; the low byte is the primary code.
#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
fn is_retryable_sqlite_code(code: &str) -> bool {
    code.parse::<i64>()
        .map(|numeric| {
            let primary = numeric & 0xff;
            primary == SQLITE_BUSY || primary == SQLITE_LOCKED
        })
        .unwrap_or(false)
}

/// Class 08 (connection exceptions) plus the listed SQLSTATEs.
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
fn is_retryable_pg_code(code: &str) -> bool {
    code.starts_with("08") || PG_RETRYABLE_STATES.contains(&code)
}

/// Canonical text form for stored timestamps.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp {value:?}: {e}")))
}

/// Decode a `metric_buckets` row.
pub fn bucket_from_row<'r, R>(row: &'r R) -> Result<MetricBucket>
where
    R: Row,
    &'static str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
{
    let kind: String = row.try_get("kind")?;
    let kind = ScoreKind::parse(&kind)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown bucket kind {kind:?}")))?;
    let bucket_start: String = row.try_get("bucket_start")?;

    Ok(MetricBucket {
        key: BucketKey {
            survey_id: row.try_get("survey_id")?,
            question_id: row.try_get("question_id")?,
            kind,
            bucket_start: parse_timestamp(&bucket_start)?,
        },
        count: row.try_get("count")?,
        sum: row.try_get("sum")?,
        promoter_count: row.try_get("promoter_count")?,
        passive_count: row.try_get("passive_count")?,
        detractor_count: row.try_get("detractor_count")?,
    })
}

/// Decode an `ingest_log` row.
pub fn log_entry_from_row<'r, R>(row: &'r R) -> Result<IngestLogEntry>
where
    R: Row,
    &'static str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(IngestLogEntry {
        event_id: row.try_get("event_id")?,
        status: row.try_get("status")?,
        message: row.try_get("message")?,
        logged_at: row.try_get("logged_at")?,
    })
}

/// Response header columns read back from `survey_responses`.
pub struct ResponseHeader {
    pub event_id: String,
    pub survey_id: String,
    pub submitted_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Decode a `survey_responses` row.
pub fn header_from_row<'r, R>(row: &'r R) -> Result<ResponseHeader>
where
    R: Row,
    &'static str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
{
    let submitted_at: String = row.try_get("submitted_at")?;
    let received_at: String = row.try_get("received_at")?;
    Ok(ResponseHeader {
        event_id: row.try_get("event_id")?,
        survey_id: row.try_get("survey_id")?,
        submitted_at: parse_timestamp(&submitted_at)?,
        received_at: parse_timestamp(&received_at)?,
    })
}

/// Decode a `survey_answers` row into its owning event id and the answer.
pub fn answer_from_row<'r, R>(row: &'r R) -> Result<(String, Answer)>
where
    R: Row,
    &'static str: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
{
    let event_id: String = row.try_get("event_id")?;
    let question_type: String = row.try_get("question_type")?;
    let raw_value: String = row.try_get("raw_value")?;
    let raw_value = serde_json::from_str(&raw_value).map_err(|e| {
        StorageError::Corrupt(format!("answer value for {event_id} is not JSON: {e}"))
    })?;

    Ok((
        event_id,
        Answer {
            question_id: row.try_get("question_id")?,
            question_type: QuestionType::parse(&question_type),
            raw_value,
        },
    ))
}

/// Join response headers with their answers, preserving header order.
///
/// `answers` must already be ordered by position within each event.
pub fn assemble_responses(
    headers: Vec<ResponseHeader>,
    answers: Vec<(String, Answer)>,
) -> Vec<(SurveyResponse, DateTime<Utc>)> {
    let mut by_event: HashMap<String, Vec<Answer>> = HashMap::new();
    for (event_id, answer) in answers {
        by_event.entry(event_id).or_default().push(answer);
    }

    headers
        .into_iter()
        .map(|header| {
            let answers = by_event.remove(&header.event_id).unwrap_or_default();
            (
                SurveyResponse {
                    event_id: header.event_id,
                    survey_id: header.survey_id,
                    submitted_at: header.submitted_at,
                    answers,
                },
                header.received_at,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_retryable_codes() {
        // SQLITE_BUSY and SQLITE_BUSY_SNAPSHOT
        assert!(is_retryable_sqlite_code("5"));
        assert!(is_retryable_sqlite_code("517"));
        // SQLITE_LOCKED_SHAREDCACHE
        assert!(is_retryable_sqlite_code("262"));
        // SQLITE_CONSTRAINT_UNIQUE
        assert!(!is_retryable_sqlite_code("2067"));
        assert!(!is_retryable_sqlite_code("40001"));

        // PostgreSQL, including all-digit SQLSTATEs
        assert!(is_retryable_pg_code("40001"));
        assert!(is_retryable_pg_code("40P01"));
        assert!(is_retryable_pg_code("55P03"));
        assert!(is_retryable_pg_code("57P01"));
        for code in ["08000", "08001", "08003", "08006"] {
            assert!(is_retryable_pg_code(code), "{code}");
        }
        assert!(!is_retryable_pg_code("23505"));
        assert!(!is_retryable_pg_code("23503"));
        assert!(!is_retryable_pg_code("42P01"));
        assert!(!is_retryable_pg_code("5"));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_lock_contention_is_retryable() {
        use sqlx::sqlite::SqliteConnectOptions;
        use sqlx::ConnectOptions;

        let dir = tempfile::tempdir().unwrap();
        let opts = SqliteConnectOptions::new()
            .filename(dir.path().join("busy.db"))
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::ZERO);

        let mut holder = opts.connect().await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER PRIMARY KEY)")
            .execute(&mut holder)
            .await
            .unwrap();
        let mut contender = opts.connect().await.unwrap();

        sqlx::query("BEGIN IMMEDIATE").execute(&mut holder).await.unwrap();
        let err = sqlx::query("INSERT INTO t (x) VALUES (1)")
            .execute(&mut contender)
            .await
            .unwrap_err();
        assert!(is_retryable(&err), "{err}");
        sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();

        sqlx::query("INSERT INTO t (x) VALUES (1)")
            .execute(&mut contender)
            .await
            .unwrap();
        let err = sqlx::query("INSERT INTO t (x) VALUES (1)")
            .execute(&mut contender)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_non_database_errors() {
        assert!(is_retryable(&sqlx::Error::PoolTimedOut));
        assert!(is_retryable(&sqlx::Error::PoolClosed));
        assert!(!is_retryable(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_timestamp_round_trip_keeps_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        let text = format_timestamp(ts);
        assert_eq!(text, "2024-05-01T12:30:00.250Z");
        assert_eq!(parse_timestamp(&text).unwrap(), ts);
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_assemble_responses_groups_answers() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let header = |id: &str| ResponseHeader {
            event_id: id.to_string(),
            survey_id: "s".to_string(),
            submitted_at: ts,
            received_at: ts,
        };
        let answer = |q: &str| Answer {
            question_id: q.to_string(),
            question_type: QuestionType::Text,
            raw_value: serde_json::json!("x"),
        };

        let assembled = assemble_responses(
            vec![header("b"), header("a")],
            vec![
                ("a".to_string(), answer("a1")),
                ("b".to_string(), answer("b1")),
                ("a".to_string(), answer("a2")),
            ],
        );

        assert_eq!(assembled.len(), 2);
        assert_eq!(assembled[0].0.event_id, "b");
        assert_eq!(assembled[0].0.answers.len(), 1);
        assert_eq!(assembled[1].0.answers[0].question_id, "a1");
        assert_eq!(assembled[1].0.answers[1].question_id, "a2");
    }
}
