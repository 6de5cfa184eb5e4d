//! Unified SQL ResponseStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;

use super::SqlDatabase;

/// SQL-based implementation of ResponseStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlResponseStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlResponseStore<DB> {
    /// Create a new SQL response store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }
}

/// Macro to implement ResponseStore for a specific SQL backend.
///
/// `append` runs in one transaction: the claiming insert goes first so the
/// transaction takes the write lock before anything is read, and dropping the
/// future before commit rolls everything back.
macro_rules! impl_response_store {
    ($db_type:ty, $feature:literal, $migrations:tt) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::interfaces::ResponseStore for SqlResponseStore<$db_type> {
            async fn init_schema(&self) -> crate::interfaces::response_store::Result<()> {
                sqlx::migrate!($migrations).run(&self.pool).await?;
                tracing::info!(backend = <$db_type>::NAME, "Response store schema ready");
                Ok(())
            }

            async fn append(
                &self,
                response: &crate::model::SurveyResponse,
                contributions: &[crate::aggregation::MetricBucket],
                received_at: chrono::DateTime<chrono::Utc>,
            ) -> crate::interfaces::response_store::Result<crate::interfaces::AppendOutcome> {
                use crate::interfaces::response_store::LOG_STATUS_RECEIVED;
                use crate::interfaces::AppendOutcome;
                use crate::storage::helpers::bucket_from_row;
                use crate::storage::idempotency::{claim, Claim};
                use crate::storage::sql::statements;

                let mut tx = self.pool.begin().await?;

                let (sql, values) =
                    <$db_type>::build_insert(statements::insert_response(response, received_at));
                let inserted = sqlx::query_with(&sql, values).execute(&mut *tx).await;
                if claim(inserted)? == Claim::Duplicate {
                    tx.rollback().await?;
                    tracing::debug!(event_id = %response.event_id, "Duplicate delivery");
                    return Ok(AppendOutcome::Duplicate);
                }

                if let Some(stmt) = statements::insert_answers(response) {
                    let (sql, values) = <$db_type>::build_insert(stmt);
                    sqlx::query_with(&sql, values).execute(&mut *tx).await?;
                }

                let mut buckets = Vec::with_capacity(contributions.len());
                for delta in contributions {
                    let (sql, values) =
                        <$db_type>::build_insert(statements::upsert_bucket(delta, received_at));
                    sqlx::query_with(&sql, values).execute(&mut *tx).await?;

                    let (sql, values) =
                        <$db_type>::build_select(statements::select_bucket(&delta.key));
                    let row = sqlx::query_with(&sql, values).fetch_one(&mut *tx).await?;
                    buckets.push(bucket_from_row(&row)?);
                }

                let (sql, values) = <$db_type>::build_insert(statements::insert_log(
                    &response.event_id,
                    LOG_STATUS_RECEIVED,
                    "",
                    received_at,
                ));
                sqlx::query_with(&sql, values).execute(&mut *tx).await?;

                tx.commit().await?;

                Ok(AppendOutcome::Stored { buckets })
            }

            async fn log_failure(
                &self,
                event_id: &str,
                message: &str,
            ) -> crate::interfaces::response_store::Result<()> {
                use crate::interfaces::response_store::LOG_STATUS_ERROR;
                use crate::storage::sql::statements;

                let (sql, values) = <$db_type>::build_insert(statements::insert_log(
                    event_id,
                    LOG_STATUS_ERROR,
                    message,
                    chrono::Utc::now(),
                ));
                sqlx::query_with(&sql, values).execute(&self.pool).await?;
                Ok(())
            }

            async fn get_response(
                &self,
                event_id: &str,
            ) -> crate::interfaces::response_store::Result<Option<crate::interfaces::StoredResponse>>
            {
                use crate::interfaces::StoredResponse;
                use crate::storage::helpers::{answer_from_row, assemble_responses, header_from_row};
                use crate::storage::sql::statements;

                let (sql, values) =
                    <$db_type>::build_select(statements::select_responses(Some(event_id)));
                let Some(row) = sqlx::query_with(&sql, values)
                    .fetch_optional(&self.pool)
                    .await?
                else {
                    return Ok(None);
                };
                let header = header_from_row(&row)?;

                let (sql, values) =
                    <$db_type>::build_select(statements::select_answers(Some(event_id)));
                let answers = sqlx::query_with(&sql, values)
                    .fetch_all(&self.pool)
                    .await?
                    .iter()
                    .map(answer_from_row)
                    .collect::<crate::interfaces::response_store::Result<Vec<_>>>()?;

                Ok(assemble_responses(vec![header], answers)
                    .into_iter()
                    .next()
                    .map(|(response, received_at)| StoredResponse {
                        response,
                        received_at,
                    }))
            }

            async fn list_responses(
                &self,
            ) -> crate::interfaces::response_store::Result<Vec<crate::model::SurveyResponse>> {
                use crate::storage::helpers::{answer_from_row, assemble_responses, header_from_row};
                use crate::storage::sql::statements;

                let (sql, values) = <$db_type>::build_select(statements::select_responses(None));
                let headers = sqlx::query_with(&sql, values)
                    .fetch_all(&self.pool)
                    .await?
                    .iter()
                    .map(header_from_row)
                    .collect::<crate::interfaces::response_store::Result<Vec<_>>>()?;

                let (sql, values) = <$db_type>::build_select(statements::select_answers(None));
                let answers = sqlx::query_with(&sql, values)
                    .fetch_all(&self.pool)
                    .await?
                    .iter()
                    .map(answer_from_row)
                    .collect::<crate::interfaces::response_store::Result<Vec<_>>>()?;

                Ok(assemble_responses(headers, answers)
                    .into_iter()
                    .map(|(response, _)| response)
                    .collect())
            }

            async fn get_bucket(
                &self,
                key: &crate::aggregation::BucketKey,
            ) -> crate::interfaces::response_store::Result<Option<crate::aggregation::MetricBucket>>
            {
                use crate::storage::helpers::bucket_from_row;
                use crate::storage::sql::statements;

                let (sql, values) = <$db_type>::build_select(statements::select_bucket(key));
                let row = sqlx::query_with(&sql, values)
                    .fetch_optional(&self.pool)
                    .await?;

                row.as_ref().map(bucket_from_row).transpose()
            }

            async fn list_buckets(
                &self,
                survey_id: Option<&str>,
            ) -> crate::interfaces::response_store::Result<Vec<crate::aggregation::MetricBucket>>
            {
                use crate::storage::helpers::bucket_from_row;
                use crate::storage::sql::statements;

                let (sql, values) = <$db_type>::build_select(statements::list_buckets(survey_id));
                sqlx::query_with(&sql, values)
                    .fetch_all(&self.pool)
                    .await?
                    .iter()
                    .map(bucket_from_row)
                    .collect()
            }

            async fn ingest_log(
                &self,
                event_id: &str,
            ) -> crate::interfaces::response_store::Result<Vec<crate::interfaces::IngestLogEntry>>
            {
                use crate::storage::helpers::log_entry_from_row;
                use crate::storage::sql::statements;

                let (sql, values) = <$db_type>::build_select(statements::select_log(event_id));
                sqlx::query_with(&sql, values)
                    .fetch_all(&self.pool)
                    .await?
                    .iter()
                    .map(log_entry_from_row)
                    .collect()
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_response_store!(super::postgres::Postgres, "postgres", "migrations/postgres");
impl_response_store!(super::sqlite::Sqlite, "sqlite", "migrations/sqlite");
