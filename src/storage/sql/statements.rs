//! Backend-neutral sea-query statements for the response store.
//!
//! Each builder returns an owned statement; the backend renders it through
//! [`SqlDatabase`](super::SqlDatabase).

use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::{Expr, InsertStatement, OnConflict, Order, Query, SelectStatement};

use crate::aggregation::{BucketKey, MetricBucket};
use crate::model::SurveyResponse;
use crate::storage::helpers::format_timestamp;
use crate::storage::schema::{IngestLog, MetricBuckets, SurveyAnswers, SurveyResponses};

/// Stored form of a bucket start. Buckets always begin on a whole second.
pub fn bucket_start_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn insert_response(response: &SurveyResponse, received_at: DateTime<Utc>) -> InsertStatement {
    Query::insert()
        .into_table(SurveyResponses::Table)
        .columns([
            SurveyResponses::EventId,
            SurveyResponses::SurveyId,
            SurveyResponses::SubmittedAt,
            SurveyResponses::ReceivedAt,
        ])
        .values_panic([
            response.event_id.as_str().into(),
            response.survey_id.as_str().into(),
            format_timestamp(response.submitted_at).into(),
            format_timestamp(received_at).into(),
        ])
        .to_owned()
}

/// Multi-row insert for every answer, in delivery order.
///
/// Returns `None` for a response with no answers.
pub fn insert_answers(response: &SurveyResponse) -> Option<InsertStatement> {
    if response.answers.is_empty() {
        return None;
    }

    let mut stmt = Query::insert()
        .into_table(SurveyAnswers::Table)
        .columns([
            SurveyAnswers::EventId,
            SurveyAnswers::Position,
            SurveyAnswers::QuestionId,
            SurveyAnswers::QuestionType,
            SurveyAnswers::RawValue,
            SurveyAnswers::Aggregated,
        ])
        .to_owned();

    for (position, answer) in response.answers.iter().enumerate() {
        stmt.values_panic([
            response.event_id.as_str().into(),
            (position as i64).into(),
            answer.question_id.as_str().into(),
            answer.question_type.as_str().into(),
            answer.raw_value.to_string().into(),
            answer.score().is_some().into(),
        ]);
    }

    Some(stmt)
}

/// Add `delta` to its bucket, creating the row on first contribution.
///
/// The update side references the existing row through the table name so the
/// arithmetic happens in the database under the row lock.
pub fn upsert_bucket(delta: &MetricBucket, updated_at: DateTime<Utc>) -> InsertStatement {
    let key = &delta.key;
    let add = |col: MetricBuckets, amount: i64| {
        Expr::col((MetricBuckets::Table, col)).add(amount)
    };

    Query::insert()
        .into_table(MetricBuckets::Table)
        .columns([
            MetricBuckets::SurveyId,
            MetricBuckets::QuestionId,
            MetricBuckets::Kind,
            MetricBuckets::BucketStart,
            MetricBuckets::Count,
            MetricBuckets::Sum,
            MetricBuckets::PromoterCount,
            MetricBuckets::PassiveCount,
            MetricBuckets::DetractorCount,
            MetricBuckets::UpdatedAt,
        ])
        .values_panic([
            key.survey_id.as_str().into(),
            key.question_id.as_str().into(),
            key.kind.as_str().into(),
            bucket_start_text(key.bucket_start).into(),
            delta.count.into(),
            delta.sum.into(),
            delta.promoter_count.into(),
            delta.passive_count.into(),
            delta.detractor_count.into(),
            format_timestamp(updated_at).into(),
        ])
        .on_conflict(
            OnConflict::columns([
                MetricBuckets::SurveyId,
                MetricBuckets::QuestionId,
                MetricBuckets::Kind,
                MetricBuckets::BucketStart,
            ])
            .value(MetricBuckets::Count, add(MetricBuckets::Count, delta.count))
            .value(MetricBuckets::Sum, add(MetricBuckets::Sum, delta.sum))
            .value(
                MetricBuckets::PromoterCount,
                add(MetricBuckets::PromoterCount, delta.promoter_count),
            )
            .value(
                MetricBuckets::PassiveCount,
                add(MetricBuckets::PassiveCount, delta.passive_count),
            )
            .value(
                MetricBuckets::DetractorCount,
                add(MetricBuckets::DetractorCount, delta.detractor_count),
            )
            .value(MetricBuckets::UpdatedAt, format_timestamp(updated_at))
            .to_owned(),
        )
        .to_owned()
}

fn bucket_columns(stmt: &mut SelectStatement) -> &mut SelectStatement {
    stmt.columns([
        MetricBuckets::SurveyId,
        MetricBuckets::QuestionId,
        MetricBuckets::Kind,
        MetricBuckets::BucketStart,
        MetricBuckets::Count,
        MetricBuckets::Sum,
        MetricBuckets::PromoterCount,
        MetricBuckets::PassiveCount,
        MetricBuckets::DetractorCount,
    ])
    .from(MetricBuckets::Table)
}

pub fn select_bucket(key: &BucketKey) -> SelectStatement {
    let mut stmt = Query::select();
    bucket_columns(&mut stmt)
        .and_where(Expr::col(MetricBuckets::SurveyId).eq(key.survey_id.as_str()))
        .and_where(Expr::col(MetricBuckets::QuestionId).eq(key.question_id.as_str()))
        .and_where(Expr::col(MetricBuckets::Kind).eq(key.kind.as_str()))
        .and_where(Expr::col(MetricBuckets::BucketStart).eq(bucket_start_text(key.bucket_start)));
    stmt
}

pub fn list_buckets(survey_id: Option<&str>) -> SelectStatement {
    let mut stmt = Query::select();
    bucket_columns(&mut stmt);
    if let Some(survey_id) = survey_id {
        stmt.and_where(Expr::col(MetricBuckets::SurveyId).eq(survey_id));
    }
    stmt.order_by(MetricBuckets::SurveyId, Order::Asc)
        .order_by(MetricBuckets::QuestionId, Order::Asc)
        .order_by(MetricBuckets::Kind, Order::Asc)
        .order_by(MetricBuckets::BucketStart, Order::Asc);
    stmt
}

/// Response headers, oldest first. Restricted to one event when given.
pub fn select_responses(event_id: Option<&str>) -> SelectStatement {
    let mut stmt = Query::select()
        .columns([
            SurveyResponses::EventId,
            SurveyResponses::SurveyId,
            SurveyResponses::SubmittedAt,
            SurveyResponses::ReceivedAt,
        ])
        .from(SurveyResponses::Table)
        .to_owned();
    if let Some(event_id) = event_id {
        stmt.and_where(Expr::col(SurveyResponses::EventId).eq(event_id));
    }
    stmt.order_by(SurveyResponses::Id, Order::Asc);
    stmt
}

/// Answers ordered by position within each event.
pub fn select_answers(event_id: Option<&str>) -> SelectStatement {
    let mut stmt = Query::select()
        .columns([
            SurveyAnswers::EventId,
            SurveyAnswers::QuestionId,
            SurveyAnswers::QuestionType,
            SurveyAnswers::RawValue,
        ])
        .from(SurveyAnswers::Table)
        .to_owned();
    if let Some(event_id) = event_id {
        stmt.and_where(Expr::col(SurveyAnswers::EventId).eq(event_id));
    }
    stmt.order_by(SurveyAnswers::EventId, Order::Asc)
        .order_by(SurveyAnswers::Position, Order::Asc);
    stmt
}

pub fn insert_log(
    event_id: &str,
    status: &str,
    message: &str,
    logged_at: DateTime<Utc>,
) -> InsertStatement {
    Query::insert()
        .into_table(IngestLog::Table)
        .columns([
            IngestLog::EventId,
            IngestLog::Status,
            IngestLog::Message,
            IngestLog::LoggedAt,
        ])
        .values_panic([
            event_id.into(),
            status.into(),
            message.into(),
            format_timestamp(logged_at).into(),
        ])
        .to_owned()
}

pub fn select_log(event_id: &str) -> SelectStatement {
    Query::select()
        .columns([
            IngestLog::EventId,
            IngestLog::Status,
            IngestLog::Message,
            IngestLog::LoggedAt,
        ])
        .from(IngestLog::Table)
        .and_where(Expr::col(IngestLog::EventId).eq(event_id))
        .order_by(IngestLog::Id, Order::Asc)
        .to_owned()
}
