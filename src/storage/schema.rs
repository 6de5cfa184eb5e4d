//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.
//! The DDL itself lives in `migrations/{sqlite,postgres}`.

use sea_query::Iden;

/// Survey responses table schema.
#[derive(Iden)]
pub enum SurveyResponses {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_id"]
    EventId,
    #[iden = "survey_id"]
    SurveyId,
    #[iden = "submitted_at"]
    SubmittedAt,
    #[iden = "received_at"]
    ReceivedAt,
}

/// Survey answers table schema.
///
/// `aggregated` marks answers that contributed to a metric bucket.
#[derive(Iden)]
pub enum SurveyAnswers {
    Table,
    #[iden = "event_id"]
    EventId,
    #[iden = "position"]
    Position,
    #[iden = "question_id"]
    QuestionId,
    #[iden = "question_type"]
    QuestionType,
    #[iden = "raw_value"]
    RawValue,
    #[iden = "aggregated"]
    Aggregated,
}

/// Metric buckets table schema.
#[derive(Iden)]
pub enum MetricBuckets {
    Table,
    #[iden = "survey_id"]
    SurveyId,
    #[iden = "question_id"]
    QuestionId,
    #[iden = "kind"]
    Kind,
    #[iden = "bucket_start"]
    BucketStart,
    #[iden = "count"]
    Count,
    #[iden = "sum"]
    Sum,
    #[iden = "promoter_count"]
    PromoterCount,
    #[iden = "passive_count"]
    PassiveCount,
    #[iden = "detractor_count"]
    DetractorCount,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Processing log table schema.
#[derive(Iden)]
pub enum IngestLog {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_id"]
    EventId,
    #[iden = "status"]
    Status,
    #[iden = "message"]
    Message,
    #[iden = "logged_at"]
    LoggedAt,
}
