//! CSAT/NPS metric aggregation.
//!
//! Buckets are keyed by `(survey_id, question_id, kind, bucket_start)` where
//! `bucket_start` is the response's `submitted_at` truncated to the configured
//! [`BucketGranularity`]. Folding is additive per bucket, so the final state is
//! the same regardless of the order in which responses arrive.
//!
//! The aggregator itself holds no state. [`MetricAggregator::contributions`]
//! produces the per-bucket deltas for one response; the response store applies
//! them inside the same transaction as the response insert. [`MetricAggregator::replay`]
//! folds stored responses in memory to rebuild or verify the materialized view.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ScoreAnswer, ScoreKind, SurveyResponse};

/// Width of a metric time bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketGranularity {
    Hour,
    #[default]
    Day,
    /// ISO weeks, starting Monday.
    Week,
    Month,
}

impl BucketGranularity {
    /// Start of the bucket containing `ts`.
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let start = match self {
            Self::Hour => date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(ts.hour())),
            Self::Day => date.and_time(NaiveTime::MIN),
            Self::Week => {
                let offset = i64::from(date.weekday().num_days_from_monday());
                (date - Duration::days(offset)).and_time(NaiveTime::MIN)
            }
            Self::Month => {
                (date - Duration::days(i64::from(date.day0()))).and_time(NaiveTime::MIN)
            }
        };
        Utc.from_utc_datetime(&start)
    }
}

/// Identity of one metric bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BucketKey {
    pub survey_id: String,
    pub question_id: String,
    pub kind: ScoreKind,
    pub bucket_start: DateTime<Utc>,
}

/// Aggregate for one bucket.
///
/// `sum` is meaningful for CSAT; the three NPS counters are meaningful for NPS.
/// Unused fields stay zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricBucket {
    #[serde(flatten)]
    pub key: BucketKey,
    pub count: i64,
    pub sum: i64,
    pub promoter_count: i64,
    pub passive_count: i64,
    pub detractor_count: i64,
}

/// NPS classification of a 0-10 rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpsClass {
    Detractor,
    Passive,
    Promoter,
}

impl NpsClass {
    pub fn classify(value: i64) -> Self {
        match value {
            9..=10 => Self::Promoter,
            7..=8 => Self::Passive,
            _ => Self::Detractor,
        }
    }
}

impl MetricBucket {
    /// Empty bucket for `key`.
    pub fn empty(key: BucketKey) -> Self {
        Self {
            key,
            count: 0,
            sum: 0,
            promoter_count: 0,
            passive_count: 0,
            detractor_count: 0,
        }
    }

    /// The single-response contribution of `score` to `key`.
    pub fn contribution(key: BucketKey, score: &ScoreAnswer) -> Self {
        let mut bucket = Self::empty(key);
        bucket.count = 1;
        match score.kind {
            ScoreKind::Csat => bucket.sum = score.value,
            ScoreKind::Nps => match NpsClass::classify(score.value) {
                NpsClass::Promoter => bucket.promoter_count = 1,
                NpsClass::Passive => bucket.passive_count = 1,
                NpsClass::Detractor => bucket.detractor_count = 1,
            },
        }
        bucket
    }

    /// Add another bucket's counters into this one. Keys must match.
    pub fn merge(&mut self, other: &MetricBucket) {
        debug_assert_eq!(self.key, other.key);
        self.count += other.count;
        self.sum += other.sum;
        self.promoter_count += other.promoter_count;
        self.passive_count += other.passive_count;
        self.detractor_count += other.detractor_count;
    }

    /// Mean CSAT rating, `sum / count`.
    pub fn mean(&self) -> Option<f64> {
        (self.key.kind == ScoreKind::Csat && self.count > 0)
            .then(|| self.sum as f64 / self.count as f64)
    }

    /// NPS score, `100 * (promoters - detractors) / count`.
    pub fn nps_score(&self) -> Option<f64> {
        (self.key.kind == ScoreKind::Nps && self.count > 0).then(|| {
            100.0 * (self.promoter_count - self.detractor_count) as f64 / self.count as f64
        })
    }
}

/// Materialized view keyed by bucket identity.
pub type BucketView = BTreeMap<BucketKey, MetricBucket>;

/// Computes bucket updates for responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricAggregator {
    granularity: BucketGranularity,
}

impl MetricAggregator {
    pub fn new(granularity: BucketGranularity) -> Self {
        Self { granularity }
    }

    pub fn granularity(&self) -> BucketGranularity {
        self.granularity
    }

    /// Bucket key for a score answer of `response`.
    pub fn bucket_key(&self, response: &SurveyResponse, score: &ScoreAnswer) -> BucketKey {
        BucketKey {
            survey_id: response.survey_id.clone(),
            question_id: score.question_id.clone(),
            kind: score.kind,
            bucket_start: self.granularity.truncate(response.submitted_at),
        }
    }

    /// Per-bucket deltas contributed by one response.
    ///
    /// Answers landing in the same bucket are coalesced so each bucket appears
    /// once. Unsupported and unscored answers contribute nothing.
    pub fn contributions(&self, response: &SurveyResponse) -> Vec<MetricBucket> {
        let mut deltas = BucketView::new();
        self.fold(&mut deltas, response);
        deltas.into_values().collect()
    }

    /// Fold one response into an in-memory view.
    pub fn fold(&self, view: &mut BucketView, response: &SurveyResponse) {
        for score in response.score_answers() {
            let key = self.bucket_key(response, &score);
            let delta = MetricBucket::contribution(key.clone(), &score);
            view.entry(key)
                .or_insert_with_key(|k| MetricBucket::empty(k.clone()))
                .merge(&delta);
        }
    }

    /// Rebuild the view from stored responses.
    pub fn replay<'a, I>(&self, responses: I) -> BucketView
    where
        I: IntoIterator<Item = &'a SurveyResponse>,
    {
        let mut view = BucketView::new();
        for response in responses {
            self.fold(&mut view, response);
        }
        view
    }
}
