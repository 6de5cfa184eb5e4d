//! Unit tests for bucket folding.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use super::*;
use crate::model::{Answer, QuestionType};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn response(event_id: &str, submitted_at: DateTime<Utc>, answers: &[(&str, &str, i64)]) -> SurveyResponse {
    SurveyResponse {
        event_id: event_id.to_string(),
        survey_id: "support".to_string(),
        submitted_at,
        answers: answers
            .iter()
            .map(|(question_id, kind, value)| Answer {
                question_id: question_id.to_string(),
                question_type: QuestionType::parse(kind),
                raw_value: json!(value),
            })
            .collect(),
    }
}

fn only_bucket(view: &BucketView) -> &MetricBucket {
    assert_eq!(view.len(), 1, "expected exactly one bucket, got {view:?}");
    view.values().next().unwrap()
}

#[test]
fn test_truncate_granularities() {
    // Thursday
    let ts = at(2024, 5, 16, 13, 47);
    assert_eq!(BucketGranularity::Hour.truncate(ts), at(2024, 5, 16, 13, 0));
    assert_eq!(BucketGranularity::Day.truncate(ts), at(2024, 5, 16, 0, 0));
    assert_eq!(BucketGranularity::Week.truncate(ts), at(2024, 5, 13, 0, 0));
    assert_eq!(BucketGranularity::Month.truncate(ts), at(2024, 5, 1, 0, 0));
}

#[test]
fn test_truncate_week_crosses_month_boundary() {
    // Sunday 2024-09-01 belongs to the week starting Monday 2024-08-26
    let ts = at(2024, 9, 1, 22, 15);
    assert_eq!(BucketGranularity::Week.truncate(ts), at(2024, 8, 26, 0, 0));
}

#[test]
fn test_nps_classification_boundaries() {
    assert_eq!(NpsClass::classify(0), NpsClass::Detractor);
    assert_eq!(NpsClass::classify(6), NpsClass::Detractor);
    assert_eq!(NpsClass::classify(7), NpsClass::Passive);
    assert_eq!(NpsClass::classify(8), NpsClass::Passive);
    assert_eq!(NpsClass::classify(9), NpsClass::Promoter);
    assert_eq!(NpsClass::classify(10), NpsClass::Promoter);
}

#[test]
fn test_csat_worked_example() {
    let aggregator = MetricAggregator::new(BucketGranularity::Day);
    let responses = [
        response("evt-1", at(2024, 5, 1, 9, 0), &[("q1", "csat", 4)]),
        response("evt-2", at(2024, 5, 1, 17, 30), &[("q1", "csat", 5)]),
    ];

    let view = aggregator.replay(&responses);
    let bucket = only_bucket(&view);
    assert_eq!(bucket.count, 2);
    assert_eq!(bucket.sum, 9);
    assert_eq!(bucket.mean(), Some(4.5));
    assert_eq!(bucket.nps_score(), None);
}

#[test]
fn test_nps_worked_example() {
    let aggregator = MetricAggregator::new(BucketGranularity::Day);
    let responses = [
        response("evt-1", at(2024, 5, 1, 8, 0), &[("rec", "nps", 9)]),
        response("evt-2", at(2024, 5, 1, 9, 0), &[("rec", "nps", 7)]),
        response("evt-3", at(2024, 5, 1, 10, 0), &[("rec", "nps", 2)]),
    ];

    let view = aggregator.replay(&responses);
    let bucket = only_bucket(&view);
    assert_eq!(bucket.promoter_count, 1);
    assert_eq!(bucket.passive_count, 1);
    assert_eq!(bucket.detractor_count, 1);
    assert_eq!(bucket.count, 3);
    assert_eq!(bucket.nps_score(), Some(0.0));
    assert_eq!(bucket.mean(), None);
}

#[test]
fn test_fold_is_order_independent() {
    let aggregator = MetricAggregator::new(BucketGranularity::Day);
    let responses = vec![
        response("a", at(2024, 5, 1, 8, 0), &[("q1", "csat", 3), ("rec", "nps", 10)]),
        response("b", at(2024, 5, 1, 23, 59), &[("q1", "csat", 5)]),
        response("c", at(2024, 5, 2, 0, 0), &[("q1", "csat", 1), ("rec", "nps", 4)]),
        response("d", at(2024, 5, 2, 6, 0), &[("rec", "nps", 8)]),
    ];

    let expected = aggregator.replay(&responses);

    // Every permutation of four responses
    let mut indices = [0usize, 1, 2, 3];
    let mut permutations = 0;
    loop {
        let ordered: Vec<&SurveyResponse> = indices.iter().map(|&i| &responses[i]).collect();
        assert_eq!(aggregator.replay(ordered), expected);
        permutations += 1;
        if !next_permutation(&mut indices) {
            break;
        }
    }
    assert_eq!(permutations, 24);
}

fn next_permutation(items: &mut [usize]) -> bool {
    let Some(pivot) = (1..items.len()).rev().find(|&i| items[i - 1] < items[i]) else {
        return false;
    };
    let successor = (pivot..items.len())
        .rev()
        .find(|&j| items[j] > items[pivot - 1])
        .unwrap();
    items.swap(pivot - 1, successor);
    items[pivot..].reverse();
    true
}

#[test]
fn test_contributions_skip_unsupported_and_unscored() {
    let aggregator = MetricAggregator::default();
    let mut response = response("evt-1", at(2024, 5, 1, 8, 0), &[("q1", "csat", 4), ("rec", "nps", 9)]);
    response.answers.push(Answer {
        question_id: "q-grid".into(),
        question_type: QuestionType::parse("matrix"),
        raw_value: json!([1, 2]),
    });
    response.answers.push(Answer {
        question_id: "q-note".into(),
        question_type: QuestionType::Text,
        raw_value: json!("thanks"),
    });

    let deltas = aggregator.contributions(&response);
    assert_eq!(deltas.len(), 2);
    assert!(deltas.iter().all(|d| d.count == 1));
    assert!(deltas.iter().any(|d| d.key.question_id == "q1" && d.sum == 4));
    assert!(deltas.iter().any(|d| d.key.question_id == "rec" && d.promoter_count == 1));
}

#[test]
fn test_contributions_coalesce_same_bucket() {
    let aggregator = MetricAggregator::default();
    let response = response("evt-1", at(2024, 5, 1, 8, 0), &[("q1", "csat", 2), ("q1", "csat", 3)]);

    let deltas = aggregator.contributions(&response);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].count, 2);
    assert_eq!(deltas[0].sum, 5);
}

#[test]
fn test_buckets_split_by_day_and_kind() {
    let aggregator = MetricAggregator::new(BucketGranularity::Day);
    let responses = [
        response("evt-1", at(2024, 5, 1, 23, 59), &[("q1", "csat", 4)]),
        response("evt-2", at(2024, 5, 2, 0, 0), &[("q1", "csat", 4)]),
        response("evt-3", at(2024, 5, 2, 1, 0), &[("q1", "nps", 4)]),
    ];

    let view = aggregator.replay(&responses);
    assert_eq!(view.len(), 3);
}

#[test]
fn test_bucket_key_uses_configured_granularity() {
    let aggregator = MetricAggregator::new(BucketGranularity::Month);
    let response = response("evt-1", at(2024, 2, 29, 12, 0), &[("q1", "csat", 4)]);
    let score = response.score_answers().next().unwrap();

    let key = aggregator.bucket_key(&response, &score);
    assert_eq!(key.bucket_start, at(2024, 2, 1, 0, 0));
    assert_eq!(key.survey_id, "support");
    assert_eq!(key.kind, ScoreKind::Csat);
}
