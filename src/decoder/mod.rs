//! Webhook payload decoding.
//!
//! Turns the raw request body into a [`SurveyResponse`]. Expected shape:
//!
//! ```json
//! {
//!   "event_id": "01J9...",
//!   "survey_id": "onboarding-v2",
//!   "submitted_at": "2024-05-01T12:30:00Z",
//!   "answers": [
//!     { "question_id": "q1", "type": "csat", "value": 4 },
//!     { "question_id": "q2", "type": "text", "value": "fast delivery" }
//!   ]
//! }
//! ```
//!
//! Decoding is pure. Unknown answer types do not fail the payload; they are
//! kept as [`QuestionType::Unsupported`] and reported through
//! [`SurveyResponse::unsupported_answers`].


use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;

use crate::model::{Answer, QuestionType, ScoreAnswer, ScoreKind, SurveyResponse};

/// Reasons a payload is rejected outright.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{kind} answer for question {question_id} out of range: {value}")]
    ScoreOutOfRange {
        question_id: String,
        kind: ScoreKind,
        value: i64,
    },
}

fn malformed(message: impl Into<String>) -> DecodeError {
    DecodeError::MalformedPayload(message.into())
}

/// Decode and validate a raw webhook body.
pub fn decode(raw: &[u8]) -> Result<SurveyResponse, DecodeError> {
    let payload: Value = serde_json::from_slice(raw)
        .map_err(|e| malformed(format!("body is not valid JSON: {e}")))?;

    if !payload.is_object() {
        return Err(malformed("body must be a JSON object"));
    }

    let event_id = required_str(&payload, "event_id")?;
    let survey_id = required_str(&payload, "survey_id")?;
    let submitted_at = parse_submitted_at(&required_str(&payload, "submitted_at")?)?;

    let answers = payload
        .get("answers")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing answers array"))?;
    if answers.is_empty() {
        return Err(malformed("answers must not be empty"));
    }

    let answers = answers
        .iter()
        .enumerate()
        .map(|(index, answer)| decode_answer(index, answer))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SurveyResponse {
        event_id,
        survey_id,
        submitted_at,
        answers,
    })
}

fn required_str(payload: &Value, field: &str) -> Result<String, DecodeError> {
    match payload.get(field) {
        None | Some(Value::Null) => Err(malformed(format!("missing {field}"))),
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(malformed(format!("{field} must not be blank")));
            }
            Ok(trimmed.to_string())
        }
        Some(_) => Err(malformed(format!("{field} must be a string"))),
    }
}

/// Years whose bucket starts stay within four-digit RFC 3339 years.
const SUBMITTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

fn parse_submitted_at(value: &str) -> Result<DateTime<Utc>, DecodeError> {
    let submitted_at = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| malformed(format!("submitted_at is not an RFC 3339 timestamp: {e}")))?;
    if !SUBMITTED_YEARS.contains(&submitted_at.year()) {
        return Err(malformed(format!(
            "submitted_at year {} is outside 0001-9999",
            submitted_at.year()
        )));
    }
    Ok(submitted_at)
}

fn decode_answer(index: usize, answer: &Value) -> Result<Answer, DecodeError> {
    if !answer.is_object() {
        return Err(malformed(format!("answers[{index}] must be an object")));
    }

    let question_id = required_str(answer, "question_id")
        .map_err(|e| malformed(format!("answers[{index}]: {}", inner_message(e))))?;
    let declared_type = required_str(answer, "type")
        .map_err(|e| malformed(format!("answers[{index}]: {}", inner_message(e))))?;
    let raw_value = answer
        .get("value")
        .cloned()
        .ok_or_else(|| malformed(format!("answers[{index}]: missing value")))?;

    let question_type = QuestionType::parse(&declared_type);
    check_value(index, &question_id, &question_type, &raw_value)?;

    Ok(Answer {
        question_id,
        question_type,
        raw_value,
    })
}

fn inner_message(err: DecodeError) -> String {
    match err {
        DecodeError::MalformedPayload(message) => message,
        other => other.to_string(),
    }
}

/// Check the value's JSON type (and range for scores) against the declared type.
fn check_value(
    index: usize,
    question_id: &str,
    question_type: &QuestionType,
    value: &Value,
) -> Result<(), DecodeError> {
    let expected = match question_type {
        QuestionType::Score(kind) => {
            let score = value.as_i64().ok_or_else(|| {
                malformed(format!(
                    "answers[{index}]: {kind} value for question {question_id} must be an integer"
                ))
            })?;
            return ScoreAnswer::new(question_id, *kind, score)
                .map(|_| ())
                .map_err(|e| DecodeError::ScoreOutOfRange {
                    question_id: question_id.to_string(),
                    kind: e.kind,
                    value: e.value,
                });
        }
        QuestionType::Text | QuestionType::Choice => value.is_string().then_some(()).ok_or("a string"),
        QuestionType::Number => value.is_number().then_some(()).ok_or("a number"),
        QuestionType::Boolean => value.is_boolean().then_some(()).ok_or("a boolean"),
        QuestionType::Unsupported(_) => Ok(()),
    };

    expected.map_err(|wanted| {
        malformed(format!(
            "answers[{index}]: {} value for question {question_id} must be {wanted}",
            question_type.as_str()
        ))
    })
}
