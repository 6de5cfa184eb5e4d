//! Canonical survey response types.
//!
//! A [`SurveyResponse`] is the normalized form of one webhook delivery. Every
//! answer is kept exactly as delivered; only answers whose question type is a
//! score kind ([`ScoreKind`]) contribute to metric aggregation.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score scale a question is rated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Customer satisfaction, 1-5.
    Csat,
    /// Net promoter, 0-10.
    Nps,
}

impl ScoreKind {
    /// Inclusive range of valid values for this kind.
    pub fn range(self) -> RangeInclusive<i64> {
        match self {
            Self::Csat => 1..=5,
            Self::Nps => 0..=10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csat => "csat",
            Self::Nps => "nps",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "csat" => Some(Self::Csat),
            "nps" => Some(Self::Nps),
            _ => None,
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csat => "CSAT",
            Self::Nps => "NPS",
        })
    }
}

/// Declared type of a question.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuestionType {
    Score(ScoreKind),
    Text,
    Choice,
    Number,
    Boolean,
    /// A type this service does not recognize. The answer is stored but never
    /// aggregated.
    Unsupported(String),
}

impl QuestionType {
    /// Parse a declared type name. Matching is case-insensitive; unknown names
    /// become [`QuestionType::Unsupported`] carrying the name as delivered.
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        if let Some(kind) = ScoreKind::parse(&normalized) {
            return Self::Score(kind);
        }
        match normalized.as_str() {
            "text" => Self::Text,
            "choice" => Self::Choice,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            _ => Self::Unsupported(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Score(kind) => kind.as_str(),
            Self::Text => "text",
            Self::Choice => "choice",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Unsupported(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

/// One answer within a response, as delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question_id: String,
    pub question_type: QuestionType,
    pub raw_value: serde_json::Value,
}

impl Answer {
    /// The validated score carried by this answer, if it is a score question.
    pub fn score(&self) -> Option<ScoreAnswer> {
        match self.question_type {
            QuestionType::Score(kind) => {
                let value = self.raw_value.as_i64()?;
                ScoreAnswer::new(&self.question_id, kind, value).ok()
            }
            _ => None,
        }
    }
}

/// A CSAT or NPS answer whose value lies within its kind's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreAnswer {
    pub question_id: String,
    pub kind: ScoreKind,
    pub value: i64,
}

impl ScoreAnswer {
    /// Build a score answer, rejecting (never clamping) out-of-range values.
    pub fn new(question_id: &str, kind: ScoreKind, value: i64) -> Result<Self, OutOfRange> {
        if !kind.range().contains(&value) {
            return Err(OutOfRange { kind, value });
        }
        Ok(Self {
            question_id: question_id.to_string(),
            kind,
            value,
        })
    }
}

/// A score value outside its kind's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    pub kind: ScoreKind,
    pub value: i64,
}

/// An answer that was kept but excluded from aggregation because its declared
/// type is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsupportedQuestionType {
    pub question_id: String,
    pub declared_type: String,
}

impl fmt::Display for UnsupportedQuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "question {} has unsupported type {:?}",
            self.question_id, self.declared_type
        )
    }
}

/// One submitted form instance.
///
/// Once stored, a response is immutable; its `event_id` is the deduplication key.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyResponse {
    pub event_id: String,
    pub survey_id: String,
    pub submitted_at: DateTime<Utc>,
    pub answers: Vec<Answer>,
}

impl SurveyResponse {
    /// Answers that contribute to aggregation, in delivery order.
    pub fn score_answers(&self) -> impl Iterator<Item = ScoreAnswer> + '_ {
        self.answers.iter().filter_map(Answer::score)
    }

    /// Answers kept in storage but skipped by aggregation.
    pub fn unsupported_answers(&self) -> Vec<UnsupportedQuestionType> {
        self.answers
            .iter()
            .filter_map(|answer| match &answer.question_type {
                QuestionType::Unsupported(name) => Some(UnsupportedQuestionType {
                    question_id: answer.question_id.clone(),
                    declared_type: name.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer(question_id: &str, kind: &str, value: serde_json::Value) -> Answer {
        Answer {
            question_id: question_id.to_string(),
            question_type: QuestionType::parse(kind),
            raw_value: value,
        }
    }

    #[test]
    fn test_question_type_parse_is_case_insensitive() {
        assert_eq!(QuestionType::parse("CSAT"), QuestionType::Score(ScoreKind::Csat));
        assert_eq!(QuestionType::parse(" Nps "), QuestionType::Score(ScoreKind::Nps));
        assert_eq!(QuestionType::parse("Boolean"), QuestionType::Boolean);
    }

    #[test]
    fn test_question_type_unsupported_keeps_original_name() {
        let parsed = QuestionType::parse("Matrix");
        assert_eq!(parsed, QuestionType::Unsupported("Matrix".to_string()));
        assert_eq!(parsed.as_str(), "Matrix");
        assert!(!parsed.is_supported());
    }

    #[test]
    fn test_score_answer_rejects_out_of_range() {
        assert!(ScoreAnswer::new("q1", ScoreKind::Csat, 0).is_err());
        assert!(ScoreAnswer::new("q1", ScoreKind::Csat, 6).is_err());
        assert!(ScoreAnswer::new("q1", ScoreKind::Nps, 11).is_err());
        assert!(ScoreAnswer::new("q1", ScoreKind::Nps, -1).is_err());
        assert!(ScoreAnswer::new("q1", ScoreKind::Nps, 0).is_ok());
        assert!(ScoreAnswer::new("q1", ScoreKind::Csat, 5).is_ok());
    }

    #[test]
    fn test_score_answers_skip_unscored_questions() {
        let response = SurveyResponse {
            event_id: "evt-1".into(),
            survey_id: "survey".into(),
            submitted_at: Utc::now(),
            answers: vec![
                answer("q1", "csat", json!(4)),
                answer("q2", "text", json!("great")),
                answer("q3", "hologram", json!({"x": 1})),
                answer("q4", "nps", json!(9)),
            ],
        };

        let scores: Vec<_> = response.score_answers().collect();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].kind, ScoreKind::Csat);
        assert_eq!(scores[1].value, 9);

        let unsupported = response.unsupported_answers();
        assert_eq!(unsupported.len(), 1);
        assert_eq!(unsupported[0].question_id, "q3");
        assert_eq!(unsupported[0].declared_type, "hologram");
    }
}
