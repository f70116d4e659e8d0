use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::SCORES;
use crate::error::RosterError;

/// Score of one student for one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    pub graded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreData {
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    /// Defaults to the time the score is saved.
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
}

impl ScoreData {
    pub fn validate(&self) -> Result<(), RosterError> {
        if !self.score.is_finite() {
            return Err(RosterError::Precondition(format!(
                "Score must be a finite number, got {}.",
                self.score
            )));
        }
        Ok(())
    }

    /// Whether `score` already records this grade.
    pub fn same_grade(&self, score: &Score) -> bool {
        self.score == score.score && self.feedback == score.feedback
    }

    pub fn score(&self, now: DateTime<Utc>) -> Score {
        Score {
            score: self.score,
            feedback: self.feedback.clone(),
            graded_at: self.graded_at.unwrap_or(now),
        }
    }
}

/// A student's result for one activity; unscored students have no score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRow {
    pub id: String,
    pub name: String,
    pub score: Option<f64>,
    pub feedback: String,
    pub graded_at: Option<DateTime<Utc>>,
}

impl ScoreRow {
    /// Reads the score for `activity` out of a raw student node.
    pub fn from_student(id: String, student: &Value, activity: &str) -> ScoreRow {
        let name = student
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let entry = student.get(SCORES).and_then(|scores| scores.get(activity));

        ScoreRow {
            id,
            name,
            score: entry.and_then(|it| it.get("score")).and_then(Value::as_f64),
            feedback: entry
                .and_then(|it| it.get("feedback"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            graded_at: entry
                .and_then(|it| it.get("gradedAt"))
                .and_then(Value::as_str)
                .and_then(|it| DateTime::parse_from_rfc3339(it).ok())
                .map(|it| it.with_timezone(&Utc)),
        }
    }

    fn rank(&self) -> f64 {
        self.score.unwrap_or(-1.0)
    }
}

/// Highest score first, unscored rows ranked as -1. The sort is stable, so
/// equal rows keep their incoming order.
pub fn rank_rows(rows: &mut [ScoreRow]) {
    rows.sort_by(|a, b| b.rank().partial_cmp(&a.rank()).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unscored_students_rank_last() {
        let a = json!({"name": "A", "scores": {"q1": {"score": 90, "feedback": "ok", "gradedAt": "2025-01-02T03:04:05Z"}}});
        let b = json!({"name": "B"});
        let c = json!({"name": "C", "scores": {"q1": {"score": 0, "feedback": "", "gradedAt": "2025-01-02T03:04:05Z"}}});

        let mut rows = vec![
            ScoreRow::from_student("b".into(), &b, "q1"),
            ScoreRow::from_student("a".into(), &a, "q1"),
            ScoreRow::from_student("c".into(), &c, "q1"),
        ];
        rank_rows(&mut rows);

        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(rows[0].score, Some(90.0));
        assert_eq!(rows[0].feedback, "ok");
        assert!(rows[0].graded_at.is_some());
        assert_eq!(rows[2].score, None);
        assert_eq!(rows[2].feedback, "");
        assert_eq!(rows[2].graded_at, None);
    }

    #[test]
    fn ties_keep_incoming_order() {
        let node = json!({"name": "X", "scores": {"q": {"score": 75}}});
        let mut rows = vec![
            ScoreRow::from_student("k1".into(), &node, "q"),
            ScoreRow::from_student("k2".into(), &node, "q"),
            ScoreRow::from_student("k3".into(), &node, "q"),
        ];
        rank_rows(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn non_finite_score_is_rejected() {
        let data = ScoreData {
            score: f64::NAN,
            feedback: String::new(),
            graded_at: None,
        };
        assert!(matches!(data.validate(), Err(RosterError::Precondition(_))));
    }
}
