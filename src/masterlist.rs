//! Filters the students an AI read off a masterlist before any of them reach
//! the roster.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::error::ConfigurationError;

/// IDs the AI reports when it couldn't read one (compared lower-cased).
pub const PLACEHOLDER_IDS: [&str; 6] = ["null", "pending", "n/a", "no id", "student id", "id"];

/// A student as extracted by the AI. The ID may come back as a string, a
/// number or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedStudent {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
}

impl ExtractedStudent {
    pub fn is_accepted(&self) -> bool {
        self.id.as_deref().map_or(false, is_plausible_student_id)
    }
}

pub fn is_plausible_student_id(id: &str) -> bool {
    let id = id.trim();
    id.chars().count() > 3
        && id.chars().any(|c| c.is_ascii_digit())
        && !PLACEHOLDER_IDS.contains(&id.to_lowercase().as_str())
}

struct LenientText;

impl<'de> Visitor<'de> for LenientText {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, a number or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(LenientText)
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(d
        .deserialize_any(LenientText)?
        .filter(|id| !id.trim().is_empty()))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(d.deserialize_any(LenientText)?.unwrap_or_default())
}

/// Which rows of a validated masterlist get persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MasterlistPolicy {
    /// Only students with a plausible ID.
    #[default]
    AcceptedOnly,
    /// The whole extracted list, once at least one ID is plausible.
    Legacy,
}

impl FromStr for MasterlistPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accepted-only" | "accepted_only" => Ok(MasterlistPolicy::AcceptedOnly),
            "legacy" => Ok(MasterlistPolicy::Legacy),
            _ => Err(ConfigurationError::InvalidValue {
                setting: "MASTERLIST_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

impl Display for MasterlistPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterlistPolicy::AcceptedOnly => f.write_str("accepted-only"),
            MasterlistPolicy::Legacy => f.write_str("legacy"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid master list no student ID: nothing was extracted")]
    Empty,
    #[error("Invalid master list no student ID: none of {total} students has a valid ID")]
    NoStudentIds { total: usize },
}

/// Students that passed validation, ready to be written to a class.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ValidatedBatch {
    #[serde(rename = "students")]
    rows: Vec<ExtractedStudent>,
    accepted: usize,
    total: usize,
}

impl ValidatedBatch {
    pub fn rows(&self) -> &[ExtractedStudent] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ExtractedStudent> {
        self.rows
    }

    /// Candidates with a plausible ID.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Candidates the AI returned.
    pub fn total(&self) -> usize {
        self.total
    }
}

pub fn validate(
    candidates: Vec<ExtractedStudent>,
    policy: MasterlistPolicy,
) -> Result<ValidatedBatch, ValidationError> {
    let total = candidates.len();
    if total == 0 {
        return Err(ValidationError::Empty);
    }

    let accepted = candidates.iter().filter(|it| it.is_accepted()).count();
    tracing::debug!("validated {} / {} students have real IDs", accepted, total);
    if accepted == 0 {
        return Err(ValidationError::NoStudentIds { total });
    }

    let rows = match policy {
        MasterlistPolicy::AcceptedOnly => {
            candidates.into_iter().filter(|it| it.is_accepted()).collect()
        }
        MasterlistPolicy::Legacy => candidates,
    };

    Ok(ValidatedBatch {
        rows,
        accepted,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn student(name: &str, id: Option<&str>) -> ExtractedStudent {
        ExtractedStudent {
            name: name.to_string(),
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn ann_and_bo() {
        let candidates = vec![student("Ann", Some("2023-001")), student("Bo", Some("pending"))];

        let batch = validate(candidates.clone(), MasterlistPolicy::AcceptedOnly).unwrap();
        assert_eq!(batch.accepted(), 1);
        assert_eq!(batch.total(), 2);
        assert_eq!(batch.rows(), &candidates[..1]);

        let legacy = validate(candidates.clone(), MasterlistPolicy::Legacy).unwrap();
        assert_eq!(legacy.accepted(), 1);
        assert_eq!(legacy.rows(), &candidates[..]);
    }

    #[test]
    fn nothing_accepted_is_an_error() {
        let candidates = vec![
            student("Ann", None),
            student("Bo", Some("N/A")),
            student("Cy", Some("12")),
            student("Di", Some("abcd")),
        ];
        assert_eq!(
            validate(candidates, MasterlistPolicy::Legacy),
            Err(ValidationError::NoStudentIds { total: 4 })
        );
        assert_eq!(
            validate(Vec::new(), MasterlistPolicy::AcceptedOnly),
            Err(ValidationError::Empty)
        );
    }

    #[test]
    fn ids_are_trimmed_before_checking() {
        assert!(is_plausible_student_id("  2023 "));
        assert!(!is_plausible_student_id(" 123 "));
        assert!(!is_plausible_student_id("No ID"));
        assert!(is_plausible_student_id("ID-7"));
    }

    #[test]
    fn ids_decode_from_numbers_and_null() {
        let candidates: Vec<ExtractedStudent> = serde_json::from_str(
            r#"[{"name": "Ann", "id": 20230001}, {"name": "Bo", "id": null}, {"name": null, "id": ""}, {"id": "7"}]"#,
        )
        .unwrap();

        assert_eq!(candidates[0].id.as_deref(), Some("20230001"));
        assert!(candidates[0].is_accepted());
        assert_eq!(candidates[1].id, None);
        assert_eq!(candidates[2], student("", None));
        assert_eq!(candidates[3].name, "");
    }

    #[test]
    fn acceptance_rule_holds_for_random_ids() {
        let alphabet: Vec<char> = "aAdiInNoOlLpPu 0123456789-/ ".chars().collect();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..2000 {
            let len = rng.gen_range(0..9);
            let id: String = (0..len)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();

            let trimmed = id.trim();
            let expected = trimmed.len() > 3
                && trimmed.bytes().any(|b| b.is_ascii_digit())
                && !PLACEHOLDER_IDS.iter().any(|p| p.eq_ignore_ascii_case(trimmed));
            assert_eq!(is_plausible_student_id(&id), expected, "id {:?}", id);
        }
    }

    #[test]
    fn policy_parses_from_env_value() {
        assert_eq!(
            "Legacy".parse::<MasterlistPolicy>().unwrap(),
            MasterlistPolicy::Legacy
        );
        assert_eq!(
            "accepted-only".parse::<MasterlistPolicy>().unwrap(),
            MasterlistPolicy::AcceptedOnly
        );
        assert!("all".parse::<MasterlistPolicy>().is_err());
    }
}
