use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::RosterError;

/// Stored in place of a student ID nobody has provided yet.
pub const PENDING_STUDENT_ID: &str = "Pending";

fn pending() -> String {
    PENDING_STUDENT_ID.to_string()
}

/// Student node without its nested scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub name: String,
    #[serde(default = "pending")]
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl Student {
    pub fn new(name: &str, student_id: Option<&str>, added_at: DateTime<Utc>) -> Student {
        let student_id = student_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(pending, str::to_string);
        Student {
            name: name.trim().to_string(),
            student_id,
            added_at: Some(added_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentEntry {
    pub id: String,
    pub name: String,
    pub student_id: String,
    pub added_at: Option<DateTime<Utc>>,
}

impl StudentEntry {
    pub fn new(id: String, student: Student) -> StudentEntry {
        StudentEntry {
            id,
            name: student.name,
            student_id: student.student_id,
            added_at: student.added_at,
        }
    }
}

/// Orders by name ignoring case, then by key.
pub fn sort_by_name(students: &mut [StudentEntry]) {
    students.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentCreateData {
    pub name: String,
    #[serde(default)]
    pub student_id: Option<String>,
}

impl StudentCreateData {
    pub fn validate(&self) -> Result<(), RosterError> {
        if self.name.trim().is_empty() {
            return Err(RosterError::Precondition(
                "Student name can't be blank.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl StudentUpdateData {
    pub fn validate(&self) -> Result<(), RosterError> {
        if self.name.as_deref().map_or(false, |it| it.trim().is_empty()) {
            return Err(RosterError::Precondition(
                "Student name can't be blank.".to_string(),
            ));
        }
        Ok(())
    }
}
