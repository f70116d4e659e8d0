use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{default_theme_color, Class};
use crate::error::RosterError;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassCreateData {
    pub class_name: String,
    pub section: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default = "default_theme_color")]
    pub theme_color: String,
}

impl ClassCreateData {
    pub fn validate(&self) -> Result<(), RosterError> {
        if self.class_name.trim().is_empty() || self.section.trim().is_empty() {
            return Err(RosterError::Precondition(
                "Please fill in class name and section.".to_string(),
            ));
        }
        Ok(())
    }

    pub fn class(&self, created_at: DateTime<Utc>) -> Class {
        Class {
            class_name: self.class_name.trim().to_string(),
            section: self.section.trim().to_string(),
            semester: self.semester.clone(),
            theme_color: self.theme_color.clone(),
            created_at,
        }
    }
}

/// Partial class update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
}

impl ClassUpdateData {
    pub fn validate(&self) -> Result<(), RosterError> {
        let blank = |it: &Option<String>| it.as_deref().map_or(false, |s| s.trim().is_empty());
        if blank(&self.class_name) || blank(&self.section) {
            return Err(RosterError::Precondition(
                "Class name and section can't be blank.".to_string(),
            ));
        }
        Ok(())
    }
}
