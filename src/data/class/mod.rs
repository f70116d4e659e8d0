use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::{tree, STUDENTS};

pub mod db;

pub const DEFAULT_THEME_COLOR: &str = "#BB73E0";

fn default_theme_color() -> String {
    DEFAULT_THEME_COLOR.to_string()
}

/// Metadata stored at the class node. Students and activities are children
/// of the same node and are read separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub class_name: String,
    pub section: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default = "default_theme_color")]
    pub theme_color: String,
    pub created_at: DateTime<Utc>,
}

/// A class as listed to its professor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassEntry {
    pub id: String,
    pub class_name: String,
    pub section: String,
    pub semester: String,
    pub theme_color: String,
    pub created_at: DateTime<Utc>,
    pub student_count: usize,
}

impl ClassEntry {
    pub fn from_node(id: String, node: Value) -> Result<ClassEntry, serde_json::Error> {
        let student_count = tree::children(node.get(STUDENTS).cloned()).len();
        let class: Class = serde_json::from_value(node)?;
        Ok(ClassEntry {
            id,
            class_name: class.class_name,
            section: class.section,
            semester: class.semester,
            theme_color: class.theme_color,
            created_at: class.created_at,
            student_count,
        })
    }
}
