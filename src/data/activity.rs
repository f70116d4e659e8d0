use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::RosterError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Set when the activity was deleted with the tombstone policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Visible activities, newest first. Same timestamps fall back to key order,
/// also descending, which keeps push keys in creation order.
pub fn visible_entries(activities: Vec<(String, Activity)>) -> Vec<ActivityEntry> {
    let mut entries: Vec<ActivityEntry> = activities
        .into_iter()
        .filter(|(_, activity)| !activity.is_deleted())
        .map(|(id, activity)| ActivityEntry {
            id,
            title: activity.title,
            created_at: activity.created_at,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    entries
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityData {
    pub title: String,
}

impl ActivityData {
    pub fn validate(&self) -> Result<(), RosterError> {
        if self.title.trim().is_empty() {
            return Err(RosterError::Precondition(
                "Activity title can't be blank.".to_string(),
            ));
        }
        Ok(())
    }
}
