//! Records of the roster tree and where they live:
//!
//! ```text
//! professors/{profId}/classes/{classId}/
//!   className, section, semester, themeColor, createdAt
//!   students/{studentKey}/ name, studentId, addedAt
//!     scores/{activityId}/ score, feedback, gradedAt
//!   activities/{activityId}/ title, createdAt, deletedAt?
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::keys::Key;
use crate::store::{tree, Path, StoreError};

pub mod activity;
pub mod class;
pub mod score;
pub mod student;

pub const PROFESSORS: &str = "professors";
pub const CLASSES: &str = "classes";
pub const STUDENTS: &str = "students";
pub const ACTIVITIES: &str = "activities";
pub const SCORES: &str = "scores";

pub fn classes_path(owner: &Key) -> Path {
    Path::root().field(PROFESSORS).child(owner).field(CLASSES)
}

/// A class of one professor; builds the paths of everything inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassScope {
    owner: Key,
    class: Key,
}

impl ClassScope {
    pub fn new(owner: &Key, class: &Key) -> ClassScope {
        ClassScope {
            owner: owner.clone(),
            class: class.clone(),
        }
    }

    pub fn owner(&self) -> &Key {
        &self.owner
    }

    pub fn class(&self) -> &Key {
        &self.class
    }

    pub fn path(&self) -> Path {
        classes_path(&self.owner).child(&self.class)
    }

    pub fn students(&self) -> Path {
        self.path().field(STUDENTS)
    }

    pub fn student(&self, student: &Key) -> Path {
        self.students().child(student)
    }

    pub fn activities(&self) -> Path {
        self.path().field(ACTIVITIES)
    }

    pub fn activity(&self, activity: &Key) -> Path {
        self.activities().child(activity)
    }

    pub fn score(&self, student: &Key, activity: &Key) -> Path {
        self.student(student).field(SCORES).child(activity)
    }
}

/// Serializes a record into a store node.
pub fn to_node<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(record)?)
}

pub fn from_node<T: DeserializeOwned>(node: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(node)?)
}

/// Serializes a patch into the fields it sets. `None` fields are skipped by
/// the patch types, so only provided fields end up in the map.
pub fn to_fields<T: Serialize>(patch: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(patch)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Children of a collection node decoded as `T`. Children that don't decode
/// are logged and skipped.
pub fn decode_children<T: DeserializeOwned>(node: Option<Value>) -> Vec<(String, T)> {
    tree::children(node)
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<T>(value) {
            Ok(record) => Some((key, record)),
            Err(e) => {
                tracing::warn!("unable to decode record '{}': {}", key, e);
                None
            }
        })
        .collect()
}
