//! Classes, students and activities of each professor.
//!
//! Every operation is scoped to the professor that owns the data. Records are
//! written through the [`DocumentStore`], multi-record writes always as one
//! [`WriteBatch`] so that nobody observes them half applied.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::activity::{visible_entries, Activity, ActivityData, ActivityEntry};
use crate::data::class::db::{ClassCreateData, ClassUpdateData};
use crate::data::class::ClassEntry;
use crate::data::student::{
    sort_by_name, Student, StudentCreateData, StudentEntry, StudentUpdateData, PENDING_STUDENT_ID,
};
use crate::data::{
    classes_path, decode_children, from_node, to_fields, to_node, ClassScope, SCORES, STUDENTS,
};
use crate::error::{ConfigurationError, RosterError};
use crate::keys::{choose_student_key, Key, KeyAllocator, StudentKey};
use crate::masterlist::{self, ExtractedStudent, MasterlistPolicy, ValidatedBatch};
use crate::store::{tree, DocumentStore, WriteBatch};

pub mod ledger;

/// What adding a student does when a record with the same student ID exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StudentCollisionPolicy {
    /// The second add fails and the existing record is kept.
    #[default]
    Reject,
    /// Last write wins.
    Overwrite,
}

impl FromStr for StudentCollisionPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(StudentCollisionPolicy::Reject),
            "overwrite" => Ok(StudentCollisionPolicy::Overwrite),
            _ => Err(ConfigurationError::InvalidValue {
                setting: "STUDENT_COLLISION_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

impl Display for StudentCollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentCollisionPolicy::Reject => f.write_str("reject"),
            StudentCollisionPolicy::Overwrite => f.write_str("overwrite"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityDeletePolicy {
    /// Removes the activity and every score recorded for it.
    #[default]
    Cascade,
    /// Marks the activity deleted and keeps its scores.
    Tombstone,
}

impl FromStr for ActivityDeletePolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cascade" => Ok(ActivityDeletePolicy::Cascade),
            "tombstone" => Ok(ActivityDeletePolicy::Tombstone),
            _ => Err(ConfigurationError::InvalidValue {
                setting: "ACTIVITY_DELETE_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

impl Display for ActivityDeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityDeletePolicy::Cascade => f.write_str("cascade"),
            ActivityDeletePolicy::Tombstone => f.write_str("tombstone"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterPolicy {
    pub masterlist: MasterlistPolicy,
    pub student_collision: StudentCollisionPolicy,
    pub activity_delete: ActivityDeletePolicy,
}

#[derive(Debug, Clone)]
pub struct Roster<S> {
    store: S,
    keys: Arc<dyn KeyAllocator>,
    policy: RosterPolicy,
}

fn duplicate_student(id: &str) -> RosterError {
    RosterError::Conflict(format!(
        "A student with ID '{}' is already in this class.",
        id
    ))
}

fn class_not_found(class: &Key) -> RosterError {
    RosterError::NotFound(format!("Class '{}' doesn't exist.", class))
}

impl<S: DocumentStore> Roster<S> {
    pub fn new(store: S, keys: Arc<dyn KeyAllocator>, policy: RosterPolicy) -> Roster<S> {
        Roster {
            store,
            keys,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> RosterPolicy {
        self.policy
    }

    async fn require_class(&self, scope: &ClassScope) -> Result<(), RosterError> {
        match self.store.get(&scope.path().field("className")).await? {
            Some(_) => Ok(()),
            None => Err(class_not_found(scope.class())),
        }
    }

    /// Runs extracted students through validation with the configured policy.
    pub fn validate_masterlist(
        &self,
        candidates: Vec<ExtractedStudent>,
    ) -> Result<ValidatedBatch, RosterError> {
        Ok(masterlist::validate(candidates, self.policy.masterlist)?)
    }

    /// Creates a class, seeded with `students` if given, in a single write.
    #[tracing::instrument(skip(self, draft, students))]
    pub async fn create_class(
        &self,
        owner: &Key,
        draft: &ClassCreateData,
        students: Option<ValidatedBatch>,
    ) -> Result<Key, RosterError> {
        draft.validate()?;

        let class = self.keys.allocate(&classes_path(owner))?;
        let scope = ClassScope::new(owner, &class);
        let now = Utc::now();

        let mut node = to_node(&draft.class(now))?;
        if let Some(batch) = students {
            let mut seeded = Map::new();
            for row in batch.into_rows() {
                let key = self.keys.allocate(&scope.students())?;
                let student = Student::new(&row.name, row.id.as_deref(), now);
                seeded.insert(key.into_string(), to_node(&student)?);
            }
            if !seeded.is_empty() {
                tracing::debug!("seeding class with {} students", seeded.len());
                if let Value::Object(fields) = &mut node {
                    fields.insert(STUDENTS.to_string(), Value::Object(seeded));
                }
            }
        }

        self.store.set(scope.path(), node).await?;
        tracing::info!("created class {}", class);
        Ok(class)
    }

    pub async fn list_classes(&self, owner: &Key) -> Result<Vec<ClassEntry>, RosterError> {
        let node = self.store.get(&classes_path(owner)).await?;
        Ok(project_classes(node))
    }

    pub async fn update_class(
        &self,
        owner: &Key,
        class: &Key,
        patch: &ClassUpdateData,
    ) -> Result<(), RosterError> {
        patch.validate()?;
        let scope = ClassScope::new(owner, class);
        self.require_class(&scope).await?;

        let fields = to_fields(patch)?;
        if !fields.is_empty() {
            self.store.update(&scope.path(), fields).await?;
        }
        Ok(())
    }

    /// Removes the class with all of its students, scores and activities.
    pub async fn delete_class(&self, owner: &Key, class: &Key) -> Result<(), RosterError> {
        let scope = ClassScope::new(owner, class);
        self.store.remove(scope.path()).await?;
        tracing::info!("deleted class {}", class);
        Ok(())
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn add_student(
        &self,
        owner: &Key,
        class: &Key,
        data: &StudentCreateData,
    ) -> Result<Key, RosterError> {
        data.validate()?;
        let scope = ClassScope::new(owner, class);
        self.require_class(&scope).await?;

        let key = choose_student_key(data.student_id.as_deref(), &*self.keys, &scope.students())?;
        let student = Student::new(&data.name, data.student_id.as_deref(), Utc::now());
        let path = scope.student(key.key());
        let node = to_node(&student)?;

        let reject = self.policy.student_collision == StudentCollisionPolicy::Reject;
        // Records under minted keys can carry the same ID, so the key alone
        // doesn't prove uniqueness.
        if reject && self.student_id_taken(&scope, &student.student_id).await? {
            return Err(duplicate_student(&student.student_id));
        }

        match (key, self.policy.student_collision) {
            (StudentKey::External(key), StudentCollisionPolicy::Reject) => {
                if !self.store.create(&path, node).await? {
                    return Err(duplicate_student(key.as_str()));
                }
                Ok(key)
            }
            (key, _) => {
                self.store.set(path, node).await?;
                Ok(key.into_key())
            }
        }
    }

    async fn student_id_taken(&self, scope: &ClassScope, id: &str) -> Result<bool, RosterError> {
        if id == PENDING_STUDENT_ID {
            return Ok(false);
        }
        let students = self.store.get(&scope.students()).await?;
        Ok(decode_children::<Student>(students)
            .iter()
            .any(|(_, it)| it.student_id == id))
    }

    pub async fn update_student(
        &self,
        owner: &Key,
        class: &Key,
        student: &Key,
        patch: &StudentUpdateData,
    ) -> Result<(), RosterError> {
        patch.validate()?;
        let scope = ClassScope::new(owner, class);
        let path = scope.student(student);
        if self.store.get(&path).await?.is_none() {
            return Err(RosterError::NotFound(format!(
                "Student '{}' doesn't exist.",
                student
            )));
        }

        let mut patch = patch.clone();
        if let Some(id) = patch.student_id.as_mut() {
            *id = id.trim().to_string();
            if id.is_empty() {
                *id = PENDING_STUDENT_ID.to_string();
            }
        }

        let fields = to_fields(&patch)?;
        if !fields.is_empty() {
            self.store.update(&path, fields).await?;
        }
        Ok(())
    }

    /// Removes the student together with their scores.
    pub async fn delete_student(
        &self,
        owner: &Key,
        class: &Key,
        student: &Key,
    ) -> Result<(), RosterError> {
        let scope = ClassScope::new(owner, class);
        self.store.remove(scope.student(student)).await?;
        Ok(())
    }

    /// Students sorted by name.
    pub async fn list_students(
        &self,
        owner: &Key,
        class: &Key,
    ) -> Result<Vec<StudentEntry>, RosterError> {
        let scope = ClassScope::new(owner, class);
        let mut students = project_students(self.store.get(&scope.students()).await?);
        sort_by_name(&mut students);
        Ok(students)
    }

    pub async fn add_activity(
        &self,
        owner: &Key,
        class: &Key,
        data: &ActivityData,
    ) -> Result<Key, RosterError> {
        data.validate()?;
        let scope = ClassScope::new(owner, class);
        self.require_class(&scope).await?;

        let key = self.keys.allocate(&scope.activities())?;
        let activity = Activity {
            title: data.title.trim().to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        };
        self.store
            .set(scope.activity(&key), to_node(&activity)?)
            .await?;
        Ok(key)
    }

    async fn find_activity(
        &self,
        scope: &ClassScope,
        activity: &Key,
    ) -> Result<Option<Activity>, RosterError> {
        let found = match self.store.get(&scope.activity(activity)).await? {
            Some(node) => from_node::<Activity>(node)?,
            None => return Ok(None),
        };
        Ok(Some(found).filter(|it| !it.is_deleted()))
    }

    pub async fn activity(
        &self,
        owner: &Key,
        class: &Key,
        activity: &Key,
    ) -> Result<ActivityEntry, RosterError> {
        let scope = ClassScope::new(owner, class);
        match self.find_activity(&scope, activity).await? {
            Some(found) => Ok(ActivityEntry {
                id: activity.to_string(),
                title: found.title,
                created_at: found.created_at,
            }),
            None => Err(RosterError::NotFound(format!(
                "Activity '{}' doesn't exist.",
                activity
            ))),
        }
    }

    pub async fn update_activity(
        &self,
        owner: &Key,
        class: &Key,
        activity: &Key,
        data: &ActivityData,
    ) -> Result<(), RosterError> {
        data.validate()?;
        let scope = ClassScope::new(owner, class);
        if self.find_activity(&scope, activity).await?.is_none() {
            return Err(RosterError::NotFound(format!(
                "Activity '{}' doesn't exist.",
                activity
            )));
        }

        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::from(data.title.trim()));
        self.store.update(&scope.activity(activity), fields).await?;
        Ok(())
    }

    /// Deletes an activity following the configured [`ActivityDeletePolicy`].
    #[tracing::instrument(skip(self))]
    pub async fn delete_activity(
        &self,
        owner: &Key,
        class: &Key,
        activity: &Key,
    ) -> Result<(), RosterError> {
        let scope = ClassScope::new(owner, class);

        match self.policy.activity_delete {
            ActivityDeletePolicy::Cascade => {
                let students = self.store.get(&scope.students()).await?;
                let mut batch = WriteBatch::new();
                batch.remove(scope.activity(activity));
                for (student, node) in tree::children(students) {
                    let scored = node
                        .get(SCORES)
                        .and_then(|it| it.get(activity.as_str()))
                        .is_some();
                    if scored {
                        batch.remove(scope.score(&Key::new(student)?, activity));
                    }
                }
                tracing::debug!("removing activity with {} scores", batch.len() - 1);
                self.store.apply(batch).await?;
            }
            ActivityDeletePolicy::Tombstone => {
                if self.find_activity(&scope, activity).await?.is_some() {
                    let mut fields = Map::new();
                    fields.insert("deletedAt".to_string(), to_node(&Utc::now())?);
                    self.store.update(&scope.activity(activity), fields).await?;
                }
            }
        }
        Ok(())
    }

    /// Activities newest first, deleted ones left out.
    pub async fn list_activities(
        &self,
        owner: &Key,
        class: &Key,
    ) -> Result<Vec<ActivityEntry>, RosterError> {
        let scope = ClassScope::new(owner, class);
        Ok(project_activities(
            self.store.get(&scope.activities()).await?,
        ))
    }

    /// Adds every row of `batch` to the class under freshly minted keys, all in
    /// one write. Returns how many students were added.
    #[tracing::instrument(skip(self, batch))]
    pub async fn save_masterlist(
        &self,
        owner: &Key,
        class: &Key,
        batch: ValidatedBatch,
    ) -> Result<usize, RosterError> {
        let scope = ClassScope::new(owner, class);
        self.require_class(&scope).await?;

        let now = Utc::now();
        let mut writes = WriteBatch::new();
        for row in batch.rows() {
            let key = self.keys.allocate(&scope.students())?;
            let student = Student::new(&row.name, row.id.as_deref(), now);
            writes.set(scope.student(&key), to_node(&student)?);
        }

        let count = writes.len();
        self.store.apply(writes).await?;
        tracing::info!(
            "saved {} students ({} with valid IDs)",
            count,
            batch.accepted()
        );
        Ok(count)
    }

    /// Validates extracted students and saves them to the class.
    pub async fn import_masterlist(
        &self,
        owner: &Key,
        class: &Key,
        candidates: Vec<ExtractedStudent>,
    ) -> Result<usize, RosterError> {
        let batch = self.validate_masterlist(candidates)?;
        self.save_masterlist(owner, class, batch).await
    }
}

/// Classes node projected to entries in key order.
pub fn project_classes(node: Option<Value>) -> Vec<ClassEntry> {
    tree::children(node)
        .into_iter()
        .filter_map(|(id, node)| match ClassEntry::from_node(id.clone(), node) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("unable to decode class '{}': {}", id, e);
                None
            }
        })
        .collect()
}

/// Students node projected to entries in key order.
pub fn project_students(node: Option<Value>) -> Vec<StudentEntry> {
    decode_children::<Student>(node)
        .into_iter()
        .map(|(id, student)| StudentEntry::new(id, student))
        .collect()
}

pub fn project_activities(node: Option<Value>) -> Vec<ActivityEntry> {
    visible_entries(decode_children::<Activity>(node))
}
