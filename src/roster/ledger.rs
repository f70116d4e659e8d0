//! Scores per (student, activity), kept inside the student records.

use chrono::Utc;

use super::Roster;
use crate::data::score::{rank_rows, Score, ScoreData, ScoreRow};
use crate::data::{from_node, to_fields, ClassScope};
use crate::error::RosterError;
use crate::keys::Key;
use crate::store::{tree, DocumentStore};

impl<S: DocumentStore> Roster<S> {
    /// Records the score of `student` for `activity`, replacing any earlier
    /// one. Neither the student nor the activity is checked for existence.
    /// Without an explicit `graded_at`, saving the same score and feedback
    /// again leaves the record untouched.
    #[tracing::instrument(skip(self, data))]
    pub async fn save_score(
        &self,
        owner: &Key,
        class: &Key,
        student: &Key,
        activity: &Key,
        data: &ScoreData,
    ) -> Result<Score, RosterError> {
        data.validate()?;
        let scope = ClassScope::new(owner, class);
        let path = scope.score(student, activity);

        // Re-saving an unchanged score keeps its original grading time.
        let previous = match self.store.get(&path).await? {
            Some(node) => from_node::<Score>(node).ok(),
            None => None,
        };
        let score = match previous {
            Some(prev) if data.graded_at.is_none() && data.same_grade(&prev) => {
                data.score(prev.graded_at)
            }
            _ => data.score(Utc::now()),
        };

        self.store.update(&path, to_fields(&score)?).await?;
        tracing::debug!("saved score {} for student {}", score.score, student);
        Ok(score)
    }

    /// One row per student of the class, best score first.
    pub async fn scores_for_activity(
        &self,
        owner: &Key,
        class: &Key,
        activity: &Key,
    ) -> Result<Vec<ScoreRow>, RosterError> {
        let scope = ClassScope::new(owner, class);
        let students = self.store.get(&scope.students()).await?;

        let mut rows: Vec<ScoreRow> = tree::children(students)
            .into_iter()
            .map(|(id, node)| ScoreRow::from_student(id, &node, activity.as_str()))
            .collect();
        rank_rows(&mut rows);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::activity::ActivityData;
    use crate::data::student::StudentCreateData;
    use crate::roster::tests::{draft, professor, roster_with};
    use crate::roster::{ActivityDeletePolicy, RosterPolicy};
    use chrono::TimeZone;

    fn graded(score: f64, feedback: &str) -> ScoreData {
        ScoreData {
            score,
            feedback: feedback.to_string(),
            graded_at: Some(Utc.with_ymd_and_hms(2025, 2, 14, 10, 30, 0).unwrap()),
        }
    }

    async fn add(
        roster: &Roster<crate::store::MemoryStore>,
        owner: &Key,
        class: &Key,
        name: &str,
        id: &str,
    ) -> Key {
        let data = StudentCreateData {
            name: name.to_string(),
            student_id: Some(id.to_string()),
        };
        roster.add_student(owner, class, &data).await.unwrap()
    }

    #[tokio::test]
    async fn saving_twice_is_saving_once() {
        let roster = roster_with(RosterPolicy::default());
        let owner = professor();
        let class = roster.create_class(&owner, &draft("Math"), None).await.unwrap();
        let ann = add(&roster, &owner, &class, "Ann", "S1").await;
        let quiz = Key::new("quiz").unwrap();

        roster
            .save_score(&owner, &class, &ann, &quiz, &graded(88.0, "good"))
            .await
            .unwrap();
        let once = roster.store().dump().await;
        roster
            .save_score(&owner, &class, &ann, &quiz, &graded(88.0, "good"))
            .await
            .unwrap();

        assert_eq!(roster.store().dump().await, once);
    }

    #[tokio::test]
    async fn resaving_without_timestamp_keeps_graded_at() {
        let roster = roster_with(RosterPolicy::default());
        let owner = professor();
        let class = roster.create_class(&owner, &draft("Math"), None).await.unwrap();
        let ann = add(&roster, &owner, &class, "Ann", "S1").await;
        let quiz = Key::new("quiz").unwrap();
        let untimed = ScoreData {
            score: 88.0,
            feedback: "good".to_string(),
            graded_at: None,
        };

        let first = roster
            .save_score(&owner, &class, &ann, &quiz, &untimed)
            .await
            .unwrap();
        let once = roster.store().dump().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = roster
            .save_score(&owner, &class, &ann, &quiz, &untimed)
            .await
            .unwrap();

        assert_eq!(second, first);
        assert_eq!(roster.store().dump().await, once);
    }

    #[tokio::test]
    async fn changed_score_gets_new_graded_at() {
        let roster = roster_with(RosterPolicy::default());
        let owner = professor();
        let class = roster.create_class(&owner, &draft("Math"), None).await.unwrap();
        let ann = add(&roster, &owner, &class, "Ann", "S1").await;
        let quiz = Key::new("quiz").unwrap();

        let first = roster
            .save_score(&owner, &class, &ann, &quiz, &graded(70.0, "ok"))
            .await
            .unwrap();
        let regraded = ScoreData {
            score: 75.0,
            feedback: "ok".to_string(),
            graded_at: None,
        };
        let second = roster
            .save_score(&owner, &class, &ann, &quiz, &regraded)
            .await
            .unwrap();

        assert_eq!(second.score, 75.0);
        assert!(second.graded_at > first.graded_at);
    }

    #[tokio::test]
    async fn scores_rank_unscored_last() {
        let roster = roster_with(RosterPolicy::default());
        let owner = professor();
        let class = roster.create_class(&owner, &draft("Math"), None).await.unwrap();
        let a = add(&roster, &owner, &class, "A", "S-A").await;
        let b = add(&roster, &owner, &class, "B", "S-B").await;
        let quiz = roster
            .add_activity(&owner, &class, &ActivityData { title: "Quiz".into() })
            .await
            .unwrap();

        roster
            .save_score(&owner, &class, &a, &quiz, &graded(90.0, "great"))
            .await
            .unwrap();

        let rows = roster.scores_for_activity(&owner, &class, &quiz).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a.as_str());
        assert_eq!(rows[0].score, Some(90.0));
        assert_eq!(rows[0].feedback, "great");
        assert_eq!(rows[1].id, b.as_str());
        assert_eq!(rows[1].score, None);
        assert_eq!(rows[1].feedback, "");
        assert_eq!(rows[1].graded_at, None);
    }

    #[tokio::test]
    async fn later_score_replaces_earlier() {
        let roster = roster_with(RosterPolicy::default());
        let owner = professor();
        let class = roster.create_class(&owner, &draft("Math"), None).await.unwrap();
        let ann = add(&roster, &owner, &class, "Ann", "S1").await;
        let quiz = Key::new("quiz").unwrap();

        roster
            .save_score(&owner, &class, &ann, &quiz, &graded(40.0, "retake"))
            .await
            .unwrap();
        roster
            .save_score(&owner, &class, &ann, &quiz, &graded(75.0, "better"))
            .await
            .unwrap();

        let rows = roster.scores_for_activity(&owner, &class, &quiz).await.unwrap();
        assert_eq!(rows[0].score, Some(75.0));
        assert_eq!(rows[0].feedback, "better");
    }

    #[tokio::test]
    async fn cascade_delete_drops_scores() {
        let roster = roster_with(RosterPolicy::default());
        let owner = professor();
        let class = roster.create_class(&owner, &draft("Math"), None).await.unwrap();
        let ann = add(&roster, &owner, &class, "Ann", "S1").await;
        let bo = add(&roster, &owner, &class, "Bo", "S2").await;
        let quiz = roster
            .add_activity(&owner, &class, &ActivityData { title: "Quiz".into() })
            .await
            .unwrap();
        let exam = roster
            .add_activity(&owner, &class, &ActivityData { title: "Exam".into() })
            .await
            .unwrap();
        roster
            .save_score(&owner, &class, &ann, &quiz, &graded(80.0, ""))
            .await
            .unwrap();
        roster
            .save_score(&owner, &class, &ann, &exam, &graded(70.0, ""))
            .await
            .unwrap();
        let before = roster.store().applied_batches();

        roster.delete_activity(&owner, &class, &quiz).await.unwrap();

        assert_eq!(roster.store().applied_batches(), before + 1);
        let scope = ClassScope::new(&owner, &class);
        assert_eq!(
            roster.store().get(&scope.score(&ann, &quiz)).await.unwrap(),
            None
        );
        assert!(roster
            .store()
            .get(&scope.score(&ann, &exam))
            .await
            .unwrap()
            .is_some());
        assert!(roster.store().get(&scope.student(&bo)).await.unwrap().is_some());

        let activities = roster.list_activities(&owner, &class).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].id, exam.as_str());
    }

    #[tokio::test]
    async fn tombstone_delete_hides_but_keeps_scores() {
        let roster = roster_with(RosterPolicy {
            activity_delete: ActivityDeletePolicy::Tombstone,
            ..Default::default()
        });
        let owner = professor();
        let class = roster.create_class(&owner, &draft("Math"), None).await.unwrap();
        let ann = add(&roster, &owner, &class, "Ann", "S1").await;
        let quiz = roster
            .add_activity(&owner, &class, &ActivityData { title: "Quiz".into() })
            .await
            .unwrap();
        roster
            .save_score(&owner, &class, &ann, &quiz, &graded(95.0, "top"))
            .await
            .unwrap();

        roster.delete_activity(&owner, &class, &quiz).await.unwrap();

        assert!(roster.list_activities(&owner, &class).await.unwrap().is_empty());
        let rows = roster.scores_for_activity(&owner, &class, &quiz).await.unwrap();
        assert_eq!(rows[0].score, Some(95.0));

        let err = roster
            .update_activity(&owner, &class, &quiz, &ActivityData { title: "Again".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn score_for_unknown_student_is_still_written() {
        let roster = roster_with(RosterPolicy::default());
        let owner = professor();
        let class = Key::new("c").unwrap();
        let ghost = Key::new("ghost").unwrap();
        let quiz = Key::new("quiz").unwrap();

        roster
            .save_score(&owner, &class, &ghost, &quiz, &graded(50.0, ""))
            .await
            .unwrap();
        let scope = ClassScope::new(&owner, &class);
        assert!(roster
            .store()
            .get(&scope.score(&ghost, &quiz))
            .await
            .unwrap()
            .is_some());
    }
}
