use rocket::serde::json::Json;
use rocket::State;

use crate::data::score::{Score, ScoreData, ScoreRow};
use crate::keys::Key;
use crate::resp::jwt::Professor;
use crate::resp::problem::Problem;
use crate::route::RosterState;

/// Every student of the class with their score for the activity, best first.
/// Unscored students come last with a null score.
#[utoipa::path(
    params(
        ("class" = String, Path, description = "Class key"),
        ("activity" = String, Path, description = "Activity key")
    ),
    responses((status = 200, description = "Ranked scores", body = [ScoreRow])),
    security(("jwt" = []))
)]
#[get("/classes/<class>/activities/<activity>/scores")]
#[tracing::instrument(skip(roster))]
pub async fn score_list(
    professor: Professor,
    class: Key,
    activity: Key,
    roster: &State<RosterState>,
) -> Result<Json<Vec<ScoreRow>>, Problem> {
    let rows = roster
        .scores_for_activity(professor.key(), &class, &activity)
        .await?;
    Ok(Json(rows))
}

#[utoipa::path(
    request_body = ScoreData,
    params(
        ("class" = String, Path, description = "Class key"),
        ("student" = String, Path, description = "Student key"),
        ("activity" = String, Path, description = "Activity key")
    ),
    responses(
        (status = 200, description = "Score saved", body = Score),
        (status = 400, body = Problem)
    ),
    security(("jwt" = []))
)]
#[put(
    "/classes/<class>/students/<student>/scores/<activity>",
    format = "application/json",
    data = "<score>"
)]
#[tracing::instrument(skip(roster))]
pub async fn score_save(
    professor: Professor,
    class: Key,
    student: Key,
    activity: Key,
    score: Json<ScoreData>,
    roster: &State<RosterState>,
) -> Result<Json<Score>, Problem> {
    let saved = roster
        .save_score(professor.key(), &class, &student, &activity, &score)
        .await?;
    Ok(Json(saved))
}
