use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::response::status;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::{Shutdown, State};
use utoipa::ToSchema;

use crate::ai::{default_rubric, AiClient, GradeResult};
use crate::data::activity::{ActivityData, ActivityEntry};
use crate::keys::Key;
use crate::resp::jwt::Professor;
use crate::resp::problem::Problem;
use crate::route::{read_upload, Created, RosterState};

/// An exam paper, with an optional rubric overriding the default one.
#[derive(Debug, FromForm, ToSchema)]
pub struct ExamUpload<'r> {
    #[schema(value_type = String, format = Binary)]
    pub file: TempFile<'r>,
    pub rubric: Option<String>,
}

#[utoipa::path(
    params(("class" = String, Path, description = "Class key")),
    responses((status = 200, description = "Activities, newest first", body = [ActivityEntry])),
    security(("jwt" = []))
)]
#[get("/classes/<class>/activities")]
#[tracing::instrument(skip(roster))]
pub async fn activity_list(
    professor: Professor,
    class: Key,
    roster: &State<RosterState>,
) -> Result<Json<Vec<ActivityEntry>>, Problem> {
    Ok(Json(roster.list_activities(professor.key(), &class).await?))
}

#[utoipa::path(
    request_body = ActivityData,
    params(("class" = String, Path, description = "Class key")),
    responses(
        (status = 201, description = "Activity added", body = Created),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/classes/<class>/activities", format = "application/json", data = "<activity>")]
#[tracing::instrument(skip(roster))]
pub async fn activity_add(
    professor: Professor,
    class: Key,
    activity: Json<ActivityData>,
    roster: &State<RosterState>,
) -> Result<status::Created<Json<Created>>, Problem> {
    let key = roster
        .add_activity(professor.key(), &class, &activity)
        .await?;
    let location = format!("/api/v1/classes/{}/activities/{}", class, key);
    Ok(status::Created::new(location).body(Json(key.into())))
}

#[utoipa::path(
    request_body = ActivityData,
    params(
        ("class" = String, Path, description = "Class key"),
        ("activity" = String, Path, description = "Activity key")
    ),
    responses(
        (status = 200, description = "Activity renamed"),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[put(
    "/classes/<class>/activities/<activity>",
    format = "application/json",
    data = "<data>"
)]
#[tracing::instrument(skip(roster))]
pub async fn activity_update(
    professor: Professor,
    class: Key,
    activity: Key,
    data: Json<ActivityData>,
    roster: &State<RosterState>,
) -> Result<(), Problem> {
    roster
        .update_activity(professor.key(), &class, &activity, &data)
        .await?;
    Ok(())
}

#[utoipa::path(
    params(
        ("class" = String, Path, description = "Class key"),
        ("activity" = String, Path, description = "Activity key")
    ),
    responses((status = 200, description = "Activity removed")),
    security(("jwt" = []))
)]
#[delete("/classes/<class>/activities/<activity>")]
#[tracing::instrument(skip(roster))]
pub async fn activity_delete(
    professor: Professor,
    class: Key,
    activity: Key,
    roster: &State<RosterState>,
) -> Result<(), Problem> {
    roster
        .delete_activity(professor.key(), &class, &activity)
        .await?;
    Ok(())
}

#[utoipa::path(
    params(("class" = String, Path, description = "Class key")),
    responses(
        (status = 200, description = "`activities` events carrying the whole list",
            content_type = "text/event-stream", body = [ActivityEntry])
    ),
    security(("jwt" = []))
)]
#[get("/classes/<class>/activities/live")]
pub fn activity_live(
    professor: Professor,
    class: Key,
    roster: &State<RosterState>,
    mut shutdown: Shutdown,
) -> EventStream![] {
    let mut live = roster.watch_activities(professor.key(), &class);
    EventStream! {
        loop {
            let snapshot = select! {
                next = live.next() => match next {
                    Some(it) => it,
                    None => break,
                },
                _ = &mut shutdown => break,
            };
            match snapshot {
                Ok(activities) => yield Event::json(&activities).event("activities"),
                Err(e) => {
                    tracing::error!("live activities of {} failed: {}", live.path(), e);
                    yield Event::data(e.to_string()).event("error");
                }
            }
        }
    }
}

/// Has the AI grade an exam paper for the activity. The result is only a
/// suggestion; it is stored once the professor saves it as a score.
#[utoipa::path(
    request_body(content = ExamUpload, content_type = "multipart/form-data"),
    params(
        ("class" = String, Path, description = "Class key"),
        ("activity" = String, Path, description = "Activity key")
    ),
    responses(
        (status = 200, description = "Suggested grade", body = GradeResult),
        (status = 404, body = Problem),
        (status = 502, description = "AI server unavailable", body = Problem)
    ),
    security(("jwt" = []))
)]
#[post(
    "/classes/<class>/activities/<activity>/grade",
    format = "multipart/form-data",
    data = "<upload>"
)]
#[tracing::instrument(skip(upload, roster, ai))]
pub async fn activity_grade(
    professor: Professor,
    class: Key,
    activity: Key,
    upload: Form<ExamUpload<'_>>,
    roster: &State<RosterState>,
    ai: &State<AiClient>,
) -> Result<Json<GradeResult>, Problem> {
    let found = roster.activity(professor.key(), &class, &activity).await?;
    let rubric = match upload.rubric.as_deref().map(str::trim) {
        Some(rubric) if !rubric.is_empty() => rubric.to_string(),
        _ => default_rubric(&found.title),
    };

    let paper = read_upload(&upload.file).await?;
    Ok(Json(ai.grade(paper, &rubric).await?))
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::Value;

    use crate::route::tests::{bearer, client, multipart};

    async fn new_class(client: &Client) -> String {
        let created: Value = client
            .post("/api/v1/classes")
            .header(bearer("prof-1"))
            .header(ContentType::JSON)
            .body(r#"{"className": "Physics", "section": "A"}"#)
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        created["id"].as_str().unwrap().to_string()
    }

    async fn activities(client: &Client, class: &str) -> Value {
        client
            .get(format!("/api/v1/classes/{}/activities", class))
            .header(bearer("prof-1"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap()
    }

    #[rocket::async_test]
    async fn activity_lifecycle() {
        let client = client().await;
        let class = new_class(&client).await;

        let response = client
            .post(format!("/api/v1/classes/{}/activities", class))
            .header(bearer("prof-1"))
            .header(ContentType::JSON)
            .body(r#"{"title": "Quiz 1"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let created: Value = response.into_json().await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let response = client
            .put(format!("/api/v1/classes/{}/activities/{}", class, id))
            .header(bearer("prof-1"))
            .header(ContentType::JSON)
            .body(r#"{"title": "Quiz 1 (retake)"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(activities(&client, &class).await[0]["title"], "Quiz 1 (retake)");

        let response = client
            .delete(format!("/api/v1/classes/{}/activities/{}", class, id))
            .header(bearer("prof-1"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(activities(&client, &class).await, Value::Array(vec![]));
    }

    #[rocket::async_test]
    async fn blank_title_is_rejected() {
        let client = client().await;
        let class = new_class(&client).await;
        let response = client
            .post(format!("/api/v1/classes/{}/activities", class))
            .header(bearer("prof-1"))
            .header(ContentType::JSON)
            .body(r#"{"title": " "}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn grading_unknown_activity_is_not_found() {
        let client = client().await;
        let class = new_class(&client).await;
        let (content_type, body) = multipart("exam.pdf", "application/pdf", &[]);
        let response = client
            .post(format!("/api/v1/classes/{}/activities/nope/grade", class))
            .header(bearer("prof-1"))
            .header(content_type)
            .body(body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn grading_reports_unreachable_ai() {
        let client = client().await;
        let class = new_class(&client).await;
        let created: Value = client
            .post(format!("/api/v1/classes/{}/activities", class))
            .header(bearer("prof-1"))
            .header(ContentType::JSON)
            .body(r#"{"title": "Midterm"}"#)
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let (content_type, body) =
            multipart("exam.pdf", "application/pdf", &[("rubric", "Be strict.")]);
        let response = client
            .post(format!("/api/v1/classes/{}/activities/{}/grade", class, id))
            .header(bearer("prof-1"))
            .header(content_type)
            .body(body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadGateway);
    }
}
