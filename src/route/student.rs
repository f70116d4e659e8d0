use rocket::response::status;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::{Shutdown, State};

use crate::data::student::{StudentCreateData, StudentEntry, StudentUpdateData};
use crate::keys::Key;
use crate::resp::jwt::Professor;
use crate::resp::problem::Problem;
use crate::route::{Created, RosterState};

#[utoipa::path(
    params(("class" = String, Path, description = "Class key")),
    responses((status = 200, description = "Students sorted by name", body = [StudentEntry])),
    security(("jwt" = []))
)]
#[get("/classes/<class>/students")]
#[tracing::instrument(skip(roster))]
pub async fn student_list(
    professor: Professor,
    class: Key,
    roster: &State<RosterState>,
) -> Result<Json<Vec<StudentEntry>>, Problem> {
    Ok(Json(roster.list_students(professor.key(), &class).await?))
}

/// Adds a student. A given student ID becomes the record key.
#[utoipa::path(
    request_body = StudentCreateData,
    params(("class" = String, Path, description = "Class key")),
    responses(
        (status = 201, description = "Student added", body = Created),
        (status = 400, body = Problem),
        (status = 404, body = Problem),
        (status = 409, description = "Student ID already taken", body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/classes/<class>/students", format = "application/json", data = "<student>")]
#[tracing::instrument(skip(roster))]
pub async fn student_add(
    professor: Professor,
    class: Key,
    student: Json<StudentCreateData>,
    roster: &State<RosterState>,
) -> Result<status::Created<Json<Created>>, Problem> {
    let key = roster.add_student(professor.key(), &class, &student).await?;
    let location = format!("/api/v1/classes/{}/students/{}", class, key);
    Ok(status::Created::new(location).body(Json(key.into())))
}

#[utoipa::path(
    request_body = StudentUpdateData,
    params(
        ("class" = String, Path, description = "Class key"),
        ("student" = String, Path, description = "Student key")
    ),
    responses(
        (status = 200, description = "Student updated"),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[put(
    "/classes/<class>/students/<student>",
    format = "application/json",
    data = "<patch>"
)]
#[tracing::instrument(skip(roster))]
pub async fn student_update(
    professor: Professor,
    class: Key,
    student: Key,
    patch: Json<StudentUpdateData>,
    roster: &State<RosterState>,
) -> Result<(), Problem> {
    roster
        .update_student(professor.key(), &class, &student, &patch)
        .await?;
    Ok(())
}

#[utoipa::path(
    params(
        ("class" = String, Path, description = "Class key"),
        ("student" = String, Path, description = "Student key")
    ),
    responses((status = 200, description = "Student and their scores removed")),
    security(("jwt" = []))
)]
#[delete("/classes/<class>/students/<student>")]
#[tracing::instrument(skip(roster))]
pub async fn student_delete(
    professor: Professor,
    class: Key,
    student: Key,
    roster: &State<RosterState>,
) -> Result<(), Problem> {
    roster
        .delete_student(professor.key(), &class, &student)
        .await?;
    Ok(())
}

#[utoipa::path(
    params(("class" = String, Path, description = "Class key")),
    responses(
        (status = 200, description = "`students` events carrying the whole roster",
            content_type = "text/event-stream", body = [StudentEntry])
    ),
    security(("jwt" = []))
)]
#[get("/classes/<class>/students/live")]
pub fn student_live(
    professor: Professor,
    class: Key,
    roster: &State<RosterState>,
    mut shutdown: Shutdown,
) -> EventStream![] {
    let mut live = roster.watch_students(professor.key(), &class);
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
                Ok(students) => yield Event::json(&students).event("students"),
                Err(e) => {
                    tracing::error!("live roster of {} failed: {}", live.path(), e);
                    yield Event::data(e.to_string()).event("error");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};

    use crate::route::tests::{bearer, client};

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

    async fn add(client: &Client, class: &str, body: Value) -> Status {
        client
            .post(format!("/api/v1/classes/{}/students", class))
            .header(bearer("prof-1"))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
            .status()
    }

    #[rocket::async_test]
    async fn students_sorted_by_name() {
        let client = client().await;
        let class = new_class(&client).await;

        assert_eq!(
            add(&client, &class, json!({"name": "zoe", "studentId": "2023-0002"})).await,
            Status::Created
        );
        assert_eq!(
            add(&client, &class, json!({"name": "Adam"})).await,
            Status::Created
        );

        let students: Value = client
            .get(format!("/api/v1/classes/{}/students", class))
            .header(bearer("prof-1"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(students[0]["name"], "Adam");
        assert_eq!(students[0]["studentId"], "Pending");
        assert_eq!(students[1]["id"], "2023-0002");
    }

    #[rocket::async_test]
    async fn duplicate_student_id_conflicts() {
        let client = client().await;
        let class = new_class(&client).await;
        let body = json!({"name": "Ana", "studentId": "2023-0001"});

        assert_eq!(add(&client, &class, body.clone()).await, Status::Created);
        assert_eq!(add(&client, &class, body).await, Status::Conflict);
    }

    #[rocket::async_test]
    async fn student_needs_existing_class() {
        let client = client().await;
        let status = add(&client, "missing", json!({"name": "Ana"})).await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn unknown_student_update_is_not_found() {
        let client = client().await;
        let class = new_class(&client).await;
        let response = client
            .put(format!("/api/v1/classes/{}/students/nobody", class))
            .header(bearer("prof-1"))
            .header(ContentType::JSON)
            .body(r#"{"name": "Ghost"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let problem: Value = response.into_json().await.unwrap();
        assert_eq!(problem["kind"], "not-found");
    }

    #[rocket::async_test]
    async fn unusable_student_id_gets_minted_key() {
        let client = client().await;
        let class = new_class(&client).await;
        let status = add(&client, &class, json!({"name": "Ana", "studentId": "2023.01"})).await;
        assert_eq!(status, Status::Created);

        let students: Value = client
            .get(format!("/api/v1/classes/{}/students", class))
            .header(bearer("prof-1"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(students[0]["studentId"], "2023.01");
        assert_ne!(students[0]["id"], "2023.01");
    }

    #[rocket::async_test]
    async fn removed_student_disappears() {
        let client = client().await;
        let class = new_class(&client).await;
        add(&client, &class, json!({"name": "Ana", "studentId": "s1"})).await;

        let response = client
            .delete(format!("/api/v1/classes/{}/students/s1", class))
            .header(bearer("prof-1"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let students: Value = client
            .get(format!("/api/v1/classes/{}/students", class))
            .header(bearer("prof-1"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(students, json!([]));
    }
}
