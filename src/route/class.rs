use rocket::form::Form;
use rocket::response::status;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::{Shutdown, State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ai::AiClient;
use crate::data::class::db::{ClassCreateData, ClassUpdateData};
use crate::data::class::ClassEntry;
use crate::keys::Key;
use crate::masterlist::{ExtractedStudent, ValidatedBatch};
use crate::resp::jwt::Professor;
use crate::resp::problem::Problem;
use crate::route::{read_upload, Created, FileUpload, RosterState};

/// Class details, optionally with the students of a reviewed masterlist.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewClass {
    #[serde(flatten)]
    pub class: ClassCreateData,
    #[serde(default)]
    pub students: Vec<ExtractedStudent>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MasterlistSaved {
    /// Students written to the class.
    pub saved: usize,
    /// Students that came with a plausible ID.
    pub accepted: usize,
    pub total: usize,
}

#[utoipa::path(
    responses(
        (status = 200, description = "Classes of the professor", body = [ClassEntry]),
        (status = 401, body = Problem)
    ),
    security(("jwt" = []))
)]
#[get("/classes")]
#[tracing::instrument(skip(roster))]
pub async fn class_list(
    professor: Professor,
    roster: &State<RosterState>,
) -> Result<Json<Vec<ClassEntry>>, Problem> {
    Ok(Json(roster.list_classes(professor.key()).await?))
}

#[utoipa::path(
    request_body = NewClass,
    responses(
        (status = 201, description = "Class created", body = Created),
        (status = 400, body = Problem),
        (status = 422, description = "Masterlist has no student IDs", body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/classes", format = "application/json", data = "<class>")]
#[tracing::instrument(skip(roster))]
pub async fn class_create(
    professor: Professor,
    class: Json<NewClass>,
    roster: &State<RosterState>,
) -> Result<status::Created<Json<Created>>, Problem> {
    let NewClass { class, students } = class.into_inner();

    // A class may be created empty; a masterlist, if sent, has to pass.
    let batch = if students.is_empty() {
        None
    } else {
        Some(roster.validate_masterlist(students)?)
    };

    let key = roster.create_class(professor.key(), &class, batch).await?;
    Ok(status::Created::new(format!("/api/v1/classes/{}", key)).body(Json(key.into())))
}

#[utoipa::path(
    request_body = ClassUpdateData,
    params(("class" = String, Path, description = "Class key")),
    responses(
        (status = 200, description = "Class updated"),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    ),
    security(("jwt" = []))
)]
#[put("/classes/<class>", format = "application/json", data = "<patch>")]
#[tracing::instrument(skip(roster))]
pub async fn class_update(
    professor: Professor,
    class: Key,
    patch: Json<ClassUpdateData>,
    roster: &State<RosterState>,
) -> Result<(), Problem> {
    roster.update_class(professor.key(), &class, &patch).await?;
    Ok(())
}

#[utoipa::path(
    params(("class" = String, Path, description = "Class key")),
    responses((status = 200, description = "Class and everything in it removed")),
    security(("jwt" = []))
)]
#[delete("/classes/<class>")]
#[tracing::instrument(skip(roster))]
pub async fn class_delete(
    professor: Professor,
    class: Key,
    roster: &State<RosterState>,
) -> Result<(), Problem> {
    roster.delete_class(professor.key(), &class).await?;
    Ok(())
}

/// Streams the full class list every time it changes.
#[utoipa::path(
    responses(
        (status = 200, description = "`classes` events carrying the whole list",
            content_type = "text/event-stream", body = [ClassEntry])
    ),
    security(("jwt" = []))
)]
#[get("/classes/live")]
pub fn class_live(
    professor: Professor,
    roster: &State<RosterState>,
    mut shutdown: Shutdown,
) -> EventStream![] {
    let mut live = roster.watch_classes(professor.key());
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
                Ok(classes) => yield Event::json(&classes).event("classes"),
                Err(e) => {
                    tracing::error!("live class list failed: {}", e);
                    yield Event::data(e.to_string()).event("error");
                }
            }
        }
    }
}

/// Sends a masterlist scan to the AI and returns the validated rows for
/// review. Nothing is saved.
#[utoipa::path(
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Students read from the masterlist", body = ValidatedBatch),
        (status = 422, description = "No student IDs found", body = Problem),
        (status = 502, description = "AI server unavailable", body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/masterlist/extract", format = "multipart/form-data", data = "<upload>")]
#[tracing::instrument(skip(upload, roster, ai))]
pub async fn masterlist_extract(
    _professor: Professor,
    upload: Form<FileUpload<'_>>,
    roster: &State<RosterState>,
    ai: &State<AiClient>,
) -> Result<Json<ValidatedBatch>, Problem> {
    let upload = read_upload(&upload.file).await?;
    let candidates = ai.extract_masterlist(upload).await?;
    Ok(Json(roster.validate_masterlist(candidates)?))
}

/// Extracts a masterlist and adds its students to an existing class.
#[utoipa::path(
    request_body(content = FileUpload, content_type = "multipart/form-data"),
    params(("class" = String, Path, description = "Class key")),
    responses(
        (status = 200, description = "Students added", body = MasterlistSaved),
        (status = 404, body = Problem),
        (status = 422, description = "No student IDs found", body = Problem),
        (status = 502, description = "AI server unavailable", body = Problem)
    ),
    security(("jwt" = []))
)]
#[post("/classes/<class>/masterlist", format = "multipart/form-data", data = "<upload>")]
#[tracing::instrument(skip(upload, roster, ai))]
pub async fn masterlist_save(
    professor: Professor,
    class: Key,
    upload: Form<FileUpload<'_>>,
    roster: &State<RosterState>,
    ai: &State<AiClient>,
) -> Result<Json<MasterlistSaved>, Problem> {
    let upload = read_upload(&upload.file).await?;
    let candidates = ai.extract_masterlist(upload).await?;
    let batch = roster.validate_masterlist(candidates)?;
    let (accepted, total) = (batch.accepted(), batch.total());
    let saved = roster.save_masterlist(professor.key(), &class, batch).await?;
    Ok(Json(MasterlistSaved {
        saved,
        accepted,
        total,
    }))
}
