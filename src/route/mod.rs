use std::collections::BTreeMap;

use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::request::FromParam;
use rocket::tokio::io::AsyncReadExt;
use rocket::{Build, Request, Rocket, Route};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod activity;
pub mod class;
pub mod score;
pub mod student;

use activity::*;
use class::*;
use score::*;
use student::*;

use crate::ai::{GradeResult, Upload};
use crate::data::activity::{ActivityData, ActivityEntry};
use crate::data::class::db::{ClassCreateData, ClassUpdateData};
use crate::data::class::ClassEntry;
use crate::data::score::{Score, ScoreData, ScoreRow};
use crate::data::student::{StudentCreateData, StudentEntry, StudentUpdateData};
use crate::keys::{Key, KeyError};
use crate::masterlist::{ExtractedStudent, ValidatedBatch};
use crate::resp::jwt::{auth_problem, doc::JWTAuth};
use crate::resp::problem::{problems, Problem};
use crate::roster::Roster;
use crate::store::AnyStore;

pub type RosterState = Roster<AnyStore>;

#[derive(OpenApi)]
#[openapi(
    paths(
        class_list,
        class_create,
        class_update,
        class_delete,
        class_live,
        masterlist_extract,
        masterlist_save,
        student_list,
        student_add,
        student_update,
        student_delete,
        student_live,
        activity_list,
        activity_add,
        activity_update,
        activity_delete,
        activity_live,
        activity_grade,
        score_list,
        score_save
    ),
    components(schemas(
        ClassEntry,
        ClassCreateData,
        ClassUpdateData,
        NewClass,
        Created,
        MasterlistSaved,
        ExtractedStudent,
        ValidatedBatch,
        StudentEntry,
        StudentCreateData,
        StudentUpdateData,
        ActivityEntry,
        ActivityData,
        ScoreData,
        Score,
        ScoreRow,
        GradeResult,
        FileUpload<'_>,
        ExamUpload<'_>,
        Problem
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

impl<'a> FromParam<'a> for Key {
    type Error = KeyError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Key::new(param)
    }
}

/// Id of a newly created record.
#[derive(Debug, Serialize, ToSchema)]
pub struct Created {
    pub id: String,
}

impl From<Key> for Created {
    fn from(key: Key) -> Self {
        Created {
            id: key.into_string(),
        }
    }
}

/// A single uploaded file, PDF or image.
#[derive(Debug, FromForm, ToSchema)]
pub struct FileUpload<'r> {
    #[schema(value_type = String, format = Binary)]
    pub file: TempFile<'r>,
}

/// Reads an uploaded file into memory for forwarding.
pub async fn read_upload(file: &TempFile<'_>) -> Result<Upload, Problem> {
    let file_name = file
        .raw_name()
        .map(|it| it.dangerous_unsafe_unsanitized_raw().as_str().to_string());
    let content_type = file.content_type().map(|it| it.to_string());

    let reader = file.open().await.map_err(problems::upload_problem)?;
    rocket::tokio::pin!(reader);
    let mut bytes = Vec::with_capacity(file.len() as usize);
    reader
        .read_to_end(&mut bytes)
        .await
        .map_err(problems::upload_problem)?;

    if bytes.is_empty() {
        return Err(problems::upload_problem("The uploaded file is empty."));
    }
    Ok(Upload::new(
        bytes,
        file_name.as_deref(),
        content_type.as_deref(),
    ))
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Problem {
    auth_problem("Missing or invalid credentials.")
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Problem {
    problems::not_found_problem()
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Problem {
    problems::parse_problem()
}

#[catch(default)]
pub fn fallback(status: Status, _req: &Request) -> Problem {
    Problem::new_untyped(status, status.reason_lossy())
}

pub fn api_v1() -> Vec<Route> {
    routes![
        class_list,
        class_create,
        class_update,
        class_delete,
        class_live,
        masterlist_extract,
        masterlist_save,
        student_list,
        student_add,
        student_update,
        student_delete,
        student_live,
        activity_list,
        activity_add,
        activity_update,
        activity_delete,
        activity_live,
        activity_grade,
        score_list,
        score_save
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/v1", api_v1())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
        )
        .register("/", catchers![unauthorized, not_found, unprocessable, fallback])
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Duration;
    use rocket::http::{ContentType, Header};
    use rocket::local::asynchronous::Client;

    use crate::config::{Config, StoreBackend};
    use crate::keys::Key;
    use crate::resp::jwt::ProfessorToken;
    use crate::security::Security;
    use crate::store::{AnyStore, MemoryStore};

    const SECRET: &str = "route-test-secret";

    pub(crate) async fn client() -> Client {
        let mut config = Config::default();
        config.store = StoreBackend::Memory;
        // Nothing listens on the discard port, so AI calls fail fast.
        config.ai_endpoint = "http://127.0.0.1:9".to_string();
        config.ai_timeout_secs = 2;

        let rocket = crate::build(
            config,
            Security::with_secret(SECRET),
            AnyStore::Memory(MemoryStore::default()),
        )
        .expect("valid rocket instance");
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    pub(crate) fn bearer(professor: &str) -> Header<'static> {
        let token = ProfessorToken::new(&Key::new(professor).unwrap(), Duration::hours(1))
            .encode_jwt(&Security::with_secret(SECRET).jwt_keys)
            .unwrap();
        Header::new("Authorization", format!("Bearer {}", token))
    }

    pub(crate) fn multipart(file_name: &str, mime: &str, fields: &[(&str, &str)]) -> (ContentType, String) {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                name, value
            ));
        }
        body.push_str(&format!(
            "--BOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n%PDF-1.4 scanned roster\r\n--BOUNDARY--\r\n",
            file_name, mime
        ));
        (
            ContentType::new("multipart", "form-data").with_params(("boundary", "BOUNDARY")),
            body,
        )
    }

    #[rocket::async_test]
    async fn openapi_is_served() {
        let client = client().await;
        let response = client.get("/api/v1/openapi.json").dispatch().await;
        assert_eq!(response.status(), rocket::http::Status::Ok);
        let body = response.into_string().await.unwrap();
        assert!(body.contains("/api/v1/classes"));
    }
}
