use std::fmt::{Display, Formatter};
use std::io::Cursor;

use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::ai::AiError;
use crate::error::{ErrorKind, RosterError};

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, type_uri: impl ToString, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: type_uri.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem::new(status, "about:blank", title)
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    fn to_json(&self) -> Map<String, Value> {
        let mut body = self.body.clone();

        // Following are required by rfc7807
        body.insert(String::from("type"), Value::from(self.type_uri.clone()));
        body.insert(String::from("title"), Value::from(self.title.clone()));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = &self.detail {
            body.insert(String::from("detail"), Value::from(detail.clone()));
        }
        body.insert(String::from("status"), Value::from(self.status.code));
        if let Some(instance) = &self.instance_uri {
            body.insert(String::from("instance"), Value::from(instance.clone()));
        }
        body
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let mut problem = self;
        if problem.instance_uri.is_none() {
            problem.instance_uri = Some(req.uri().path().to_string());
        }
        let body_string = Value::Object(problem.to_json()).to_string();

        Response::build()
            .status(problem.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header("Content-Language", "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn parse_problem() -> Problem {
        Problem::new_untyped(
            Status::BadRequest,
            "There was a problem parsing part of the request.",
        )
    }

    #[inline]
    pub fn not_found_problem() -> Problem {
        Problem::new_untyped(Status::NotFound, "Requested resource doesn't exist.")
    }

    #[inline]
    pub fn upload_problem(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Unable to read the uploaded file.")
            .detail(detail)
            .clone()
    }
}

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Transport => "transport",
        ErrorKind::Validation => "validation",
        ErrorKind::Precondition => "precondition",
        ErrorKind::Conflict => "conflict",
        ErrorKind::NotFound => "not-found",
    }
}

impl From<RosterError> for Problem {
    fn from(e: RosterError) -> Self {
        let kind = e.kind();
        let status = match (&e, kind) {
            (RosterError::Ai(_), _) => Status::BadGateway,
            (_, ErrorKind::Transport) => Status::ServiceUnavailable,
            (_, ErrorKind::Validation) => Status::UnprocessableEntity,
            (_, ErrorKind::Precondition) => Status::BadRequest,
            (_, ErrorKind::Conflict) => Status::Conflict,
            (_, ErrorKind::NotFound) => Status::NotFound,
        };

        if kind == ErrorKind::Transport {
            tracing::error!("request failed: {}", e);
        }

        Problem::new_untyped(status, e.user_message())
            .detail(&e)
            .insert_str("kind", kind_name(kind))
            .clone()
    }
}

impl From<AiError> for Problem {
    fn from(e: AiError) -> Self {
        RosterError::from(e).into()
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                Problem::new_untyped(Status::Unauthorized, "Expired JWT signature.")
            }
            _ => Problem::new_untyped(Status::Unauthorized, "Error while handling JWT."),
        }
    }
}

impl From<std::io::Error> for Problem {
    fn from(_: std::io::Error) -> Self {
        Problem::new_untyped(Status::InternalServerError, "Server IO error")
    }
}
