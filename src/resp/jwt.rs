use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Header, Validation};
use rocket::http::Status;
use rocket::outcome::Outcome::{Error, Success};
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};

use crate::keys::Key;
use crate::resp::problem::Problem;
use crate::security::{JwtKeys, Security};

pub static AUTH_COOKIE_NAME: &str = "jwt_auth";

/// Claims issued by the authentication provider. `sub` is the professor id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfessorToken {
    #[serde(with = "jwt_numeric_date")]
    iat: DateTime<Utc>,
    #[serde(with = "jwt_numeric_date")]
    exp: DateTime<Utc>,
    pub sub: String,
}

impl ProfessorToken {
    pub fn new(professor: &Key, ttl: Duration) -> ProfessorToken {
        let now = Utc::now();
        ProfessorToken {
            iat: now,
            exp: now + ttl,
            sub: professor.to_string(),
        }
    }

    pub fn encode_jwt(&self, keys: &JwtKeys) -> Result<String, jsonwebtoken::errors::Error> {
        let key = match keys.encoding_key() {
            Some(key) => key?,
            None => return Err(jsonwebtoken::errors::ErrorKind::InvalidKeyFormat.into()),
        };
        encode(&Header::new(keys.algorithm()), &self, &key)
    }
}

mod jwt_numeric_date {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(date.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Utc.timestamp_opt(i64::deserialize(deserializer)?, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom("invalid Unix timestamp value"))
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize professor.")
        .detail(detail)
        .clone()
}

pub fn extract_claims(token: &str, keys: &JwtKeys) -> Result<ProfessorToken, Problem> {
    let key = keys.decoding_key().map_err(|e| {
        tracing::error!("JWT verification key isn't valid: {}", e);
        Problem::new_untyped(Status::InternalServerError, "Unable to verify credentials.")
    })?;

    match decode::<ProfessorToken>(token, &key, &Validation::new(keys.algorithm())) {
        Ok(data) => {
            tracing::debug!("decoded token for professor: {}", data.claims.sub);
            Ok(data.claims)
        }
        Err(e) => Err(Problem::from(e)),
    }
}

fn token_of<'r>(req: &'r Request<'_>) -> Option<String> {
    if let Some(header) = req.headers().get_one("Authorization") {
        if let Some(token) = header.strip_prefix("Bearer ") {
            tracing::trace!("extracted jwt from authorization header");
            return Some(token.trim().to_string());
        }
    }
    req.cookies()
        .get(AUTH_COOKIE_NAME)
        .map(|it| it.value().to_string())
}

/// The authenticated professor making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Professor(pub Key);

impl Professor {
    pub fn key(&self) -> &Key {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Professor {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security = match req.rocket().state::<Security>() {
            Some(it) => it,
            None => {
                tracing::error!("security information isn't managed");
                return Error((
                    Status::InternalServerError,
                    Problem::new_untyped(Status::InternalServerError, "Server misconfigured."),
                ));
            }
        };

        let token = match token_of(req) {
            Some(it) => it,
            None => {
                return Error((
                    Status::Unauthorized,
                    auth_problem("No JWT bearer token or auth cookie."),
                ))
            }
        };

        let claims = match extract_claims(&token, &security.jwt_keys) {
            Ok(it) => it,
            Err(e) => {
                tracing::debug!("unable to extract claims from token");
                return Error((Status::Unauthorized, e));
            }
        };

        match Key::new(claims.sub) {
            Ok(key) => Success(Professor(key)),
            Err(e) => Error((Status::Unauthorized, auth_problem(e))),
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> SecurityScheme {
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            )
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}
