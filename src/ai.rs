//! Client of the exam processing server. Reading masterlists and grading
//! papers happens there; this module only ships files and decodes replies.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::masterlist::ExtractedStudent;

const PROCESS_EXAM: &str = "process_exam";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("AI server responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("AI server rejected the request: {0}")]
    Rejected(String),
    #[error("unable to parse AI server response: {0}")]
    Malformed(String),
}

/// A file sent for processing. The server only looks at the extension, so
/// the file is always named `upload.pdf` or `upload.jpg`.
#[derive(Debug, Clone)]
pub struct Upload {
    bytes: Vec<u8>,
    pdf: bool,
    mime: String,
}

impl Upload {
    pub fn new(bytes: Vec<u8>, file_name: Option<&str>, content_type: Option<&str>) -> Upload {
        let pdf = file_name.map_or(false, |it| it.to_lowercase().ends_with("pdf"))
            || content_type == Some("application/pdf");
        let mime = match content_type {
            Some(it) if !it.is_empty() => it.to_string(),
            _ if pdf => "application/pdf".to_string(),
            _ => "image/jpeg".to_string(),
        };
        Upload { bytes, pdf, mime }
    }

    pub fn is_pdf(&self) -> bool {
        self.pdf
    }

    pub fn file_name(&self) -> &'static str {
        if self.pdf {
            "upload.pdf"
        } else {
            "upload.jpg"
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GradeResult {
    #[serde(deserialize_with = "number_or_text")]
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub transcribed_text: String,
}

fn number_or_text<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    use serde::de::Error;

    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("score out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("score '{}' isn't a number", s))),
        other => Err(D::Error::custom(format!("unexpected score {}", other))),
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Rubric used when an activity has none of its own.
pub fn default_rubric(title: &str) -> String {
    format!("Activity: {}. Grade strictly but fairly.", title)
}

/// Decodes a `{success, data, error}` reply into its payload.
pub fn decode_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, AiError> {
    let ok = (200..300).contains(&status);
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(it) => it,
        Err(_) if !ok => {
            return Err(AiError::Status {
                status,
                message: format!("Server Error: {}", status),
            })
        }
        Err(e) => return Err(AiError::Malformed(e.to_string())),
    };

    if !ok {
        return Err(AiError::Status {
            status,
            message: envelope
                .error
                .unwrap_or_else(|| format!("Server Error: {}", status)),
        });
    }
    if !envelope.success {
        return Err(AiError::Rejected(
            envelope
                .error
                .unwrap_or_else(|| "request was not successful".to_string()),
        ));
    }

    serde_json::from_value(envelope.data).map_err(|e| AiError::Malformed(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct AiClient {
    http: reqwest::Client,
    endpoint: String,
}

impl AiClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<AiClient, AiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(AiClient {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn process<T: DeserializeOwned>(
        &self,
        upload: Upload,
        fields: Vec<(&'static str, String)>,
    ) -> Result<T, AiError> {
        tracing::debug!(
            "uploading {} bytes as {} ({})",
            upload.len(),
            upload.file_name(),
            upload.mime()
        );
        let name = upload.file_name();
        let part = Part::bytes(upload.bytes)
            .file_name(name)
            .mime_str(&upload.mime)?;

        let mut form = Form::new().part("file", part);
        for (key, value) in fields {
            form = form.text(key, value);
        }

        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, PROCESS_EXAM))
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        let result = decode_response(status, &body);
        if let Err(e) = &result {
            tracing::warn!("AI request failed: {}", e);
        }
        result
    }

    /// Reads the students listed on a masterlist.
    pub async fn extract_masterlist(
        &self,
        upload: Upload,
    ) -> Result<Vec<ExtractedStudent>, AiError> {
        let students: Vec<ExtractedStudent> = self
            .process(upload, vec![("mode", "masterlist".to_string())])
            .await?;
        tracing::info!("AI extracted {} students", students.len());
        Ok(students)
    }

    /// Grades an exam paper against `rubric`.
    pub async fn grade(&self, upload: Upload, rubric: &str) -> Result<GradeResult, AiError> {
        self.process(
            upload,
            vec![
                ("mode", "grade".to_string()),
                ("rubric", rubric.to_string()),
            ],
        )
        .await
    }
}
