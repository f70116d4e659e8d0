use std::path::PathBuf;
use thiserror::Error;

use crate::ai::AiError;
use crate::keys::KeyError;
use crate::masterlist::ValidationError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid value '{value}' for {setting}")]
    InvalidValue { setting: &'static str, value: String },
}

/// Startup failures.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("no signing keys: set JWT_SECRET or place PEM keys in '{0}'")]
    MissingKeys(PathBuf),
    #[error("unable to generate signing keys: {0}")]
    KeyGeneration(String),

    // External errors
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}

/// How a failure is reported to the professor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Store or AI endpoint failed; worth trying again.
    Transport,
    /// The masterlist had no usable student IDs.
    Validation,
    Precondition,
    Conflict,
    NotFound,
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Precondition(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
}

impl RosterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RosterError::Store(StoreError::Key(_)) => ErrorKind::Precondition,
            RosterError::Store(_) | RosterError::Ai(_) => ErrorKind::Transport,
            RosterError::Key(KeyError::Exhausted(_)) => ErrorKind::Transport,
            RosterError::Key(_) | RosterError::Precondition(_) => ErrorKind::Precondition,
            RosterError::Validation(_) => ErrorKind::Validation,
            RosterError::Conflict(_) => ErrorKind::Conflict,
            RosterError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Message shown to the professor.
    pub fn user_message(&self) -> String {
        match self {
            RosterError::Key(KeyError::Exhausted(_)) => {
                "Unable to allocate a key, please try again.".to_string()
            }
            RosterError::Store(StoreError::Key(e)) | RosterError::Key(e) => e.to_string(),
            RosterError::Store(_) => "Unable to reach the database, please try again.".to_string(),
            RosterError::Ai(_) => {
                "Failed to process the file. Ensure the AI server is running.".to_string()
            }
            RosterError::Validation(_) => "Invalid master list no student ID".to_string(),
            RosterError::Precondition(msg)
            | RosterError::Conflict(msg)
            | RosterError::NotFound(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            RosterError::from(ValidationError::NoStudentIds { total: 3 }).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            RosterError::from(AiError::Rejected("busy".into())).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            RosterError::from(KeyError::Empty).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            RosterError::from(StoreError::CrossDocument).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            RosterError::Conflict("taken".into()).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn validation_has_its_own_message() {
        let err = RosterError::from(ValidationError::Empty);
        assert_eq!(err.user_message(), "Invalid master list no student ID");
        let err = RosterError::from(AiError::Malformed("eof".into()));
        assert!(err.user_message().contains("AI server"));
    }
}
