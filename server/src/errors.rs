use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Message type already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Message type '{0}' is not registered")]
    UnknownMessageType(String),

    #[error("Missing key: {0}")]
    MissingField(String),

    #[error("Key '{field}' has invalid type. Expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unsupported type tag '{tag}' for field '{field}'")]
    UnsupportedTypeTag { field: String, tag: String },

    #[error("Reading does not name a message type")]
    MissingMessageType,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{detail}")]
    InvalidBody { status: StatusCode, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidBody {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl Error {
    /// Errors produced by the validator, as opposed to storage or framing.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnknownMessageType(_)
                | Error::MissingField(_)
                | Error::TypeMismatch { .. }
                | Error::MissingMessageType
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::AlreadyExists(_) | Error::UnsupportedTypeTag { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidBody { status, .. } => *status,
            e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            Error::MalformedFrame(_) | Error::InvalidChunk(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("API error: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
