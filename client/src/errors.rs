use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedTransportMethod(String),

    #[error("Validation error: {0}")]
    Validation(#[from] hololens_server::Error),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server replied {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
