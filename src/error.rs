use http::{Method, StatusCode};
use thiserror::Error;
use url::Url;

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Client build error: {0}")]
    BuildError(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The server answered with an error status code.
    #[error("{method} request to {url} failed with status {status}{}", message_suffix(.message))]
    Response {
        method: Method,
        url: Url,
        status: StatusCode,
        message: Option<String>,
    },

    /// Batch upload rejected as too large at batch size one.
    #[error("Upload aborted: {remaining} of {total} records not uploaded: {source}")]
    BatchExhausted {
        remaining: usize,
        total: usize,
        #[source]
        source: Box<ClientError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether the error is an HTTP 413 response.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(
            self,
            ClientError::Response { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}
