use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ClientError;

const BODY_PREVIEW_CHARS: usize = 512;

/// HTTP request with method, absolute URL and optional body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    body: Option<Bytes>,
}

impl HttpRequest {
    /// Create a request without a body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
        }
    }

    /// Attach a body to the request.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Get the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the request body.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Buffered HTTP response, tagged with the request it belongs to.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    method: Method,
    url: Url,
    status: StatusCode,
    body: Bytes,
}

impl HttpResponse {
    /// Create a response from components.
    pub fn new(method: Method, url: Url, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            url,
            status,
            body: body.into(),
        }
    }

    /// Get the method of the originating request.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the URL of the originating request.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body as text. Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidResponse`] if the body is not valid JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ClientError::InvalidResponse(format!("{} returned malformed JSON: {e}", self.url))
        })
    }
}

/// Transport abstraction used by [`crate::Client`].
///
/// Implementations return `Err` for transport failures only (connection,
/// timeout). Any received response, success or error status, is returned as
/// `Ok`; status handling is up to the caller.
#[async_trait]
pub trait HttpSession: Send + Sync {
    /// Send a request and return the buffered response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// Options for the underlying HTTP session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Headers to include in every request.
    pub headers: HeaderMap,
    /// Timeout per request.
    pub timeout: Duration,
    /// Perform TLS certificate validation for HTTPS requests.
    pub verify_tls: bool,
}

/// Production [`HttpSession`] backed by a pooled reqwest client.
///
/// The connection pool is released when the session is dropped.
pub struct ReqwestSession {
    client: reqwest::Client,
}

impl ReqwestSession {
    /// Create a session with the given options.
    ///
    /// # Errors
    /// Returns [`ClientError::BuildError`] if the underlying client cannot be
    /// constructed.
    pub fn new(options: &SessionOptions) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .default_headers(options.headers.clone())
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()
            .map_err(|e| ClientError::BuildError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpSession for ReqwestSession {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let method = request.method().clone();
        let url = request.url().clone();

        let mut builder = self.client.request(method.clone(), url.clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let result = builder.send().await.map_err(|e| {
            if let Some(body) = request.body() {
                debug!("{} {} request body: {}", method, url, preview(body));
            }
            if e.is_timeout() {
                ClientError::Timeout(e.to_string())
            } else if e.is_connect() {
                ClientError::Connection(e.to_string())
            } else {
                ClientError::Reqwest(e)
            }
        })?;

        let status = result.status();
        if !status.is_success() {
            if let Some(body) = request.body() {
                debug!("{} {} -> {}: request body: {}", method, url, status, preview(body));
            }
        }

        let body = result.bytes().await?;
        Ok(HttpResponse::new(method, url, status, body))
    }
}

/// Render a request body for logging, truncated to a readable length.
fn preview(body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > BODY_PREVIEW_CHARS {
        let truncated: String = text.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{truncated}... ({} bytes total)", body.len())
    } else {
        text.into_owned()
    }
}
