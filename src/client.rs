use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;
use crate::session::{HttpRequest, HttpResponse, HttpSession, ReqwestSession, SessionOptions};
use crate::types::{format_timestamp, Annotation, Attribute, Record, Setup, VirtualChannel};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BATCH_SIZE: usize = 128;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Dashboard base URL, e.g. `https://shmdash.de`.
    pub base_url: String,
    /// API key for the `UPLOAD-API-KEY` header.
    pub api_key: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Max. number of records per upload request. Halved automatically on
    /// payload-too-large responses.
    pub batch_size: usize,
    /// Verify TLS certificates. Off by default, dashboard instances commonly
    /// run with self-signed certificates.
    pub verify_tls: bool,
}

impl ClientConfig {
    /// Create a configuration for the given dashboard URL and API key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
            verify_tls: false,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the initial upload batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable TLS certificate verification.
    pub fn with_tls_verification(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// Create a configuration from the environment variables `SHMDASH_URL`
    /// (default `https://shmdash.de`) and `SHMDASH_API_KEY` (required).
    ///
    /// # Errors
    /// Returns [`ClientError::BuildError`] if `SHMDASH_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url =
            std::env::var("SHMDASH_URL").unwrap_or_else(|_| "https://shmdash.de".to_string());
        let api_key = std::env::var("SHMDASH_API_KEY")
            .map_err(|_| ClientError::BuildError("SHMDASH_API_KEY not set".to_string()))?;
        Ok(Self::new(base_url, api_key))
    }
}

/// Upload API endpoints resolved against the base URL.
#[derive(Debug, Clone)]
struct Endpoints {
    setup: Url,
    data: Url,
    commands: Url,
    annotation: Url,
    dev_data: Url,
    dev_recreate: Url,
}

impl Endpoints {
    fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::BuildError(format!("invalid base URL {base_url}: {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| ClientError::BuildError(format!("invalid endpoint {path}: {e}")))
        };
        Ok(Self {
            setup: join("/upload/vjson/v1/setup")?,
            data: join("/upload/vjson/v1/data")?,
            commands: join("/upload/vjson/v1/commands")?,
            annotation: join("/upload/vjson/v1/annotation")?,
            dev_data: join("/dev/timeseriesdata")?,
            dev_recreate: join("/dev/recreate")?,
        })
    }
}

/// Async SHM Dash client.
///
/// Create with [`Client::new`] for the HTTP transport or
/// [`Client::with_session`] to plug in a custom [`HttpSession`].
pub struct Client {
    config: ClientConfig,
    endpoints: Endpoints,
    session: Arc<dyn HttpSession>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

fn default_headers(api_key: &str) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static("upload-api-key"),
        HeaderValue::from_str(api_key)
            .map_err(|e| ClientError::BuildError(format!("invalid API key: {e}")))?,
    );
    Ok(headers)
}

fn check_response(response: &HttpResponse) -> Result<(), ClientError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(ClientError::Response {
        method: response.method().clone(),
        url: response.url().clone(),
        status: response.status(),
        message: error_message(response),
    })
}

/// Extract a human-readable error message from a response body. The server
/// reports errors as `{"message": "..."}`, other bodies are passed through.
fn error_message(response: &HttpResponse) -> Option<String> {
    let text = response.text();
    if text.is_empty() {
        return None;
    }
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .as_ref()
        .and_then(|body| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    Some(message.unwrap_or(text))
}

impl Client {
    /// Create a client using the HTTP transport.
    ///
    /// # Errors
    /// Returns [`ClientError::BuildError`] if the base URL or API key is
    /// invalid or the transport cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let options = SessionOptions {
            headers: default_headers(&config.api_key)?,
            timeout: config.timeout,
            verify_tls: config.verify_tls,
        };
        let session = Arc::new(ReqwestSession::new(&options)?);
        Self::with_session(config, session)
    }

    /// Create a client on top of a custom session.
    ///
    /// # Errors
    /// Returns [`ClientError::BuildError`] if the base URL is invalid.
    pub fn with_session(
        config: ClientConfig,
        session: Arc<dyn HttpSession>,
    ) -> Result<Self, ClientError> {
        info!("Initialize SHM Dash client: {}", config.base_url);
        let endpoints = Endpoints::new(&config.base_url)?;
        Ok(Self {
            config,
            endpoints,
            session,
        })
    }

    async fn get(&self, url: &Url) -> Result<HttpResponse, ClientError> {
        let response = self
            .session
            .send(HttpRequest::new(Method::GET, url.clone()))
            .await?;
        check_response(&response)?;
        Ok(response)
    }

    async fn post_json(&self, url: &Url, body: &Value) -> Result<HttpResponse, ClientError> {
        let body = serde_json::to_vec(body)?;
        let response = self
            .session
            .send(HttpRequest::new(Method::POST, url.clone()).with_body(body))
            .await?;
        check_response(&response)?;
        Ok(response)
    }

    async fn delete(&self, url: &Url) -> Result<HttpResponse, ClientError> {
        let response = self
            .session
            .send(HttpRequest::new(Method::DELETE, url.clone()))
            .await?;
        check_response(&response)?;
        Ok(response)
    }

    /// Read the setup stored on the server.
    pub async fn get_setup(&self) -> Result<Setup, ClientError> {
        let response = self.get(&self.endpoints.setup).await?;
        let document: Value = response.json()?;
        Ok(Setup::from_json(document)?)
    }

    /// Synchronize attribute and virtual channel definitions with the server.
    ///
    /// If the server setup is empty, all definitions are uploaded in a single
    /// setup request. Otherwise definitions are added one by one, skipping
    /// identifiers that already exist. Existing definitions are never
    /// modified.
    pub async fn setup(
        &self,
        attributes: &[Attribute],
        virtual_channels: &[VirtualChannel],
    ) -> Result<(), ClientError> {
        let existing = self.get_setup().await?;
        if existing.is_empty() {
            info!("Upload setup");
            let setup = Setup::new(attributes.to_vec(), virtual_channels.to_vec());
            self.post_json(&self.endpoints.setup, &setup.to_json()?)
                .await?;
            return Ok(());
        }

        for attribute in attributes {
            if existing.attribute(&attribute.identifier).is_some() {
                debug!("Attribute {} already exists", attribute.identifier);
                continue;
            }
            self.add_attribute(attribute).await?;
        }
        for virtual_channel in virtual_channels {
            if existing.virtual_channel(&virtual_channel.identifier).is_some() {
                debug!("Virtual channel {} already exists", virtual_channel.identifier);
                continue;
            }
            self.add_virtual_channel(virtual_channel).await?;
        }
        Ok(())
    }

    /// Add a single attribute definition.
    pub async fn add_attribute(&self, attribute: &Attribute) -> Result<(), ClientError> {
        info!("Add attribute {}", attribute.identifier);
        let body = command(
            "addAttribute",
            "attributeId",
            &attribute.identifier,
            serde_json::to_value(attribute)?,
        );
        self.post_json(&self.endpoints.commands, &body).await?;
        Ok(())
    }

    /// Add a single virtual channel definition.
    pub async fn add_virtual_channel(
        &self,
        virtual_channel: &VirtualChannel,
    ) -> Result<(), ClientError> {
        info!("Add virtual channel {}", virtual_channel.identifier);
        let body = command(
            "addVirtualChannel",
            "virtualChannelId",
            &virtual_channel.identifier,
            serde_json::to_value(virtual_channel)?,
        );
        self.post_json(&self.endpoints.commands, &body).await?;
        Ok(())
    }

    /// Append attributes to an existing virtual channel.
    pub async fn add_virtual_channel_attributes(
        &self,
        virtual_channel_id: &str,
        attribute_ids: &[String],
    ) -> Result<(), ClientError> {
        info!(
            "Add attributes {:?} to virtual channel {}",
            attribute_ids, virtual_channel_id
        );
        let body = json!({
            "commands": [{
                "cmdName": "addVirtualChannelAttributes",
                "virtualChannelId": virtual_channel_id,
                "attributes": attribute_ids,
            }],
        });
        self.post_json(&self.endpoints.commands, &body).await?;
        Ok(())
    }

    /// Upload records for a virtual channel in batches.
    ///
    /// Records are sent in chunks of at most the configured batch size. When
    /// the server rejects a chunk as too large, the chunk is retried with
    /// half the size, and the reduced size is kept for the remaining records
    /// of this call. If a single record is still rejected, the upload aborts
    /// with [`ClientError::BatchExhausted`].
    ///
    /// Records already uploaded stay uploaded; a conflict marker in the
    /// request makes the server ignore records with known timestamps, so the
    /// failed remainder can be retried as a whole.
    pub async fn upload_data(
        &self,
        virtual_channel_id: &str,
        records: &[Record],
    ) -> Result<(), ClientError> {
        debug!(
            "Upload {} records to virtual channel {}",
            records.len(),
            virtual_channel_id
        );
        let total = records.len();
        let mut batch_size = self.config.batch_size.max(1);
        let mut cursor = 0;

        while cursor < total {
            let chunk = &records[cursor..total.min(cursor + batch_size)];
            match self.upload_chunk(virtual_channel_id, chunk).await {
                Ok(()) => cursor += chunk.len(),
                Err(e) if e.is_payload_too_large() => {
                    if chunk.len() <= 1 {
                        return Err(ClientError::BatchExhausted {
                            remaining: total - cursor,
                            total,
                            source: Box::new(e),
                        });
                    }
                    batch_size = chunk.len() / 2;
                    warn!("{e}. Retry with smaller batch size {batch_size}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn upload_chunk(
        &self,
        virtual_channel_id: &str,
        records: &[Record],
    ) -> Result<(), ClientError> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let mut row = Vec::with_capacity(record.values.len() + 2);
            row.push(Value::from(virtual_channel_id));
            row.push(Value::from(format_timestamp(&record.timestamp)));
            for value in &record.values {
                row.push(serde_json::to_value(value)?);
            }
            rows.push(Value::Array(row));
        }
        let body = json!({
            "conflict": "IGNORE",
            "data": rows,
        });
        let response = self.post_json(&self.endpoints.data, &body).await?;
        log_upload_report(&response, records.len());
        Ok(())
    }

    /// Upload an annotation.
    pub async fn upload_annotation(&self, annotation: &Annotation) -> Result<(), ClientError> {
        info!("Upload annotation: {}", annotation.description);
        self.post_json(&self.endpoints.annotation, &serde_json::to_value(annotation)?)
            .await?;
        Ok(())
    }

    /// Delete all time series data. The setup is kept.
    pub async fn delete_data(&self) -> Result<(), ClientError> {
        warn!("Delete all data");
        self.delete(&self.endpoints.dev_data).await?;
        Ok(())
    }

    /// Delete all data and setup information.
    pub async fn recreate(&self) -> Result<(), ClientError> {
        warn!("Delete all data and setup information");
        self.get(&self.endpoints.dev_recreate).await?;
        Ok(())
    }
}

fn command(name: &str, id_key: &str, identifier: &str, fields: Value) -> Value {
    let mut object = Map::new();
    object.insert("cmdName".to_string(), Value::from(name));
    object.insert(id_key.to_string(), Value::from(identifier));
    if let Value::Object(fields) = fields {
        object.extend(fields);
    }
    json!({"commands": [object]})
}

/// Collect warnings from an upload report. The server reports results per
/// virtual channel, `{"<id>": {"success": <count>}}` for accepted records
/// and `{"<id>": {"error": "..."}}` for rejected ones.
fn upload_report_warnings(report: &Map<String, Value>, uploaded: usize) -> Vec<String> {
    let mut warnings = Vec::new();
    for (identifier, results) in report {
        let successful = results
            .get("success")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(uploaded);
        if successful < uploaded {
            warnings.push(format!(
                "Ignored {}/{uploaded} uploads to virtual channel {identifier}: \
                 Timestamps already exist",
                uploaded - successful
            ));
        }
        if let Some(error) = results.get("error").and_then(Value::as_str) {
            warnings.push(format!(
                "Error uploading to virtual channel {identifier}, ignore data: {error}"
            ));
        }
    }
    warnings
}

/// Log per-channel results of an accepted upload. Ignored or rejected
/// records on one channel do not fail the batch.
fn log_upload_report(response: &HttpResponse, uploaded: usize) {
    let report: Map<String, Value> = match response.json() {
        Ok(report) => report,
        Err(e) => {
            debug!("Unparseable upload report: {e}");
            return;
        }
    };
    for warning in upload_report_warnings(&report, uploaded) {
        warn!("{warning}");
    }
}
