//! Async client library for [SHM Dash](https://shmdash.de) sensor data
//! dashboards.
//!
//! The client uploads timestamped records to virtual channels of a
//! dashboard, manages the setup (attribute and virtual channel definitions)
//! and posts annotations. Records are uploaded in batches; if the server
//! rejects a batch as too large, the batch size is halved automatically
//! until the upload goes through.
//!
//! # Example
//!
//! Define a setup and upload records:
//!
//! ```no_run
//! use shmdash::{
//!     Attribute, AttributeType, Client, ClientConfig, Record, VirtualChannel,
//! };
//!
//! # async fn run() -> Result<(), shmdash::ClientError> {
//! let config = ClientConfig::new("https://shmdash.example.org", "<api-key>");
//! let client = Client::new(config)?;
//!
//! let attributes = vec![
//!     Attribute::new("AbsDateTime", AttributeType::DateTime)
//!         .with_description("Absolute time in ISO 8601, UTC")
//!         .with_format("YYYY-MM-DDThh:mm:ss.ssssssZ"),
//!     Attribute::new("Temperature", AttributeType::Float32)
//!         .with_unit("°C")
//!         .with_format("%.2f"),
//! ];
//! let virtual_channels = vec![
//!     VirtualChannel::new("0", vec!["AbsDateTime".into(), "Temperature".into()])
//!         .with_name("Weather station"),
//! ];
//! client.setup(&attributes, &virtual_channels).await?;
//!
//! let record = Record::new(chrono::Utc::now(), vec![21.5.into()]);
//! client.upload_data("0", &[record]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Read the configuration from the environment variables `SHMDASH_URL` and
//! `SHMDASH_API_KEY`:
//!
//! ```no_run
//! use shmdash::{Client, ClientConfig};
//!
//! # async fn run() -> Result<(), shmdash::ClientError> {
//! let client = Client::new(ClientConfig::from_env()?)?;
//! let setup = client.get_setup().await?;
//! for virtual_channel in &setup.virtual_channels {
//!     println!("{}: {:?}", virtual_channel.identifier, virtual_channel.attributes);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod session;
mod types;

pub use client::{Client, ClientConfig};
pub use error::ClientError;
pub use session::{HttpRequest, HttpResponse, HttpSession, ReqwestSession, SessionOptions};
pub use types::{
    format_timestamp, sanitize_identifier, Annotation, Attribute, AttributeType, DiagramScale,
    Record, RecordValue, Setup, Severity, VirtualChannel,
};

// Re-export http types used in the public API.
pub use http::{Method, StatusCode};
