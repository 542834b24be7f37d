//! # dataplane-http Library
//!
//! HTTP data plane for dataspace connectors: moves a payload from an HTTP
//! source endpoint to an HTTP destination endpoint as a stream, with bounded
//! memory, classified errors, full-restart retries and cooperative
//! cancellation.
//!
//! ## Features
//!
//! - **Streaming copy**: fixed-size chunks, never the whole payload in memory
//! - **Address driven**: endpoints described by `baseUrl`, `path`, `queryParams`, `header:*`, ...
//! - **Retry with backoff**: transient failures restart the transfer from the first byte
//! - **Cancellation**: every suspension point races a cancellation token
//! - **Credential injection**: pluggable [`CredentialProvider`]
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let outcome = dataplane_http::transfer(
//!         "https://provider.example/assets/42",
//!         "https://consumer.example/inbox",
//!     )
//!     .await?;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```
//!
//! ## Service Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dataplane_http::{DataAddress, NoCredentials, TransferConfig, TransferRequest, TransferService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = TransferService::new(TransferConfig::default(), Arc::new(NoCredentials))?;
//!     let request = TransferRequest::new(
//!         "transfer-1",
//!         DataAddress::http("https://provider.example").with("path", "assets/42"),
//!         DataAddress::http("https://consumer.example/inbox").with("method", "PUT"),
//!     );
//!
//!     let handle = service.submit(request);
//!     // service.cancel("transfer-1") stops it early
//!     let outcome = handle.outcome().await;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

// Internal modules
mod core;

pub use crate::core::address;
pub use crate::core::config;
pub use crate::core::request;

pub use crate::core::{
    BearerToken, ConfigError, CredentialProvider, DataAddress, DataSink, DataSource, DataStream,
    Error, ErrorKind, FlowType, HttpDataSink, HttpDataSinkFactory, HttpDataSource,
    HttpDataSourceFactory, HttpTransport, NoCredentials, ProgressCallback, Result, RetryPolicy,
    SecretStore, SinkWriter, StateObserver, StreamMetadata, TransferConfig, TransferHandle,
    TransferOutcome, TransferPipeline, TransferRequest, TransferService, TransferState,
};

/// Copy one URL to another with default settings
///
/// The destination receives a POST. Use [`TransferService`] for anything
/// more specific.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let outcome = dataplane_http::transfer("http://localhost:8080/data", "http://localhost:9090/in").await?;
/// assert!(outcome.is_success());
/// # Ok(())
/// # }
/// ```
pub async fn transfer(source_url: &str, destination_url: &str) -> Result<TransferOutcome> {
    transfer_with_config(source_url, destination_url, TransferConfig::default()).await
}

/// Copy one URL to another with custom settings
///
/// Returns an error only when the service cannot be built; transfer failures
/// are reported through the [`TransferOutcome`].
pub async fn transfer_with_config(
    source_url: &str,
    destination_url: &str,
    config: TransferConfig,
) -> Result<TransferOutcome> {
    let service = TransferService::new(config, Arc::new(NoCredentials))?;
    let request = TransferRequest::new(
        "transfer",
        DataAddress::http(source_url),
        DataAddress::http(destination_url),
    );
    Ok(service.submit(request).outcome().await)
}
