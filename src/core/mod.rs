//! Core library modules for dataplane-http
//!
//! Adapters, request building, retry, and the transfer pipeline.

pub mod address;
pub mod config;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod service;
pub mod sink;
pub mod source;
pub mod stream;
pub mod transport;

pub use address::{DataAddress, FlowType, TransferRequest};
pub use config::{ConfigError, TransferConfig};
pub use credentials::{BearerToken, CredentialProvider, NoCredentials, SecretStore};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{StateObserver, TransferOutcome, TransferPipeline, TransferState};
pub use retry::RetryPolicy;
pub use service::{TransferHandle, TransferService};
pub use sink::{DataSink, HttpDataSink, HttpDataSinkFactory, SinkWriter};
pub use source::{DataSource, HttpDataSource, HttpDataSourceFactory};
pub use stream::{DataStream, ProgressCallback, StreamMetadata};
pub use transport::HttpTransport;
