//! HTTP data source
//!
//! Opening a source issues a request and exposes the response body as a
//! [`DataStream`]. Each call to `open` is a fresh request, which is how a
//! transfer restarts from the beginning.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::core::address::{DataAddress, TransferRequest};
use crate::core::credentials::CredentialProvider;
use crate::core::error::{Error, Result};
use crate::core::request::{build_request, Direction};
use crate::core::stream::{DataStream, StreamMetadata};
use crate::core::transport::HttpTransport;

/// Response headers copied into [`StreamMetadata::properties`]
const FORWARDED_HEADERS: [&str; 3] = ["etag", "last-modified", "content-disposition"];

/// Something a transfer can read from
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Open a new stream positioned at the first byte
    async fn open(&self) -> Result<DataStream>;
}

pub struct HttpDataSource {
    request_id: String,
    address: DataAddress,
    transport: Arc<HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpDataSource {
    pub fn new(
        request_id: impl Into<String>,
        address: DataAddress,
        transport: Arc<HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            address,
            transport,
            credentials,
        }
    }

    pub fn address(&self) -> &DataAddress {
        &self.address
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn open(&self) -> Result<DataStream> {
        let params = build_request(&self.address, Direction::Source, None, &*self.credentials)?;
        let url = params.url.to_string();

        let response = self
            .transport
            .send(params.to_builder(self.transport.client()))
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("[{}] Source {url} answered {status}", self.request_id);
            // Dropping the response releases the connection
            return Err(Error::from_status(status, &url));
        }

        let headers = response.headers();
        let properties = FORWARDED_HEADERS
            .iter()
            .filter_map(|name| {
                let value = headers.get(*name)?.to_str().ok()?;
                Some((name.to_string(), value.to_string()))
            })
            .collect();
        let metadata = StreamMetadata {
            name: params.name.clone(),
            content_type: headers
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            content_length: response.content_length(),
            properties,
        };
        debug!(
            "[{}] Source {url} opened ({status}, length {:?})",
            self.request_id, metadata.content_length
        );

        Ok(DataStream::from_response(response, metadata))
    }
}

/// Creates [`HttpDataSource`]s for requests whose source is an `HttpData` address
pub struct HttpDataSourceFactory {
    transport: Arc<HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpDataSourceFactory {
    pub fn new(transport: Arc<HttpTransport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub fn can_handle(&self, request: &TransferRequest) -> bool {
        request.source.is_http_data()
    }

    /// Check that a source could be built for `request`, without any I/O
    pub fn validate(&self, request: &TransferRequest) -> Result<()> {
        if !self.can_handle(request) {
            return Err(Error::InvalidAddress(format!(
                "Source address type {:?} is not handled",
                request.source.address_type()
            )));
        }
        build_request(&request.source, Direction::Source, None, &*self.credentials).map(|_| ())
    }

    pub fn create_source(&self, request: &TransferRequest) -> Result<HttpDataSource> {
        self.validate(request)?;
        Ok(HttpDataSource::new(
            request.id.clone(),
            request.source.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.credentials),
        ))
    }
}
