//! HTTP data sink
//!
//! Opening a sink starts the outbound request with a streaming body. Chunks
//! written to the [`SinkWriter`] travel through a bounded channel straight into
//! the connection, so a slow destination applies backpressure to the copy
//! loop instead of the payload piling up in memory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{RequestBuilder, Response};
use tokio::task::JoinHandle;

use crate::core::address::{DataAddress, TransferRequest};
use crate::core::credentials::CredentialProvider;
use crate::core::error::{Error, Result};
use crate::core::request::{build_request, Direction};
use crate::core::stream::StreamMetadata;
use crate::core::transport::HttpTransport;

/// Something a transfer can write to
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Start a new upload for a stream described by `metadata`
    async fn open(&self, metadata: &StreamMetadata) -> Result<Box<dyn SinkWriter>>;
}

/// An upload in progress
#[async_trait]
pub trait SinkWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Complete the body and wait for the destination's verdict
    async fn close(self: Box<Self>) -> Result<()>;

    /// Give up on the upload and release its connection
    async fn abort(self: Box<Self>);
}

pub struct HttpDataSink {
    request_id: String,
    address: DataAddress,
    transport: Arc<HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    queue_chunks: usize,
}

impl HttpDataSink {
    pub fn new(
        request_id: impl Into<String>,
        address: DataAddress,
        transport: Arc<HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
        queue_chunks: usize,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            address,
            transport,
            credentials,
            queue_chunks: queue_chunks.max(1),
        }
    }

    pub fn address(&self) -> &DataAddress {
        &self.address
    }
}

#[async_trait]
impl DataSink for HttpDataSink {
    async fn open(&self, metadata: &StreamMetadata) -> Result<Box<dyn SinkWriter>> {
        let params = build_request(
            &self.address,
            Direction::Sink,
            Some(metadata),
            &*self.credentials,
        )?;
        let url = params.url.to_string();
        let builder = params.to_builder(self.transport.client());

        let body = if params.non_chunked {
            debug!("[{}] Sink {url} buffering body for a sized request", self.request_id);
            Body::Buffered {
                request: Some(builder),
                buffer: Vec::new(),
            }
        } else {
            let (sender, receiver) = mpsc::channel::<Bytes>(self.queue_chunks);
            let request = builder
                .body(reqwest::Body::wrap_stream(receiver.map(Ok::<Bytes, std::io::Error>)))
                .build()?;
            let client = self.transport.client().clone();
            debug!("[{}] Sink streaming {} {url}", self.request_id, request.method());
            Body::Streaming {
                sender: Some(sender),
                in_flight: Some(tokio::spawn(async move { client.execute(request).await })),
            }
        };

        Ok(Box::new(HttpSinkWriter {
            request_id: self.request_id.clone(),
            url,
            transport: Arc::clone(&self.transport),
            body,
            bytes_written: 0,
        }))
    }
}

enum Body {
    Streaming {
        sender: Option<mpsc::Sender<Bytes>>,
        in_flight: Option<JoinHandle<reqwest::Result<Response>>>,
    },
    Buffered {
        request: Option<RequestBuilder>,
        buffer: Vec<u8>,
    },
}

/// Writer half of an HTTP upload
pub struct HttpSinkWriter {
    request_id: String,
    url: String,
    transport: Arc<HttpTransport>,
    body: Body,
    bytes_written: u64,
}

impl HttpSinkWriter {
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Turn the settled upload task into a verdict
    fn verdict(
        &self,
        joined: std::result::Result<reqwest::Result<Response>, tokio::task::JoinError>,
    ) -> Result<()> {
        match joined {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(Error::from_status(response.status(), &self.url)),
            Ok(Err(e)) => Err(Error::interrupted(e)),
            Err(e) => Err(Error::StreamInterrupted(format!(
                "Upload to {} did not complete: {e}",
                self.url
            ))),
        }
    }

    /// The destination stopped accepting the body before we finished it
    async fn early_termination(&mut self) -> Error {
        let Body::Streaming { sender, in_flight } = &mut self.body else {
            return Error::StreamInterrupted(format!("Upload to {} was closed", self.url));
        };
        sender.take();
        let Some(handle) = in_flight.take() else {
            return Error::StreamInterrupted(format!("Upload to {} was closed", self.url));
        };

        match tokio::time::timeout(self.transport.request_timeout(), handle).await {
            Ok(joined) => match self.verdict(joined) {
                Err(e) => e,
                Ok(()) => Error::StreamInterrupted(format!(
                    "{} answered before receiving the full body ({} bytes sent)",
                    self.url, self.bytes_written
                )),
            },
            Err(_) => Error::StreamInterrupted(format!(
                "Upload to {} stalled after {} bytes",
                self.url, self.bytes_written
            )),
        }
    }
}

#[async_trait]
impl SinkWriter for HttpSinkWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let len = chunk.len() as u64;
        let delivered = match &mut self.body {
            Body::Streaming { sender: Some(sender), .. } => sender.send(chunk).await.is_ok(),
            Body::Streaming { sender: None, .. } => false,
            Body::Buffered { buffer, .. } => {
                buffer.extend_from_slice(&chunk);
                true
            }
        };

        if !delivered {
            let err = self.early_termination().await;
            warn!("[{}] Sink write failed: {err}", self.request_id);
            return Err(err);
        }
        self.bytes_written += len;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let timeout = this.transport.request_timeout();
        let result = match &mut this.body {
            Body::Streaming { sender, in_flight } => {
                // Dropping the sender ends the request body
                sender.take();
                match in_flight.take() {
                    None => Err(Error::StreamInterrupted(format!("Upload to {} was closed", this.url))),
                    Some(mut handle) => match tokio::time::timeout(timeout, &mut handle).await {
                        Ok(joined) => this.verdict(joined),
                        Err(_) => {
                            handle.abort();
                            Err(Error::TimeoutError(format!(
                                "No response from {} within {timeout:?}",
                                this.url
                            )))
                        }
                    },
                }
            }
            Body::Buffered { request, buffer } => {
                let payload = std::mem::take(buffer);
                match request.take() {
                    None => Err(Error::StreamInterrupted(format!("Upload to {} was closed", this.url))),
                    Some(request) => {
                        let request = request
                            .header(CONTENT_LENGTH, payload.len())
                            .body(payload);
                        match this.transport.send(request).await {
                            Ok(response) if response.status().is_success() => Ok(()),
                            Ok(response) => Err(Error::from_status(response.status(), &this.url)),
                            Err(e) => Err(e),
                        }
                    }
                }
            }
        };

        match &result {
            Ok(()) => debug!(
                "[{}] Sink {} accepted {} bytes",
                this.request_id, this.url, this.bytes_written
            ),
            Err(e) => warn!("[{}] Sink {} rejected upload: {e}", this.request_id, this.url),
        }
        result
    }

    async fn abort(self: Box<Self>) {
        let mut this = self;
        if let Body::Streaming { sender, in_flight } = &mut this.body {
            sender.take();
            if let Some(handle) = in_flight.take() {
                handle.abort();
            }
        }
        debug!("[{}] Sink {} aborted after {} bytes", this.request_id, this.url, this.bytes_written);
    }
}

impl Drop for HttpSinkWriter {
    fn drop(&mut self) {
        if let Body::Streaming { in_flight: Some(handle), .. } = &self.body {
            handle.abort();
        }
    }
}

/// Creates [`HttpDataSink`]s for requests whose destination is an `HttpData` address
pub struct HttpDataSinkFactory {
    transport: Arc<HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    queue_chunks: usize,
}

impl HttpDataSinkFactory {
    pub fn new(
        transport: Arc<HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
        queue_chunks: usize,
    ) -> Self {
        Self {
            transport,
            credentials,
            queue_chunks,
        }
    }

    pub fn can_handle(&self, request: &TransferRequest) -> bool {
        request.destination.is_http_data()
    }

    /// Check that a sink could be built for `request`, without any I/O
    pub fn validate(&self, request: &TransferRequest) -> Result<()> {
        if !self.can_handle(request) {
            return Err(Error::InvalidAddress(format!(
                "Destination address type {:?} is not handled",
                request.destination.address_type()
            )));
        }
        build_request(&request.destination, Direction::Sink, None, &*self.credentials).map(|_| ())
    }

    pub fn create_sink(&self, request: &TransferRequest) -> Result<HttpDataSink> {
        self.validate(request)?;
        Ok(HttpDataSink::new(
            request.id.clone(),
            request.destination.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.credentials),
            self.queue_chunks,
        ))
    }
}
