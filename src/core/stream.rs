//! Stream primitive for dataplane-http
//!
//! A [`DataStream`] owns a readable byte sequence together with its metadata.
//! Closing or dropping it releases the underlying connection.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::TryStreamExt;
use tokio::io::{AsyncRead, ReadBuf};

use crate::core::error::Result;

/// Progress callback receiving (transferred_bytes, expected_total). The total is 0 when unknown.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Metadata travelling with a byte stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMetadata {
    /// Part name, taken from the address `name` property
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Descriptive response headers forwarded by the source (`etag`,
    /// `last-modified`, `content-disposition`), keyed by lowercase name
    pub properties: BTreeMap<String, String>,
}

impl StreamMetadata {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }
}

/// A readable byte stream plus metadata
pub struct DataStream {
    metadata: StreamMetadata,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl DataStream {
    pub fn new(metadata: StreamMetadata, reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self { metadata, reader }
    }

    /// Wrap a successful HTTP response; the body is read lazily
    pub fn from_response(response: reqwest::Response, metadata: StreamMetadata) -> Self {
        let reader = tokio_util::io::StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );
        Self::new(metadata, Box::new(reader))
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    /// Release the underlying connection. Dropping the reader cannot fail,
    /// so HTTP-backed streams always close cleanly.
    pub async fn close(self) -> Result<()> {
        drop(self.reader);
        Ok(())
    }
}

impl AsyncRead for DataStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl fmt::Debug for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_stream_reads_and_keeps_metadata() {
        let metadata = StreamMetadata::default()
            .with_content_type("text/plain")
            .with_content_length(5);
        let mut stream = DataStream::new(metadata.clone(), Box::new(&b"hello"[..]));

        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();

        assert_eq!(body, b"hello");
        assert_eq!(stream.metadata(), &metadata);
        assert!(stream.close().await.is_ok());
    }

    #[test]
    fn test_debug_hides_reader() {
        let stream = DataStream::new(StreamMetadata::default(), Box::new(&b""[..]));
        let rendered = format!("{stream:?}");
        assert!(rendered.contains("DataStream"));
        assert!(rendered.contains("metadata"));
    }
}
