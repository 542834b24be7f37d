//! HTTP request construction
//!
//! Turns an address descriptor (and, for sinks, the metadata of the stream
//! about to be sent) into a fully resolved request. No I/O happens here.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Url};

use crate::core::address::DataAddress;
use crate::core::credentials::CredentialProvider;
use crate::core::error::{Error, Result};
use crate::core::stream::StreamMetadata;

/// Which side of a transfer a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Reading from the address
    Source,
    /// Writing to the address
    Sink,
}

impl Direction {
    fn default_method(self) -> Method {
        match self {
            Direction::Source => Method::GET,
            Direction::Sink => Method::POST,
        }
    }
}

/// A resolved outbound request, minus its body
#[derive(Debug, Clone)]
pub struct HttpRequestParams {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Send the body with an explicit Content-Length instead of chunked framing
    pub non_chunked: bool,
    pub name: Option<String>,
}

impl HttpRequestParams {
    /// Start a request on `client` with method, URL and headers applied
    pub fn to_builder(&self, client: &Client) -> RequestBuilder {
        client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone())
    }
}

/// Build the request for `address`.
///
/// `metadata` describes the outgoing stream and is only consulted for sink
/// requests, where it supplies Content-Type and Content-Length when the
/// address does not set them.
pub fn build_request(
    address: &DataAddress,
    direction: Direction,
    metadata: Option<&StreamMetadata>,
    credentials: &dyn CredentialProvider,
) -> Result<HttpRequestParams> {
    let url = resolve_url(address)?;
    let method = resolve_method(address, direction)?;
    let non_chunked = direction == Direction::Sink && address.non_chunked_transfer();

    let mut headers = HeaderMap::new();
    for (name, value) in address.headers() {
        insert_header(&mut headers, name, value)?;
    }
    if let (Some(key), Some(code)) = (address.auth_key(), address.auth_code()) {
        insert_header(&mut headers, key, code)?;
    }

    let resolved = credentials.resolve(address).map_err(|e| match e {
        Error::ClientError { .. } => e,
        other => Error::client(format!("Credential resolution failed: {other}")),
    })?;
    for (name, value) in &resolved {
        insert_header(&mut headers, name, value)
            .map_err(|e| Error::client(format!("Credential provider returned an unusable header: {e}")))?;
    }

    if direction == Direction::Sink {
        if !headers.contains_key(CONTENT_TYPE) {
            let content_type = address
                .content_type()
                .or_else(|| metadata.and_then(|m| m.content_type.as_deref()));
            if let Some(content_type) = content_type {
                insert_header(&mut headers, CONTENT_TYPE.as_str(), content_type)?;
            }
        }
        if !non_chunked && !headers.contains_key(CONTENT_LENGTH) {
            if let Some(length) = metadata.and_then(|m| m.content_length) {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
        }
    }

    Ok(HttpRequestParams {
        method,
        url,
        headers,
        non_chunked,
        name: address.name().map(str::to_string),
    })
}

fn resolve_url(address: &DataAddress) -> Result<Url> {
    let base = address
        .base_url()
        .ok_or_else(|| Error::InvalidAddress("Missing baseUrl".to_string()))?;

    let mut url = Url::parse(base.trim())
        .map_err(|e| Error::InvalidAddress(format!("Malformed baseUrl '{base}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidAddress(format!(
            "Unsupported scheme '{}' in baseUrl '{base}'",
            url.scheme()
        )));
    }

    if let Some(path) = address.path() {
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
    }

    if let Some(extra) = address.query_params() {
        let extra = extra.trim_start_matches(['?', '&']);
        let merged = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{extra}"),
            _ => extra.to_string(),
        };
        url.set_query(Some(&merged));
    }

    Ok(url)
}

fn resolve_method(address: &DataAddress, direction: Direction) -> Result<Method> {
    let Some(raw) = address.method() else {
        return Ok(direction.default_method());
    };

    let method = Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidAddress(format!("Invalid method '{raw}'")))?;

    if direction == Direction::Sink
        && !matches!(method, Method::POST | Method::PUT | Method::PATCH)
    {
        return Err(Error::InvalidAddress(format!(
            "Method {method} cannot carry a transfer body"
        )));
    }
    Ok(method)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::InvalidAddress(format!("Invalid header name '{name}'")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidAddress(format!("Invalid value for header '{name}'")))?;
    headers.insert(name, value);
    Ok(())
}
