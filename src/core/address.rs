//! Address descriptors and transfer requests
//!
//! A [`DataAddress`] is an immutable string map describing one HTTP endpoint.
//! Key names follow the HTTP data address convention used by dataspace
//! connectors (`baseUrl`, `path`, `queryParams`, `header:<Name>`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Address type handled by this extension
pub const HTTP_DATA_TYPE: &str = "HttpData";

/// Address type registered by anonymizing HTTP data planes; same wire contract
pub const HTTP_DATA_ANONYMIZE_TYPE: &str = "HttpDataAnonymize";

pub const TYPE: &str = "type";
pub const BASE_URL: &str = "baseUrl";
pub const PATH: &str = "path";
pub const QUERY_PARAMS: &str = "queryParams";
pub const METHOD: &str = "method";
pub const CONTENT_TYPE: &str = "contentType";
pub const NAME: &str = "name";
pub const AUTH_KEY: &str = "authKey";
pub const AUTH_CODE: &str = "authCode";
pub const SECRET_NAME: &str = "secretName";
pub const NON_CHUNKED_TRANSFER: &str = "nonChunkedTransfer";
pub const HEADER_PREFIX: &str = "header:";

/// Structured description of an HTTP endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataAddress {
    properties: BTreeMap<String, String>,
}

impl DataAddress {
    /// Shorthand for an `HttpData` address pointing at `base_url`
    pub fn http(base_url: impl Into<String>) -> Self {
        Self::default()
            .with(TYPE, HTTP_DATA_TYPE)
            .with(BASE_URL, base_url)
    }

    /// Return a copy with `key` set to `value`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Return a copy carrying an additional request header
    pub fn with_header(self, name: &str, value: impl Into<String>) -> Self {
        self.with(format!("{HEADER_PREFIX}{name}"), value)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn address_type(&self) -> Option<&str> {
        self.get(TYPE)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.get(BASE_URL).filter(|url| !url.trim().is_empty())
    }

    pub fn path(&self) -> Option<&str> {
        self.get(PATH).filter(|p| !p.is_empty())
    }

    pub fn query_params(&self) -> Option<&str> {
        self.get(QUERY_PARAMS).filter(|q| !q.is_empty())
    }

    pub fn method(&self) -> Option<&str> {
        self.get(METHOD).filter(|m| !m.is_empty())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE).filter(|c| !c.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME)
    }

    pub fn auth_key(&self) -> Option<&str> {
        self.get(AUTH_KEY).filter(|k| !k.is_empty())
    }

    pub fn auth_code(&self) -> Option<&str> {
        self.get(AUTH_CODE)
    }

    pub fn secret_name(&self) -> Option<&str> {
        self.get(SECRET_NAME).filter(|s| !s.is_empty())
    }

    pub fn non_chunked_transfer(&self) -> bool {
        self.get(NON_CHUNKED_TRANSFER)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Additional headers declared with the `header:` prefix
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().filter_map(|(key, value)| {
            key.strip_prefix(HEADER_PREFIX)
                .map(|name| (name, value.as_str()))
        })
    }

    pub fn is_http_data(&self) -> bool {
        matches!(
            self.address_type(),
            Some(HTTP_DATA_TYPE) | Some(HTTP_DATA_ANONYMIZE_TYPE)
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DataAddress {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Direction of data movement relative to the consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    /// The data plane pushes data to the destination
    #[default]
    Push,
    /// The consumer pulls data through the data plane
    Pull,
}

/// A single unit of work issued by the orchestrating manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub id: String,
    pub source: DataAddress,
    pub destination: DataAddress,
    #[serde(default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl TransferRequest {
    pub fn new(id: impl Into<String>, source: DataAddress, destination: DataAddress) -> Self {
        Self {
            id: id.into(),
            source,
            destination,
            flow_type: FlowType::default(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_flow_type(mut self, flow_type: FlowType) -> Self {
        self.flow_type = flow_type;
        self
    }
}
