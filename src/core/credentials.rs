//! Credential injection for outbound requests
//!
//! The request builder asks a [`CredentialProvider`] for extra headers before
//! every request. A provider failure is reported to callers as a client error.

use std::collections::HashMap;

use crate::core::address::DataAddress;
use crate::core::error::{Error, Result};

/// Header used when an address names a secret but no `authKey`
pub const DEFAULT_AUTH_HEADER: &str = "Authorization";

/// Resolves authentication headers for an address
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self, address: &DataAddress) -> Result<Vec<(String, String)>>;
}

/// Adds nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn resolve(&self, _address: &DataAddress) -> Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

/// Sends the same bearer token to every endpoint
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for BearerToken {
    fn resolve(&self, _address: &DataAddress) -> Result<Vec<(String, String)>> {
        Ok(vec![(
            DEFAULT_AUTH_HEADER.to_string(),
            format!("Bearer {}", self.0),
        )])
    }
}

/// Looks up the address's `secretName` in an in-memory vault.
///
/// The secret value is sent in the header named by `authKey`, or
/// `Authorization` when the address has none. Addresses without a
/// `secretName` get no extra headers.
#[derive(Clone, Default)]
pub struct SecretStore {
    secrets: HashMap<String, String>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

impl CredentialProvider for SecretStore {
    fn resolve(&self, address: &DataAddress) -> Result<Vec<(String, String)>> {
        let Some(secret_name) = address.secret_name() else {
            return Ok(Vec::new());
        };

        let value = self
            .secrets
            .get(secret_name)
            .ok_or_else(|| Error::client(format!("No secret found for '{secret_name}'")))?;

        let header = address.auth_key().unwrap_or(DEFAULT_AUTH_HEADER);
        Ok(vec![(header.to_string(), value.clone())])
    }
}
