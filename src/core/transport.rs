//! Shared HTTP transport
//!
//! One [`HttpTransport`] is built per process and handed to every adapter by
//! `Arc`. The inner `reqwest::Client` owns the connection pool and is safe for
//! concurrent use.

use std::time::Duration;

use log::debug;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};

use crate::core::config::TransferConfig;
use crate::core::error::{Error, Result};

pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransferConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(20)
            .connect_timeout(config.connect_timeout)
            // 3xx answers are reported to the caller, never followed
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(format!("dataplane-http/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send a request and wait for its response headers.
    ///
    /// Only the wait for headers is bounded by the request timeout; reading the
    /// body afterwards is not.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.build()?;
        let url = request.url().to_string();
        debug!("Executing HTTP request: {} {url}", request.method());

        match tokio::time::timeout(self.request_timeout, self.client.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_connect() => {
                Err(Error::transient(format!("Connection to {url} failed: {e}")))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::TimeoutError(format!(
                "No response from {url} within {:?}",
                self.request_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_returns_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&TransferConfig::default()).unwrap();
        let response = transport
            .send(transport.client().get(server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 204);
    }

    #[tokio::test]
    async fn test_send_times_out_waiting_for_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = TransferConfig {
            request_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let err = transport
            .send(transport.client().get(server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimeoutError);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(&TransferConfig::default()).unwrap();
        let err = transport
            .send(transport.client().get(format!("http://{addr}/")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientError);
    }
}
