//! Transport seam between the update logic and the deployment server.
//!
//! The update code never opens sockets itself: it builds plain `reqwest`
//! requests and hands them to an [`ApiRequester`]. Production uses
//! `reqwest::Client`; tests substitute scripted executors.

use std::time::Duration;

use reqwest::{Client, Request, Response};
use thiserror::Error;
use url::Url;

/// Path prefix every device-facing deployment API route lives under.
pub const API_PREFIX: &str = "/api/devices";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ── Errors ────────────────────────────────────────────────────────────────────

/// Transport-level failure (connection, TLS, timeout).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP transport: {0}")]
    Http(#[from] reqwest::Error),

    /// For executors not backed by reqwest (scripted test transports).
    #[error("transport: {0}")]
    Other(String),
}

// ── Request executor ──────────────────────────────────────────────────────────

/// Capability to execute one HTTP request.
pub trait ApiRequester {
    /// Send `request` and return the raw response.
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

impl ApiRequester for Client {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.execute(request).await?)
    }
}

impl<A: ApiRequester> ApiRequester for &A {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        (**self).send(request).await
    }
}

/// Build the HTTP client shared by all deployment API calls.
///
/// Only the connect phase is bounded; artifact downloads may legitimately
/// run longer than any fixed request timeout.
pub fn new_api_client() -> Result<Client, TransportError> {
    Ok(Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("ota-client/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

// ── URL building ──────────────────────────────────────────────────────────────

/// Compose a deployment API URL from the configured server address and an
/// API path.
///
/// `server` may omit the scheme (`https://` is assumed) and may carry a
/// trailing slash; `path` must start with `/`.
pub fn build_api_url(server: &str, path: &str) -> Result<Url, url::ParseError> {
    let server = server.trim_end_matches('/');
    let base = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{server}")
    };
    Url::parse(&format!("{base}{API_PREFIX}{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_adds_default_scheme() {
        let u = build_api_url("hub.example.com", "/v2/deployments/device/deployments/next").unwrap();
        assert_eq!(
            u.as_str(),
            "https://hub.example.com/api/devices/v2/deployments/device/deployments/next"
        );
    }

    #[test]
    fn url_keeps_explicit_scheme_and_port() {
        let u = build_api_url("http://10.0.0.2:8080", "/v1/status").unwrap();
        assert_eq!(u.as_str(), "http://10.0.0.2:8080/api/devices/v1/status");
    }

    #[test]
    fn url_strips_trailing_slash() {
        let u = build_api_url("https://hub.example.com/", "/v1/status").unwrap();
        assert_eq!(u.as_str(), "https://hub.example.com/api/devices/v1/status");
    }

    #[test]
    fn url_rejects_garbage() {
        assert!(build_api_url("http://", "/v1/status").is_err());
    }
}
