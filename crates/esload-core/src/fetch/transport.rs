//! HTTP transport used by the fetch cache and the npm tarball downloader.

use crate::error::{LoaderError, Result};
use crate::version::user_agent;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, redirect, Client};
use std::time::Duration;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single, non-redirect-following HTTP response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub location: Option<String>,
    pub body: Bytes,
}

impl TransportResponse {
    /// A `200 OK` response with the given content type and body.
    #[must_use]
    pub fn ok(content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            content_type: content_type.map(String::from),
            location: None,
            body: body.into(),
        }
    }

    /// A redirect response pointing at `location`.
    #[must_use]
    pub fn redirect(status: u16, location: &str) -> Self {
        Self {
            status,
            content_type: None,
            location: Some(location.to_string()),
            body: Bytes::new(),
        }
    }

    /// A response with only a status code.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            location: None,
            body: Bytes::new(),
        }
    }
}

/// Performs a single GET without following redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`.
    ///
    /// # Errors
    /// Returns an error only when no response was received. HTTP error
    /// statuses are returned as responses.
    async fn get(&self, url: &Url) -> Result<TransportResponse>;
}

/// `reqwest`-backed transport. Redirects are surfaced, never followed.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Create a transport with a connect timeout and the esload user agent.
    /// Requests themselves have no overall deadline.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(user_agent())
            .build()
            .map_err(|e| LoaderError::fetch_failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse> {
        let response = self.http.get(url.as_str()).send().await?;

        let status = response.status().as_u16();
        let header_str = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let content_type = header_str(header::CONTENT_TYPE);
        let location = header_str(header::LOCATION);

        let body = response.bytes().await?;

        Ok(TransportResponse {
            status,
            content_type,
            location,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpTransport::new().is_ok());
    }

    #[test]
    fn test_response_constructors() {
        let ok = TransportResponse::ok(Some("text/javascript"), "export {}");
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body.as_ref(), b"export {}");

        let moved = TransportResponse::redirect(302, "/next.ts");
        assert_eq!(moved.location.as_deref(), Some("/next.ts"));
        assert!(moved.body.is_empty());

        assert_eq!(TransportResponse::status(404).status, 404);
    }
}
