//! Best-effort link shortening for diagram URLs.
//!
//! Shortening never fails the caller: any non-200 answer, transport error,
//! or empty body falls back to the original long URL.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use wikiscribe_shared::{Result, WikiScribeError};

/// User-Agent string for shortener requests.
const USER_AGENT: &str = concat!("WikiScribe/", env!("CARGO_PKG_VERSION"));

/// Outcome of a shortening attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortenedUrl {
    /// The service returned a short URL.
    Shortened(String),
    /// The service was unavailable; this is the original long URL.
    Fallback(String),
}

impl ShortenedUrl {
    /// The URL to embed, whichever way it was obtained.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Shortened(url) | Self::Fallback(url) => url,
        }
    }

    pub fn into_url(self) -> String {
        match self {
            Self::Shortened(url) | Self::Fallback(url) => url,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Client for a TinyURL-compatible `api-create.php` endpoint.
#[derive(Debug, Clone)]
pub struct LinkShortener {
    client: Client,
    endpoint: String,
}

impl LinkShortener {
    /// Create a shortener for `host` (e.g. `https://tinyurl.com`).
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| WikiScribeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api-create.php", host.trim_end_matches('/')),
        })
    }

    /// Shorten `long_url`, falling back to it on any failure.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn shorten(&self, long_url: &str) -> ShortenedUrl {
        match self.request(long_url).await {
            Ok(short) => {
                debug!(%short, "diagram URL shortened");
                ShortenedUrl::Shortened(short)
            }
            Err(e) => {
                warn!(error = %e, "link shortening failed, using long URL");
                ShortenedUrl::Fallback(long_url.to_string())
            }
        }
    }

    async fn request(&self, long_url: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", long_url)])
            .send()
            .await
            .map_err(|e| WikiScribeError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(WikiScribeError::Network(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body = response.text().await.map_err(|e| {
            WikiScribeError::Network(format!("{}: failed to read body: {e}", self.endpoint))
        })?;

        let short = body.trim();
        if short.is_empty() {
            return Err(WikiScribeError::Network(format!(
                "{}: empty response body",
                self.endpoint
            )));
        }
        Ok(short.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LONG: &str = "https://kroki.io/mermaid/png/eNpLL0osyFAIcbHm4gIAFZwDeA==";

    fn shortener(host: &str) -> LinkShortener {
        LinkShortener::new(host, Duration::from_secs(2)).expect("build shortener")
    }

    #[tokio::test]
    async fn returns_short_url_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api-create.php"))
            .and(query_param("url", LONG))
            .respond_with(ResponseTemplate::new(200).set_body_string("https://tinyurl.com/abc123\n"))
            .expect(1)
            .mount(&server)
            .await;

        let result = shortener(&server.uri()).shorten(LONG).await;
        assert_eq!(result, ShortenedUrl::Shortened("https://tinyurl.com/abc123".into()));
    }

    #[tokio::test]
    async fn falls_back_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api-create.php"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = shortener(&server.uri()).shorten(LONG).await;
        assert!(result.is_fallback());
        assert_eq!(result.as_str(), LONG);
    }

    #[tokio::test]
    async fn falls_back_on_non_200_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api-create.php"))
            .respond_with(ResponseTemplate::new(201).set_body_string("https://tinyurl.com/x"))
            .mount(&server)
            .await;

        let result = shortener(&server.uri()).shorten(LONG).await;
        assert_eq!(result, ShortenedUrl::Fallback(LONG.into()));
    }

    #[tokio::test]
    async fn falls_back_on_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api-create.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  "))
            .mount(&server)
            .await;

        let result = shortener(&server.uri()).shorten(LONG).await;
        assert!(result.is_fallback());
    }

    #[tokio::test]
    async fn falls_back_when_unreachable() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let result = shortener(&uri).shorten(LONG).await;
        assert_eq!(result.into_url(), LONG);
    }
}
