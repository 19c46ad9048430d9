//! HTTP client for marketplace scraping
//!
//! Wraps `reqwest` with browser-like default headers and the shared retry
//! policy. Failures surface as [`FetchError`]; callers treat them as final
//! for the item being fetched.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::infrastructure::config::HttpConfig;
use crate::infrastructure::retry_policy::{RetryPolicy, RetryableError, retry_async};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("HTTP request failed for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP error {status}: {url}")]
    Status {
        status: u16,
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Empty response from {url}")]
    EmptyBody { url: String },

    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { url: url.to_string() }
        } else {
            Self::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// 408, 429 and every 5xx are worth another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

impl RetryableError for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } | Self::EmptyBody { .. } => true,
            Self::Status { status, .. } => StatusCode::from_u16(*status).is_ok_and(is_retryable_status),
            Self::InvalidUrl { .. } | Self::ClientBuild(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Source of raw HTML, the seam scrapers depend on
#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP client with browser default headers and retry policy
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    /// Optional context label for provenance in logs
    context_label: Option<String>,
}

impl HttpClient {
    pub fn with_config(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .default_headers(Self::default_headers(config)?)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
            context_label: None,
        })
    }

    /// Set a human-readable context label for logging provenance
    pub fn with_context_label(mut self, label: &str) -> Self {
        self.context_label = Some(label.to_string());
        self
    }

    fn default_headers(config: &HttpConfig) -> Result<HeaderMap, FetchError> {
        let value = |raw: &str| {
            HeaderValue::from_str(raw).map_err(|e| FetchError::ClientBuild(format!("invalid header value '{raw}': {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, value(&config.accept)?);
        headers.insert(header::ACCEPT_LANGUAGE, value(&config.accept_language)?);
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        Ok(headers)
    }

    /// Single attempt to fetch HTML content
    async fn fetch_html_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);

            debug!("HTTP {} from {}", status, url);
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                retry_after,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody { url: url.to_string() });
        }

        Ok(body)
    }
}

#[async_trait]
impl HtmlFetcher for HttpClient {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match &self.context_label {
            Some(label) => info!("🌐 HTTP GET ({}): {}", label, url),
            None => info!("🌐 HTTP GET: {}", url),
        }

        let html = retry_async(&self.retry, url, |_| self.fetch_html_once(url))
            .await
            .inspect_err(|e| error!("❌ HTTP fetch failed: {}", e))?;
        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Captures formatted log output for the current thread
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn error_lines(&self) -> usize {
            let output = String::from_utf8_lossy(&self.0.lock().unwrap()).to_string();
            output.lines().filter(|line| line.contains(" ERROR ")).count()
        }
    }

    fn test_config() -> HttpConfig {
        HttpConfig {
            timeout_seconds: 5,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 10,
                max_delay_ms: 50,
                backoff_multiplier: 2.0,
                jitter_ms: 0,
            },
            ..Default::default()
        }
    }

    /// Serves the canned `(status line, body)` responses in order, repeating the last one
    async fn spawn_server(responses: Vec<(&'static str, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[index.min(responses.len() - 1)];

                let mut buf = [0_u8; 4096];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/dp/B000000000"), hits)
    }

    #[test]
    fn test_client_creation() {
        assert!(HttpClient::with_config(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = HttpConfig {
            accept_language: "en\nus".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpClient::with_config(&config), Err(FetchError::ClientBuild(_))));
    }

    #[rstest]
    #[case(408, true)]
    #[case(429, true)]
    #[case(500, true)]
    #[case(503, true)]
    #[case(404, false)]
    #[case(403, false)]
    fn test_status_classification(#[case] status: u16, #[case] transient: bool) {
        let err = FetchError::Status {
            status,
            url: "https://www.amazon.com/dp/B000000000".to_string(),
            retry_after: None,
        };
        assert_eq!(err.is_transient(), transient);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_request() {
        let client = HttpClient::with_config(&test_config()).unwrap();
        let result = client.fetch_html("not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_server_error_retried_then_succeeds() {
        let (url, hits) = spawn_server(vec![
            ("503 Service Unavailable", "busy"),
            ("200 OK", "<html><body>ok</body></html>"),
        ])
        .await;

        let client = HttpClient::with_config(&test_config()).unwrap();
        let html = client.fetch_html(&url).await.unwrap();

        assert!(html.contains("ok"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_final() {
        let (url, hits) = spawn_server(vec![("404 Not Found", "missing")]).await;

        let client = HttpClient::with_config(&test_config()).unwrap();
        let result = client.fetch_html(&url).await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_surfaces_last_status() {
        let (url, hits) = spawn_server(vec![("502 Bad Gateway", "down")]).await;

        let client = HttpClient::with_config(&test_config()).unwrap();
        let result = client.fetch_html(&url).await;

        assert!(matches!(result, Err(FetchError::Status { status: 502, .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retried_statuses_are_not_logged_as_errors() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let (url, _) = spawn_server(vec![
            ("503 Service Unavailable", "busy"),
            ("503 Service Unavailable", "busy"),
            ("200 OK", "<html><body>ok</body></html>"),
        ])
        .await;

        let client = HttpClient::with_config(&test_config()).unwrap();
        client.fetch_html(&url).await.unwrap();

        assert_eq!(logs.error_lines(), 0);
    }

    #[tokio::test]
    async fn test_final_failure_logged_once() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let (url, _) = spawn_server(vec![("502 Bad Gateway", "down")]).await;

        let client = HttpClient::with_config(&test_config()).unwrap();
        assert!(client.fetch_html(&url).await.is_err());

        assert_eq!(logs.error_lines(), 1);
    }
}
