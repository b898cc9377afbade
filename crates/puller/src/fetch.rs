// ABOUTME: Page fetching: the Fetcher trait the engine depends on and its reqwest implementation.
// ABOUTME: HttpFetcher retries transient failures with backoff and enforces content-length limits.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::TransportError;

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub redirected: bool,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchedPage {
    /// A 200 response for `url` with an HTML body, without redirects.
    pub fn html(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let url = url.into();
        Self {
            status: 200,
            final_url: url.clone(),
            url,
            redirected: false,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
        }
    }
}

/// Fetches raw page content. Retries, if any, happen behind this trait;
/// callers only see the terminal success or failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError>;
}

/// Fetcher over a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    cfg: FetchConfig,
}

impl HttpFetcher {
    /// Builds a fetcher with its own HTTP client configured from `cfg`.
    pub fn new(cfg: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(&cfg.user_agent)
            .timeout(cfg.timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;
        Ok(Self { client, cfg })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.cfg
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, TransportError> {
        let mut request = self.client.get(url);
        for (key, value) in &self.cfg.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| map_reqwest(url, e))?;

        let content_length = response.content_length().or_else(|| {
            response
                .headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
        });
        if let Some(len) = content_length {
            if len as usize > self.cfg.max_content_length {
                return Err(TransportError::too_large(
                    url,
                    Some(anyhow::anyhow!("content-length {} exceeds limit", len)),
                ));
            }
        }

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let redirected = url::Url::parse(url)
            .map(|requested| requested != final_url)
            .unwrap_or(true);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());

        if !(200..300).contains(&status) {
            return Err(TransportError::status(url, status));
        }

        let body = response.bytes().await.map_err(|e| map_reqwest(url, e))?;
        if body.len() > self.cfg.max_content_length {
            return Err(TransportError::too_large(
                url,
                Some(anyhow::anyhow!("body of {} bytes exceeds limit", body.len())),
            ));
        }

        Ok(FetchedPage {
            status,
            url: url.to_string(),
            final_url: final_url.to_string(),
            redirected,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TransportError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| TransportError::invalid_url(url, Some(anyhow::anyhow!("{}", e))))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TransportError::invalid_url(
                url,
                Some(anyhow::anyhow!("scheme must be http or https")),
            ));
        }

        let max_attempts = self.cfg.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(page) => {
                    debug!(url, status = page.status, bytes = page.body.len(), "fetched");
                    return Ok(page);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.cfg.backoff.delay(attempt);
                    warn!(url, attempt, max_attempts, error = %err, "fetch failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn map_reqwest(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(url, Some(err.into()))
    } else {
        TransportError::network(url, Some(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backoff;
    use httpmock::prelude::*;

    fn test_fetcher(max_attempts: u32) -> HttpFetcher {
        let cfg = FetchConfig::builder()
            .user_agent("test-agent")
            .max_attempts(max_attempts)
            .backoff(Backoff::none())
            .build()
            .unwrap();
        HttpFetcher::new(cfg).unwrap()
    }

    #[tokio::test]
    async fn fetch_ok() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/list").query_param("page", "2");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<ul><li>a</li></ul>");
        });

        let page = test_fetcher(1)
            .fetch(&server.url("/list?page=2"))
            .await
            .expect("fetch should succeed");
        mock.assert();

        assert_eq!(page.status, 200);
        assert!(!page.redirected);
        assert_eq!(&page.body[..], b"<ul><li>a</li></ul>");
        assert_eq!(
            page.content_type.as_deref(),
            Some("text/html; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn non_success_status_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not found");
        });

        let err = test_fetcher(3)
            .fetch(&server.url("/missing"))
            .await
            .expect_err("404 should fail");
        assert_eq!(mock.calls(), 1);
        assert!(err.is_gone());
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_max_attempts() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let err = test_fetcher(3)
            .fetch(&server.url("/flaky"))
            .await
            .expect_err("503 should fail after retries");
        assert_eq!(mock.calls(), 3);
        assert_eq!(err.http_status(), Some(503));
    }

    #[tokio::test]
    async fn redirect_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/old-list");
            then.status(302).header("location", "/list");
        });
        server.mock(|when, then| {
            when.method(GET).path("/list");
            then.status(200).body("<html></html>");
        });

        let page = test_fetcher(1)
            .fetch(&server.url("/old-list"))
            .await
            .unwrap();
        assert!(page.redirected);
        assert!(page.final_url.ends_with("/list"));
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let err = test_fetcher(1)
            .fetch("ftp://example.com/file")
            .await
            .unwrap_err();
        assert!(err.is_invalid_url());
    }

    #[tokio::test]
    async fn content_length_limit() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/big");
            then.status(200).body("x".repeat(64));
        });

        let cfg = FetchConfig::builder()
            .max_content_length(16)
            .max_attempts(1)
            .build()
            .unwrap();
        let err = HttpFetcher::new(cfg)
            .unwrap()
            .fetch(&server.url("/big"))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::TransportCode::TooLarge);
    }
}
