// ABOUTME: Job and fetch configuration for the listings puller, with fluent builders.
// ABOUTME: JobConfig drives the pagination driver; FetchConfig drives the HTTP fetcher and its retries.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration for one ingestion job against one site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Overrides the site's built-in root URL when set.
    pub root_url: Option<String>,
    /// Path or query fragment selecting the listing category or search.
    pub listing_page_slug: String,
    /// First index page to visit, starting from 1.
    pub page_start: u32,
    /// Last index page to visit (inclusive). `None` walks until exhaustion.
    pub page_end: Option<u32>,
    /// Extract fields visible on the index page.
    pub get_listing_previews: bool,
    /// Follow each listing to its detail page.
    pub get_listing_pages: bool,
    /// Maximum detail pages fetched at once within one index page.
    pub detail_concurrency: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            root_url: None,
            listing_page_slug: String::new(),
            page_start: 1,
            page_end: None,
            get_listing_previews: true,
            get_listing_pages: true,
            detail_concurrency: 1,
        }
    }
}

impl JobConfig {
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    /// Checks the configuration before any network activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.get_listing_previews && !self.get_listing_pages {
            return Err(ConfigError::NoExtractionEnabled);
        }
        if self.page_start < 1 {
            return Err(ConfigError::InvalidPageStart(self.page_start));
        }
        if let Some(end) = self.page_end {
            if end < self.page_start {
                return Err(ConfigError::InvalidPageRange {
                    start: self.page_start,
                    end,
                });
            }
        }
        if self.detail_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if let Some(ref root) = self.root_url {
            validate_root_url(root)?;
        }
        Ok(())
    }
}

/// Checks that a root URL is an absolute http(s) URL.
pub fn validate_root_url(root: &str) -> Result<url::Url, ConfigError> {
    let parsed = url::Url::parse(root).map_err(|e| ConfigError::InvalidRootUrl {
        url: root.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ConfigError::InvalidRootUrl {
            url: root.to_string(),
            reason: format!("scheme must be http or https, got {}", other),
        }),
    }
}

/// Builder for constructing JobConfig instances.
#[derive(Debug, Clone, Default)]
pub struct JobBuilder {
    cfg: JobConfig,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_url(mut self, root_url: impl Into<String>) -> Self {
        self.cfg.root_url = Some(root_url.into());
        self
    }

    pub fn listing_page_slug(mut self, slug: impl Into<String>) -> Self {
        self.cfg.listing_page_slug = slug.into();
        self
    }

    pub fn page_start(mut self, page: u32) -> Self {
        self.cfg.page_start = page;
        self
    }

    pub fn page_end(mut self, page: Option<u32>) -> Self {
        self.cfg.page_end = page;
        self
    }

    pub fn get_listing_previews(mut self, enabled: bool) -> Self {
        self.cfg.get_listing_previews = enabled;
        self
    }

    pub fn get_listing_pages(mut self, enabled: bool) -> Self {
        self.cfg.get_listing_pages = enabled;
        self
    }

    pub fn detail_concurrency(mut self, n: usize) -> Self {
        self.cfg.detail_concurrency = n;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<JobConfig, ConfigError> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Exponential backoff between fetch attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// No waiting between attempts.
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            factor: 1.0,
            max: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let nanos = (self.initial.as_nanos() as f64 * self.factor.powi(exp)).round();
        let delay = Duration::from_nanos(nanos.clamp(0.0, u64::MAX as f64) as u64);
        delay.min(self.max)
    }
}

/// Configuration for the HTTP page fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub headers: HashMap<String, String>,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub max_content_length: usize,
}

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "listings-puller/0.1".to_string(),
            headers: HashMap::new(),
            max_attempts: 3,
            backoff: Backoff::default(),
            max_content_length: MAX_CONTENT_LENGTH,
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchBuilder {
        FetchBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}

/// Builder for constructing FetchConfig instances.
#[derive(Debug, Clone, Default)]
pub struct FetchBuilder {
    cfg: FetchConfig,
}

impl FetchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.cfg.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.cfg.user_agent = user_agent.into();
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cfg.headers.insert(key.into(), value.into());
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.cfg.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.cfg.backoff = backoff;
        self
    }

    pub fn max_content_length(mut self, bytes: usize) -> Self {
        self.cfg.max_content_length = bytes;
        self
    }

    pub fn build(self) -> Result<FetchConfig, ConfigError> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let cfg = JobConfig::default();
        assert_eq!(cfg.page_start, 1);
        assert_eq!(cfg.page_end, None);
        assert!(cfg.get_listing_previews);
        assert!(cfg.get_listing_pages);
        assert_eq!(cfg.detail_concurrency, 1);
    }

    #[test]
    fn both_extractions_disabled_is_rejected() {
        let err = JobConfig::builder()
            .get_listing_previews(false)
            .get_listing_pages(false)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NoExtractionEnabled);
    }

    #[test]
    fn page_range_is_checked() {
        let err = JobConfig::builder()
            .page_start(5)
            .page_end(Some(4))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidPageRange { start: 5, end: 4 });

        let err = JobConfig::builder().page_start(0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidPageStart(0));

        assert!(JobConfig::builder()
            .page_start(3)
            .page_end(Some(3))
            .build()
            .is_ok());
    }

    #[test]
    fn root_url_must_be_http() {
        let err = JobConfig::builder()
            .root_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRootUrl { .. }));
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: JobConfig =
            serde_json::from_str(r#"{"listing_page_slug": "wynajem", "page_end": 7}"#).unwrap();
        assert_eq!(cfg.listing_page_slug, "wynajem");
        assert_eq!(cfg.page_end, Some(7));
        assert_eq!(cfg.page_start, 1);
        assert!(cfg.get_listing_pages);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let b = Backoff {
            initial: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_millis(300),
        };
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(300));
        assert_eq!(Backoff::none().delay(4), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = FetchConfig::builder().max_attempts(0).build().unwrap_err();
        assert_eq!(err, ConfigError::ZeroAttempts);
    }
}
