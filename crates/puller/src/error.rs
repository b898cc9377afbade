// ABOUTME: Error types for the listings puller: transport, adapter, config, sink and job errors.
// ABOUTME: TransportError is a coded struct with convenience constructors and boolean helpers.

use std::fmt;

use thiserror::Error;

/// Error codes representing different categories of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCode {
    InvalidUrl,
    Network,
    Timeout,
    Status(u16),
    TooLarge,
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportCode::InvalidUrl => write!(f, "invalid URL"),
            TransportCode::Network => write!(f, "network error"),
            TransportCode::Timeout => write!(f, "timeout"),
            TransportCode::Status(status) => write!(f, "HTTP status {}", status),
            TransportCode::TooLarge => write!(f, "response too large"),
        }
    }
}

/// A page fetch failed at the transport level.
#[derive(Debug, Error)]
pub struct TransportError {
    pub code: TransportCode,
    pub url: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch {}: {}", self.url, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl TransportError {
    pub fn invalid_url(url: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self {
            code: TransportCode::InvalidUrl,
            url: url.into(),
            source,
        }
    }

    pub fn network(url: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self {
            code: TransportCode::Network,
            url: url.into(),
            source,
        }
    }

    pub fn timeout(url: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self {
            code: TransportCode::Timeout,
            url: url.into(),
            source,
        }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            code: TransportCode::Status(status),
            url: url.into(),
            source: None,
        }
    }

    pub fn too_large(url: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self {
            code: TransportCode::TooLarge,
            url: url.into(),
            source,
        }
    }

    /// Returns the HTTP status if the server answered with a non-success code.
    pub fn http_status(&self) -> Option<u16> {
        match self.code {
            TransportCode::Status(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for failures worth another attempt: network errors,
    /// timeouts, 429 and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self.code {
            TransportCode::Network | TransportCode::Timeout => true,
            TransportCode::Status(s) => s == 429 || (500..600).contains(&s),
            TransportCode::InvalidUrl | TransportCode::TooLarge => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.code == TransportCode::Timeout
    }

    pub fn is_invalid_url(&self) -> bool {
        self.code == TransportCode::InvalidUrl
    }

    /// Returns true when the server says the page does not exist (404 or 410).
    pub fn is_gone(&self) -> bool {
        matches!(self.code, TransportCode::Status(404) | TransportCode::Status(410))
    }
}

/// Errors raised by a site adapter or the document parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The document structure is not what the adapter expects.
    #[error("parse failure: {0}")]
    ParseFailure(String),
}

impl AdapterError {
    pub fn parse(msg: impl Into<String>) -> Self {
        AdapterError::ParseFailure(msg.into())
    }
}

/// Configuration problems, detected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("both listing previews and listing pages are disabled; a row would have no fields")]
    NoExtractionEnabled,

    #[error("page_start must be at least 1, got {0}")]
    InvalidPageStart(u32),

    #[error("page_end ({end}) is before page_start ({start})")]
    InvalidPageRange { start: u32, end: u32 },

    #[error("invalid root URL {url:?}: {reason}")]
    InvalidRootUrl { url: String, reason: String },

    #[error("detail_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("unknown site {0:?}")]
    UnknownSite(String),

    #[error("invalid site definition: {0}")]
    InvalidSiteSpec(String),
}

/// Errors writing to or reading from the tabular output.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Job-terminating errors surfaced by the pagination driver.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The index page could not be fetched. Rows for pages up to
    /// `last_completed_page` are already in the sink.
    #[error("index page {page} could not be fetched (last completed page: {}): {source}", fmt_page(.last_completed_page))]
    IndexFetch {
        page: u32,
        last_completed_page: Option<u32>,
        #[source]
        source: TransportError,
    },

    /// Writing a record failed. Pages up to `last_completed_page` were
    /// fully written before the failure.
    #[error("writing output failed (last completed page: {}): {source}", fmt_page(.last_completed_page))]
    Sink {
        last_completed_page: Option<u32>,
        #[source]
        source: SinkError,
    },
}

impl IngestError {
    /// The last page whose rows were fully written before the job stopped.
    pub fn last_completed_page(&self) -> Option<u32> {
        match self {
            IngestError::IndexFetch {
                last_completed_page,
                ..
            }
            | IngestError::Sink {
                last_completed_page,
                ..
            } => *last_completed_page,
            IngestError::Config(_) => None,
        }
    }
}

fn fmt_page(page: &Option<u32>) -> String {
    page.map_or_else(|| "none".to_string(), |p| p.to_string())
}
