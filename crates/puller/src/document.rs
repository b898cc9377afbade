// ABOUTME: Parsed HTML documents handed to site adapters.
// ABOUTME: Decodes fetched bytes using the content-type charset or detection, then builds a scraper tree.

use scraper::Html;

use crate::error::AdapterError;
use crate::fetch::FetchedPage;

/// A parsed page, queryable with CSS selectors.
pub struct Document {
    url: String,
    html: Html,
}

impl Document {
    /// Parses a fetched page. An empty body is a parse failure.
    pub fn parse(page: &FetchedPage) -> Result<Self, AdapterError> {
        Self::parse_bytes(&page.final_url, &page.body, page.content_type.as_deref())
    }

    /// Parses raw bytes with an optional content-type hint.
    pub fn parse_bytes(
        url: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<Self, AdapterError> {
        let text = decode_body(body, content_type);
        if text.trim().is_empty() {
            return Err(AdapterError::parse(format!("empty document at {}", url)));
        }
        Ok(Self::from_html(url, &text))
    }

    /// Parses an already-decoded HTML string.
    pub fn from_html(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            html: Html::parse_document(html),
        }
    }

    /// The URL the document was loaded from, after redirects.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &Html {
        &self.html
    }
}

/// Decode body bytes to a String using charset from content-type header or detection.
pub(crate) fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if let Some(charset) = extract_charset(ct) {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(body);
                return decoded.into_owned();
            }
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    for part in lower.split(';') {
        let trimmed = part.trim();
        if let Some(charset) = trimmed.strip_prefix("charset=") {
            let charset = charset.trim_matches('"').trim_matches('\'');
            return Some(charset.to_string());
        }
    }
    None
}
