// ABOUTME: ListingRecord, the fused output row of one listing, and its flattening to named columns.
// ABOUTME: Detail fields win over preview fields on key collisions; metadata columns come first.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::adapter::{Fields, Site};

/// Metadata columns written ahead of the extracted fields, in this order.
pub const METADATA_COLUMNS: &[&str] = &[
    "listing_id",
    "source_site",
    "page",
    "url",
    "fetched_at",
    "fetch_error",
];

/// One listing, fused from its preview and detail extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    pub listing_id: String,
    pub source_site: Site,
    /// Index page the listing was found on.
    pub page: u32,
    pub url: Option<String>,
    pub preview_fields: Fields,
    pub detail_fields: Fields,
    pub fetched_at: DateTime<Utc>,
    /// Set when the detail page could not be fetched.
    pub fetch_error: Option<String>,
}

impl ListingRecord {
    /// Flattens the record into (column, value) pairs: metadata first, then
    /// preview fields overlaid by detail fields.
    pub fn columns(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = vec![
            ("listing_id".to_string(), self.listing_id.clone()),
            ("source_site".to_string(), self.source_site.to_string()),
            ("page".to_string(), self.page.to_string()),
            ("url".to_string(), self.url.clone().unwrap_or_default()),
            (
                "fetched_at".to_string(),
                self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "fetch_error".to_string(),
                self.fetch_error.clone().unwrap_or_default(),
            ),
        ];

        let mut merged = self.preview_fields.clone();
        for (key, value) in &self.detail_fields {
            merged.insert(key.clone(), value.clone());
        }
        for (key, value) in merged {
            if METADATA_COLUMNS.contains(&key.as_str()) {
                continue;
            }
            out.push((key, value));
        }
        out
    }
}
