// ABOUTME: The site-adapter contract: the capability set every source site implements.
// ABOUTME: Defines Site, ListingHandle, AdapterResult, the SiteAdapter trait and URL helpers.

//! Site adapters.
//!
//! The engine only talks to sites through [`SiteAdapter`]. Each site is a
//! value implementing the trait, bound to its root URL at construction.
//! Submodules:
//! - `spec`: serde definitions of a site (selectors, page parameter, normalizer rules).
//! - `select`: selector-based value extraction over parsed HTML.
//! - `compiled`: cache of compiled CSS selectors and regexes.
//! - `selector_adapter`: the data-driven adapter built from a `SiteSpec`.
//! - `loader`: the built-in site catalogue.

pub mod compiled;
pub mod loader;
pub mod select;
pub mod selector_adapter;
pub mod spec;

use std::collections::BTreeMap;
use std::fmt;

use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::document::Document;
use crate::error::AdapterError;

/// Raw extracted fields, keyed by field name.
pub type Fields = BTreeMap<String, String>;

/// The source sites known to the puller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Site {
    Otodom,
    Olx,
    Domiporta,
    Zingat,
    Hepsiemlak,
    Emlakjet,
    Custom(String),
}

impl Site {
    pub fn as_str(&self) -> &str {
        match self {
            Site::Otodom => "otodom",
            Site::Olx => "olx",
            Site::Domiporta => "domiporta",
            Site::Zingat => "zingat",
            Site::Hepsiemlak => "hepsiemlak",
            Site::Emlakjet => "emlakjet",
            Site::Custom(name) => name,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Site {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "otodom" => Site::Otodom,
            "olx" => Site::Olx,
            "domiporta" => Site::Domiporta,
            "zingat" => Site::Zingat,
            "hepsiemlak" => Site::Hepsiemlak,
            "emlakjet" => Site::Emlakjet,
            other => Site::Custom(other.to_string()),
        }
    }
}

impl From<String> for Site {
    fn from(s: String) -> Self {
        Site::from(s.as_str())
    }
}

impl From<Site> for String {
    fn from(site: Site) -> Self {
        site.as_str().to_string()
    }
}

/// One listing entry cut out of an index page.
///
/// Holds the outer HTML of the listing element so it can outlive the
/// index document. Adapters re-parse it on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingHandle {
    /// Position of the listing on its index page, from 0.
    pub index: usize,
    html: String,
}

impl ListingHandle {
    pub fn new(index: usize, html: impl Into<String>) -> Self {
        Self {
            index,
            html: html.into(),
        }
    }

    /// Parses the listing markup as a fragment. The listing element itself
    /// is part of the fragment, so selectors may match it directly.
    pub fn fragment(&self) -> Html {
        Html::parse_fragment(&self.html)
    }
}

/// Outcome of a single adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterResult {
    Listings(Vec<ListingHandle>),
    Fields(Fields),
    NotFound,
    /// No listings on this index page: natural end of pagination.
    Empty,
}

impl AdapterResult {
    /// The extracted fields, or an empty map for any other outcome.
    pub fn into_fields(self) -> Fields {
        match self {
            AdapterResult::Fields(fields) => fields,
            _ => Fields::new(),
        }
    }
}

/// The capability set each source site provides to the engine.
pub trait SiteAdapter: Send + Sync {
    fn site(&self) -> Site;

    /// The root URL this adapter instance was bound to.
    fn root_url(&self) -> &str;

    /// URL fragment appended to the root URL to address index page
    /// `page_number` of `listing_page_slug`. Pure.
    fn page_param(&self, page_number: u32, listing_page_slug: &str) -> String;

    /// Listing entries on an index page. Returns `Empty`, never an error,
    /// when the page has no further listings.
    fn get_listings_list(&self, doc: &Document) -> Result<AdapterResult, AdapterError>;

    /// Absolute URL of the listing's detail page, if the listing links to one
    /// on this site.
    fn get_listing_url(&self, handle: &ListingHandle) -> Option<String>;

    /// Fields visible on the index page without following the link.
    fn get_listing_preview_data(
        &self,
        handle: &ListingHandle,
    ) -> Result<AdapterResult, AdapterError>;

    /// Fields from the listing's own page.
    fn get_listing_details(&self, doc: &Document) -> Result<AdapterResult, AdapterError>;

    /// A stable site-native key for the listing, used for identity when the
    /// listing has no detail URL.
    fn listing_key(&self, _handle: &ListingHandle) -> Option<String> {
        None
    }

    /// Whether the site shows any fields on its index pages.
    fn supports_previews(&self) -> bool {
        true
    }

    /// Whether the site's detail pages carry fields worth fetching.
    fn supports_details(&self) -> bool {
        true
    }

    /// Full URL of an index page.
    fn index_url(&self, page_number: u32, listing_page_slug: &str) -> String {
        format!(
            "{}{}",
            self.root_url().trim_end_matches('/'),
            self.page_param(page_number, listing_page_slug)
        )
    }
}

/// Resolves a listing href against the site root.
///
/// Relative hrefs are joined onto `root_url`. Absolute hrefs must point at
/// the same host as `root_url`; links to other hosts yield `None`.
pub fn resolve_listing_url(root_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let root = Url::parse(root_url).ok()?;
    let resolved = root.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    if resolved.host_str() != root.host_str() {
        return None;
    }
    Some(resolved.to_string())
}

/// Derives a listing identity from its detail URL: the path without a
/// trailing slash, plus the query string when present.
pub fn listing_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path().trim_end_matches('/');
    let id = match parsed.query() {
        Some(q) if !q.is_empty() => format!("{}?{}", path, q),
        _ => path.to_string(),
    };
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
