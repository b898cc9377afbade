// ABOUTME: Main library entry point for the listings puller ingestion engine.
// ABOUTME: Re-exports the public API: Driver, JobConfig, SiteAdapter, sinks, fetchers and the Normalizer.

//! Listings puller - paginated property-listing ingestion.
//!
//! The engine walks a site's index pages, extracts each listing's preview
//! fields and detail-page fields through a [`SiteAdapter`], and appends the
//! fused rows to a durable [`Sink`] one page at a time. A separate
//! [`Normalizer`] pass later turns the raw strings into typed columns.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use listings_puller::{
//!     load_builtin_sites, CsvSink, Driver, FetchConfig, HttpFetcher, JobConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sites = load_builtin_sites()?;
//!     let adapter = sites.adapter("otodom", None)?;
//!     let fetcher = HttpFetcher::new(FetchConfig::default())?;
//!     let job = JobConfig::builder()
//!         .listing_page_slug("pl/wyniki/wynajem/mieszkanie/mazowieckie/warszawa")
//!         .page_end(Some(2))
//!         .build()?;
//!
//!     let driver = Driver::new(Arc::new(adapter), Arc::new(fetcher), job)?;
//!     let mut sink = CsvSink::open("otodom.csv")?;
//!     let summary = driver.run(&mut sink, CancellationToken::new()).await?;
//!     println!("{} rows", summary.rows_written);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod record;
pub mod sink;

pub use crate::adapter::loader::{extend_from_file, load_builtin_sites, parse_sites};
pub use crate::adapter::selector_adapter::SelectorAdapter;
pub use crate::adapter::spec::{
    DetailTable, FieldExtractor, PageParam, SelectorSpec, SiteRegistry, SiteSpec,
};
pub use crate::adapter::{AdapterResult, Fields, ListingHandle, Site, SiteAdapter};
pub use crate::config::{Backoff, FetchConfig, JobConfig};
pub use crate::document::Document;
pub use crate::driver::{Driver, PageBatch, PageCursor, PageWalker, RunSummary, StopReason};
pub use crate::error::{
    AdapterError, ConfigError, IngestError, SinkError, TransportCode, TransportError,
};
pub use crate::fetch::{FetchedPage, Fetcher, HttpFetcher};
pub use crate::normalize::{Dataset, NormalizeSpec, Normalizer, Value};
pub use crate::record::ListingRecord;
pub use crate::sink::{CsvSink, MemorySink, Sink};
