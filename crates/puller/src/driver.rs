// ABOUTME: Pagination driver: walks index pages, fuses preview and detail fields per listing, writes pages to a sink.
// ABOUTME: Each page's rows reach the sink as one contiguous unit before the cursor moves past that page.

//! The ingestion engine.
//!
//! [`PageWalker`] is the lazy, pull-based page sequence: each call to
//! [`PageWalker::next_page`] fetches one index page, extracts its listings
//! and returns their fused records. [`Driver::run`] drains a walker into a
//! [`Sink`] and reports a [`RunSummary`].
//!
//! Termination:
//! - `page_end` reached (inclusive).
//! - The adapter reports `Empty` for an index page.
//! - The index page cannot be parsed, or answers 404/410 (treated as past
//!   the end rather than aborting the job).
//! - An index page above 1 redirects elsewhere.
//! - The cancellation token fires; the current partial page is discarded.
//!
//! Only a transport failure on an index page is fatal.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{listing_id_from_url, AdapterResult, Fields, SiteAdapter};
use crate::config::JobConfig;
use crate::document::Document;
use crate::error::{ConfigError, IngestError};
use crate::fetch::Fetcher;
use crate::record::ListingRecord;
use crate::sink::Sink;

/// Position of the driver in the page sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page_number: u32,
    pub page_end: Option<u32>,
}

impl PageCursor {
    pub fn new(page_start: u32, page_end: Option<u32>) -> Self {
        Self {
            page_number: page_start,
            page_end,
        }
    }

    /// True once the cursor has moved past `page_end`.
    pub fn is_past_end(&self) -> bool {
        self.page_end.is_some_and(|end| self.page_number > end)
    }

    pub fn advance(&mut self) {
        self.page_number = self.page_number.saturating_add(1);
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// An index page had no listings.
    Exhausted,
    /// The last configured page was processed.
    PageEndReached,
    /// An index page could not be parsed or no longer exists.
    MalformedPage,
    /// An index page redirected elsewhere.
    Redirected,
    Cancelled,
}

/// The records of one fully processed index page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBatch {
    pub page: u32,
    pub records: Vec<ListingRecord>,
    /// Listings dropped for lacking an identity.
    pub skipped: usize,
    /// Records whose detail page could not be fetched.
    pub detail_failures: usize,
}

/// Outcome of [`Driver::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pages_visited: u32,
    pub last_completed_page: Option<u32>,
    pub rows_written: usize,
    pub skipped: usize,
    pub detail_failures: usize,
    pub stop_reason: StopReason,
}

struct Pending {
    listing_id: String,
    url: Option<String>,
    preview: Fields,
}

#[derive(Debug, Clone, Default)]
struct Detail {
    fields: Fields,
    error: Option<String>,
}

/// Lazy sequence of processed index pages.
pub struct PageWalker<'a> {
    adapter: &'a dyn SiteAdapter,
    fetcher: &'a dyn Fetcher,
    job: &'a JobConfig,
    cursor: PageCursor,
    cancel: CancellationToken,
    last_completed: Option<u32>,
    pages_fetched: u32,
    finished: Option<StopReason>,
    failed: bool,
}

impl<'a> PageWalker<'a> {
    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    /// Index pages requested so far, including the one that ended the run.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn last_completed_page(&self) -> Option<u32> {
        self.last_completed
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.finished
    }

    fn stop(&mut self, reason: StopReason) -> Option<PageBatch> {
        self.finished = Some(reason);
        None
    }

    /// Processes the next index page. Returns `Ok(None)` once the sequence
    /// has ended; see [`PageWalker::stop_reason`] for why.
    pub async fn next_page(&mut self) -> Result<Option<PageBatch>, IngestError> {
        if self.finished.is_some() || self.failed {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            return Ok(self.stop(StopReason::Cancelled));
        }
        if self.cursor.is_past_end() {
            return Ok(self.stop(StopReason::PageEndReached));
        }

        let adapter = self.adapter;
        let fetcher = self.fetcher;
        let page = self.cursor.page_number;
        let url = adapter.index_url(page, &self.job.listing_page_slug);
        info!(site = %adapter.site(), page, url = %url, "searching listings");

        self.pages_fetched += 1;
        let fetched = match fetcher.fetch(&url).await {
            Ok(fetched) => fetched,
            Err(err) if err.is_gone() => {
                warn!(page, error = %err, "index page gone, treating as end of pagination");
                return Ok(self.stop(StopReason::MalformedPage));
            }
            Err(err) => {
                self.failed = true;
                return Err(IngestError::IndexFetch {
                    page,
                    last_completed_page: self.last_completed,
                    source: err,
                });
            }
        };

        if fetched.redirected && page > 1 {
            info!(page, final_url = %fetched.final_url, "index page redirected, end of pagination");
            return Ok(self.stop(StopReason::Redirected));
        }

        let listed = Document::parse(&fetched).and_then(|doc| adapter.get_listings_list(&doc));
        let handles = match listed {
            Ok(AdapterResult::Listings(handles)) => handles,
            Ok(AdapterResult::Empty) => {
                info!(page, "no more listings");
                return Ok(self.stop(StopReason::Exhausted));
            }
            Ok(other) => {
                warn!(page, result = ?other, "unexpected listings result, treating as end of pagination");
                return Ok(self.stop(StopReason::MalformedPage));
            }
            Err(err) => {
                warn!(page, error = %err, "index page could not be parsed, treating as end of pagination");
                return Ok(self.stop(StopReason::MalformedPage));
            }
        };

        let want_previews = self.job.get_listing_previews && adapter.supports_previews();
        let want_details = self.job.get_listing_pages && adapter.supports_details();

        let mut seen = HashSet::new();
        let mut pending = Vec::with_capacity(handles.len());
        let mut skipped = 0;
        for handle in &handles {
            if self.cancel.is_cancelled() {
                return Ok(self.stop(StopReason::Cancelled));
            }
            let url = adapter.get_listing_url(handle);
            let identity = url
                .as_deref()
                .and_then(listing_id_from_url)
                .or_else(|| adapter.listing_key(handle));
            let Some(listing_id) = identity else {
                warn!(page, index = handle.index, "listing has no identity, skipping");
                skipped += 1;
                continue;
            };
            if !seen.insert(listing_id.clone()) {
                debug!(page, listing_id = %listing_id, "listing repeated on page, keeping first");
                continue;
            }

            let preview = if want_previews {
                match adapter.get_listing_preview_data(handle) {
                    Ok(result) => result.into_fields(),
                    Err(err) => {
                        warn!(page, listing_id = %listing_id, error = %err, "preview extraction failed");
                        Fields::new()
                    }
                }
            } else {
                Fields::new()
            };
            pending.push(Pending {
                listing_id,
                url,
                preview,
            });
        }

        let details = if want_details {
            let cancel = self.cancel.clone();
            let fetches = stream::iter(
                pending
                    .iter()
                    .map(|p| fetch_detail(fetcher, adapter, &cancel, page, p.url.clone())),
            )
            .buffered(self.job.detail_concurrency.max(1))
            .collect::<Vec<_>>();
            let collected = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                details = fetches => Some(details),
            };
            match collected {
                Some(details) if !cancel.is_cancelled() => details,
                _ => return Ok(self.stop(StopReason::Cancelled)),
            }
        } else {
            vec![Detail::default(); pending.len()]
        };

        let site = adapter.site();
        let mut detail_failures = 0;
        let records: Vec<ListingRecord> = pending
            .into_iter()
            .zip(details)
            .map(|(p, d)| {
                if d.error.is_some() {
                    detail_failures += 1;
                }
                ListingRecord {
                    listing_id: p.listing_id,
                    source_site: site.clone(),
                    page,
                    url: p.url,
                    preview_fields: p.preview,
                    detail_fields: d.fields,
                    fetched_at: Utc::now(),
                    fetch_error: d.error,
                }
            })
            .collect();

        self.last_completed = Some(page);
        self.cursor.advance();
        Ok(Some(PageBatch {
            page,
            records,
            skipped,
            detail_failures,
        }))
    }
}

async fn fetch_detail(
    fetcher: &dyn Fetcher,
    adapter: &dyn SiteAdapter,
    cancel: &CancellationToken,
    page: u32,
    url: Option<String>,
) -> Detail {
    let Some(url) = url else {
        debug!(page, "listing has no detail URL");
        return Detail::default();
    };
    if cancel.is_cancelled() {
        return Detail::default();
    }
    match fetcher.fetch(&url).await {
        Ok(fetched) => {
            let parsed = Document::parse(&fetched).and_then(|doc| adapter.get_listing_details(&doc));
            match parsed {
                Ok(result) => Detail {
                    fields: result.into_fields(),
                    error: None,
                },
                Err(err) => {
                    warn!(page, url = %url, error = %err, "detail page could not be parsed");
                    Detail::default()
                }
            }
        }
        Err(err) => {
            warn!(page, url = %url, error = %err, "detail page fetch failed");
            Detail {
                fields: Fields::new(),
                error: Some(err.to_string()),
            }
        }
    }
}

/// Runs one ingestion job of one site.
pub struct Driver {
    adapter: Arc<dyn SiteAdapter>,
    fetcher: Arc<dyn Fetcher>,
    job: JobConfig,
}

impl Driver {
    /// Validates the job against the adapter before any network activity.
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        fetcher: Arc<dyn Fetcher>,
        job: JobConfig,
    ) -> Result<Self, ConfigError> {
        job.validate()?;
        let previews = job.get_listing_previews && adapter.supports_previews();
        let details = job.get_listing_pages && adapter.supports_details();
        if !previews && !details {
            return Err(ConfigError::NoExtractionEnabled);
        }
        Ok(Self {
            adapter,
            fetcher,
            job,
        })
    }

    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    /// A fresh page sequence starting at `page_start`.
    pub fn walker(&self, cancel: CancellationToken) -> PageWalker<'_> {
        PageWalker {
            adapter: self.adapter.as_ref(),
            fetcher: self.fetcher.as_ref(),
            job: &self.job,
            cursor: PageCursor::new(self.job.page_start, self.job.page_end),
            cancel,
            last_completed: None,
            pages_fetched: 0,
            finished: None,
            failed: false,
        }
    }

    /// Walks every page and appends each page's records to `sink`.
    ///
    /// On an index fetch or sink failure the rows of completed pages are
    /// already in the sink and the error names the last completed page.
    pub async fn run(
        &self,
        sink: &mut dyn Sink,
        cancel: CancellationToken,
    ) -> Result<RunSummary, IngestError> {
        let mut walker = self.walker(cancel);
        let mut rows_written = 0;
        let mut skipped = 0;
        let mut detail_failures = 0;
        let mut completed: Option<u32> = None;

        while let Some(batch) = walker.next_page().await? {
            for record in &batch.records {
                sink.append(record).map_err(|source| IngestError::Sink {
                    last_completed_page: completed,
                    source,
                })?;
            }
            completed = Some(batch.page);
            rows_written += batch.records.len();
            skipped += batch.skipped;
            detail_failures += batch.detail_failures;
            info!(
                page = batch.page,
                rows = batch.records.len(),
                skipped = batch.skipped,
                detail_failures = batch.detail_failures,
                "page written"
            );
        }

        let summary = RunSummary {
            pages_visited: walker.pages_fetched(),
            last_completed_page: walker.last_completed_page(),
            rows_written,
            skipped,
            detail_failures,
            stop_reason: walker.stop_reason().unwrap_or(StopReason::Exhausted),
        };
        info!(?summary, "run finished");
        Ok(summary)
    }
}
