// ABOUTME: Durable, append-only sinks for listing records: a resumable CSV file and an in-memory sink.
// ABOUTME: The CSV sink extends its header when new fields appear, empty-filling earlier rows.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::record::ListingRecord;

/// Destination for listing records. `append` returns only once the record
/// is durably stored.
pub trait Sink: Send {
    fn append(&mut self, record: &ListingRecord) -> Result<(), SinkError>;
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<ListingRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ListingRecord> {
        self.records
    }
}

impl Sink for MemorySink {
    fn append(&mut self, record: &ListingRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Appends records as rows of a CSV file with a header.
///
/// Reopening an existing file continues it under its existing header, so a
/// job resumed with a later start page keeps writing to the same dataset.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    columns: Vec<String>,
}

impl CsvSink {
    /// Opens `path`, reading the header if the file already has one.
    ///
    /// A row cut off by an interrupted write is dropped first, so the next
    /// record starts on a line of its own.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        drop_partial_row(&path)?;
        let columns = read_header(&path)?;
        if !columns.is_empty() {
            info!(path = %path.display(), columns = columns.len(), "resuming existing dataset");
        }
        Ok(Self { path, columns })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn append_row(&self, row: &[String]) -> Result<(), SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        wtr.write_record(row)?;
        wtr.flush()?;
        let file = wtr.into_inner().map_err(|e| SinkError::Io(e.into_error()))?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrites the file under a wider header, then appends `row`.
    fn rewrite_with(&self, columns: &[String], row: &[String]) -> Result<(), SinkError> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::Writer::from_path(&tmp)?;
            wtr.write_record(columns)?;
            if self.path.exists() {
                let mut rdr = csv::ReaderBuilder::new()
                    .flexible(true)
                    .from_reader(BufReader::new(File::open(&self.path)?));
                for old in rdr.records() {
                    let old = old?;
                    let mut padded: Vec<&str> = old.iter().collect();
                    padded.resize(columns.len(), "");
                    wtr.write_record(&padded)?;
                }
            }
            wtr.write_record(row)?;
            wtr.flush()?;
            let file = wtr.into_inner().map_err(|e| SinkError::Io(e.into_error()))?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Sink for CsvSink {
    fn append(&mut self, record: &ListingRecord) -> Result<(), SinkError> {
        let cells = record.columns();

        let known: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let added: Vec<String> = cells
            .iter()
            .filter(|(k, _)| !known.contains(k.as_str()))
            .map(|(k, _)| k.clone())
            .collect();

        let mut columns = self.columns.clone();
        columns.extend(added.iter().cloned());
        let row: Vec<String> = columns
            .iter()
            .map(|c| {
                cells
                    .iter()
                    .find(|(k, _)| k == c)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            })
            .collect();

        if self.columns.is_empty() || !added.is_empty() {
            if !self.columns.is_empty() {
                debug!(path = %self.path.display(), new_columns = ?added, "extending header");
            }
            self.rewrite_with(&columns, &row)?;
            self.columns = columns;
        } else {
            self.append_row(&row)?;
        }
        Ok(())
    }
}

/// Truncates a file not ending in a newline back to its last complete line.
fn drop_partial_row(path: &Path) -> Result<(), SinkError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }
    let keep = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    warn!(
        path = %path.display(),
        dropped = %String::from_utf8_lossy(&bytes[keep..]),
        "dropping incomplete last row"
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep as u64)?;
    file.sync_all()?;
    Ok(())
}

fn read_header(path: &Path) -> Result<Vec<String>, SinkError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => return Ok(Vec::new()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    }
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(BufReader::new(File::open(path)?));
    Ok(rdr.headers()?.iter().map(str::to_string).collect())
}
