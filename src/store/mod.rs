//! The state store: one row per article URL with per-engine submission state.
//!
//! The store is a comma-separated file with a header row. On load, columns are
//! located by header name so older layouts (for example one without the Bing
//! column) still read correctly; on save the canonical layout is always
//! written:
//!
//! ```text
//! url,last_successful_submission,bing_last_successful_submission
//! https://example.com/hello-world/,2025-07-14T09:30:12.123456,
//! ```
//!
//! There is no locking. Components that mutate the store must run one after
//! another.

pub mod codec;

use crate::models::{Engine, SubmissionMark, UrlRecord};
use crate::utils::normalize_header;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

pub const URL_COLUMN: &str = "url";
pub const GOOGLE_COLUMN: &str = "last_successful_submission";
pub const BING_COLUMN: &str = "bing_last_successful_submission";

/// Header written on every save.
pub const CANONICAL_HEADER: [&str; 3] = [URL_COLUMN, GOOGLE_COLUMN, BING_COLUMN];

/// Column positions resolved from a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    url: usize,
    google: Option<usize>,
    bing: Option<usize>,
}

impl Layout {
    const CANONICAL: Layout = Layout {
        url: 0,
        google: Some(1),
        bing: Some(2),
    };

    /// Resolve a header row. `None` if there is no `url` column, meaning the
    /// row is data rather than a header.
    fn from_header(header: &[String]) -> Option<Layout> {
        let names: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
        let find = |wanted: &[&str]| names.iter().position(|n| wanted.contains(&n.as_str()));

        let url = find(&[URL_COLUMN])?;
        let google = find(&[GOOGLE_COLUMN, "google_last_successful_submission"]);
        let bing = find(&[BING_COLUMN]);

        let known = 1 + google.is_some() as usize + bing.is_some() as usize;
        if names.iter().filter(|n| !n.is_empty()).count() > known {
            warn!(header = ?header, "State file has unrecognised columns; they will be dropped on save");
        }
        Some(Layout { url, google, bing })
    }

    /// Lay out `record` as a row of at least `width` cells.
    fn row(&self, record: &UrlRecord, width: usize) -> Vec<String> {
        let width = [Some(width), Some(self.url + 1), self.google.map(|g| g + 1), self.bing.map(|b| b + 1)]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(width);
        let mut cells = vec![String::new(); width];
        cells[self.url] = record.url.clone();
        if let (Some(pos), Some(mark)) = (self.google, &record.google_last_submitted) {
            cells[pos] = mark.to_string();
        }
        if let (Some(pos), Some(mark)) = (self.bing, &record.bing_last_submitted) {
            cells[pos] = mark.to_string();
        }
        cells
    }
}

/// In-memory view of the state file, in file order.
#[derive(Debug, Default, Clone)]
pub struct StateStore {
    records: Vec<UrlRecord>,
    index: HashMap<String, usize>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - The state file
    ///
    /// # Returns
    ///
    /// The records in file order. An absent file is an empty store; malformed
    /// rows are padded or skipped rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            info!("State file does not exist yet; starting empty");
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path).await?;
        let store = Self::parse(&text);
        info!(records = store.len(), "Loaded state file");
        Ok(store)
    }

    /// Build a store from the file contents.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut rows = codec::parse_rows(text)
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .peekable();

        let layout = match rows.peek().and_then(|first| Layout::from_header(first)) {
            Some(layout) => {
                rows.next();
                layout
            }
            None => {
                debug!("No recognised header; using canonical column order");
                Layout::CANONICAL
            }
        };

        let mut store = Self::new();
        for row in rows {
            let cell = |pos: Option<usize>| {
                pos.and_then(|p| row.get(p))
                    .map(String::as_str)
                    .unwrap_or_default()
            };
            let url = cell(Some(layout.url)).trim();
            if url.is_empty() {
                continue;
            }
            let record = UrlRecord {
                url: url.to_string(),
                google_last_submitted: SubmissionMark::parse(cell(layout.google)),
                bing_last_submitted: SubmissionMark::parse(cell(layout.bing)),
            };
            store.merge(record);
        }
        store
    }

    /// Insert a loaded row, folding duplicates into the first occurrence.
    fn merge(&mut self, record: UrlRecord) {
        match self.index.get(&record.url) {
            Some(&i) => {
                warn!(url = %record.url, "Duplicate URL in state file; keeping first row");
                let existing = &mut self.records[i];
                if existing.google_last_submitted.is_none() {
                    existing.google_last_submitted = record.google_last_submitted;
                }
                if existing.bing_last_submitted.is_none() {
                    existing.bing_last_submitted = record.bing_last_submitted;
                }
            }
            None => {
                self.index.insert(record.url.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Encode the store in the canonical layout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        codec::write_row(&mut out, &CANONICAL_HEADER);
        for record in &self.records {
            let cell = |mark: &Option<SubmissionMark>| {
                mark.as_ref().map(ToString::to_string).unwrap_or_default()
            };
            codec::write_row(
                &mut out,
                &[
                    record.url.clone(),
                    cell(&record.google_last_submitted),
                    cell(&record.bing_last_submitted),
                ],
            );
        }
        out
    }

    /// Overwrite `path` with the full store in one write.
    ///
    /// # Arguments
    ///
    /// * `path` - The state file to replace
    ///
    /// # Output
    ///
    /// The canonical header followed by every record in store order. Columns
    /// not in [`CANONICAL_HEADER`] are not written. Timestamps read from the
    /// file are written back with their original text.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        fs::write(path.as_ref(), self.render()).await?;
        debug!(records = self.len(), "Saved state file");
        Ok(())
    }

    /// Append `records` to the end of `path` without touching existing bytes.
    ///
    /// Rows follow the column layout of the file's own header, so files with
    /// extra or legacy columns stay consistent. The canonical header is
    /// written only when the file is missing or empty.
    ///
    /// # Arguments
    ///
    /// * `path` - The state file
    /// * `records` - Rows to add, already known to be absent from the file
    ///
    /// # Examples
    ///
    /// ```ignore
    /// StateStore::append("article_links.csv", &[UrlRecord::new("https://example.com/new/")]).await?;
    /// // ...existing bytes...
    /// // https://example.com/new/,,
    /// ```
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display(), count = records.len()))]
    pub async fn append(path: impl AsRef<Path>, records: &[UrlRecord]) -> Result<(), Box<dyn Error>> {
        let path = path.as_ref();
        if records.is_empty() {
            return Ok(());
        }
        let existing = if fs::try_exists(path).await? {
            fs::read_to_string(path).await?
        } else {
            String::new()
        };
        let body = existing.strip_prefix('\u{feff}').unwrap_or(&existing);

        let mut out = String::new();
        if body.trim().is_empty() {
            codec::write_row(&mut out, &CANONICAL_HEADER);
            for record in records {
                codec::write_row(&mut out, &Layout::CANONICAL.row(record, CANONICAL_HEADER.len()));
            }
            fs::write(path, out).await?;
            debug!("Created state file");
            return Ok(());
        }

        let first = codec::parse_rows(body)
            .into_iter()
            .find(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .unwrap_or_default();
        let (layout, width) = match Layout::from_header(&first) {
            Some(layout) => (layout, first.len()),
            None => (Layout::CANONICAL, first.len().max(CANONICAL_HEADER.len())),
        };

        if !existing.ends_with('\n') && !existing.ends_with('\r') {
            out.push_str("\r\n");
        }
        for record in records {
            codec::write_row(&mut out, &layout.row(record, width));
        }
        let mut file = OpenOptions::new().append(true).open(path).await?;
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;
        debug!("Appended rows to state file");
        Ok(())
    }

    pub fn records(&self) -> &[UrlRecord] {
        &self.records
    }

    pub fn get(&self, url: &str) -> Option<&UrlRecord> {
        self.index.get(url).map(|&i| &self.records[i])
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    /// Append a record. Returns `false` (and changes nothing) if the URL is
    /// already tracked.
    pub fn push(&mut self, record: UrlRecord) -> bool {
        if self.contains(&record.url) {
            return false;
        }
        self.index.insert(record.url.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Positions of records the engine has never accepted, in store order.
    pub fn pending(&self, engine: Engine) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_pending(engine))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn record(&self, position: usize) -> Option<&UrlRecord> {
        self.records.get(position)
    }

    /// Record a successful submission for the record at `position`.
    pub fn mark(&mut self, position: usize, engine: Engine, mark: SubmissionMark) {
        if let Some(record) = self.records.get_mut(position) {
            record.set_mark(engine, mark);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
