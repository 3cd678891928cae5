//! Data models for tracked article URLs and their submission state.
//!
//! This module defines the core data structures used throughout the application:
//! - [`UrlRecord`]: One row of the state store, keyed by article URL
//! - [`SubmissionMark`]: When (or that) an engine accepted a URL
//! - [`Engine`]: Which indexing engine a timestamp column belongs to
//! - [`NotificationKind`]: The Google Indexing API notification type

use chrono::{DateTime, Local, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used when writing submission timestamps (local time, microseconds).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Record of a successful submission to one engine.
///
/// Values read from the store keep their original text so saving never
/// rewrites a timestamp another run wrote. A cell that is non-empty but cannot
/// be parsed as a timestamp is kept as [`SubmissionMark::Unparsed`] so it still
/// blocks resubmission and is written back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionMark {
    /// A parsed local timestamp and the text it was read from.
    At { ts: NaiveDateTime, raw: String },
    /// A non-empty value from the store that is not a recognised timestamp.
    Unparsed(String),
}

impl SubmissionMark {
    /// A mark for the current local time, written as [`TIMESTAMP_FORMAT`].
    pub fn now() -> Self {
        Self::at(Local::now().naive_local())
    }

    /// A mark for `ts`, written as [`TIMESTAMP_FORMAT`].
    pub fn at(ts: NaiveDateTime) -> Self {
        SubmissionMark::At {
            ts,
            raw: ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Parse a store cell. Empty (or whitespace-only) cells mean "never submitted".
    pub fn parse(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        let parsed = NaiveDateTime::parse_from_str(cell, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(cell)
                    .ok()
                    .map(|ts| ts.with_timezone(&Local).naive_local())
            });
        Some(match parsed {
            Some(ts) => SubmissionMark::At {
                ts,
                raw: cell.to_string(),
            },
            None => SubmissionMark::Unparsed(cell.to_string()),
        })
    }

    /// The parsed timestamp, if the value was recognised.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SubmissionMark::At { ts, .. } => Some(*ts),
            SubmissionMark::Unparsed(_) => None,
        }
    }
}

impl fmt::Display for SubmissionMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionMark::At { raw, .. } => f.write_str(raw),
            SubmissionMark::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// An indexing engine with its own submission-timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    Google,
    Bing,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Google => f.write_str("google"),
            Engine::Bing => f.write_str("bing"),
        }
    }
}

/// One tracked article URL and its per-engine submission state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// Absolute article URL. Unique within the store.
    pub url: String,
    /// Last successful Google Indexing API submission.
    pub google_last_submitted: Option<SubmissionMark>,
    /// Last successful IndexNow submission.
    pub bing_last_submitted: Option<SubmissionMark>,
}

impl UrlRecord {
    /// A freshly discovered URL, never submitted anywhere.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            google_last_submitted: None,
            bing_last_submitted: None,
        }
    }

    pub fn mark(&self, engine: Engine) -> Option<&SubmissionMark> {
        match engine {
            Engine::Google => self.google_last_submitted.as_ref(),
            Engine::Bing => self.bing_last_submitted.as_ref(),
        }
    }

    pub fn set_mark(&mut self, engine: Engine, mark: SubmissionMark) {
        match engine {
            Engine::Google => self.google_last_submitted = Some(mark),
            Engine::Bing => self.bing_last_submitted = Some(mark),
        }
    }

    /// `true` if the engine has never accepted this URL.
    pub fn is_pending(&self, engine: Engine) -> bool {
        self.mark(engine).is_none()
    }
}

/// Notification type sent to the Google Indexing API.
///
/// Selected once per run; the CLI spells it `publish` / `deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum NotificationKind {
    #[serde(rename = "URL_UPDATED")]
    #[value(name = "publish")]
    UrlUpdated,
    #[serde(rename = "URL_DELETED")]
    #[value(name = "deleted")]
    UrlDeleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::UrlUpdated => "URL_UPDATED",
            NotificationKind::UrlDeleted => "URL_DELETED",
        }
    }
}

/// Status code and raw body of an indexing API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}
