//! Link extractor: discover published articles and add their URLs to the store.
//!
//! Article sources are Markdown (`.md`) or reStructuredText (`.rst`) files
//! under the content root. A file counts only if its metadata carries a
//! published status line:
//!
//! ```text
//! Status: published        (Markdown)
//! :status: published       (reStructuredText)
//! ```
//!
//! # URL Pattern
//!
//! English articles live in an `en/` directory or use a `.en.md` / `.en.rst`
//! suffix and map to `{site_url}en/{slug}/`; everything else maps to
//! `{site_url}{slug}/`.

use crate::config::Config;
use crate::models::UrlRecord;
use crate::store::StateStore;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Path segment for the alternate (English) locale.
pub const ALTERNATE_LOCALE: &str = "en";

static PUBLISHED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*:?status:\s*published\s*$").unwrap());

/// `true` if the document declares itself published.
pub fn is_published(content: &str) -> bool {
    PUBLISHED_MARKER.is_match(content)
}

fn is_article_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("rst")
    )
}

/// Derive the canonical URL for an article source file.
///
/// Returns `None` for paths without a usable UTF-8 file name.
pub fn canonical_url(site_url: &str, path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let in_locale_dir = path
        .parent()
        .and_then(|p| p.file_name())
        .is_some_and(|name| name == ALTERNATE_LOCALE);
    let locale_suffix = format!(".{ALTERNATE_LOCALE}");

    let (slug, suffixed) = match stem.strip_suffix(&locale_suffix) {
        Some(slug) => (slug, true),
        None => (stem, false),
    };
    if slug.is_empty() {
        return None;
    }

    if in_locale_dir || suffixed {
        Some(format!("{site_url}{ALTERNATE_LOCALE}/{slug}/"))
    } else {
        Some(format!("{site_url}{slug}/"))
    }
}

/// Walk `root` depth-first in sorted order and return the canonical URL of
/// every published article, without duplicates.
#[instrument(level = "info", skip_all, fields(root = %root.display()))]
pub async fn discover(root: &Path, site_url: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read content directory; skipping");
                continue;
            }
        };

        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                subdirs.push(path);
            } else if file_type.is_symlink() {
                // Linked files are read through the link; linked directories
                // are not descended into, so a cycle cannot form.
                match fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() && is_article_source(&path) => files.push(path),
                    Ok(meta) if meta.is_dir() => {
                        debug!(path = %path.display(), "Not following directory symlink")
                    }
                    Ok(_) => {}
                    Err(e) => debug!(path = %path.display(), error = %e, "Broken symlink; skipping"),
                }
            } else if file_type.is_file() && is_article_source(&path) {
                files.push(path);
            }
        }
        files.sort();
        subdirs.sort();
        stack.extend(subdirs.into_iter().rev());

        for path in files {
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read article source; skipping");
                    continue;
                }
            };
            if !is_published(&content) {
                debug!(path = %path.display(), "Not published; skipping");
                continue;
            }
            match canonical_url(site_url, &path) {
                Some(url) => found.push(url),
                None => warn!(path = %path.display(), "Cannot derive a slug; skipping"),
            }
        }
    }

    let urls: Vec<String> = found.into_iter().unique().collect();
    info!(count = urls.len(), "Discovered published articles");
    urls
}

/// Append every newly discovered article URL to the state store.
///
/// # Arguments
///
/// * `config` - Supplies the content root, the site URL and the state file
///
/// # Returns
///
/// How many rows were added. New rows go to the end of the state file in
/// discovery order; bytes already in the file are never rewritten, and the
/// file is not touched when nothing new was found.
///
/// # Examples
///
/// ```ignore
/// let config = Config::load(Path::new("config.yaml")).await?;
/// let added = extract::run(&config).await?;
/// info!(added, "Extraction complete");
/// ```
#[instrument(level = "info", skip_all)]
pub async fn run(config: &Config) -> Result<usize, Box<dyn Error>> {
    if !fs::try_exists(&config.articles_path).await? {
        warn!(path = %config.articles_path.display(), "Content directory does not exist");
    }

    let mut store = StateStore::load(&config.csv_file).await?;
    let mut fresh = Vec::new();
    for url in discover(&config.articles_path, &config.site_url).await {
        let record = UrlRecord::new(url.clone());
        if store.push(record.clone()) {
            debug!(%url, "New article link");
            fresh.push(record);
        }
    }

    if fresh.is_empty() {
        info!("No new articles to add");
        return Ok(0);
    }

    StateStore::append(&config.csv_file, &fresh).await?;
    info!(added = fresh.len(), path = %config.csv_file.display(), "Appended new article links");
    Ok(fresh.len())
}
