//! Small helpers shared by the components.
//!
//! - String truncation for logging API response bodies
//! - Header-cell normalisation for the state file
//! - Prerequisite file checks

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary at or below `max` bytes and
/// get `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Normalise a header cell: trimmed, lowercase, whitespace runs become `_`.
pub fn normalize_header(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Fail with a logged error if a file the run depends on is missing.
#[instrument(level = "debug", skip_all, fields(%what, path = %path.display()))]
pub async fn require_file(what: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    if fs::try_exists(path).await? {
        return Ok(());
    }
    error!(path = %path.display(), "{what} not found");
    Err(format!("{what} not found: {}", path.display()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("ğğğ", 3);
        assert_eq!(result, "ğ…(+4 bytes)");
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(" URL "), "url");
        assert_eq!(
            normalize_header("Last Successful  Submission"),
            "last_successful_submission"
        );
        assert_eq!(
            normalize_header("bing_last_successful_submission"),
            "bing_last_successful_submission"
        );
    }

    #[tokio::test]
    async fn test_require_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("service_account.json");
        tokio::fs::write(&present, "{}").await.unwrap();

        assert!(require_file("Service account file", &present).await.is_ok());
        let err = require_file("State file", &dir.path().join("missing.csv"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("State file not found"));
    }
}
