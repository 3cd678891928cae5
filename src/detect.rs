//! Change detector: does the store hold URLs an engine has never accepted?
//!
//! The answer is printed as `has_new_urls=true|false` and, when an output
//! file is given (CI runners export one as `GITHUB_OUTPUT`), appended to it
//! in the same form so a workflow step can branch on it.

use crate::models::Engine;
use crate::store::StateStore;
use std::error::Error;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

pub const SIGNAL_NAME: &str = "has_new_urls";

/// `true` if any record is still pending for `engine`. A missing store has
/// nothing pending.
#[instrument(level = "info", skip_all, fields(%engine))]
pub async fn has_pending(csv_file: &Path, engine: Engine) -> Result<bool, Box<dyn Error>> {
    let store = StateStore::load(csv_file).await?;
    let pending = store.pending(engine).len();
    info!(pending, total = store.len(), "Checked for pending URLs");
    Ok(pending > 0)
}

pub fn signal_line(has_new: bool) -> String {
    format!("{SIGNAL_NAME}={has_new}")
}

/// Compute the signal, print it, and append it to `output_file` if given.
#[instrument(level = "info", skip_all)]
pub async fn run(
    csv_file: &Path,
    engine: Engine,
    output_file: Option<&Path>,
) -> Result<bool, Box<dyn Error>> {
    let has_new = has_pending(csv_file, engine).await?;
    let line = signal_line(has_new);
    println!("{line}");

    if let Some(path) = output_file {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), "Wrote trigger signal");
    }
    Ok(has_new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_store_has_nothing_pending() {
        let dir = TempDir::new().unwrap();
        let result = has_pending(&dir.path().join("links.csv"), Engine::Google).await;
        assert!(!result.unwrap());
    }

    #[tokio::test]
    async fn test_pending_is_per_engine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        tokio::fs::write(
            &path,
            "url,last_successful_submission,bing_last_successful_submission\n\
             https://example.com/a/,2025-01-01T00:00:00.000000,\n",
        )
        .await
        .unwrap();

        assert!(!has_pending(&path, Engine::Google).await.unwrap());
        assert!(has_pending(&path, Engine::Bing).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_appends_signal_to_output_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.csv");
        let output = dir.path().join("github_output");
        tokio::fs::write(&path, "url\nhttps://example.com/a/\n").await.unwrap();
        tokio::fs::write(&output, "other=1\n").await.unwrap();

        assert!(run(&path, Engine::Google, Some(&output)).await.unwrap());
        let text = tokio::fs::read_to_string(&output).await.unwrap();
        assert_eq!(text, "other=1\nhas_new_urls=true\n");
    }

    #[test]
    fn test_signal_line() {
        assert_eq!(signal_line(false), "has_new_urls=false");
    }
}
