//! Per-domain views of the application log.

use crate::config::{LOG_FILE_PREFIX, LOG_FILE_SUFFIX};
use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};

/// At most this many lines are shown per domain.
pub const MAX_LINES: usize = 1000;

/// The retained application log files in `logs_dir`, oldest first.
///
/// # Errors
///
/// Returns the IO error if `logs_dir` can't be listed.
pub async fn log_files(logs_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let prefix = format!("{LOG_FILE_PREFIX}.");
    let suffix = format!(".{LOG_FILE_SUFFIX}");
    let mut files = vec![];
    let mut entries = fs::read_dir(logs_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&prefix) && name.ends_with(&suffix) {
            files.push(entry.path());
        }
    }
    // Dates in the names are zero-padded, so name order is age order.
    files.sort();
    Ok(files)
}

/// The most recent application log lines mentioning `[domain]` across the retained log files,
/// newest first.
///
/// # Errors
///
/// Returns the IO error if a log file can't be opened or read. No log files at all surfaces as
/// [`ErrorKind::NotFound`].
pub async fn domain_log(logs_dir: &Path, domain: &str) -> std::io::Result<String> {
    let files = log_files(logs_dir).await?;
    if files.is_empty() {
        return Err(Error::new(ErrorKind::NotFound, "no application log files"));
    }

    let filter_key = format!("[{domain}]");
    let mut matching = VecDeque::with_capacity(MAX_LINES);
    for file in files {
        let mut lines = BufReader::new(File::open(file).await?).lines();
        while let Some(line) = lines.next_line().await? {
            if line.contains(&filter_key) {
                if matching.len() == MAX_LINES {
                    matching.pop_front();
                }
                matching.push_back(line);
            }
        }
    }

    if matching.is_empty() {
        return Ok(format!(
            "No log entries found for '{domain}'.\n(Note: General app logs are not shown here.)"
        ));
    }
    Ok(matching.into_iter().rev().collect::<Vec<_>>().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn newest_first_and_capped() {
        let dir = TempDir::new().unwrap();
        let mut log = String::new();
        for i in 0..1200 {
            writeln!(log, "2024-01-01 INFO [a.example.com] line {i}").unwrap();
            writeln!(log, "2024-01-01 INFO [b.example.com] other {i}").unwrap();
            writeln!(log, "2024-01-01 INFO running DDNS update check...").unwrap();
        }
        std::fs::write(dir.path().join("domaincrab.2024-01-01.log"), log).unwrap();

        let content = domain_log(dir.path(), "a.example.com").await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), MAX_LINES);
        assert!(lines[0].ends_with("line 1199"));
        assert!(lines[MAX_LINES - 1].ends_with("line 200"));
        assert!(lines.iter().all(|l| l.contains("[a.example.com]")));
    }

    #[tokio::test]
    async fn reads_across_rotated_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("domaincrab.2024-01-02.log"),
            "INFO [a.example.com] newer\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("domaincrab.2024-01-01.log"),
            "INFO [a.example.com] older\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("letsencrypt.log"),
            "INFO [a.example.com] certbot\n",
        )
        .unwrap();

        assert_eq!(
            domain_log(dir.path(), "a.example.com").await.unwrap(),
            "INFO [a.example.com] newer\nINFO [a.example.com] older"
        );
    }

    #[tokio::test]
    async fn empty_and_missing_logs() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            domain_log(dir.path(), "a.example.com").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        std::fs::write(
            dir.path().join("domaincrab.2024-01-01.log"),
            "INFO [b.example.com] hello\n",
        )
        .unwrap();
        assert!(domain_log(dir.path(), "a.example.com")
            .await
            .unwrap()
            .starts_with("No log entries found for 'a.example.com'."));
    }
}
