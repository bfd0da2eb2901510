//! Per-request access logging.
//!
//! Every request produces one structured record, emitted through `tracing`
//! and optionally appended as a JSON line to a file. Write failures are logged
//! and never affect the response.

use crate::template::format_timestamp;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// One access log record.
#[derive(Debug, Clone, Serialize)]
pub struct AccessRecord {
    pub timestamp: String,
    pub method: String,
    pub url: String,
    pub query: HashMap<String, String>,
    pub status: u16,
    pub duration: String,
}

impl AccessRecord {
    pub fn new(
        method: &str,
        path: &str,
        query: &HashMap<String, String>,
        status: u16,
        elapsed: Duration,
    ) -> Self {
        Self {
            timestamp: format_timestamp(Utc::now()),
            method: method.to_string(),
            url: path.to_string(),
            query: query.clone(),
            status,
            duration: format!("{}ms", elapsed.as_millis()),
        }
    }
}

/// Append-only access log.
#[derive(Debug, Default)]
pub struct AccessLog {
    file: Option<(PathBuf, Mutex<File>)>,
}

impl AccessLog {
    /// Log through `tracing` only.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    /// Open (or create) a log file for appending, creating parent directories.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Some((path.to_path_buf(), Mutex::new(file))),
        })
    }

    /// Path of the log file, when file logging is enabled.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Record a completed request.
    pub async fn record(&self, record: &AccessRecord) {
        info!(
            method = %record.method,
            path = %record.url,
            status = record.status,
            duration = %record.duration,
            "{} {} - {} ({})",
            record.method,
            record.url,
            record.status,
            record.duration
        );

        let Some((path, file)) = &self.file else {
            return;
        };

        let mut line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize access log record");
                return;
            }
        };
        line.push('\n');

        let mut file = file.lock().await;
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "Failed to write access log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fields() {
        let mut query = HashMap::new();
        query.insert("q".to_string(), "phone".to_string());
        let record = AccessRecord::new("GET", "/search", &query, 200, Duration::from_millis(42));

        assert_eq!(record.duration, "42ms");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["url"], "/search");
        assert_eq!(json["query"]["q"], "phone");
        assert_eq!(json["status"], 200);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("requests.log");
        let log = AccessLog::open(&path).await.unwrap();
        assert_eq!(log.path(), Some(path.as_path()));

        let query = HashMap::new();
        log.record(&AccessRecord::new("GET", "/a", &query, 200, Duration::ZERO))
            .await;
        log.record(&AccessRecord::new("POST", "/b", &query, 404, Duration::ZERO))
            .await;

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["url"], "/a");
        assert_eq!(lines[1]["status"], 404);
    }

    #[tokio::test]
    async fn test_disabled_log_does_nothing() {
        let log = AccessLog::disabled();
        assert!(log.path().is_none());
        log.record(&AccessRecord::new("GET", "/", &HashMap::new(), 200, Duration::ZERO))
            .await;
    }
}
