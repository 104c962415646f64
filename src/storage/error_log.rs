//! Append-only log of search failures.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::RecordId;

const SEPARATOR: &str = "-------------------------";

/// Everything needed to reproduce a failed page request.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureContext {
    pub at: DateTime<Utc>,
    pub term: String,
    pub query: String,
    pub since_id: RecordId,
    pub max_id: Option<RecordId>,
    pub until: NaiveDate,
    pub pending: usize,
    pub flush_threshold: usize,
    /// 1-based position of this failure in the current streak
    pub failure: usize,
    pub max_errors: usize,
    pub error: String,
}

impl FailureContext {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("term", self.term.clone()),
            ("query", self.query.clone()),
            ("since_id", self.since_id.to_string()),
            (
                "max_id",
                self.max_id.map_or_else(|| "unset".to_string(), |id| id.to_string()),
            ),
            ("until", self.until.to_string()),
            ("pending", self.pending.to_string()),
            ("flush_threshold", self.flush_threshold.to_string()),
            ("failure", format!("{}/{}", self.failure, self.max_errors)),
        ]
    }

    /// Plain-text block written to the error log.
    pub fn to_log_entry(&self) -> String {
        let mut entry = format!("[{}] Search failure for term '{}'\n", self.at.to_rfc3339(), self.term);
        entry.push_str("Context:\n");
        for (name, value) in self.fields() {
            entry.push_str(&format!("{name} = {value}\n"));
        }
        entry.push_str("Error:\n");
        entry.push_str(&self.error);
        entry.push('\n');
        entry.push_str(SEPARATOR);
        entry.push('\n');
        entry
    }

    /// HTML body for the notification channel.
    pub fn to_html(&self) -> String {
        let vars = self
            .fields()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("<br>");
        format!(
            "Search failure while harvesting '{}'.<br><br><b>Date</b> = {}\
             <br><br><b>Error:</b> <br>{}<br><br><b>Vars:</b> <br>{}",
            self.term,
            self.at.to_rfc3339(),
            self.error,
            vars
        )
    }
}

/// Append-only failure log file.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, context: &FailureContext) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(context.to_log_entry().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Number of entries in the log; zero if it was never written.
    pub async fn entries(&self) -> Result<usize> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.lines().filter(|l| *l == SEPARATOR).count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
