//! Pass and runtime report files.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

const PASS_REPORT_HEADER: &str = "date,pass,new_records\n";

/// Appends per-pass counts and total run time.
#[derive(Debug, Clone)]
pub struct RunReport {
    pass_report: PathBuf,
    runtime_log: PathBuf,
}

impl RunReport {
    pub fn new(pass_report: impl Into<PathBuf>, runtime_log: impl Into<PathBuf>) -> Self {
        Self {
            pass_report: pass_report.into(),
            runtime_log: runtime_log.into(),
        }
    }

    async fn append(path: &PathBuf, line: &str, header: Option<&str>) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let is_new = !tokio::fs::try_exists(path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        if let (true, Some(header)) = (is_new, header) {
            file.write_all(header.as_bytes()).await?;
        }
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Record how many new records one pass added.
    pub async fn record_pass(&self, date: NaiveDate, pass: usize, new_records: u64) -> Result<()> {
        let line = format!("{},{},{}\n", date.format("%Y-%m-%d"), pass, new_records);
        Self::append(&self.pass_report, &line, Some(PASS_REPORT_HEADER)).await
    }

    /// Record total run time in hours.
    pub async fn record_runtime(&self, finished: DateTime<Utc>, elapsed: Duration) -> Result<()> {
        let hours = elapsed.as_secs_f64() / 3600.0;
        let line = format!("{} - {:.4} hours\n", finished.to_rfc3339(), hours);
        Self::append(&self.runtime_log, &line, None).await
    }
}
