//! Local filesystem storage.
//!
//! The fallback route of the durable sink: each flush appends JSON lines to
//! a per-term, per-day file. It is also the only route when no primary
//! store is configured.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── last_ids.json        # Checkpoint (see checkpoint.rs)
//! ├── btc/
//! │   └── 2018-10-14.jsonl # One enriched record per line
//! └── eth/
//!     └── 2018-10-14.jsonl
//! ```

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::EnrichedRecord;

/// Extension of fallback record files.
pub const RECORD_FILE_EXT: &str = "jsonl";

/// Write bytes atomically (write to temp, then rename).
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &Path) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Append records as JSON lines, creating the file if needed.
    pub async fn append_records(&self, key: &Path, records: &[EnrichedRecord]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        log::debug!("Appended {} records to {}", records.len(), path.display());
        Ok(())
    }

    /// Read every record from one file, returning an empty list if it doesn't exist.
    pub async fn read_records(&self, key: &Path) -> Result<Vec<EnrichedRecord>> {
        let path = self.path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }

    /// Count records across all record files under the root.
    pub async fn count_records(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut pending = vec![self.root_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == RECORD_FILE_EXT) {
                    let content = tokio::fs::read_to_string(&path).await?;
                    total += content.lines().filter(|l| !l.trim().is_empty()).count() as u64;
                }
            }
        }

        Ok(total)
    }
}
