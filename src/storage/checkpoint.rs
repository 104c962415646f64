//! Per-term checkpoints persisted across runs.
//!
//! The file is a JSON object mapping each term to the newest identifier a
//! previous run started from, written as decimal strings:
//!
//! ```json
//! { "btc": "1051474389723336704", "eth": "1051474389723336000" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};
use crate::models::RecordId;
use crate::storage::local::write_atomic;

/// Mapping from term to the lower bound of its next search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint {
    #[serde(deserialize_with = "skip_null_ids")]
    entries: BTreeMap<String, RecordId>,
}

/// Older files hold `null` for terms that never produced a record.
fn skip_null_ids<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, RecordId>, D::Error> {
    let raw = BTreeMap::<String, Option<RecordId>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(term, id)| id.map(|id| (term, id)))
        .collect())
}

impl Checkpoint {
    /// Lower bound for a term; zero when the term was never searched.
    pub fn since_id(&self, term: &str) -> RecordId {
        self.entries.get(term).copied().unwrap_or(RecordId::ZERO)
    }

    /// Overwrite the given terms, keeping every other entry.
    pub fn merge(&mut self, updates: &BTreeMap<String, RecordId>) {
        for (term, id) in updates {
            self.entries.insert(term.clone(), *id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RecordId)> {
        self.entries.iter().map(|(term, id)| (term.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<const N: usize> From<[(&str, u64); N]> for Checkpoint {
    fn from(pairs: [(&str, u64); N]) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(term, id)| (term.to_string(), RecordId::new(id)))
                .collect(),
        }
    }
}

/// Loads and merge-saves the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted checkpoint.
    ///
    /// A missing file is an empty checkpoint. A file that exists but can't be
    /// read or parsed is an error; searching without the right lower bounds
    /// would re-harvest everything.
    pub async fn load(&self) -> Result<Checkpoint> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No checkpoint at {}, starting unbounded", self.path.display());
                return Ok(Checkpoint::default());
            }
            Err(e) => return Err(AppError::checkpoint(&self.path, e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| AppError::checkpoint(&self.path, e))
    }

    /// Merge `updates` into the persisted checkpoint and write it atomically.
    ///
    /// Terms absent from `updates` keep their stored value.
    pub async fn save(&self, updates: &BTreeMap<String, RecordId>) -> Result<Checkpoint> {
        let mut checkpoint = self.load().await?;
        checkpoint.merge(updates);

        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|e| AppError::checkpoint(&self.path, e))?;

        log::info!(
            "Saved checkpoint for {} terms ({} updated) to {}",
            checkpoint.len(),
            updates.len(),
            self.path.display()
        );
        Ok(checkpoint)
    }
}
