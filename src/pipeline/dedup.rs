//! Within-run duplicate suppression.
//!
//! One set per term, alive for the whole run (all passes) and never
//! persisted. The checkpoint already keeps a new run above everything a
//! previous run committed, so duplicates across runs are limited to the
//! boundary page around the checkpoint: delivery is at-least-once.

use std::collections::HashSet;

use crate::models::{Record, RecordId};

/// Identifiers already placed in a batch during this run.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    seen: HashSet<RecordId>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, ids: impl IntoIterator<Item = RecordId>) {
        self.seen.extend(ids);
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.seen.contains(&id)
    }

    /// Records not marked yet, keeping page order. Repeats within the
    /// page itself are dropped too.
    pub fn filter_new(&self, records: Vec<Record>) -> Vec<Record> {
        let mut page_seen = HashSet::new();
        records
            .into_iter()
            .filter(|r| !self.seen.contains(&r.id) && page_seen.insert(r.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
