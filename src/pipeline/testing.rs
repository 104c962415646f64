//! In-memory collaborators for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{EnrichedRecord, Record, RecordId};
use crate::services::{
    ApiConnector, ApiError, ApiResult, Notification, Notifier, SearchApi, SearchQuery,
};
use crate::storage::{Collection, Destination, ErrorLog, RecordSink};
use crate::utils::Clock;

use super::Diagnostics;

pub fn record(id: u64) -> Record {
    Record::from_status(json!({
        "id": id,
        "id_str": id.to_string(),
        "created_at": "Sat Oct 13 10:00:00 +0000 2018",
        "text": format!("status {id}"),
    }))
    .unwrap()
}

pub fn page(ids: &[u64]) -> ApiResult<Vec<Record>> {
    Ok(ids.iter().copied().map(record).collect())
}

pub fn transient() -> ApiResult<Vec<Record>> {
    Err(ApiError::Transient("HTTP 503 Service Unavailable".into()))
}

pub fn rate_limited() -> ApiResult<Vec<Record>> {
    Err(ApiError::RateLimited { reset_at: None })
}

pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// 2018-10-14 12:00 UTC
    pub fn run_day() -> Self {
        Self(Utc.with_ymd_and_hms(2018, 10, 14, 12, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub query: SearchQuery,
    pub at: Instant,
}

/// Serves fixed timelines per query string, honoring the id window.
pub struct TimelineApi {
    timelines: HashMap<String, Vec<u64>>,
    page_len: usize,
    calls: Mutex<Vec<Call>>,
}

impl TimelineApi {
    pub fn new(page_len: usize) -> Self {
        Self {
            timelines: HashMap::new(),
            page_len,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timeline(mut self, query: &str, ids: &[u64]) -> Self {
        let mut ids = ids.to_vec();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        self.timelines.insert(query.to_string(), ids);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchApi for TimelineApi {
    async fn search(&self, query: &SearchQuery) -> ApiResult<Vec<Record>> {
        self.calls.lock().unwrap().push(Call {
            query: query.clone(),
            at: Instant::now(),
        });
        let ids = self.timelines.get(&query.query).cloned().unwrap_or_default();
        Ok(ids
            .into_iter()
            .map(RecordId::new)
            .filter(|id| *id > query.since_id && query.max_id.is_none_or(|max| *id <= max))
            .take(self.page_len.min(query.count as usize))
            .map(|id| record(id.get()))
            .collect())
    }

    async fn rate_limit_reset(&self) -> ApiResult<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

/// Replays queued responses in order; empty pages once drained.
#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<VecDeque<ApiResult<Vec<Record>>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedApi {
    pub fn new(script: impl IntoIterator<Item = ApiResult<Vec<Record>>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchApi for ScriptedApi {
    async fn search(&self, query: &SearchQuery) -> ApiResult<Vec<Record>> {
        self.calls.lock().unwrap().push(Call {
            query: query.clone(),
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn rate_limit_reset(&self) -> ApiResult<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

/// Hands out the same client on every connect.
pub struct SharedConnector {
    api: Arc<dyn SearchApi>,
    connects: AtomicUsize,
}

impl SharedConnector {
    pub fn new(api: Arc<dyn SearchApi>) -> Self {
        Self {
            api,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiConnector for SharedConnector {
    async fn connect(&self) -> Result<Arc<dyn SearchApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.api))
    }
}

#[derive(Debug, Clone)]
pub struct Flush {
    pub destination: Destination,
    pub records: Vec<EnrichedRecord>,
    pub at: Instant,
}

impl Flush {
    pub fn ids(&self) -> Vec<u64> {
        self.records
            .iter()
            .filter_map(EnrichedRecord::id)
            .map(RecordId::get)
            .collect()
    }
}

/// Keeps every flushed batch in memory.
#[derive(Default)]
pub struct MemorySink {
    flushes: Mutex<Vec<Flush>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every flush fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn flushes(&self) -> Vec<Flush> {
        self.flushes.lock().unwrap().clone()
    }

    /// Ids of every stored record, in flush order.
    pub fn ids(&self) -> Vec<u64> {
        self.flushes().iter().flat_map(Flush::ids).collect()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn flush(&self, records: &[EnrichedRecord], destination: &Destination) -> Result<()> {
        if self.failing {
            return Err(AppError::sink(destination.to_string(), "disk full"));
        }
        self.flushes.lock().unwrap().push(Flush {
            destination: destination.clone(),
            records: records.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn count(&self, collection: &Collection) -> Result<u64> {
        Ok(self
            .flushes()
            .iter()
            .filter(|f| f.destination.collection == *collection)
            .map(|f| f.records.len() as u64)
            .sum())
    }

    async fn drop_database(&self, _database: &str) -> Result<()> {
        self.flushes.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Diagnostics writing `errors.log` under `dir`.
pub fn diagnostics(dir: &Path) -> (Diagnostics, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let diagnostics = Diagnostics::new(
        ErrorLog::new(dir.join("errors.log")),
        notifier.clone(),
        vec!["ops@example.com".into()],
    );
    (diagnostics, notifier)
}
