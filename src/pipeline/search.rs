//! Pagination engine for one term.
//!
//! Pages backwards through the search results, newest first, until the
//! window closes on the checkpoint, the results run dry, or the error
//! budget is spent. Records are buffered and flushed to the sink in
//! batches; nothing buffered survives a return without being flushed.

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Config, EnrichedRecord, Record, RecordId};
use crate::services::{ApiError, SearchApi, SearchQuery};
use crate::storage::{Destination, FailureContext, RecordSink};
use crate::utils::Clock;

use super::circuit_breaker::{ErrorBudget, ErrorBudgetConfig, SearchSignal, Verdict};
use super::dedup::DedupSet;
use super::diagnostics::Diagnostics;
use super::pacer::RatePacer;

/// Knobs for a term search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub page_size: u32,
    /// Flush once more than this many records are pending
    pub flush_threshold: usize,
    pub max_errors: usize,
    /// Retries after an empty page before the search ends
    pub max_empty_retries: u32,
    /// End the search right after its first threshold flush
    pub stop_after_first_flush: bool,
}

impl SearchSettings {
    pub fn from_config(config: &Config, testing: bool) -> Self {
        let search = &config.search;
        Self {
            page_size: config.api.page_size,
            flush_threshold: if testing {
                search.testing_flush_threshold
            } else {
                search.flush_threshold
            },
            max_errors: search.max_errors,
            max_empty_retries: search.max_empty_retries,
            stop_after_first_flush: testing,
        }
    }
}

/// One term search to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub term: String,
    /// Effective query string
    pub query: String,
    /// Checkpoint for the term; only newer records are wanted
    pub since_id: RecordId,
    pub until: NaiveDate,
    pub destination: Destination,
}

/// Why a term search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Empty page, still empty after the retry
    Exhausted,
    /// Paged down to the checkpoint
    CheckpointReached,
    /// Too many consecutive failures
    BudgetExhausted,
    /// The API refused the request outright
    Rejected,
    /// Testing mode: stopped after the first flush
    TestingFlush,
    /// A page did not move the window below its previous bound
    Stalled,
}

impl Termination {
    /// Whether the search ended because of failures.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::BudgetExhausted | Self::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Records handed to the sink
    pub emitted: usize,
    /// Non-empty pages received
    pub pages: usize,
    /// Id of the first record of the first page, if any page arrived
    pub next_since_id: Option<RecordId>,
    pub termination: Termination,
}

/// Where the window stands after a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStep {
    /// Ids remain between `since_id` and `max_id`
    Open,
    /// Paged down to `since_id`
    Closed,
    /// The page reached no lower than the current `max_id`
    Stalled,
}

/// The id window of a running search.
///
/// `since_id` stays fixed; `max_id` walks down below each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub since_id: RecordId,
    pub max_id: Option<RecordId>,
    pub until: NaiveDate,
}

impl SearchWindow {
    pub fn new(since_id: RecordId, until: NaiveDate) -> Self {
        Self {
            since_id,
            max_id: None,
            until,
        }
    }

    pub fn query(&self, query: &str, count: u32) -> SearchQuery {
        SearchQuery {
            query: query.to_string(),
            count,
            since_id: self.since_id,
            max_id: self.max_id,
            until: self.until,
        }
    }

    /// Move below the oldest record of a page.
    ///
    /// `max_id` only ever decreases. A page whose oldest record is not
    /// below the current bound leaves the window untouched.
    pub fn advance(&mut self, oldest: RecordId) -> WindowStep {
        let Some(next) = oldest.predecessor() else {
            return WindowStep::Closed;
        };
        if self.max_id.is_some_and(|current| next >= current) {
            return WindowStep::Stalled;
        }
        self.max_id = Some(next);
        if next > self.since_id {
            WindowStep::Open
        } else {
            WindowStep::Closed
        }
    }
}

/// Counts for one received page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageStats {
    fetched: usize,
    /// Left after dropping records seen earlier in the run
    fresh: usize,
    oldest: RecordId,
}

/// Runs term searches against one client and sink.
pub struct SearchEngine<'a> {
    pub api: &'a dyn SearchApi,
    pub sink: &'a dyn RecordSink,
    pub pacer: &'a RatePacer,
    pub diagnostics: &'a Diagnostics,
    pub clock: &'a dyn Clock,
    pub settings: &'a SearchSettings,
}

impl SearchEngine<'_> {
    /// Page through one term's results.
    ///
    /// `dedup` is the term's run-wide seen set. Sink failures are returned
    /// as errors; API failures end the search with a failure
    /// [`Termination`] instead.
    pub async fn search(&self, request: &SearchRequest, dedup: &mut DedupSet) -> Result<SearchOutcome> {
        let mut window = SearchWindow::new(request.since_id, request.until);
        let mut budget = ErrorBudget::with_config(ErrorBudgetConfig {
            max_errors: self.settings.max_errors,
        });
        let mut pending: Vec<EnrichedRecord> = Vec::new();
        let mut empty_retries = 0;
        let mut outcome = SearchOutcome {
            emitted: 0,
            pages: 0,
            next_since_id: None,
            termination: Termination::Exhausted,
        };

        log::debug!(
            "Searching '{}' (since_id={}, until={})",
            request.query,
            request.since_id,
            request.until
        );

        let termination = loop {
            self.pacer.before_request().await;
            let query = window.query(&request.query, self.settings.page_size);

            let failure = match self.api.search(&query).await {
                Ok(records) if !records.is_empty() => {
                    budget.reset();
                    empty_retries = 0;

                    let stats = self.accept_page(request, records, dedup, &mut pending, &mut outcome);
                    let step = window.advance(stats.oldest);
                    log::info!(
                        "Found {} records for '{}', {} new ({} pending), max_id -> {}",
                        stats.fetched,
                        request.query,
                        stats.fresh,
                        pending.len(),
                        window.max_id.unwrap_or(RecordId::ZERO)
                    );

                    if pending.len() > self.settings.flush_threshold {
                        self.flush(&mut pending, &request.destination).await?;
                        if self.settings.stop_after_first_flush {
                            break Termination::TestingFlush;
                        }
                    }
                    match step {
                        WindowStep::Open => continue,
                        WindowStep::Closed => break Termination::CheckpointReached,
                        WindowStep::Stalled => {
                            log::warn!(
                                "Page for '{}' reached only {}, not below max_id {}; ending search",
                                request.query,
                                stats.oldest,
                                window.max_id.unwrap_or(RecordId::ZERO)
                            );
                            break Termination::Stalled;
                        }
                    }
                }
                Ok(_) => None,
                Err(err) => Some(err),
            };

            let signal = failure.as_ref().map_or(SearchSignal::Exhausted, SearchSignal::from);
            match budget.apply(signal) {
                Verdict::RetryOnce => {
                    if empty_retries >= self.settings.max_empty_retries {
                        break Termination::Exhausted;
                    }
                    empty_retries += 1;
                    log::debug!("Empty page for '{}', retrying", request.query);
                    self.pacer.empty_retry_pause().await;
                }
                Verdict::Continue => match failure {
                    Some(ApiError::RateLimited { reset_at }) => {
                        self.flush(&mut pending, &request.destination).await?;
                        let reset_at = match reset_at {
                            Some(at) => Some(at),
                            None => self.api.rate_limit_reset().await.ok().flatten(),
                        };
                        self.pacer.cool_down(reset_at).await;
                    }
                    Some(err) => self.report(request, &window, pending.len(), &budget, &err).await,
                    None => {}
                },
                Verdict::Abort => {
                    if let Some(err) = &failure {
                        self.report(request, &window, pending.len(), &budget, err).await;
                    }
                    break if signal == SearchSignal::Fatal {
                        Termination::Rejected
                    } else {
                        Termination::BudgetExhausted
                    };
                }
            }
        };

        self.flush(&mut pending, &request.destination).await?;
        outcome.termination = termination;

        log::info!(
            "'{}' done: {} records over {} pages ({:?})",
            request.query,
            outcome.emitted,
            outcome.pages,
            termination
        );
        Ok(outcome)
    }

    /// Buffer the unseen records of a page.
    fn accept_page(
        &self,
        request: &SearchRequest,
        records: Vec<Record>,
        dedup: &mut DedupSet,
        pending: &mut Vec<EnrichedRecord>,
        outcome: &mut SearchOutcome,
    ) -> PageStats {
        outcome.pages += 1;
        if outcome.next_since_id.is_none() {
            outcome.next_since_id = records.first().map(|r| r.id);
        }

        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        let oldest = ids.iter().copied().min().unwrap_or(RecordId::ZERO);
        let fresh = dedup.filter_new(records);
        dedup.mark(ids.clone());

        let stats = PageStats {
            fetched: ids.len(),
            fresh: fresh.len(),
            oldest,
        };

        let fetched_at = self.clock.now();
        outcome.emitted += fresh.len();
        pending.extend(
            fresh
                .into_iter()
                .map(|r| EnrichedRecord::new(&request.term, &request.query, fetched_at, r)),
        );
        stats
    }

    async fn flush(&self, pending: &mut Vec<EnrichedRecord>, destination: &Destination) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        self.sink.flush(pending, destination).await?;
        pending.clear();
        Ok(())
    }

    async fn report(
        &self,
        request: &SearchRequest,
        window: &SearchWindow,
        pending: usize,
        budget: &ErrorBudget,
        err: &ApiError,
    ) {
        let context = FailureContext {
            at: self.clock.now(),
            term: request.term.clone(),
            query: request.query.clone(),
            since_id: window.since_id,
            max_id: window.max_id,
            until: window.until,
            pending,
            flush_threshold: self.settings.flush_threshold,
            failure: budget.failures(),
            max_errors: budget.max_errors(),
            error: err.to_string(),
        };
        self.diagnostics.report(&context).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::models::SearchConfig;
    use crate::pipeline::testing::*;
    use crate::storage::Collection;

    fn settings() -> SearchSettings {
        SearchSettings {
            page_size: 100,
            flush_threshold: 1500,
            max_errors: 5,
            max_empty_retries: 1,
            stop_after_first_flush: false,
        }
    }

    fn request(since_id: u64) -> SearchRequest {
        SearchRequest {
            term: "btc".into(),
            query: "$btc".into(),
            since_id: RecordId::new(since_id),
            until: NaiveDate::from_ymd_opt(2018, 10, 13).unwrap(),
            destination: Destination {
                collection: Collection::new("twitter", "tweets"),
                fallback_file: PathBuf::from("btc/2018-10-14.jsonl"),
            },
        }
    }

    struct Harness {
        _tmp: TempDir,
        diagnostics: Diagnostics,
        notifier: std::sync::Arc<RecordingNotifier>,
        clock: FixedClock,
        sink: MemorySink,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_sink(MemorySink::new())
        }

        fn with_sink(sink: MemorySink) -> Self {
            let tmp = TempDir::new().unwrap();
            let (diagnostics, notifier) = diagnostics(tmp.path());
            Self {
                _tmp: tmp,
                diagnostics,
                notifier,
                clock: FixedClock::run_day(),
                sink,
            }
        }

        async fn run(
            &self,
            api: &dyn SearchApi,
            pacer: &RatePacer,
            settings: &SearchSettings,
            request: &SearchRequest,
            dedup: &mut DedupSet,
        ) -> Result<SearchOutcome> {
            let engine = SearchEngine {
                api,
                sink: &self.sink,
                pacer,
                diagnostics: &self.diagnostics,
                clock: &self.clock,
                settings,
            };
            engine.search(request, dedup).await
        }

        async fn error_entries(&self) -> usize {
            self.diagnostics.error_log().entries().await.unwrap()
        }
    }

    #[test]
    fn test_window_advances_below_page() {
        let until = NaiveDate::from_ymd_opt(2018, 10, 13).unwrap();
        let mut window = SearchWindow::new(RecordId::new(900), until);

        assert_eq!(window.advance(RecordId::new(1004)), WindowStep::Open);
        assert_eq!(window.max_id, Some(RecordId::new(1003)));

        assert_eq!(window.advance(RecordId::new(901)), WindowStep::Closed);
        assert_eq!(window.max_id, Some(RecordId::new(900)));
        assert_eq!(window.advance(RecordId::ZERO), WindowStep::Closed);
    }

    #[test]
    fn test_window_never_moves_up() {
        let until = NaiveDate::from_ymd_opt(2018, 10, 13).unwrap();
        let mut window = SearchWindow::new(RecordId::ZERO, until);
        assert_eq!(window.advance(RecordId::new(8)), WindowStep::Open);

        assert_eq!(window.advance(RecordId::new(11)), WindowStep::Stalled);
        assert_eq!(window.advance(RecordId::new(8)), WindowStep::Stalled);
        assert_eq!(window.max_id, Some(RecordId::new(7)));

        assert_eq!(window.advance(RecordId::new(7)), WindowStep::Open);
        assert_eq!(window.max_id, Some(RecordId::new(6)));
    }

    #[tokio::test]
    async fn test_repeated_page_ends_search() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[9, 8]), page(&[9, 8]), page(&[9, 8]), page(&[7])]);

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::Stalled);
        assert!(!outcome.termination.is_failure());
        assert_eq!(api.calls().len(), 2);
        assert_eq!(h.sink.ids(), vec![9, 8]);
    }

    #[tokio::test]
    async fn test_overlapping_newer_page_ends_search() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[9, 8]), page(&[12, 11]), page(&[7])]);

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::Stalled);
        let max_ids: Vec<_> = api.calls().iter().map(|c| c.query.max_id).collect();
        assert_eq!(max_ids, vec![None, Some(RecordId::new(7))]);
        assert_eq!(h.sink.ids(), vec![9, 8, 12, 11]);
        assert_eq!(h.sink.flushes().len(), 1);
    }

    #[test]
    fn test_page_stats_count_new_records() {
        let h = Harness::new();
        let api = ScriptedApi::default();
        let pacer = RatePacer::immediate();
        let settings = settings();
        let engine = SearchEngine {
            api: &api,
            sink: &h.sink,
            pacer: &pacer,
            diagnostics: &h.diagnostics,
            clock: &h.clock,
            settings: &settings,
        };
        let mut dedup = DedupSet::new();
        dedup.mark([RecordId::new(5)]);
        let mut pending = Vec::new();
        let mut outcome = SearchOutcome {
            emitted: 0,
            pages: 0,
            next_since_id: None,
            termination: Termination::Exhausted,
        };

        let records = vec![record(6), record(5), record(5), record(4)];
        let stats = engine.accept_page(&request(0), records, &mut dedup, &mut pending, &mut outcome);

        assert_eq!(
            stats,
            PageStats {
                fetched: 4,
                fresh: 2,
                oldest: RecordId::new(4),
            }
        );
        assert_eq!(pending.len(), 2);
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.next_since_id, Some(RecordId::new(6)));
        assert!(dedup.contains(RecordId::new(4)));
    }

    #[tokio::test]
    async fn test_pages_until_results_run_dry() {
        let h = Harness::new();
        let api = TimelineApi::new(3).with_timeline("$btc", &[1006, 1005, 1004, 1003, 1002, 1001]);
        let mut dedup = DedupSet::new();

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut dedup)
            .await
            .unwrap();

        assert_eq!(outcome.emitted, 6);
        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.next_since_id, Some(RecordId::new(1006)));
        assert_eq!(outcome.termination, Termination::Exhausted);

        // Two pages, then one empty page and its retry.
        let max_ids: Vec<_> = api.calls().iter().map(|c| c.query.max_id).collect();
        assert_eq!(
            max_ids,
            vec![
                None,
                Some(RecordId::new(1003)),
                Some(RecordId::new(1000)),
                Some(RecordId::new(1000)),
            ]
        );
        assert_eq!(h.sink.flushes().len(), 1);
        assert_eq!(h.sink.ids(), vec![1006, 1005, 1004, 1003, 1002, 1001]);
        assert_eq!(dedup.len(), 6);
    }

    #[tokio::test]
    async fn test_same_pages_same_next_since_id() {
        let h = Harness::new();
        let api = TimelineApi::new(2).with_timeline("$btc", &[44, 43, 42]);

        let mut captured = Vec::new();
        for _ in 0..2 {
            let outcome = h
                .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
                .await
                .unwrap();
            captured.push(outcome.next_since_id);
        }
        assert_eq!(captured, vec![Some(RecordId::new(44)); 2]);
    }

    #[tokio::test]
    async fn test_stops_at_checkpoint_boundary() {
        let h = Harness::new();
        let api = TimelineApi::new(2).with_timeline("$btc", &[1006, 1005, 1004, 1003, 1002]);

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(1003), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::CheckpointReached);
        assert_eq!(api.calls().len(), 2);
        assert_eq!(h.sink.flushes().len(), 1);
        assert_eq!(h.sink.ids(), vec![1006, 1005, 1004]);
        assert!(h.sink.ids().iter().all(|id| *id > 1003));
    }

    #[tokio::test]
    async fn test_nothing_newer_than_checkpoint() {
        let h = Harness::new();
        let api = TimelineApi::new(3).with_timeline("$btc", &[1003, 1002]);

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(1003), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.next_since_id, None);
        assert_eq!(outcome.emitted, 0);
        assert!(h.sink.flushes().is_empty());
    }

    #[tokio::test]
    async fn test_flushes_when_threshold_exceeded() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[9, 8, 7]), page(&[6, 5]), page(&[4])]);
        let settings = SearchSettings {
            flush_threshold: 4,
            ..settings()
        };

        h.run(&api, &RatePacer::immediate(), &settings, &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        let batches: Vec<_> = h.sink.flushes().iter().map(Flush::ids).collect();
        assert_eq!(batches, vec![vec![9, 8, 7, 6, 5], vec![4]]);
    }

    #[tokio::test]
    async fn test_pending_flushed_on_budget_abort() {
        let h = Harness::new();
        let api = ScriptedApi::new([
            page(&[9, 8]),
            transient(),
            transient(),
        ]);
        let settings = SearchSettings {
            max_errors: 2,
            ..settings()
        };

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings, &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::BudgetExhausted);
        assert!(outcome.termination.is_failure());
        let flushes = h.sink.flushes();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].ids(), vec![9, 8]);
    }

    #[tokio::test]
    async fn test_error_budget_stops_after_max_errors() {
        let h = Harness::new();
        let api = ScriptedApi::new((0..6).map(|_| transient()));

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::BudgetExhausted);
        assert_eq!(api.calls().len(), 5);
        assert_eq!(h.error_entries().await, 5);
        assert_eq!(h.notifier.sent().len(), 5);
        assert!(h.sink.flushes().is_empty());
    }

    #[tokio::test]
    async fn test_failure_streak_resets_on_page() {
        let h = Harness::new();
        let mut script: Vec<_> = (0..4).map(|_| transient()).collect();
        script.push(page(&[9, 8]));
        script.extend((0..4).map(|_| transient()));
        script.push(page(&[7]));
        let api = ScriptedApi::new(script);

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(h.sink.ids(), vec![9, 8, 7]);
        assert_eq!(h.error_entries().await, 8);
    }

    #[tokio::test]
    async fn test_failed_request_is_retried_unchanged() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[9, 8]), transient(), page(&[7])]);

        h.run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        let calls = api.calls();
        assert_eq!(calls[1].query, calls[2].query);
        assert_eq!(calls[1].query.max_id, Some(RecordId::new(7)));
    }

    #[tokio::test]
    async fn test_fatal_rejection_aborts() {
        let h = Harness::new();
        let api = ScriptedApi::new([Err(ApiError::Fatal {
            status: 401,
            message: "Invalid or expired token".into(),
        })]);

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::Rejected);
        assert_eq!(api.calls().len(), 1);
        assert_eq!(h.error_entries().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_flushes_then_cools_down() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[10, 9, 8]), rate_limited(), page(&[7, 6])]);
        let pacer = RatePacer::from_config(&SearchConfig::default());

        let outcome = h
            .run(&api, &pacer, &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();
        assert_eq!(outcome.emitted, 5);

        let calls = api.calls();
        let flushes = h.sink.flushes();
        assert_eq!(flushes[0].ids(), vec![10, 9, 8]);
        assert!(flushes[0].at <= calls[2].at);
        assert!(calls[2].at.duration_since(flushes[0].at) >= Duration::from_secs(900));
        assert_eq!(calls[1].query.max_id, Some(RecordId::new(7)));
        assert_eq!(calls[2].query.max_id, calls[1].query.max_id);

        // Rate limiting never spends the error budget.
        assert_eq!(h.error_entries().await, 0);
        assert_eq!(flushes[1].ids(), vec![7, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_retry_waits() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[9, 8])]);
        let pacer = RatePacer {
            request_interval: Duration::ZERO,
            cooldown: Duration::ZERO,
            empty_retry_delay: Duration::from_secs(3),
        };

        let outcome = h
            .run(&api, &pacer, &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();
        assert_eq!(outcome.termination, Termination::Exhausted);

        // The page, the empty page, then its single retry.
        let calls = api.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].query, calls[1].query);
        assert!(calls[2].at.duration_since(calls[1].at) >= Duration::from_secs(3));
        assert!(calls[1].at.duration_since(calls[0].at) < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[3]), page(&[2]), page(&[1])]);
        let pacer = RatePacer::from_config(&SearchConfig::default());

        h.run(&api, &pacer, &settings(), &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        let calls = api.calls();
        for pair in calls.windows(2) {
            assert!(pair[1].at.duration_since(pair[0].at) >= Duration::from_secs(3));
        }
    }

    #[tokio::test]
    async fn test_seen_records_not_emitted_again() {
        let h = Harness::new();
        let api = TimelineApi::new(10).with_timeline("$btc", &[5, 4, 3]);
        let mut dedup = DedupSet::new();
        dedup.mark([RecordId::new(5), RecordId::new(4)]);

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut dedup)
            .await
            .unwrap();

        assert_eq!(outcome.emitted, 1);
        assert_eq!(outcome.next_since_id, Some(RecordId::new(5)));
        assert_eq!(h.sink.ids(), vec![3]);
    }

    #[tokio::test]
    async fn test_stop_after_first_flush() {
        let h = Harness::new();
        let api = ScriptedApi::new([page(&[9, 8, 7]), page(&[6, 5, 4]), page(&[3, 2, 1])]);
        let settings = SearchSettings {
            flush_threshold: 5,
            stop_after_first_flush: true,
            ..settings()
        };

        let outcome = h
            .run(&api, &RatePacer::immediate(), &settings, &request(0), &mut DedupSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Termination::TestingFlush);
        assert_eq!(api.calls().len(), 2);
        assert_eq!(h.sink.ids(), vec![9, 8, 7, 6, 5, 4]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_an_error() {
        let h = Harness::with_sink(MemorySink::failing());
        let api = ScriptedApi::new([page(&[9, 8])]);

        let result = h
            .run(&api, &RatePacer::immediate(), &settings(), &request(0), &mut DedupSet::new())
            .await;

        assert!(matches!(result, Err(crate::error::AppError::Sink { .. })));
    }
}
