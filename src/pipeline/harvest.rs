//! Run orchestration: passes over the term list, checkpoints at the end.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{Config, FilterMethod, RecordId, SearchMethod, build_query, term_path};
use crate::services::ApiConnector;
use crate::storage::{Checkpoint, CheckpointStore, Collection, Destination, RecordSink, RunReport};
use crate::utils::{Clock, log, previous_day};

use super::dedup::DedupSet;
use super::diagnostics::Diagnostics;
use super::pacer::RatePacer;
use super::search::{SearchEngine, SearchRequest, SearchSettings, Termination};

/// What to search in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestPlan {
    pub method: SearchMethod,
    pub filter: FilterMethod,
    pub passes: usize,
    /// Only the first N terms are searched
    pub term_limit: Option<usize>,
}

impl HarvestPlan {
    pub fn new(method: SearchMethod, filter: FilterMethod, passes: usize) -> Self {
        Self {
            method,
            filter,
            passes,
            term_limit: None,
        }
    }

    /// Plan from CLI choices, applying testing-mode limits.
    pub fn for_run(
        config: &Config,
        method: SearchMethod,
        filter: FilterMethod,
        passes: usize,
        testing: bool,
    ) -> Self {
        Self {
            term_limit: testing.then_some(config.search.testing_term_limit),
            ..Self::new(method, filter, passes)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub pass: usize,
    /// Records handed to the sink during the pass
    pub emitted: usize,
    /// Growth of the collection over the pass
    pub new_records: u64,
    /// Terms whose search ended on failures
    pub failed_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub terms: usize,
    pub passes: Vec<PassSummary>,
    /// Checkpoint entries written by this run
    pub updated: BTreeMap<String, RecordId>,
    /// Checkpoint as saved
    pub checkpoint: Checkpoint,
}

impl HarvestSummary {
    pub fn emitted(&self) -> usize {
        self.passes.iter().map(|p| p.emitted).sum()
    }
}

/// Runs every pass of a harvest against shared collaborators.
pub struct Harvester<'a> {
    pub connector: &'a dyn ApiConnector,
    pub sink: &'a dyn RecordSink,
    pub checkpoints: &'a CheckpointStore,
    pub diagnostics: &'a Diagnostics,
    pub pacer: &'a RatePacer,
    pub clock: &'a dyn Clock,
    pub report: Option<&'a RunReport>,
    pub collection: Collection,
    pub settings: SearchSettings,
}

impl Harvester<'_> {
    /// Search every term once per pass, then save the new checkpoints.
    ///
    /// The checkpoint is read once up front, so later passes search the
    /// same window again and only the dedup set keeps them from
    /// re-emitting records. Checkpoints are not saved if a flush fails.
    pub async fn run(&self, terms: &[String], plan: &HarvestPlan) -> Result<HarvestSummary> {
        let run_date = self.clock.now().date_naive();
        let until = previous_day(run_date);
        let checkpoint = self.checkpoints.load().await?;

        let terms = match plan.term_limit {
            Some(limit) if terms.len() > limit => {
                log::sub_item(&format!("Limiting run to the first {limit} terms"));
                &terms[..limit]
            }
            _ => terms,
        };

        let mut seen: HashMap<String, DedupSet> = HashMap::new();
        let mut updated: BTreeMap<String, RecordId> = BTreeMap::new();
        let mut passes = Vec::with_capacity(plan.passes);

        for pass in 0..plan.passes {
            log::step(pass + 1, plan.passes, &format!("Pass over {} terms", terms.len()));
            let before = self.sink.count(&self.collection).await?;
            let mut emitted = 0;
            let mut failed_terms = Vec::new();

            for (i, term) in terms.iter().enumerate() {
                let query = build_query(term, plan.method, plan.filter);
                ::log::info!("{} Term = {} | query = {}", log::progress(i + 1, terms.len()), term, query);

                let api = self.connector.connect().await?;
                let engine = SearchEngine {
                    api: api.as_ref(),
                    sink: self.sink,
                    pacer: self.pacer,
                    diagnostics: self.diagnostics,
                    clock: self.clock,
                    settings: &self.settings,
                };
                let request = SearchRequest {
                    term: term.clone(),
                    query,
                    since_id: checkpoint.since_id(term),
                    until,
                    destination: Destination {
                        collection: self.collection.clone(),
                        fallback_file: PathBuf::from(term_path(term))
                            .join(format!("{}.jsonl", run_date.format("%Y-%m-%d"))),
                    },
                };

                let outcome = engine
                    .search(&request, seen.entry(term.clone()).or_default())
                    .await?;

                if let Some(id) = outcome.next_since_id {
                    updated.entry(term.clone()).or_insert(id);
                }
                if outcome.termination.is_failure() {
                    failed_terms.push(term.clone());
                }
                if outcome.termination == Termination::TestingFlush {
                    ::log::info!("Testing mode: stopped '{}' after its first flush", term);
                }
                emitted += outcome.emitted;
            }

            let after = self.sink.count(&self.collection).await?;
            let new_records = after.saturating_sub(before);
            ::log::info!("Pass {} added {} records to {}", pass, new_records, self.collection);
            if let Some(report) = self.report {
                if let Err(e) = report.record_pass(run_date, pass, new_records).await {
                    ::log::warn!("Could not write pass report: {}", e);
                }
            }

            passes.push(PassSummary {
                pass,
                emitted,
                new_records,
                failed_terms,
            });
        }

        let checkpoint = self.checkpoints.save(&updated).await?;
        ::log::info!(
            "Saved {} checkpoint updates to {}",
            updated.len(),
            self.checkpoints.path().display()
        );

        Ok(HarvestSummary {
            terms: terms.len(),
            passes,
            updated,
            checkpoint,
        })
    }
}
