//! Pipeline entry points for harvester operations.
//!
//! - `run_search`: Page every term's search results into the sink
//! - `run_flush_db`: Drop the configured database from the primary store

pub mod circuit_breaker;
pub mod dedup;
pub mod diagnostics;
pub mod harvest;
pub mod pacer;
pub mod search;
#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::models::{Config, FilterMethod, SearchMethod, load_terms};
use crate::services::{TwitterConnector, notifier_from_config};
use crate::storage::{CheckpointStore, Collection, ErrorLog, RecordSink, RunReport, open_sink};
use crate::utils::{Clock, SystemClock, log};

pub use circuit_breaker::{
    BudgetResult, ErrorBudget, ErrorBudgetConfig, SearchSignal, Verdict, decide,
};
pub use dedup::DedupSet;
pub use diagnostics::Diagnostics;
pub use harvest::{HarvestPlan, HarvestSummary, Harvester, PassSummary};
pub use pacer::RatePacer;
pub use search::{
    SearchEngine, SearchOutcome, SearchRequest, SearchSettings, SearchWindow, Termination,
    WindowStep,
};

/// Choices for one `search` run.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// CSV term list; relative paths resolve against the data directory
    pub terms_file: PathBuf,
    pub terms_column: String,
    pub method: SearchMethod,
    pub filter: FilterMethod,
    pub passes: usize,
    pub testing: bool,
}

/// Run a full harvest with the real API client and sink.
pub async fn run_search(config: &Config, options: &SearchOptions) -> Result<HarvestSummary> {
    let started = Instant::now();
    let clock = SystemClock;
    log::header("Tweet harvest");

    let terms_path = if options.terms_file.is_absolute() {
        options.terms_file.clone()
    } else {
        config.data_path().join(&options.terms_file)
    };
    let terms = load_terms(&terms_path, &options.terms_column)?;
    log::sub_item(&format!(
        "{} terms from {} (method = {}, filter = {}, passes = {})",
        terms.len(),
        terms_path.display(),
        options.method,
        options.filter,
        options.passes
    ));

    let sink = open_sink(config).await?;
    let connector = TwitterConnector::new(config.api.clone(), config.credentials_path());
    let notifier = notifier_from_config(&config.notify)?;
    let diagnostics = Diagnostics::new(
        ErrorLog::new(config.resolve(&config.logging.error_log)),
        Arc::from(notifier),
        config.notify.recipients.clone(),
    );
    let checkpoints = CheckpointStore::new(config.checkpoint_path());
    let report = RunReport::new(
        config.resolve(&config.logging.pass_report),
        config.resolve(&config.logging.runtime_log),
    );
    let pacer = RatePacer::from_config(&config.search);

    if options.testing {
        ::log::warn!("Testing mode: small batches, first terms only, early stop");
        diagnostics
            .announce(
                "Testing mode",
                format!(
                    "Harvest started in testing mode at {} with {} terms.",
                    clock.now().to_rfc3339(),
                    terms.len()
                ),
            )
            .await;
    }

    let harvester = Harvester {
        connector: &connector,
        sink: &sink,
        checkpoints: &checkpoints,
        diagnostics: &diagnostics,
        pacer: &pacer,
        clock: &clock,
        report: Some(&report),
        collection: Collection::new(&config.storage.database, &config.storage.collection),
        settings: SearchSettings::from_config(config, options.testing),
    };
    let plan = HarvestPlan::for_run(
        config,
        options.method,
        options.filter,
        options.passes,
        options.testing,
    );
    let summary = harvester.run(&terms, &plan).await?;

    let elapsed = started.elapsed();
    if let Err(e) = report.record_runtime(clock.now(), elapsed).await {
        ::log::warn!("Could not write runtime log: {}", e);
    }

    let failed: usize = summary.passes.iter().map(|p| p.failed_terms.len()).sum();
    log::summary(
        "Harvest",
        &[
            ("Terms", summary.terms.to_string()),
            ("Passes", summary.passes.len().to_string()),
            ("Records emitted", summary.emitted().to_string()),
            ("Failed term searches", failed.to_string()),
            ("Checkpoints updated", summary.updated.len().to_string()),
            ("Elapsed", format!("{:.1}s", elapsed.as_secs_f64())),
        ],
    );
    Ok(summary)
}

/// Drop the configured database. A sink on its local fallback leaves
/// files alone.
pub async fn run_flush_db(config: &Config) -> Result<()> {
    let sink = open_sink(config).await?;
    sink.drop_database(&config.storage.database).await
}
