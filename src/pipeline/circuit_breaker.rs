//! Error budget for one term search.
//!
//! Counts consecutive qualifying failures (transient API errors). Rate
//! limiting and empty pages have their own handling and never spend the
//! budget. The budget trips once the recorded failures reach `max_errors`;
//! the term search then ends with its pending batch flushed, and the run
//! moves on to the next term.

use crate::services::ApiError;

/// Error budget configuration.
#[derive(Debug, Clone)]
pub struct ErrorBudgetConfig {
    /// Consecutive failures tolerated. Default: 5
    pub max_errors: usize,
}

impl Default for ErrorBudgetConfig {
    fn default() -> Self {
        Self { max_errors: 5 }
    }
}

/// What happened to a page request, as far as control flow cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSignal {
    RateLimited,
    /// The page came back empty
    Exhausted,
    Transient,
    Fatal,
}

impl From<&ApiError> for SearchSignal {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::RateLimited { .. } => Self::RateLimited,
            ApiError::Transient(_) => Self::Transient,
            ApiError::Fatal { .. } => Self::Fatal,
        }
    }
}

/// What the pagination engine does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Retry the same request (after cooling down, or if the budget allows)
    Continue,
    /// Retry once more, then end the search normally
    RetryOnce,
    /// End the search now
    Abort,
}

/// Map a signal to the next step, ignoring the budget.
pub fn decide(signal: SearchSignal) -> Verdict {
    match signal {
        SearchSignal::RateLimited | SearchSignal::Transient => Verdict::Continue,
        SearchSignal::Exhausted => Verdict::RetryOnce,
        SearchSignal::Fatal => Verdict::Abort,
    }
}

/// Result of recording a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetResult {
    /// Retry allowed
    Available { failures: usize, remaining: usize },
    /// Budget spent - abort the search
    Exhausted { failures: usize },
}

/// Consecutive failure counter for one term search.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    config: ErrorBudgetConfig,
    failures: usize,
}

impl ErrorBudget {
    /// Create a budget with default configuration.
    pub fn new() -> Self {
        Self::with_config(ErrorBudgetConfig::default())
    }

    /// Create a budget with custom configuration.
    pub fn with_config(config: ErrorBudgetConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    pub fn max_errors(&self) -> usize {
        self.config.max_errors
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Count one more failure and report whether retrying is still allowed.
    pub fn record_failure(&mut self) -> BudgetResult {
        self.failures += 1;

        if self.failures >= self.config.max_errors {
            log::error!(
                "Error budget: EXHAUSTED ({} consecutive failures, limit {})",
                self.failures,
                self.config.max_errors
            );
            BudgetResult::Exhausted {
                failures: self.failures,
            }
        } else {
            BudgetResult::Available {
                failures: self.failures,
                remaining: self.config.max_errors - self.failures,
            }
        }
    }

    /// [`decide`], with transient and fatal failures spent from the budget.
    pub fn apply(&mut self, signal: SearchSignal) -> Verdict {
        let verdict = decide(signal);
        match signal {
            SearchSignal::Transient | SearchSignal::Fatal => match self.record_failure() {
                BudgetResult::Available { .. } => verdict,
                BudgetResult::Exhausted { .. } => Verdict::Abort,
            },
            SearchSignal::RateLimited | SearchSignal::Exhausted => verdict,
        }
    }

    /// A page succeeded; the streak is over.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

impl Default for ErrorBudget {
    fn default() -> Self {
        Self::new()
    }
}
