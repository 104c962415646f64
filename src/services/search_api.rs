//! The seam between the pagination engine and the search API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::error::Result;
use crate::models::{Record, RecordId};

/// Result of a single API call.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// How a failed API call should be treated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The shared request budget is exhausted; wait and retry unchanged.
    #[error("rate limit exhausted")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Network or server-side failure worth retrying.
    #[error("transient API failure: {0}")]
    Transient(String),

    /// The request will not succeed by retrying (bad credentials, forbidden).
    #[error("API rejected request ({status}): {message}")]
    Fatal { status: u16, message: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.to_string())
    }
}

/// One page request, newest records first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    /// Page size, at most 100
    pub count: u32,
    /// Exclusive lower bound; zero means unbounded
    pub since_id: RecordId,
    /// Inclusive upper bound; `None` starts from the most recent record
    pub max_id: Option<RecordId>,
    /// Only records created before this day
    pub until: NaiveDate,
}

/// A credentialed client able to page through search results.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetch one page, ordered newest first.
    async fn search(&self, query: &SearchQuery) -> ApiResult<Vec<Record>>;

    /// When the search rate limit window resets. Diagnostic only.
    async fn rate_limit_reset(&self) -> ApiResult<Option<DateTime<Utc>>>;
}

/// Hands out a freshly authorized client, once per term.
#[async_trait]
pub trait ApiConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SearchApi>>;
}
