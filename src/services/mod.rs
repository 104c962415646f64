//! Service layer for the harvester.
//!
//! This module contains the external collaborators:
//! - The search API seam (`SearchApi`, `ApiConnector`) and its failure taxonomy
//! - The Twitter client (`TwitterClient`, `TwitterConnector`)
//! - Notification delivery (`Notifier`)

mod notifier;
mod search_api;
mod twitter;

pub use notifier::{
    LogNotifier, Notification, Notifier, WebhookNotifier, notifier_from_config,
    notify_best_effort,
};
pub use search_api::{ApiConnector, ApiError, ApiResult, SearchApi, SearchQuery};
pub use twitter::{TwitterClient, TwitterConnector};
