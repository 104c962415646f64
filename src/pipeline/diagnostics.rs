//! Failure reporting: durable error log plus a best-effort notification.

use std::sync::Arc;

use crate::services::{Notification, Notifier, notify_best_effort};
use crate::storage::{ErrorLog, FailureContext};

const FAILURE_SUBJECT: &str = "Exception raised in search";

pub struct Diagnostics {
    error_log: ErrorLog,
    notifier: Arc<dyn Notifier>,
    recipients: Vec<String>,
}

impl Diagnostics {
    pub fn new(error_log: ErrorLog, notifier: Arc<dyn Notifier>, recipients: Vec<String>) -> Self {
        Self {
            error_log,
            notifier,
            recipients,
        }
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Record one failure. Never fails: a broken log file or notifier is
    /// itself only logged.
    pub async fn report(&self, context: &FailureContext) {
        log::error!(
            "Search failure for '{}' ({}/{}): {}",
            context.term,
            context.failure,
            context.max_errors,
            context.error
        );

        if let Err(e) = self.error_log.append(context).await {
            log::error!(
                "Could not append to error log {}: {}",
                self.error_log.path().display(),
                e
            );
        }

        let notification = Notification {
            subject: FAILURE_SUBJECT.to_string(),
            html: context.to_html(),
            recipients: self.recipients.clone(),
        };
        notify_best_effort(self.notifier.as_ref(), &notification).await;
    }

    /// Send an informational notice to the configured recipients.
    pub async fn announce(&self, subject: &str, html: String) {
        let notification = Notification {
            subject: subject.to_string(),
            html,
            recipients: self.recipients.clone(),
        };
        notify_best_effort(self.notifier.as_ref(), &notification).await;
    }
}
