//! Out-of-band notifications (failure mail, testing-mode notices).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::NotifyConfig;

/// A message for human operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub subject: String,
    /// HTML body
    pub html: String,
    pub recipients: Vec<String>,
}

/// Delivery channel for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Send a notification, logging instead of failing when delivery breaks.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier.notify(notification).await {
        log::warn!(
            "Notification '{}' to {:?} failed to send: {}",
            notification.subject,
            notification.recipients,
            e
        );
    }
}

/// Posts notifications as JSON to a mail relay endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::notify(format!("relay returned {status}: {body}")));
        }
        log::debug!("Notification '{}' delivered", notification.subject);
        Ok(())
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        log::info!(
            "Notification (not delivered, no relay configured): {}",
            notification.subject
        );
        Ok(())
    }
}

/// Pick the notifier described by the configuration.
pub fn notifier_from_config(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Box::new(WebhookNotifier::new(url)?)),
        _ => Ok(Box::new(LogNotifier)),
    }
}
