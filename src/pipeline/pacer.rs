//! Request pacing and rate limit cool-down.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;

use crate::models::SearchConfig;

/// Fixed delays around page requests.
///
/// Every page request waits `request_interval` first. A rate-limited
/// request waits `cooldown` before being retried unchanged. An empty page
/// waits `empty_retry_delay` before its single retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePacer {
    pub request_interval: Duration,
    pub cooldown: Duration,
    pub empty_retry_delay: Duration,
}

impl RatePacer {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            request_interval: config.request_delay(),
            cooldown: config.rate_limit_cooldown(),
            empty_retry_delay: config.empty_retry_delay(),
        }
    }

    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            request_interval: Duration::ZERO,
            cooldown: Duration::ZERO,
            empty_retry_delay: Duration::ZERO,
        }
    }

    pub async fn before_request(&self) {
        if !self.request_interval.is_zero() {
            sleep(self.request_interval).await;
        }
    }

    /// Wait out a rate limit window.
    pub async fn cool_down(&self, reset_at: Option<DateTime<Utc>>) {
        match reset_at {
            Some(reset) => log::warn!(
                "Rate limited (window resets at {}). Sleeping {}s",
                reset.to_rfc3339(),
                self.cooldown.as_secs()
            ),
            None => log::warn!("Rate limited. Sleeping {}s", self.cooldown.as_secs()),
        }
        sleep(self.cooldown).await;
        log::info!("Rate limit cool-down over, resuming");
    }

    pub async fn empty_retry_pause(&self) {
        sleep(self.empty_retry_delay).await;
    }
}
