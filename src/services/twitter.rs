// src/services/twitter.rs

//! Twitter v1.1 standard search client.
//!
//! Uses app-only bearer authentication. The credentials file is re-read on
//! every [`ApiConnector::connect`], so rotating the token between terms
//! needs no restart.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ApiConfig, Record};
use crate::services::search_api::{ApiConnector, ApiError, ApiResult, SearchApi, SearchQuery};

const SEARCH_PATH: &str = "search/tweets.json";
const RATE_LIMIT_PATH: &str = "application/rate_limit_status.json";
const RESET_HEADER: &str = "x-rate-limit-reset";

/// Contents of the credentials file.
#[derive(Deserialize)]
struct Credentials {
    bearer_token: String,
}

/// Search response envelope.
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<Value>,
}

/// Authorized search client.
pub struct TwitterClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl TwitterClient {
    /// Create a client for the given API settings and bearer token.
    pub fn new(config: &ApiConfig, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Fatal {
                status: 0,
                message: format!("bad endpoint {path}: {e}"),
            })
    }

    async fn get(&self, url: Url, params: &[(&str, String)]) -> ApiResult<Value> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        response.json::<Value>().await.map_err(ApiError::from)
    }

    /// Map a non-success response onto the failure taxonomy.
    async fn check_status(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // 420 is the legacy "enhance your calm" throttle
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 420 {
            let reset_at = response
                .headers()
                .get(RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0));
            return Err(ApiError::RateLimited { reset_at });
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Fatal {
                status: status.as_u16(),
                message: body,
            }),
            _ => Err(ApiError::Transient(format!("HTTP {status}: {body}"))),
        }
    }

    fn search_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", query.query.clone()),
            ("count", query.count.to_string()),
            ("result_type", "recent".to_string()),
            ("until", query.until.format("%Y-%m-%d").to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        if !query.since_id.is_zero() {
            params.push(("since_id", query.since_id.to_string()));
        }
        if let Some(max_id) = query.max_id {
            params.push(("max_id", max_id.to_string()));
        }
        params
    }
}

#[async_trait]
impl SearchApi for TwitterClient {
    async fn search(&self, query: &SearchQuery) -> ApiResult<Vec<Record>> {
        let url = self.endpoint(SEARCH_PATH)?;
        let body = self.get(url, &Self::search_params(query)).await?;
        let response: SearchResponse = serde_json::from_value(body)
            .map_err(|e| ApiError::Transient(format!("malformed search response: {e}")))?;

        let mut records = Vec::with_capacity(response.statuses.len());
        for status in response.statuses {
            match Record::from_status(status) {
                Some(record) => records.push(record),
                None => log::warn!("Dropping status without an id for query {}", query.query),
            }
        }
        Ok(records)
    }

    async fn rate_limit_reset(&self) -> ApiResult<Option<DateTime<Utc>>> {
        let url = self.endpoint(RATE_LIMIT_PATH)?;
        let body = self
            .get(url, &[("resources", "search".to_string())])
            .await?;
        Ok(body
            .pointer("/resources/search/~1search~1tweets/reset")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }
}

/// Builds a [`TwitterClient`] from the credentials file on each call.
pub struct TwitterConnector {
    config: ApiConfig,
    credentials_path: PathBuf,
}

impl TwitterConnector {
    pub fn new(config: ApiConfig, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            credentials_path: credentials_path.into(),
        }
    }

    async fn read_token(&self) -> Result<String> {
        let raw = tokio::fs::read_to_string(&self.credentials_path)
            .await
            .map_err(|e| {
                AppError::config(format!(
                    "Cannot read API credentials at {}: {e}",
                    self.credentials_path.display()
                ))
            })?;
        let credentials: Credentials = serde_json::from_str(&raw)?;
        if credentials.bearer_token.trim().is_empty() {
            return Err(AppError::config("bearer_token is empty"));
        }
        Ok(credentials.bearer_token)
    }
}

#[async_trait]
impl ApiConnector for TwitterConnector {
    async fn connect(&self) -> Result<Arc<dyn SearchApi>> {
        let token = self.read_token().await?;
        Ok(Arc::new(TwitterClient::new(&self.config, token)?))
    }
}
