// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
///
/// Anything surfacing as an `AppError` out of a run is fatal for that run.
/// Per-term API failures never reach this type; they are classified by
/// [`crate::services::ApiError`] and absorbed by the error budget.
#[derive(Error, Debug)]
pub enum AppError {
    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV parsing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Checkpoint file could not be read or written
    #[error("Checkpoint error at {path}: {message}")]
    Checkpoint { path: String, message: String },

    /// Durable sink rejected a write
    #[error("Sink error for {destination}: {message}")]
    Sink {
        destination: String,
        message: String,
    },

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notify(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a checkpoint error for the given file.
    pub fn checkpoint(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        Self::Checkpoint {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create a sink error with the destination it was writing to.
    pub fn sink(destination: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Sink {
            destination: destination.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification error.
    pub fn notify(message: impl fmt::Display) -> Self {
        Self::Notify(message.to_string())
    }
}
