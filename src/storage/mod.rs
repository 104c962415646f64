//! Storage abstractions for harvested records and run state.
//!
//! - `RecordSink`: where flushed batches go. `DurableSink` routes to a
//!   primary `DocumentStore` or, when that store is unreachable at
//!   construction, to local JSON-lines files for its whole lifetime.
//! - `CheckpointStore`: per-term high-water marks across runs.
//! - `ErrorLog` and `RunReport`: append-only diagnostics.

pub mod checkpoint;
pub mod error_log;
pub mod local;
pub mod report;
#[cfg(feature = "s3")]
pub mod s3;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Config, EnrichedRecord, SinkBackend};

// Re-export for convenience
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error_log::{ErrorLog, FailureContext};
pub use local::LocalStorage;
pub use report::RunReport;

/// A logical collection in the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    pub database: String,
    pub collection: String,
}

impl Collection {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Where one term's batches are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub collection: Collection,
    /// File under the fallback root, used when the primary store is down
    pub fallback_file: PathBuf,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.collection, self.fallback_file.display())
    }
}

/// Accepts flushed batches durably.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store a batch. Must not drop records silently.
    async fn flush(&self, records: &[EnrichedRecord], destination: &Destination) -> Result<()>;

    /// Records currently held for a collection.
    async fn count(&self, collection: &Collection) -> Result<u64>;

    /// Remove every record of a database.
    async fn drop_database(&self, database: &str) -> Result<()>;
}

/// A primary store holding records as documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<()>;

    async fn insert_many(&self, collection: &Collection, records: &[EnrichedRecord])
    -> Result<()>;

    async fn count(&self, collection: &Collection) -> Result<u64>;

    async fn drop_database(&self, database: &str) -> Result<()>;
}

enum Route {
    Primary(Box<dyn DocumentStore>),
    Fallback(LocalStorage),
}

/// Sink whose primary-vs-fallback route is fixed at construction.
pub struct DurableSink {
    route: Route,
}

impl DurableSink {
    /// Sink writing only to local files.
    pub fn local(fallback: LocalStorage) -> Self {
        log::info!("Writing records to {}", fallback.root().display());
        Self {
            route: Route::Fallback(fallback),
        }
    }

    /// Use the primary store if it answers now, otherwise the fallback for good.
    pub async fn connect(primary: Box<dyn DocumentStore>, fallback: LocalStorage) -> Self {
        log::info!("Attempting to connect to {}", primary.describe());
        match primary.ping().await {
            Ok(()) => {
                log::info!("Connected to {}", primary.describe());
                Self {
                    route: Route::Primary(primary),
                }
            }
            Err(e) => {
                log::warn!(
                    "Could not reach {} ({}). Writing to {} instead",
                    primary.describe(),
                    e,
                    fallback.root().display()
                );
                Self {
                    route: Route::Fallback(fallback),
                }
            }
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.route, Route::Primary(_))
    }
}

#[async_trait]
impl RecordSink for DurableSink {
    async fn flush(&self, records: &[EnrichedRecord], destination: &Destination) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let written = match &self.route {
            Route::Primary(store) => store.insert_many(&destination.collection, records).await,
            Route::Fallback(local) => {
                local
                    .append_records(&destination.fallback_file, records)
                    .await
            }
        };
        written.map_err(|e| AppError::sink(destination.to_string(), e))?;

        log::info!("Flushed {} records to {}", records.len(), destination);
        Ok(())
    }

    async fn count(&self, collection: &Collection) -> Result<u64> {
        match &self.route {
            Route::Primary(store) => store.count(collection).await,
            Route::Fallback(local) => local.count_records().await,
        }
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        match &self.route {
            Route::Primary(store) => {
                store.drop_database(database).await?;
                log::info!("Dropped database {} on {}", database, store.describe());
                Ok(())
            }
            Route::Fallback(local) => {
                log::warn!(
                    "Primary store unavailable; local files under {} are left untouched",
                    local.root().display()
                );
                Ok(())
            }
        }
    }
}

/// Build the sink described by the configuration.
///
/// The primary store is tried once here; the route chosen holds for the
/// whole run.
pub async fn open_sink(config: &Config) -> Result<DurableSink> {
    let fallback = LocalStorage::new(config.fallback_dir());
    match config.storage.backend {
        SinkBackend::Local => Ok(DurableSink::local(fallback)),
        #[cfg(feature = "s3")]
        SinkBackend::S3 => {
            let store = s3::S3Storage::from_env(&config.storage.bucket, &config.storage.prefix).await;
            Ok(DurableSink::connect(Box::new(store), fallback).await)
        }
        #[cfg(not(feature = "s3"))]
        SinkBackend::S3 => Err(AppError::config(
            "storage.backend = \"s3\" needs a build with the `s3` feature",
        )),
    }
}
