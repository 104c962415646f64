// src/models/mod.rs

//! Domain models for the harvester.
//!
//! Configuration, search terms and the records moving from the search API
//! to the sink.

mod config;
mod record;
mod term;

// Re-export all public types
pub use config::{
    ApiConfig, Config, LoggingConfig, NotifyConfig, SearchConfig, SinkBackend, StorageConfig,
};
pub use record::{API_DATE_FORMAT, EnrichedRecord, Record, RecordId, status_id};
pub use term::{
    CRYPTO_EXCLUSIONS, FilterMethod, SearchMethod, build_query, load_terms, term_path,
};
