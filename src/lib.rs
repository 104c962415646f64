// src/lib.rs

//! Tweet Harvester Library
//!
//! Pages term searches backwards from the newest result to a per-term
//! checkpoint, paced under the API's rate limit, flushing batches to a
//! document store or local JSON-lines fallback.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
