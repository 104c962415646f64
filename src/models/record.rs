//! Search records and their identifiers.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Timestamp layout used by the search API (and for `get_date`).
pub const API_DATE_FORMAT: &str = "%a %b %d %H:%M:%S +0000 %Y";

/// Identifier of a search record.
///
/// Identifiers grow monotonically with creation time. They are written to
/// JSON as decimal strings since they exceed the range JSON numbers can hold
/// exactly in most readers. Zero means "no bound".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    /// The unset bound.
    pub const ZERO: RecordId = RecordId(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The identifier directly below this one, if any.
    pub fn predecessor(self) -> Option<RecordId> {
        self.0.checked_sub(1).map(RecordId)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(RecordId)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(RecordId(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Extract the identifier of a raw status object.
///
/// `id_str` wins over `id` because the numeric form may have been rounded
/// by whatever produced the JSON.
pub fn status_id(status: &Value) -> Option<RecordId> {
    if let Some(id) = status.get("id_str").and_then(Value::as_str) {
        return id.parse().ok();
    }
    status.get("id").and_then(Value::as_u64).map(RecordId)
}

/// A record returned by one search page.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    /// The full status object as returned by the API
    pub payload: Value,
}

impl Record {
    /// Build a record from a raw status object, if it carries an identifier.
    pub fn from_status(status: Value) -> Option<Self> {
        let id = status_id(&status)?;
        Some(Self {
            id,
            payload: status,
        })
    }
}

/// A record annotated with the search that found it, ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Search term the record was found for
    pub term: String,
    /// Effective query string sent to the API
    pub q: String,
    /// Fetch timestamp in [`API_DATE_FORMAT`]
    pub get_date: String,
    /// The original status object
    pub tweet: Value,
}

impl EnrichedRecord {
    pub fn new(term: &str, query: &str, fetched_at: DateTime<Utc>, record: Record) -> Self {
        Self {
            term: term.to_string(),
            q: query.to_string(),
            get_date: fetched_at.format(API_DATE_FORMAT).to_string(),
            tweet: record.payload,
        }
    }

    pub fn id(&self) -> Option<RecordId> {
        status_id(&self.tweet)
    }
}
