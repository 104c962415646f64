//! Search terms and the queries built from them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Exclusion clauses appended by [`FilterMethod::Crypto`].
pub const CRYPTO_EXCLUSIONS: &str = "-filter:retweets -filter:links \
     -gainers -losers -alert -alerts -changes \
     -change -changed -increased -decreased";

/// How a term is turned into a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// `$TERM`
    Ticker,
    /// `#TERM`
    Hashtag,
    /// The term verbatim
    #[default]
    Raw,
}

impl SearchMethod {
    pub fn apply(self, term: &str) -> String {
        match self {
            Self::Ticker => format!("${term}"),
            Self::Hashtag => format!("#{term}"),
            Self::Raw => term.to_string(),
        }
    }
}

impl FromStr for SearchMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ticker" => Ok(Self::Ticker),
            "hashtag" => Ok(Self::Hashtag),
            "" | "raw" => Ok(Self::Raw),
            other => Err(AppError::validation(format!(
                "unknown search method '{other}' (expected ticker, hashtag or raw)"
            ))),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ticker => "ticker",
            Self::Hashtag => "hashtag",
            Self::Raw => "raw",
        })
    }
}

/// Optional noise filter appended to every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMethod {
    #[default]
    None,
    /// Drop retweets, links and price-alert chatter
    Crypto,
}

impl FromStr for FilterMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "crypto" => Ok(Self::Crypto),
            other => Err(AppError::validation(format!(
                "bad filter method '{other}' (expected none or crypto)"
            ))),
        }
    }
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Crypto => "crypto",
        })
    }
}

/// Build the effective query string for a term.
pub fn build_query(term: &str, method: SearchMethod, filter: FilterMethod) -> String {
    let query = method.apply(term);
    match filter {
        FilterMethod::None => query,
        FilterMethod::Crypto => format!("{query} {CRYPTO_EXCLUSIONS}"),
    }
}

/// Filesystem-safe, lower-case form of a term.
pub fn term_path(term: &str) -> String {
    let path = term
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || " ._-".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase();

    // "." and ".." would point at the fallback root or its parent
    if path.chars().all(|c| c == '.') {
        "_".repeat(path.len().max(1))
    } else {
        path
    }
}

/// Read the ordered term list from a CSV file with a header row.
///
/// Blank cells are skipped. A missing file or column is a configuration
/// error: nothing should be searched with a half-read term list.
pub fn load_terms(path: impl AsRef<Path>, column: &str) -> Result<Vec<String>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AppError::config(format!(
            "Missing search terms file, expected at {}",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let index = headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| {
            AppError::config(format!(
                "Column '{}' not in {} (found: {})",
                column,
                path.display(),
                headers.iter().collect::<Vec<_>>().join(", ")
            ))
        })?;

    let mut terms = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(value) = row.get(index).map(str::trim).filter(|v| !v.is_empty()) {
            terms.push(value.to_string());
        }
    }
    Ok(terms)
}
