//! Pipeline types
//!
//! Results returned by data set fetches and criteria option construction.

use crate::config::PagingMode;
use crate::http::PendingResult;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// A fully processed data set fetch
#[derive(Debug, Clone, Default)]
pub struct CompleteResult {
    /// Shaped data
    pub data: Value,
    /// Where the data came from: `{method, url, status}` of the last fetch
    pub source: Value,
    /// Headers of the last fetch
    pub headers: HeaderMap,
    /// Page to resume from, for job-level paging
    pub next_page: Option<String>,
    /// `{dataSet, url}` of the request
    pub context: Value,
}

/// Outcome of a data set fetch
#[derive(Debug, Clone)]
pub enum DataSetResult {
    /// Every stage ran
    Complete(CompleteResult),
    /// A fetch was throttled; nothing after it ran
    Pending(PendingResult),
}

impl DataSetResult {
    /// Check if the fetch completed
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Completed result, if any
    pub fn as_complete(&self) -> Option<&CompleteResult> {
        match self {
            Self::Complete(result) => Some(result),
            Self::Pending(_) => None,
        }
    }

    /// Render as JSON for display
    pub fn to_json(&self) -> Value {
        match self {
            Self::Complete(result) => json!({
                "status": "complete",
                "data": result.data,
                "source": result.source,
                "headers": headers_to_json(&result.headers),
                "nextPage": result.next_page,
                "context": result.context,
            }),
            Self::Pending(pending) => pending_to_json(pending),
        }
    }
}

/// Render a pending result as JSON
pub fn pending_to_json(pending: &PendingResult) -> Value {
    json!({
        "status": "pending",
        "delay": pending.delay,
        "maxRetry": pending.max_retry,
        "metadata": pending.metadata,
    })
}

/// Header map as a JSON object; values that are not UTF-8 are skipped
pub fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str().to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(out)
}

/// How a fetch drives the paging scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// One page; `next_page` is returned to the caller
    Job,
    /// Every page, rows concatenated
    Aggregate,
    /// The paging scheme is ignored
    Disabled,
}

impl From<PagingMode> for FetchMode {
    fn from(mode: PagingMode) -> Self {
        match mode {
            PagingMode::Job => Self::Job,
            PagingMode::Aggregate => Self::Aggregate,
        }
    }
}

/// A value/label pair offered for a criteria field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaOption {
    pub value: Value,
    pub label: Value,
}

/// Outcome of criteria option construction
#[derive(Debug, Clone)]
pub enum CriteriaOptionsResult {
    Complete(Vec<CriteriaOption>),
    Pending(PendingResult),
}
