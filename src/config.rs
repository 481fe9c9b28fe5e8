//! Configuration types for data source definitions
//!
//! This module contains the structures connector authors declare in JSON
//! (or YAML): the data sets, their paging schemes and shaping stages, and
//! the static token layers they resolve against. Field names follow the
//! camelCase configuration contract exactly.

use crate::http::{BackoffType, HttpClientConfig, RateLimiterConfig};
use crate::pagination::PagingScheme;
use crate::types::{JsonObject, Method, ResultKind, SortOrder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

// ============================================================================
// Top-Level Data Source Config
// ============================================================================

/// Complete data source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    /// Base URL for relative data set URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Static messages token layer
    #[serde(default)]
    pub messages: JsonObject,

    /// Constants token layer
    #[serde(default)]
    pub constants: JsonObject,

    /// Static lookup tables used by `vlookup`
    #[serde(default)]
    pub lookups: HashMap<String, JsonObject>,

    /// Named data sets
    #[serde(default)]
    pub data_sets: BTreeMap<String, DataSet>,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
}

impl DataSourceConfig {
    /// Get a data set by name
    pub fn data_set(&self, name: &str) -> Option<&DataSet> {
        self.data_sets.get(name)
    }

    /// Data set names in sorted order
    pub fn data_set_names(&self) -> Vec<&str> {
        self.data_sets.keys().map(String::as_str).collect()
    }
}

// ============================================================================
// Data Sets
// ============================================================================

/// A named request and shaping recipe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    /// Relative or absolute URL, may contain tokens
    pub url: String,

    /// HTTP method
    #[serde(default)]
    pub method: Method,

    /// Query parameters appended to the URL, may contain tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<JsonObject>,

    /// Message body for POST and PATCH, may contain tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Expression selecting the rows from the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,

    /// Inner joins against other data sets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,

    /// Per-row secondary fetches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lookups: Vec<Lookup>,

    /// Row filter, all clauses must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<FilterClause>,

    /// Row rewrite expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,

    /// Sort keys, in priority order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortClause>,

    /// How successive pages are requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging_scheme: Option<PagingScheme>,

    /// Whether paging is driven by the caller or aggregated here
    #[serde(default)]
    pub paging_mode: PagingMode,

    /// Expected shape of the final data
    #[serde(default)]
    pub result: ResultKind,
}

/// Who drives paging for a paged data set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagingMode {
    /// One page per call; the caller resumes with `next_page`
    #[default]
    Job,
    /// Follow every page and concatenate the rows
    Aggregate,
}

/// Inner join against another data set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    /// Data set providing the right-hand rows
    pub data_set: String,
    /// Key the matching right row is attached under
    pub name: String,
    /// Params for the joined fetch, may contain tokens
    #[serde(default)]
    pub params: JsonObject,
    /// Equality predicates, all must hold
    pub on: Vec<JoinCondition>,
}

/// One equality predicate of a join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinCondition {
    /// Expression evaluated against the left row
    pub left: String,
    /// Expression evaluated against the right row
    pub right: String,
}

/// Per-row secondary fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookup {
    /// Data set to fetch per row
    pub data_set: String,
    /// Key the result is attached under
    pub name: String,
    /// Params, may reference the row via `{{ source.* }}`
    #[serde(default)]
    pub params: JsonObject,
}

/// Filter clause: keep rows where `expression` equals `value`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterClause {
    pub expression: String,
    /// Target value, may contain tokens
    pub value: Value,
}

/// Transform expression, written as one string or as lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transform {
    Single(String),
    Lines(Vec<String>),
}

impl Transform {
    /// The expression text, joining lines with newlines
    pub fn source(&self) -> String {
        match self {
            Self::Single(s) => s.clone(),
            Self::Lines(lines) => lines.join("\n"),
        }
    }
}

/// Sort key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortClause {
    pub expression: String,
    #[serde(default)]
    pub order: SortOrder,
}

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of transient retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Throttle retries allowed before giving up
    #[serde(default = "default_max_throttle_retries")]
    pub max_throttle_retries: u32,

    /// Retry backoff configuration
    #[serde(default)]
    pub retry_backoff: BackoffConfig,

    /// Rate limiting configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    /// Headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            max_throttle_retries: default_max_throttle_retries(),
            retry_backoff: BackoffConfig::default(),
            rate_limit: None,
            headers: HashMap::new(),
        }
    }
}

impl HttpConfig {
    /// Build the client configuration these settings describe
    pub fn to_client_config(&self, base_url: Option<&str>) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .max_retries(self.max_retries)
            .max_throttle_retries(self.max_throttle_retries)
            .backoff(
                self.retry_backoff.backoff_type,
                Duration::from_millis(self.retry_backoff.initial_ms),
                Duration::from_millis(self.retry_backoff.max_ms),
            );
        if let Some(url) = base_url {
            builder = builder.base_url(url);
        }
        builder = match &self.rate_limit {
            Some(limit) => builder.rate_limit(RateLimiterConfig::new(
                limit.requests_per_second,
                limit.burst_size.unwrap_or(limit.requests_per_second),
            )),
            None => builder.no_rate_limit(),
        };
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        builder.build()
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_throttle_retries() -> u32 {
    5
}

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Type of backoff
    #[serde(rename = "type", default)]
    pub backoff_type: BackoffType,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_initial_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    60000
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Requests per second limit
    pub requests_per_second: u32,

    /// Burst size, defaults to the per-second rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<u32>,
}
