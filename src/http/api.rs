//! HTTP collaborator boundary
//!
//! The pipeline only talks to the network through [`ApiClient`]. A fetch
//! either completes with a JSON body or asks to be retried later.

use crate::error::Result;
use crate::types::Method;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;

/// A completed fetch
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    /// Parsed response body (`null` for an empty body)
    pub json: Value,
    /// Where the data came from: `{method, url, status}`
    pub source: Value,
    /// Response headers
    pub headers: HeaderMap,
}

/// A fetch the caller should retry later
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResult {
    /// Seconds to wait before retrying
    pub delay: u64,
    /// Retries allowed before giving up
    pub max_retry: u32,
    /// Opaque state to hand back on the retry
    pub metadata: Value,
}

/// Outcome of a fetch
#[derive(Debug, Clone)]
pub enum ApiResult {
    /// The request completed
    Complete(ApiResponse),
    /// The request was throttled
    Pending(PendingResult),
}

impl ApiResult {
    /// Check if the request completed
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// JSON API client used by data sources
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Base URL that relative data set URLs are resolved against
    fn base_url(&self) -> Option<&str>;

    /// GET a JSON document
    async fn get_json(&self, url: &str, metadata: Option<&Value>) -> Result<ApiResult>;

    /// POST a JSON body
    async fn post_json(
        &self,
        url: &str,
        body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult>;

    /// PATCH a JSON body
    async fn patch_json(
        &self,
        url: &str,
        body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult>;

    /// Dispatch on the data set's declared method
    async fn fetch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult> {
        match method {
            Method::GET => self.get_json(url, metadata).await,
            Method::POST => self.post_json(url, body, metadata).await,
            Method::PATCH => self.patch_json(url, body, metadata).await,
        }
    }
}
