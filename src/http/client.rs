//! HTTP client with retry and rate limiting
//!
//! The default [`ApiClient`]. It handles:
//! - Automatic retries with configurable backoff for transient failures
//! - Rate limiting to pace requests
//! - Turning throttled (429) responses into pending results

use super::api::{ApiClient, ApiResponse, ApiResult, PendingResult};
use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::types::Method;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default delay when a throttled response has no usable Retry-After
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Backoff strategy between transient retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffType {
    Constant,
    Linear,
    #[default]
    Exponential,
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for relative request URLs
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of transient retries per request
    pub max_retries: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
    /// Throttle retries allowed before the caller gives up
    pub max_throttle_retries: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
            backoff_type: BackoffType::Exponential,
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers: HashMap::new(),
            user_agent: format!("dataset-cdk/{}", env!("CARGO_PKG_VERSION")),
            max_throttle_retries: 5,
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set max transient retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set how many throttle retries a caller may make
    pub fn max_throttle_retries(mut self, retries: u32) -> Self {
        self.config.max_throttle_retries = retries;
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// HTTP client with retry and rate limiting
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new).transpose()?;

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Send a request, retrying transient failures
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult> {
        let full_url = self.build_url(url);
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let mut req = self
                .client
                .request(method.into(), &full_url)
                .header("accept", "application/json");
            for (key, value) in &self.config.default_headers {
                req = req.header(key.as_str(), value.as_str());
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            debug!(%method, url = %full_url, attempt, "Sending request");

            let error = match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return self.throttled(&response, metadata).map(ApiResult::Pending);
                    }

                    if status.is_success() {
                        return Ok(ApiResult::Complete(
                            into_api_response(method, &full_url, response).await?,
                        ));
                    }

                    let code = status.as_u16();
                    let text = response.text().await.unwrap_or_default();
                    if !is_retryable_status(status) {
                        return Err(Error::http_status(code, text));
                    }
                    Error::http_status(code, text)
                }
                Err(e) if e.is_timeout() => {
                    #[allow(clippy::cast_possible_truncation)]
                    let timeout_ms = self.config.timeout.as_millis() as u64;
                    Error::Timeout { timeout_ms }
                }
                Err(e) if e.is_connect() => Error::Http(e),
                Err(e) => return Err(Error::Http(e)),
            };

            if attempt >= max_retries {
                return Err(error);
            }
            let delay = self.calculate_backoff(attempt);
            warn!(
                "Request failed ({}), attempt {}/{}, retrying in {:?}",
                error,
                attempt + 1,
                max_retries + 1,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Build the pending result for a throttled response
    fn throttled(&self, response: &Response, metadata: Option<&Value>) -> Result<PendingResult> {
        let retry_count = metadata
            .and_then(|m| m.get("retryCount"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + 1;
        let max_retry = self.config.max_throttle_retries;
        if retry_count > u64::from(max_retry) {
            return Err(Error::MaxRetriesExceeded {
                max_retries: max_retry,
            });
        }

        let mut state = match metadata {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        state.insert("retryCount".to_string(), json!(retry_count));

        let delay = extract_retry_after(response);
        info!(delay, retry_count, "Throttled (429), returning pending result");
        Ok(PendingResult {
            delay,
            max_retry,
            metadata: Value::Object(state),
        })
    }

    /// Build full URL from path
    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        }
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.config.backoff_type {
            BackoffType::Constant => self.config.initial_backoff,
            BackoffType::Linear => self.config.initial_backoff * (attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.config.initial_backoff * factor
            }
        };

        std::cmp::min(delay, self.config.max_backoff)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ApiClient for HttpClient {
    fn base_url(&self) -> Option<&str> {
        self.config.base_url.as_deref()
    }

    async fn get_json(&self, url: &str, metadata: Option<&Value>) -> Result<ApiResult> {
        self.request(Method::GET, url, None, metadata).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult> {
        self.request(Method::POST, url, body, metadata).await
    }

    async fn patch_json(
        &self,
        url: &str,
        body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ApiResult> {
        self.request(Method::PATCH, url, body, metadata).await
    }
}

async fn into_api_response(method: Method, url: &str, response: Response) -> Result<ApiResponse> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let text = response.text().await?;
    let json = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)?
    };

    Ok(ApiResponse {
        json,
        source: json!({ "method": method.as_str(), "url": url, "status": status }),
        headers,
    })
}

/// Check if an HTTP status is worth retrying in place
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        500 | 502 | 503 | 504 | 520 | 521 | 522 | 523 | 524
    )
}

/// Extract retry-after header value in seconds
fn extract_retry_after(response: &Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}
