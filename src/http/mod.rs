//! HTTP client module
//!
//! Provides the [`ApiClient`] boundary the pipeline fetches through and a
//! default reqwest-backed implementation.
//!
//! # Features
//!
//! - **Automatic Retries**: Transient failures retried with backoff
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Throttle Handling**: 429 responses become [`PendingResult`]s

mod api;
mod client;
mod rate_limit;

pub use api::{ApiClient, ApiResponse, ApiResult, PendingResult};
pub use client::{BackoffType, HttpClient, HttpClientConfig, HttpClientConfigBuilder};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
