// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Dataset Connector Development Kit (CDK)
//!
//! Declarative data-set retrieval for integration connectors. A data source
//! definition names data sets: a URL template, a paging scheme and a chain
//! of shaping stages. [`DataSource::get_data`] turns one of them into data.
//!
//! ## Features
//!
//! - **Token templates**: `{{criteria.x}}`, `{{constants.x}}` in URLs, queries and bodies
//! - **Pagination**: next token, page based, offset and limit, GraphQL connections
//! - **Joins and lookups**: nested fetches of other data sets
//! - **Shaping**: filter, result shape, transform and sort expressions
//! - **Throttling as data**: a 429 anywhere comes back as a pending result
//! - **Iteration**: run a data set once per element of a plan
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dataset_cdk::{load_data_source, DataSetResult, DataSource, HttpClient, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = load_data_source("datasource.json")?;
//!     let client = HttpClient::with_config(config.http.to_client_config(config.base_url.as_deref()))?;
//!     let source = DataSource::new(config, Arc::new(client));
//!
//!     match source.get_data("projects", None, None, None, None).await? {
//!         DataSetResult::Complete(result) => println!("{}", result.data),
//!         DataSetResult::Pending(pending) => println!("retry in {}s", pending.delay),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                 DataSource::get_data(name, params)            │
//! │  tokens → fetch/paginate → property → joins → lookups →       │
//! │  filter → shape → transform → sort                            │
//! └───────────────────────────────────────────────────────────────┘
//!                                │
//! ┌───────────┬──────────────┬───┴──────────┬─────────────────────┐
//! │ Template  │ Pagination   │ Expression   │ HTTP                │
//! ├───────────┼──────────────┼──────────────┼─────────────────────┤
//! │ criteria  │ nextToken    │ paths        │ retry + backoff     │
//! │ constants │ pageBased    │ filters      │ rate limit          │
//! │ messages  │ offset/limit │ vlookup      │ 429 → pending       │
//! │ lookups   │ graphql      │ comparators  │                     │
//! └───────────┴──────────────┴──────────────┴─────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the CDK
pub mod error;

/// Common types and type aliases
pub mod types;

/// Data source configuration types
pub mod config;

/// JSON/YAML loader and validation for data source definitions
pub mod loader;

/// Token resolution
pub mod template;

/// Path and expression evaluation
pub mod expression;

/// Paging schemes
pub mod pagination;

/// HTTP client with retry, rate limiting and throttle handling
pub mod http;

/// Data set pipeline
pub mod pipeline;

/// Service data iterator
pub mod iterator;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{DataSet, DataSourceConfig};
pub use http::{ApiClient, HttpClient, PendingResult};
pub use iterator::{IteratorLayer, IteratorPlan, ServiceDataIterator};
pub use loader::{load_data_source, load_data_source_from_str};
pub use pipeline::{CompleteResult, CriteriaOptionsResult, DataSetResult, DataSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
