//! Error types for the dataset CDK
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Retry requests are not errors: a throttled fetch surfaces as
//! `DataSetResult::Pending` and flows back through the pipeline as data.

use thiserror::Error;

/// The main error type for the dataset CDK
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Data Set Errors
    // ============================================================================
    #[error("Invalid data set name: {name}")]
    InvalidDataSet { name: String },

    #[error("Data returned does not match expected result for data set '{data_set}': expected {expected}, got {actual}")]
    ResultMismatch {
        data_set: String,
        expected: String,
        actual: String,
    },

    #[error("Filter specified for data set '{data_set}' but data returned is not an array")]
    FilterNotArray { data_set: String },

    #[error("Join '{join}' specified for data set '{data_set}' but {side} data is not an array")]
    JoinNotArray {
        data_set: String,
        join: String,
        side: String,
    },

    #[error("Object result specified for data set '{data_set}' but {message}")]
    FilteredObjectCount { data_set: String, message: String },

    // ============================================================================
    // Paging Errors
    // ============================================================================
    #[error("Invalid {scheme} paging scheme: {message}")]
    PagingScheme { scheme: String, message: String },

    // ============================================================================
    // Iterator Errors
    // ============================================================================
    #[error("Iterator configuration error: {message}")]
    Iterator { message: String },

    #[error("Invalid iterable array: {message}")]
    IterableArray { message: String },

    // ============================================================================
    // Expression / Template Errors
    // ============================================================================
    #[error("Expression error in '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("Lookup table '{table}': {message}")]
    LookupTable { table: String, message: String },

    #[error("JSONPath error: {message}")]
    JsonPath { message: String },

    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid data set error
    pub fn invalid_data_set(name: impl Into<String>) -> Self {
        Self::InvalidDataSet { name: name.into() }
    }

    /// Create a paging scheme error
    pub fn paging(scheme: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PagingScheme {
            scheme: scheme.into(),
            message: message.into(),
        }
    }

    /// Create an iterator configuration error
    pub fn iterator(message: impl Into<String>) -> Self {
        Self::Iterator {
            message: message.into(),
        }
    }

    /// Create an iterable array validation error
    pub fn iterable(message: impl Into<String>) -> Self {
        Self::IterableArray {
            message: message.into(),
        }
    }

    /// Create an expression error
    pub fn expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a lookup table error
    pub fn lookup_table(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LookupTable {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a JSONPath error
    pub fn json_path(message: impl Into<String>) -> Self {
        Self::JsonPath {
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for the dataset CDK
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
