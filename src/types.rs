//! Common types used throughout the dataset CDK
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method a data set is fetched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    #[serde(alias = "get", alias = "Get")]
    GET,
    #[serde(alias = "post", alias = "Post")]
    POST,
    #[serde(alias = "patch", alias = "Patch")]
    PATCH,
}

impl Method {
    /// Upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PATCH => "PATCH",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PATCH => reqwest::Method::PATCH,
        }
    }
}

// ============================================================================
// Result Shape
// ============================================================================

/// Shape a data set declares for its final data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// A list of rows
    #[default]
    Array,
    /// A single row
    Object,
}

impl ResultKind {
    /// Describe the runtime shape of a JSON value in the same vocabulary
    pub fn describe(value: &JsonValue) -> &'static str {
        match value {
            JsonValue::Array(_) => "array",
            JsonValue::Object(_) => "object",
            JsonValue::Null => "null",
            JsonValue::String(_) => "string",
            JsonValue::Number(_) => "number",
            JsonValue::Bool(_) => "boolean",
        }
    }

    /// Name used in configuration and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Array => "array",
            ResultKind::Object => "object",
        }
    }
}

// ============================================================================
// Sort Order
// ============================================================================

/// Direction of a sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "ascending")]
    Asc,
    #[serde(alias = "descending")]
    Desc,
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.is_empty())
    }
}

impl OptionStringExt for String {
    fn none_if_empty(self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_conversion() {
        let get: reqwest::Method = Method::GET.into();
        assert_eq!(reqwest::Method::GET, get);
        let patch: reqwest::Method = Method::PATCH.into();
        assert_eq!(reqwest::Method::PATCH, patch);
    }

    #[test]
    fn test_method_serde_case_insensitive() {
        let m: Method = serde_json::from_str("\"post\"").unwrap();
        assert_eq!(m, Method::POST);
        let m: Method = serde_json::from_str("\"PATCH\"").unwrap();
        assert_eq!(m, Method::PATCH);
        assert_eq!(Method::default(), Method::GET);
    }

    #[test]
    fn test_result_kind_serde() {
        let kind: ResultKind = serde_json::from_str("\"object\"").unwrap();
        assert_eq!(kind, ResultKind::Object);
        assert_eq!(ResultKind::default(), ResultKind::Array);
    }

    #[test]
    fn test_result_kind_describe() {
        assert_eq!(ResultKind::describe(&json!([])), "array");
        assert_eq!(ResultKind::describe(&json!({})), "object");
        assert_eq!(ResultKind::describe(&json!(null)), "null");
    }

    #[test]
    fn test_option_string_none_if_empty() {
        assert_eq!(
            Some("test".to_string()).none_if_empty(),
            Some("test".to_string())
        );
        assert_eq!(Some(String::new()).none_if_empty(), None);
        assert_eq!(None::<String>.none_if_empty(), None);
        assert_eq!(String::new().none_if_empty(), None);
    }
}
