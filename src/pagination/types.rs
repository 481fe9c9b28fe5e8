//! Pagination types and traits
//!
//! Defines the declarative paging schemes, the explicit page state machine
//! and the [`Paginator`] trait implemented by every strategy.

use crate::error::{Error, Result};
use crate::types::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

// ============================================================================
// Paging Schemes
// ============================================================================

/// Declarative paging scheme, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PagingScheme {
    /// Token or next-link based paging
    NextToken(NextTokenScheme),
    /// Page number based paging
    PageBased(PageBasedScheme),
    /// Offset and limit paging
    OffsetAndLimit(OffsetAndLimitScheme),
    /// GraphQL connection cursors
    GraphqlConnections(GraphqlConnectionsScheme),
}

impl PagingScheme {
    /// The scheme's `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NextToken(_) => "nextToken",
            Self::PageBased(_) => "pageBased",
            Self::OffsetAndLimit(_) => "offsetAndLimit",
            Self::GraphqlConnections(_) => "graphqlConnections",
        }
    }
}

/// When to stop requesting pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageUntil {
    /// The response carries no next token
    NoNextToken,
    /// The response returned fewer rows than the limit
    NoDataLeft,
    /// The rows collected so far reach a declared total
    ReachTotalCount,
    /// GraphQL `pageInfo.hasNextPage` is false
    NoNextPage,
}

impl PageUntil {
    /// The `pageUntil` tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoNextToken => "noNextToken",
            Self::NoDataLeft => "noDataLeft",
            Self::ReachTotalCount => "reachTotalCount",
            Self::NoNextPage => "noNextPage",
        }
    }
}

/// How a next token is applied to the following request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenType {
    /// Sent as the token parameter
    #[default]
    Token,
    /// Replaces the whole relative URL
    Url,
    /// Parsed as a JSON array before insertion into the body
    SearchArray,
}

/// `nextToken` scheme fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTokenScheme {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<String>,
    #[serde(default)]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_until: Option<PageUntil>,
}

/// `pageBased` scheme fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBasedScheme {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_starting_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_until: Option<PageUntil>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_path: Option<String>,
}

/// `offsetAndLimit` scheme fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetAndLimitScheme {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_starting_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_until: Option<PageUntil>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_path: Option<String>,
}

/// `graphqlConnections` scheme fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlConnectionsScheme {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_until: Option<PageUntil>,
}

// ============================================================================
// Page State
// ============================================================================

/// Where a paginator is in its page sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageState {
    /// No request has been paginated yet
    #[default]
    Unstarted,
    /// The last paginated request was for this page
    AtPage(String),
}

impl PageState {
    /// Current page value, if started
    pub fn page(&self) -> Option<&str> {
        match self {
            Self::Unstarted => None,
            Self::AtPage(page) => Some(page),
        }
    }
}

/// A request with paging applied
#[derive(Debug, Clone, PartialEq)]
pub struct PagedRequest {
    /// Relative URL including paging query parameters
    pub paged_relative_url: String,
    /// Message body including paging fields
    pub paged_message_body: Option<Value>,
}

/// What a paginator sees of a fetched page
#[derive(Debug, Clone, Copy)]
pub struct PageResponse<'a> {
    /// Raw response body
    pub body: &'a Value,
    /// Rows after `property` extraction
    pub records: &'a Value,
    /// Response headers
    pub headers: &'a HeaderMap,
    /// Base URL used to validate relative next links
    pub base_url: Option<&'a str>,
}

impl<'a> PageResponse<'a> {
    /// Create a response view where the body is also the row set
    pub fn new(body: &'a Value, headers: &'a HeaderMap) -> Self {
        Self {
            body,
            records: body,
            headers,
            base_url: None,
        }
    }

    /// Set the extracted rows
    #[must_use]
    pub fn with_records(mut self, records: &'a Value) -> Self {
        self.records = records;
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<&'a str>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Number of rows on this page
    pub fn record_count(&self) -> usize {
        match self.records {
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        }
    }
}

/// Core trait for pagination strategies
///
/// A paginator is built per fetch and is stateful across the two calls of a
/// page's lifecycle: [`Paginator::paginate_request`] moves it to a page and
/// [`Paginator::next_page`] reads the response for that page.
pub trait Paginator: Send + Sync + std::fmt::Debug {
    /// The scheme `type` tag, used in error messages
    fn scheme_type(&self) -> &'static str;

    /// Current page state
    fn state(&self) -> &PageState;

    /// Apply paging to a request
    ///
    /// With `page` set, the request is for that page. Without it, the first
    /// page is requested when unstarted. Counter schemes (page and offset)
    /// advance one step from their current page instead once started.
    fn paginate_request(
        &mut self,
        relative_url: &str,
        base_url: Option<&str>,
        message_body: Option<&Value>,
        method: Method,
        page: Option<&str>,
    ) -> Result<PagedRequest>;

    /// Compute the next page token, or `None` when paging is complete
    fn next_page(&self, response: &PageResponse<'_>) -> Result<Option<String>>;
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Append query parameters, choosing `?` or `&` as the delimiter
///
/// Names are used as declared; values are url-encoded.
pub fn append_query(url: &str, params: &[(String, String)]) -> String {
    let mut out = url.to_string();
    for (name, value) in params {
        let delimiter = if out.contains('?') { '&' } else { '?' };
        let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
        out.push(delimiter);
        out.push_str(name);
        out.push('=');
        out.push_str(&encoded);
    }
    out
}

/// Set a value at a dotted path, creating intermediate objects
pub fn set_body_path(body: &mut Value, path: &str, value: Value, scheme: &str) -> Result<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return Err(Error::paging(scheme, "empty body path"));
    };

    let mut current = body;
    for part in parents {
        let Value::Object(map) = current else {
            return Err(Error::paging(
                scheme,
                format!("cannot set '{path}': message body is not an object at '{part}'"),
            ));
        };
        current = map
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    match current {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        _ => Err(Error::paging(
            scheme,
            format!("cannot set '{path}': message body is not an object"),
        )),
    }
}

/// Apply paging parameters to a request
///
/// GET requests carry them in the query string; POST and PATCH merge them
/// into the message body.
pub fn apply_params(
    relative_url: &str,
    message_body: Option<&Value>,
    method: Method,
    params: Vec<(String, Value)>,
    scheme: &str,
) -> Result<PagedRequest> {
    if method == Method::GET {
        let query: Vec<(String, String)> = params
            .into_iter()
            .map(|(name, value)| (name, crate::expression::stringify(&value)))
            .collect();
        return Ok(PagedRequest {
            paged_relative_url: append_query(relative_url, &query),
            paged_message_body: message_body.cloned(),
        });
    }

    let mut body = message_body
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    for (name, value) in params {
        set_body_path(&mut body, &name, value, scheme)?;
    }
    Ok(PagedRequest {
        paged_relative_url: relative_url.to_string(),
        paged_message_body: Some(body),
    })
}

/// Read a value from a page by path
///
/// `headers.<name>` reads a response header, `@odata.nextLink` reads that
/// body key, a `$`-prefixed path is a JSONPath query (first match) and
/// anything else is a dotted path with `[n]` indexing.
pub fn extract_page_value(body: &Value, headers: &HeaderMap, path: &str) -> Result<Option<Value>> {
    if let Some(name) = path.strip_prefix("headers.") {
        return Ok(headers
            .get(name.to_ascii_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
            .map(|s| Value::String(s.to_string())));
    }

    if path == "@odata.nextLink" {
        return Ok(body.get(path).cloned());
    }

    if path.starts_with('$') {
        return extract_with_jsonpath(body, path);
    }

    Ok(extract_simple_path(body, path))
}

/// Evaluate a JSONPath query, returning the first match
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Option<Value>> {
    use jsonpath_rust::JsonPath;

    let jp = JsonPath::try_from(path)
        .map_err(|e| Error::json_path(format!("Invalid JSONPath '{path}': {e}")))?;

    match jp.find(value) {
        Value::Array(matches) => Ok(matches.into_iter().next()),
        Value::Null => Ok(None),
        other => Ok(Some(other)),
    }
}

/// Extract a value using dot notation with `[n]` indexing
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn extract_simple_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for part in path.split('.') {
        let (name, indexes) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !name.is_empty() {
            current = current.get(name)?;
        }

        for index in indexes.split('[').skip(1) {
            let index: i64 = index.strip_suffix(']')?.parse().ok()?;
            let Value::Array(arr) = current else {
                return None;
            };
            let idx = if index < 0 {
                arr.len() as i64 + index
            } else {
                index
            };
            if idx < 0 {
                return None;
            }
            current = arr.get(idx as usize)?;
        }
    }
    Some(current.clone())
}

/// Read a declared total as a number
///
/// A missing or non-numeric total yields `None` and a warning.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_total(value: Option<Value>, path: &str) -> Option<i64> {
    let total = match &value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if total.is_none() {
        warn!(path, value = ?value, "Total count is not a number, ending paging");
    }
    total
}
