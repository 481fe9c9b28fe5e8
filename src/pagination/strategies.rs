//! Pagination strategy implementations
//!
//! Each strategy handles one declared paging scheme.

use super::types::{
    apply_params, extract_page_value, parse_total, set_body_path, GraphqlConnectionsScheme,
    NextTokenScheme, OffsetAndLimitScheme, PageBasedScheme, PageResponse, PageState, PageUntil,
    PagedRequest, Paginator, PagingScheme, TokenType,
};
use crate::error::{Error, Result};
use crate::types::Method;
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

// ============================================================================
// Factory
// ============================================================================

/// Validate a paging scheme and build its paginator
///
/// GraphQL connection schemes require `POST`; other schemes ignore the
/// method here.
pub fn create_paginator(scheme: &PagingScheme, method: Method) -> Result<Box<dyn Paginator>> {
    Ok(match scheme {
        PagingScheme::NextToken(s) => Box::new(NextTokenPaginator::new(s)?),
        PagingScheme::PageBased(s) => Box::new(PageBasedPaginator::new(s)?),
        PagingScheme::OffsetAndLimit(s) => Box::new(OffsetAndLimitPaginator::new(s)?),
        PagingScheme::GraphqlConnections(s) => Box::new(GraphqlPaginator::new(s, method)?),
    })
}

fn required(value: Option<&String>, field: &str, scheme: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(Error::paging(scheme, format!("'{field}' is required"))),
    }
}

/// Validate the optional limit pair: both or neither, value positive
fn limit_pair(
    parameter: Option<&String>,
    value: Option<i64>,
    scheme: &str,
) -> Result<Option<(String, i64)>> {
    match (parameter, value) {
        (None, None) => Ok(None),
        (Some(p), Some(v)) => {
            if p.trim().is_empty() {
                return Err(Error::paging(scheme, "'limitParameter' must not be empty"));
            }
            if v <= 0 {
                return Err(Error::paging(
                    scheme,
                    format!("'limitValue' must be a positive integer, got {v}"),
                ));
            }
            Ok(Some((p.clone(), v)))
        }
        (Some(_), None) => Err(Error::paging(
            scheme,
            "'limitValue' is required when 'limitParameter' is set",
        )),
        (None, Some(_)) => Err(Error::paging(
            scheme,
            "'limitParameter' is required when 'limitValue' is set",
        )),
    }
}

fn check_page_until(
    page_until: PageUntil,
    allowed: &[PageUntil],
    scheme: &str,
) -> Result<PageUntil> {
    if allowed.contains(&page_until) {
        Ok(page_until)
    } else {
        Err(Error::paging(
            scheme,
            format!("pageUntil '{}' is not supported", page_until.as_str()),
        ))
    }
}

fn parse_counter(page: &str, scheme: &str) -> Result<i64> {
    page.trim()
        .parse::<i64>()
        .map_err(|_| Error::paging(scheme, format!("page '{page}' is not a number")))
}

/// Counter arithmetic result, or a paging error when it leaves the i64 range
fn checked_counter(value: Option<i64>, scheme: &str) -> Result<i64> {
    value.ok_or_else(|| Error::paging(scheme, "page counter overflow"))
}

/// Turn an extracted token into a page value, treating empty as absent
fn token_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Next Token Pagination
// ============================================================================

/// Token based pagination (e.g., OData next links, continuation tokens)
///
/// The first page only carries the limit. Later pages add the token from
/// the previous response, or replace the URL outright for `url` tokens.
#[derive(Debug, Clone)]
pub struct NextTokenPaginator {
    token_parameter: Option<String>,
    token_path: String,
    token_type: TokenType,
    limit: Option<(String, i64)>,
    page_until: PageUntil,
    state: PageState,
}

impl NextTokenPaginator {
    const SCHEME: &'static str = "nextToken";

    /// Validate the scheme and create a paginator
    pub fn new(scheme: &NextTokenScheme) -> Result<Self> {
        let token_path = required(scheme.token_path.as_ref(), "tokenPath", Self::SCHEME)?;
        let token_parameter = if scheme.token_type == TokenType::Url {
            scheme.token_parameter.clone()
        } else {
            Some(required(
                scheme.token_parameter.as_ref(),
                "tokenParameter",
                Self::SCHEME,
            )?)
        };
        let limit = limit_pair(
            scheme.limit_parameter.as_ref(),
            scheme.limit_value,
            Self::SCHEME,
        )?;
        let page_until = check_page_until(
            scheme.page_until.unwrap_or(PageUntil::NoNextToken),
            &[PageUntil::NoNextToken, PageUntil::NoDataLeft],
            Self::SCHEME,
        )?;
        if page_until == PageUntil::NoDataLeft && limit.is_none() {
            return Err(Error::paging(
                Self::SCHEME,
                "'limitValue' is required for pageUntil 'noDataLeft'",
            ));
        }

        Ok(Self {
            token_parameter,
            token_path,
            token_type: scheme.token_type,
            limit,
            page_until,
            state: PageState::Unstarted,
        })
    }

    fn read_token(&self, response: &PageResponse<'_>) -> Result<Option<String>> {
        let value = extract_page_value(response.body, response.headers, &self.token_path)?;
        let Some(token) = token_string(value) else {
            return Ok(None);
        };
        if self.token_type == TokenType::Url {
            validate_url_token(&token, response.base_url)?;
        }
        Ok(Some(token))
    }
}

/// A `url` token must be absolute or joinable onto the base URL
fn validate_url_token(token: &str, base_url: Option<&str>) -> Result<()> {
    if token.chars().any(char::is_whitespace) {
        return Err(Error::paging(
            NextTokenPaginator::SCHEME,
            format!("next token '{token}' is not a valid URL"),
        ));
    }
    if Url::parse(token).is_ok() {
        return Ok(());
    }
    let joined = base_url
        .and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(token).ok());
    if joined.is_some() {
        Ok(())
    } else {
        Err(Error::paging(
            NextTokenPaginator::SCHEME,
            format!("next token '{token}' is not a valid URL"),
        ))
    }
}

impl Paginator for NextTokenPaginator {
    fn scheme_type(&self) -> &'static str {
        Self::SCHEME
    }

    fn state(&self) -> &PageState {
        &self.state
    }

    fn paginate_request(
        &mut self,
        relative_url: &str,
        _base_url: Option<&str>,
        message_body: Option<&Value>,
        method: Method,
        page: Option<&str>,
    ) -> Result<PagedRequest> {
        let mut params = Vec::new();
        if let Some((name, value)) = &self.limit {
            params.push((name.clone(), json!(value)));
        }

        let Some(token) = page else {
            self.state = PageState::Unstarted;
            return apply_params(relative_url, message_body, method, params, Self::SCHEME);
        };
        self.state = PageState::AtPage(token.to_string());

        if self.token_type == TokenType::Url {
            return Ok(PagedRequest {
                paged_relative_url: token.to_string(),
                paged_message_body: message_body.cloned(),
            });
        }

        let token_value = match (self.token_type, method) {
            (TokenType::SearchArray, Method::POST | Method::PATCH) => {
                match serde_json::from_str::<Value>(token) {
                    Ok(array @ Value::Array(_)) => array,
                    _ => Value::String(token.to_string()),
                }
            }
            _ => Value::String(token.to_string()),
        };
        if let Some(name) = &self.token_parameter {
            params.push((name.clone(), token_value));
        }
        apply_params(relative_url, message_body, method, params, Self::SCHEME)
    }

    fn next_page(&self, response: &PageResponse<'_>) -> Result<Option<String>> {
        if self.page_until == PageUntil::NoDataLeft {
            #[allow(clippy::cast_possible_wrap)]
            let count = response.record_count() as i64;
            if let Some((_, limit)) = &self.limit {
                if count < *limit {
                    debug!(count, limit, "Short page, paging complete");
                    return Ok(None);
                }
            }
        }

        let token = self.read_token(response)?;
        if token.is_none() {
            debug!(path = %self.token_path, "No next token, paging complete");
        }
        Ok(token)
    }
}

// ============================================================================
// Page Based Pagination
// ============================================================================

/// Page number pagination (e.g., `?page=2&size=50`)
#[derive(Debug, Clone)]
pub struct PageBasedPaginator {
    page_parameter: String,
    start: i64,
    limit: Option<(String, i64)>,
    page_until: PageUntil,
    total_path: Option<String>,
    state: PageState,
}

impl PageBasedPaginator {
    const SCHEME: &'static str = "pageBased";

    /// Validate the scheme and create a paginator
    pub fn new(scheme: &PageBasedScheme) -> Result<Self> {
        let page_parameter =
            required(scheme.page_parameter.as_ref(), "pageParameter", Self::SCHEME)?;
        let limit = limit_pair(
            scheme.limit_parameter.as_ref(),
            scheme.limit_value,
            Self::SCHEME,
        )?;
        let page_until = check_page_until(
            scheme.page_until.unwrap_or(PageUntil::NoDataLeft),
            &[PageUntil::NoDataLeft, PageUntil::ReachTotalCount],
            Self::SCHEME,
        )?;
        let total_path = validate_termination(
            page_until,
            limit.is_some(),
            scheme.total_path.as_ref(),
            Self::SCHEME,
        )?;

        Ok(Self {
            page_parameter,
            start: scheme.page_starting_value.unwrap_or(1),
            limit,
            page_until,
            total_path,
            state: PageState::Unstarted,
        })
    }

    fn current(&self) -> Result<i64> {
        match &self.state {
            PageState::Unstarted => Ok(self.start),
            PageState::AtPage(page) => parse_counter(page, Self::SCHEME),
        }
    }
}

/// `noDataLeft` needs a limit and `reachTotalCount` needs a total path
fn validate_termination(
    page_until: PageUntil,
    has_limit: bool,
    total_path: Option<&String>,
    scheme: &str,
) -> Result<Option<String>> {
    match page_until {
        PageUntil::NoDataLeft if !has_limit => Err(Error::paging(
            scheme,
            "'limitValue' is required for pageUntil 'noDataLeft'",
        )),
        PageUntil::ReachTotalCount => required(total_path, "totalPath", scheme).map(Some),
        _ => Ok(total_path.cloned()),
    }
}

impl Paginator for PageBasedPaginator {
    fn scheme_type(&self) -> &'static str {
        Self::SCHEME
    }

    fn state(&self) -> &PageState {
        &self.state
    }

    fn paginate_request(
        &mut self,
        relative_url: &str,
        _base_url: Option<&str>,
        message_body: Option<&Value>,
        method: Method,
        page: Option<&str>,
    ) -> Result<PagedRequest> {
        let current = match (page, &self.state) {
            (Some(p), _) => parse_counter(p, Self::SCHEME)?,
            (None, PageState::Unstarted) => self.start,
            (None, PageState::AtPage(p)) => {
                checked_counter(parse_counter(p, Self::SCHEME)?.checked_add(1), Self::SCHEME)?
            }
        };
        self.state = PageState::AtPage(current.to_string());

        let mut params = vec![(self.page_parameter.clone(), json!(current))];
        if let Some((name, value)) = &self.limit {
            params.push((name.clone(), json!(value)));
        }
        apply_params(relative_url, message_body, method, params, Self::SCHEME)
    }

    fn next_page(&self, response: &PageResponse<'_>) -> Result<Option<String>> {
        let current = self.current()?;
        #[allow(clippy::cast_possible_wrap)]
        let count = response.record_count() as i64;

        let done = match self.page_until {
            PageUntil::ReachTotalCount => {
                let path = self.total_path.as_deref().unwrap_or_default();
                let value = extract_page_value(response.body, response.headers, path)?;
                match parse_total(value, path) {
                    None => true,
                    Some(total) => {
                        let per_page = self.limit.as_ref().map_or(count, |(_, l)| *l);
                        let collected = checked_counter(
                            current
                                .checked_sub(self.start)
                                .and_then(|pages| pages.checked_add(1))
                                .and_then(|pages| pages.checked_mul(per_page)),
                            Self::SCHEME,
                        )?;
                        debug!(collected, total, "Page based progress");
                        collected >= total
                    }
                }
            }
            _ => self.limit.as_ref().is_some_and(|(_, limit)| count < *limit),
        };

        if done {
            debug!(page = current, "Paging complete");
            Ok(None)
        } else {
            let next = checked_counter(current.checked_add(1), Self::SCHEME)?;
            Ok(Some(next.to_string()))
        }
    }
}

// ============================================================================
// Offset And Limit Pagination
// ============================================================================

/// Offset-based pagination (e.g., `?offset=100&limit=50`)
#[derive(Debug, Clone)]
pub struct OffsetAndLimitPaginator {
    offset_parameter: String,
    start: i64,
    limit_parameter: String,
    limit: i64,
    page_until: PageUntil,
    total_path: Option<String>,
    state: PageState,
}

impl OffsetAndLimitPaginator {
    const SCHEME: &'static str = "offsetAndLimit";

    /// Validate the scheme and create a paginator
    pub fn new(scheme: &OffsetAndLimitScheme) -> Result<Self> {
        let offset_parameter =
            required(scheme.offset_parameter.as_ref(), "offsetParameter", Self::SCHEME)?;
        let limit_parameter =
            required(scheme.limit_parameter.as_ref(), "limitParameter", Self::SCHEME)?;
        let Some((limit_parameter, limit)) =
            limit_pair(Some(&limit_parameter), scheme.limit_value, Self::SCHEME)?
        else {
            return Err(Error::paging(Self::SCHEME, "'limitValue' is required"));
        };
        let page_until = check_page_until(
            scheme.page_until.unwrap_or(PageUntil::NoDataLeft),
            &[PageUntil::NoDataLeft, PageUntil::ReachTotalCount],
            Self::SCHEME,
        )?;
        let total_path =
            validate_termination(page_until, true, scheme.total_path.as_ref(), Self::SCHEME)?;

        Ok(Self {
            offset_parameter,
            start: scheme.offset_starting_value.unwrap_or(0),
            limit_parameter,
            limit,
            page_until,
            total_path,
            state: PageState::Unstarted,
        })
    }

    fn current(&self) -> Result<i64> {
        match &self.state {
            PageState::Unstarted => Ok(self.start),
            PageState::AtPage(offset) => parse_counter(offset, Self::SCHEME),
        }
    }
}

impl Paginator for OffsetAndLimitPaginator {
    fn scheme_type(&self) -> &'static str {
        Self::SCHEME
    }

    fn state(&self) -> &PageState {
        &self.state
    }

    fn paginate_request(
        &mut self,
        relative_url: &str,
        _base_url: Option<&str>,
        message_body: Option<&Value>,
        method: Method,
        page: Option<&str>,
    ) -> Result<PagedRequest> {
        let offset = match (page, &self.state) {
            (Some(p), _) => parse_counter(p, Self::SCHEME)?,
            (None, PageState::Unstarted) => self.start,
            (None, PageState::AtPage(p)) => checked_counter(
                parse_counter(p, Self::SCHEME)?.checked_add(self.limit),
                Self::SCHEME,
            )?,
        };
        self.state = PageState::AtPage(offset.to_string());

        let params = vec![
            (self.offset_parameter.clone(), json!(offset)),
            (self.limit_parameter.clone(), json!(self.limit)),
        ];
        apply_params(relative_url, message_body, method, params, Self::SCHEME)
    }

    fn next_page(&self, response: &PageResponse<'_>) -> Result<Option<String>> {
        let offset = self.current()?;
        let next = checked_counter(offset.checked_add(self.limit), Self::SCHEME)?;

        let done = match self.page_until {
            PageUntil::ReachTotalCount => {
                let path = self.total_path.as_deref().unwrap_or_default();
                let value = extract_page_value(response.body, response.headers, path)?;
                match parse_total(value, path) {
                    None => true,
                    Some(total) => {
                        debug!(collected = next, total, "Offset progress");
                        next >= total
                    }
                }
            }
            _ => {
                #[allow(clippy::cast_possible_wrap)]
                let count = response.record_count() as i64;
                count < self.limit
            }
        };

        if done {
            debug!(offset, "Paging complete");
            Ok(None)
        } else {
            Ok(Some(next.to_string()))
        }
    }
}

// ============================================================================
// GraphQL Connections Pagination
// ============================================================================

/// GraphQL cursor connections (`first`/`after` with `pageInfo`)
///
/// Pages are requested through `variables` in the POST body and the next
/// cursor is read from the connection's `pageInfo`.
#[derive(Debug, Clone)]
pub struct GraphqlPaginator {
    limit_parameter: String,
    limit: i64,
    page_info_path: String,
    state: PageState,
}

impl GraphqlPaginator {
    const SCHEME: &'static str = "graphqlConnections";

    /// Validate the scheme and create a paginator
    pub fn new(scheme: &GraphqlConnectionsScheme, method: Method) -> Result<Self> {
        if method != Method::POST {
            return Err(Error::paging(
                Self::SCHEME,
                format!("method must be POST, got {method}"),
            ));
        }
        let limit_parameter =
            required(scheme.limit_parameter.as_ref(), "limitParameter", Self::SCHEME)?;
        let Some((limit_parameter, limit)) =
            limit_pair(Some(&limit_parameter), scheme.limit_value, Self::SCHEME)?
        else {
            return Err(Error::paging(Self::SCHEME, "'limitValue' is required"));
        };
        let page_info_path =
            required(scheme.page_info_path.as_ref(), "pageInfoPath", Self::SCHEME)?;
        check_page_until(
            scheme.page_until.unwrap_or(PageUntil::NoNextPage),
            &[PageUntil::NoNextPage],
            Self::SCHEME,
        )?;

        Ok(Self {
            limit_parameter,
            limit,
            page_info_path,
            state: PageState::Unstarted,
        })
    }
}

impl Paginator for GraphqlPaginator {
    fn scheme_type(&self) -> &'static str {
        Self::SCHEME
    }

    fn state(&self) -> &PageState {
        &self.state
    }

    fn paginate_request(
        &mut self,
        relative_url: &str,
        _base_url: Option<&str>,
        message_body: Option<&Value>,
        _method: Method,
        page: Option<&str>,
    ) -> Result<PagedRequest> {
        self.state = page.map_or(PageState::Unstarted, |p| PageState::AtPage(p.to_string()));

        let mut body = message_body
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        set_body_path(
            &mut body,
            &format!("variables.{}", self.limit_parameter),
            json!(self.limit),
            Self::SCHEME,
        )?;
        set_body_path(
            &mut body,
            "variables.after",
            page.map_or(Value::Null, |p| Value::String(p.to_string())),
            Self::SCHEME,
        )?;

        Ok(PagedRequest {
            paged_relative_url: relative_url.to_string(),
            paged_message_body: Some(body),
        })
    }

    fn next_page(&self, response: &PageResponse<'_>) -> Result<Option<String>> {
        let page_info = extract_page_value(response.body, response.headers, &self.page_info_path)?;
        let Some(page_info) = page_info else {
            debug!(path = %self.page_info_path, "No pageInfo, paging complete");
            return Ok(None);
        };

        let has_next = page_info
            .get("hasNextPage")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !has_next {
            return Ok(None);
        }
        Ok(token_string(page_info.get("endCursor").cloned()))
    }
}
