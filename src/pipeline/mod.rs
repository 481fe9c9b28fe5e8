//! Data source pipeline
//!
//! Turns a named data set into shaped data.
//!
//! # Overview
//!
//! [`DataSource::get_data`] runs the fixed stage order:
//!
//! 1. resolve tokens in the URL, query and body
//! 2. fetch, paging through the declared scheme
//! 3. extract `property`
//! 4. joins, each a nested fetch of another data set
//! 5. lookups, a nested fetch per row
//! 6. filter
//! 7. reconcile the declared result shape
//! 8. transform
//! 9. sort
//!
//! A throttled fetch anywhere, nested fetches included, stops the pipeline
//! and comes back as [`DataSetResult::Pending`].

mod options;
mod stages;
mod types;

pub use stages::{
    extract_property, filter_rows, join_rows, reconcile_shape, sort_rows, transform_data,
};
pub use types::{
    headers_to_json, pending_to_json, CompleteResult, CriteriaOption, CriteriaOptionsResult,
    DataSetResult, FetchMode,
};

use crate::config::{DataSet, DataSourceConfig, Lookup};
use crate::error::{Error, Result};
use crate::expression::{stringify, ExpressionEngine, PathEngine};
use crate::http::{ApiClient, ApiResponse, ApiResult, PendingResult};
use crate::pagination::{append_query, create_paginator, PageResponse};
use crate::template::{render_url, resolve_tokens, TokenContext};
use crate::types::JsonObject;
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One data set request, as it travels through nested fetches
#[derive(Debug, Clone, Copy)]
struct Request<'a> {
    name: &'a str,
    params: &'a JsonObject,
    page: Option<&'a str>,
    metadata: Option<&'a Value>,
    organization: Option<&'a str>,
    /// Overrides the data set's own paging mode
    mode: Option<FetchMode>,
}

/// Rows fetched for one request, before the shaping stages
struct Fetched {
    records: Value,
    source: Value,
    headers: HeaderMap,
    next_page: Option<String>,
}

/// A configured data source bound to an API client
pub struct DataSource {
    config: Arc<DataSourceConfig>,
    client: Arc<dyn ApiClient>,
    engine: Arc<dyn ExpressionEngine>,
    lookup_layer: Value,
}

impl DataSource {
    /// Create a data source; `vlookup` resolves against the config's lookup tables
    pub fn new(config: DataSourceConfig, client: Arc<dyn ApiClient>) -> Self {
        let engine = Arc::new(PathEngine::with_lookup_tables(config.lookups.clone()));
        let lookup_layer = Value::Object(
            config
                .lookups
                .iter()
                .map(|(name, table)| (name.clone(), Value::Object(table.clone())))
                .collect(),
        );
        Self {
            config: Arc::new(config),
            client,
            engine,
            lookup_layer,
        }
    }

    /// Use a different expression engine
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn ExpressionEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// The data source configuration
    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    /// The expression engine used by every stage
    pub fn engine(&self) -> &dyn ExpressionEngine {
        self.engine.as_ref()
    }

    /// The API client fetches go through
    pub fn client(&self) -> &dyn ApiClient {
        self.client.as_ref()
    }

    /// Fetch and shape a data set
    ///
    /// `page` resumes job-level paging from a previous `next_page`.
    /// `metadata` is handed to the client so throttle retries can carry state.
    pub async fn get_data(
        &self,
        data_set: &str,
        params: Option<&JsonObject>,
        page: Option<&str>,
        metadata: Option<&Value>,
        organization: Option<&str>,
    ) -> Result<DataSetResult> {
        let empty = JsonObject::new();
        self.run(Request {
            name: data_set,
            params: params.unwrap_or(&empty),
            page,
            metadata,
            organization,
            mode: None,
        })
        .await
    }

    /// Fetch a data set with an explicit paging mode
    pub(crate) async fn get_data_with_mode(
        &self,
        data_set: &str,
        params: &JsonObject,
        metadata: Option<&Value>,
        organization: Option<&str>,
        mode: FetchMode,
    ) -> Result<DataSetResult> {
        self.run(Request {
            name: data_set,
            params,
            page: None,
            metadata,
            organization,
            mode: Some(mode),
        })
        .await
    }

    fn token_context(&self, req: &Request<'_>) -> TokenContext {
        let mut ctx = TokenContext::with_criteria(Value::Object(req.params.clone()));
        ctx.set_messages(Value::Object(self.config.messages.clone()))
            .set_constants(Value::Object(self.config.constants.clone()))
            .set_lookups(self.lookup_layer.clone())
            .set_organization(req.organization);
        ctx
    }

    fn run<'a>(&'a self, req: Request<'a>) -> BoxFuture<'a, Result<DataSetResult>> {
        async move {
            let data_set = self
                .config
                .data_set(req.name)
                .ok_or_else(|| Error::invalid_data_set(req.name))?;
            let ctx = self.token_context(&req);

            let mut url = render_url(&data_set.url, &ctx)?;
            if let Some(query) = &data_set.query {
                let resolved = resolve_tokens(&Value::Object(query.clone()), &ctx, false)?;
                if let Value::Object(pairs) = resolved {
                    let pairs: Vec<(String, String)> = pairs
                        .into_iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| (k, stringify(&v)))
                        .collect();
                    url = append_query(&url, &pairs);
                }
            }
            let body = data_set
                .body
                .as_ref()
                .map(|b| resolve_tokens(b, &ctx, false))
                .transpose()?;

            let mode = req.mode.unwrap_or_else(|| data_set.paging_mode.into());
            let fetched = match self
                .fetch_records(data_set, &url, body.as_ref(), &req, mode)
                .await?
            {
                ControlFlow::Continue(fetched) => fetched,
                ControlFlow::Break(pending) => return Ok(self.pending(req.name, pending)),
            };

            let mut data = fetched.records;
            for join in &data_set.joins {
                let params = nested_params(&join.params, &ctx, req.params)?;
                let right = self
                    .run(Request {
                        name: &join.data_set,
                        params: &params,
                        page: None,
                        metadata: req.metadata,
                        organization: req.organization,
                        mode: Some(FetchMode::Aggregate),
                    })
                    .await?;
                let right = match right {
                    DataSetResult::Complete(result) => result.data,
                    DataSetResult::Pending(pending) => return Ok(self.pending(req.name, pending)),
                };
                data = join_rows(self.engine(), req.name, join, data, &right)?;
            }

            for lookup in &data_set.lookups {
                data = match self.apply_lookup(lookup, data, &ctx, &req).await? {
                    ControlFlow::Continue(data) => data,
                    ControlFlow::Break(pending) => return Ok(self.pending(req.name, pending)),
                };
            }

            let data = filter_rows(
                self.engine(),
                req.name,
                &data_set.filter,
                data_set.result,
                data,
                &ctx,
            )?;
            let data = reconcile_shape(req.name, data_set.result, data)?;
            let data = match &data_set.transform {
                Some(transform) => transform_data(self.engine(), transform, data)?,
                None => data,
            };
            let data = sort_rows(self.engine(), &data_set.sort, data)?;

            Ok(DataSetResult::Complete(CompleteResult {
                data,
                source: fetched.source,
                headers: fetched.headers,
                next_page: fetched.next_page,
                context: json!({"dataSet": req.name, "url": url}),
            }))
        }
        .boxed()
    }

    fn pending(&self, data_set: &str, pending: PendingResult) -> DataSetResult {
        info!(
            data_set,
            delay = pending.delay,
            "Fetch throttled, returning pending result"
        );
        DataSetResult::Pending(pending)
    }

    async fn fetch(
        &self,
        data_set: &DataSet,
        url: &str,
        body: Option<&Value>,
        metadata: Option<&Value>,
    ) -> Result<ControlFlow<PendingResult, ApiResponse>> {
        debug!(method = %data_set.method, url, "Fetching");
        match self.client.fetch(data_set.method, url, body, metadata).await? {
            ApiResult::Complete(response) => Ok(ControlFlow::Continue(response)),
            ApiResult::Pending(pending) => Ok(ControlFlow::Break(pending)),
        }
    }

    /// Fetch the rows, following the paging scheme as the mode asks
    async fn fetch_records(
        &self,
        data_set: &DataSet,
        url: &str,
        body: Option<&Value>,
        req: &Request<'_>,
        mode: FetchMode,
    ) -> Result<ControlFlow<PendingResult, Fetched>> {
        let property = data_set.property.as_deref();
        let scheme = match &data_set.paging_scheme {
            Some(scheme) if mode != FetchMode::Disabled => scheme,
            _ => {
                let response = match self.fetch(data_set, url, body, req.metadata).await? {
                    ControlFlow::Continue(response) => response,
                    ControlFlow::Break(pending) => return Ok(ControlFlow::Break(pending)),
                };
                return Ok(ControlFlow::Continue(Fetched {
                    records: extract_property(self.engine(), property, &response.json)?,
                    source: response.source,
                    headers: response.headers,
                    next_page: None,
                }));
            }
        };

        let base_url = self.client.base_url();
        let mut paginator = create_paginator(scheme, data_set.method)?;
        let mut page = req.page.map(str::to_string);
        let mut rows = Vec::new();
        let mut page_count = 0usize;

        let (source, headers) = loop {
            let paged = paginator.paginate_request(
                url,
                base_url,
                body,
                data_set.method,
                page.as_deref(),
            )?;
            let response = match self
                .fetch(
                    data_set,
                    &paged.paged_relative_url,
                    paged.paged_message_body.as_ref(),
                    req.metadata,
                )
                .await?
            {
                ControlFlow::Continue(response) => response,
                ControlFlow::Break(pending) => return Ok(ControlFlow::Break(pending)),
            };
            page_count += 1;

            let ApiResponse {
                json,
                source,
                headers,
            } = response;
            let records = extract_property(self.engine(), property, &json)?;
            let next = paginator.next_page(
                &PageResponse::new(&json, &headers)
                    .with_records(&records)
                    .with_base_url(base_url),
            )?;

            if mode == FetchMode::Job {
                debug!(data_set = req.name, next_page = ?next, "Fetched page");
                return Ok(ControlFlow::Continue(Fetched {
                    records,
                    source,
                    headers,
                    next_page: next,
                }));
            }

            match records {
                Value::Array(items) => rows.extend(items),
                Value::Null => {}
                other => rows.push(other),
            }
            debug!(
                data_set = req.name,
                page_count,
                rows = rows.len(),
                "Aggregated page"
            );

            match next {
                Some(next) if page.as_deref() == Some(next.as_str()) => {
                    warn!(
                        data_set = req.name,
                        page = %next,
                        "Paging returned the current page again, stopping"
                    );
                    break (source, headers);
                }
                Some(next) => page = Some(next),
                None => break (source, headers),
            }
        };

        Ok(ControlFlow::Continue(Fetched {
            records: Value::Array(rows),
            source,
            headers,
            next_page: None,
        }))
    }

    /// Fetch the lookup for every row and attach it under the lookup name
    async fn apply_lookup(
        &self,
        lookup: &Lookup,
        data: Value,
        ctx: &TokenContext,
        req: &Request<'_>,
    ) -> Result<ControlFlow<PendingResult, Value>> {
        match data {
            Value::Array(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    match self.lookup_row(lookup, row, ctx, req).await? {
                        ControlFlow::Continue(row) => out.push(row),
                        ControlFlow::Break(pending) => return Ok(ControlFlow::Break(pending)),
                    }
                }
                Ok(ControlFlow::Continue(Value::Array(out)))
            }
            row @ Value::Object(_) => self.lookup_row(lookup, row, ctx, req).await,
            other => Ok(ControlFlow::Continue(other)),
        }
    }

    async fn lookup_row(
        &self,
        lookup: &Lookup,
        mut row: Value,
        ctx: &TokenContext,
        req: &Request<'_>,
    ) -> Result<ControlFlow<PendingResult, Value>> {
        let mut row_ctx = ctx.clone();
        row_ctx.set_source(row.clone());
        let params = nested_params(&lookup.params, &row_ctx, req.params)?;

        let result = self
            .run(Request {
                name: &lookup.data_set,
                params: &params,
                page: None,
                metadata: req.metadata,
                organization: req.organization,
                mode: Some(FetchMode::Disabled),
            })
            .await?;
        let data = match result {
            DataSetResult::Complete(result) => result.data,
            DataSetResult::Pending(pending) => return Ok(ControlFlow::Break(pending)),
        };

        if let Value::Object(map) = &mut row {
            map.insert(lookup.name.clone(), data);
        }
        Ok(ControlFlow::Continue(row))
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("data_sets", &self.config.data_set_names())
            .field("base_url", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

/// Params for a nested fetch: the caller's params overlaid with the resolved
/// declaration params
fn nested_params(
    declared: &JsonObject,
    ctx: &TokenContext,
    outer: &JsonObject,
) -> Result<JsonObject> {
    let mut params = outer.clone();
    if let Value::Object(resolved) = resolve_tokens(&Value::Object(declared.clone()), ctx, false)? {
        params.extend(resolved);
    }
    Ok(params)
}
