//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::DataSourceConfig;
use crate::error::{Error, Result, ResultExt};
use crate::http::HttpClient;
use crate::iterator::{IteratorLayer, IteratorPlan, ServiceDataIterator};
use crate::loader::{load_data_source, load_document};
use crate::pipeline::{pending_to_json, CompleteResult, DataSetResult, DataSource};
use crate::types::{JsonObject, OptionStringExt};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Validate => self.validate(),
            Commands::DataSets => self.data_sets(),
            Commands::Fetch {
                data_set,
                params,
                page,
                all_pages,
            } => {
                let params = parse_params(params.as_deref(), "--params")?;
                self.fetch(data_set, params.as_ref(), page.as_deref(), *all_pages)
                    .await
            }
            Commands::Plan {
                iterator,
                params,
                iterator_params,
            } => {
                let params = parse_params(params.as_deref(), "--params")?;
                let iterator_params =
                    parse_params(iterator_params.as_deref(), "--iterator-params")?;
                self.plan(iterator, params.as_ref(), iterator_params.as_ref())
                    .await
            }
            Commands::Iterate {
                iterator,
                data_set,
                params,
                iterator_params,
            } => {
                let params = parse_params(params.as_deref(), "--params")?;
                let iterator_params =
                    parse_params(iterator_params.as_deref(), "--iterator-params")?;
                self.iterate(iterator, data_set, params.as_ref(), iterator_params.as_ref())
                    .await
            }
        }
    }

    /// Load the data source definition
    fn load_config(&self) -> Result<DataSourceConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Data source file not specified (use -c flag)"))?;
        load_data_source(path)
    }

    /// Load the definition and build a data source on the default HTTP client
    fn data_source(&self) -> Result<Arc<DataSource>> {
        let config = self.load_config()?;
        let base_url = self
            .cli
            .base_url
            .clone()
            .none_if_empty()
            .or_else(|| config.base_url.clone());
        let client = HttpClient::with_config(config.http.to_client_config(base_url.as_deref()))?;
        Ok(Arc::new(DataSource::new(config, Arc::new(client))))
    }

    /// Validate the data source definition
    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;

        self.output(&json!({
            "valid": true,
            "dataSets": config.data_sets.len(),
        }));

        Ok(())
    }

    /// List data set names
    fn data_sets(&self) -> Result<()> {
        let config = self.load_config()?;
        self.output(&json!(config.data_set_names()));
        Ok(())
    }

    /// Fetch one page, or every page with `all_pages`
    async fn fetch(
        &self,
        data_set: &str,
        params: Option<&JsonObject>,
        page: Option<&str>,
        all_pages: bool,
    ) -> Result<()> {
        let source = self.data_source()?;

        let mut combined = match source.get_data(data_set, params, page, None, None).await? {
            DataSetResult::Complete(result) => result,
            DataSetResult::Pending(pending) => {
                self.output(&pending_to_json(&pending));
                return Ok(());
            }
        };
        if !all_pages {
            self.output(&DataSetResult::Complete(combined).to_json());
            return Ok(());
        }

        let mut pages = 1_usize;
        while let Some(next) = combined.next_page.take() {
            if page == Some(next.as_str()) {
                warn!(data_set, page = %next, "Data set returned the same page again");
                break;
            }
            debug!(data_set, page = %next, "Fetching next page");
            match source
                .get_data(data_set, params, Some(&next), None, None)
                .await?
            {
                DataSetResult::Complete(result) => {
                    pages += 1;
                    if result.next_page.as_deref() == Some(next.as_str()) {
                        warn!(data_set, page = %next, "Data set returned the same page again");
                        merge_page(&mut combined, result);
                        combined.next_page = None;
                        break;
                    }
                    merge_page(&mut combined, result);
                }
                DataSetResult::Pending(pending) => {
                    self.output(&pending_to_json(&pending));
                    return Ok(());
                }
            }
        }

        info!(data_set, pages, "Fetched all pages");
        self.output(&DataSetResult::Complete(combined).to_json());
        Ok(())
    }

    /// Build an iterator from a layers file
    fn iterator(&self, path: &Path) -> Result<ServiceDataIterator> {
        let source = self.data_source()?;
        let layers: Vec<IteratorLayer> = load_document(path)
            .with_context(|| format!("Failed to load iterator layers from {}", path.display()))?;
        ServiceDataIterator::new(source, layers)
    }

    /// Print the iteration plan
    async fn plan(
        &self,
        iterator: &Path,
        params: Option<&JsonObject>,
        iterator_params: Option<&JsonObject>,
    ) -> Result<()> {
        let iterator = self.iterator(iterator)?;
        match iterator
            .generate_iterator_plan(params, iterator_params, None)
            .await?
        {
            IteratorPlan::Complete(plan) => {
                let slices = iterator.slices(&plan).len();
                self.output(&json!({
                    "status": "complete",
                    "iterandKey": iterator.layer().iterand_key,
                    "subArraySize": iterator.sub_array_size(),
                    "slices": slices,
                    "plan": plan,
                }));
            }
            IteratorPlan::Pending(pending) => self.output(&pending_to_json(&pending)),
        }
        Ok(())
    }

    /// Walk every slice of the plan and print the accumulated rows
    async fn iterate(
        &self,
        iterator: &Path,
        data_set: &str,
        params: Option<&JsonObject>,
        iterator_params: Option<&JsonObject>,
    ) -> Result<()> {
        let iterator = self.iterator(iterator)?;
        let plan = match iterator
            .generate_iterator_plan(params, iterator_params, None)
            .await?
        {
            IteratorPlan::Complete(plan) => plan,
            IteratorPlan::Pending(pending) => {
                self.output(&pending_to_json(&pending));
                return Ok(());
            }
        };

        let mut rows = Vec::new();
        let mut calls = 0_usize;
        for slice in iterator.slices(&plan) {
            let mut page: Option<String> = None;
            loop {
                let result = match iterator
                    .iterate_data_flow(data_set, slice, params, page.as_deref(), None, None)
                    .await?
                {
                    DataSetResult::Complete(result) => result,
                    DataSetResult::Pending(pending) => {
                        self.output(&pending_to_json(&pending));
                        return Ok(());
                    }
                };
                calls += 1;
                if let Value::Array(items) = result.data {
                    rows.extend(items);
                }
                match result.next_page {
                    Some(next) if page.as_deref() != Some(next.as_str()) => page = Some(next),
                    _ => break,
                }
            }
        }

        info!(data_set, elements = plan.len(), calls, "Iteration finished");
        self.output(&json!({
            "status": "complete",
            "elements": plan.len(),
            "calls": calls,
            "data": rows,
        }));
        Ok(())
    }

    /// Output a message
    fn output(&self, msg: &Value) {
        println!("{}", render(msg, self.cli.format));
    }
}

/// Render a message in the chosen format
fn render(msg: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(msg).unwrap_or_default(),
        OutputFormat::Pretty => serde_json::to_string_pretty(msg).unwrap_or_default(),
    }
}

/// Parse a `--params` style argument into a JSON object
fn parse_params(raw: Option<&str>, flag: &str) -> Result<Option<JsonObject>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(params)) => Ok(Some(params)),
        Ok(other) => Err(Error::config(format!(
            "{flag} must be a JSON object, got {}",
            crate::types::ResultKind::describe(&other)
        ))),
        Err(e) => Err(Error::config(format!("Invalid {flag} JSON: {e}"))),
    }
}

/// Append a page to the rows fetched so far
fn merge_page(combined: &mut CompleteResult, page: CompleteResult) {
    match (&mut combined.data, page.data) {
        (Value::Array(rows), Value::Array(more)) => rows.extend(more),
        (_, Value::Null) => {}
        (data, more) => *data = more,
    }
    combined.source = page.source;
    combined.headers = page.headers;
    combined.next_page = page.next_page;
    combined.context = page.context;
}
