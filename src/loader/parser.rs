//! Parser for data source definitions
//!
//! Parses and validates data source files. Files ending in `.json` are read
//! as JSON, anything else as YAML.

use crate::config::{DataSet, DataSourceConfig};
use crate::error::{Error, Result};
use crate::expression::{ExpressionEngine, PathEngine};
use crate::pagination::create_paginator;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parse any document in the given format
pub fn parse_document<T: DeserializeOwned>(content: &str, format: Format) -> Result<T> {
    match format {
        Format::Json => Ok(serde_json::from_str(content)?),
        Format::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}

/// Read and parse a document file
pub fn load_document<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!("Failed to read '{}': {}", path.display(), e))
        }
    })?;
    parse_document(&content, Format::from_path(path))
}

/// Load and validate a data source definition file
pub fn load_data_source(path: impl AsRef<Path>) -> Result<DataSourceConfig> {
    let path = path.as_ref();
    let config: DataSourceConfig = load_document(path)?;
    validate_data_source(&config)?;
    debug!(
        path = %path.display(),
        data_sets = config.data_sets.len(),
        "Loaded data source"
    );
    Ok(config)
}

/// Load and validate a data source definition from text
pub fn load_data_source_from_str(content: &str, format: Format) -> Result<DataSourceConfig> {
    let config: DataSourceConfig = parse_document(content, format)?;
    validate_data_source(&config)?;
    Ok(config)
}

/// Validate a data source definition
///
/// Checks every data set's URL, references, paging scheme and expressions,
/// and rejects join/lookup cycles.
pub fn validate_data_source(config: &DataSourceConfig) -> Result<()> {
    if config.data_sets.is_empty() {
        return Err(Error::config("Data source must declare at least one data set"));
    }

    let engine = PathEngine::new();
    for (name, data_set) in &config.data_sets {
        validate_data_set(config, name, data_set, &engine)?;
    }

    check_cycles(config)
}

/// Validate a single data set
fn validate_data_set(
    config: &DataSourceConfig,
    name: &str,
    data_set: &DataSet,
    engine: &PathEngine,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::config("Data set name cannot be empty"));
    }

    if data_set.url.trim().is_empty() {
        return Err(Error::InvalidConfigValue {
            field: format!("dataSets.{name}.url"),
            message: "URL cannot be empty".to_string(),
        });
    }

    let field_error = |field: &str, e: Error| Error::InvalidConfigValue {
        field: format!("dataSets.{name}.{field}"),
        message: e.to_string(),
    };

    if let Some(scheme) = &data_set.paging_scheme {
        create_paginator(scheme, data_set.method).map_err(|e| field_error("pagingScheme", e))?;
    }

    let transform = data_set.transform.as_ref().map(|t| t.source());
    let mut expressions: Vec<(String, &str)> = Vec::new();
    if let Some(property) = &data_set.property {
        expressions.push(("property".into(), property.as_str()));
    }
    for (i, join) in data_set.joins.iter().enumerate() {
        if config.data_set(&join.data_set).is_none() {
            return Err(field_error(
                &format!("joins[{i}].dataSet"),
                Error::invalid_data_set(&join.data_set),
            ));
        }
        if join.name.trim().is_empty() {
            return Err(Error::missing_field(format!("dataSets.{name}.joins[{i}].name")));
        }
        if join.on.is_empty() {
            return Err(Error::missing_field(format!("dataSets.{name}.joins[{i}].on")));
        }
        for (j, condition) in join.on.iter().enumerate() {
            expressions.push((format!("joins[{i}].on[{j}].left"), condition.left.as_str()));
            expressions.push((format!("joins[{i}].on[{j}].right"), condition.right.as_str()));
        }
    }
    for (i, lookup) in data_set.lookups.iter().enumerate() {
        if config.data_set(&lookup.data_set).is_none() {
            return Err(field_error(
                &format!("lookups[{i}].dataSet"),
                Error::invalid_data_set(&lookup.data_set),
            ));
        }
        if lookup.name.trim().is_empty() {
            return Err(Error::missing_field(format!("dataSets.{name}.lookups[{i}].name")));
        }
    }
    for (i, clause) in data_set.filter.iter().enumerate() {
        expressions.push((format!("filter[{i}].expression"), clause.expression.as_str()));
    }
    for (i, clause) in data_set.sort.iter().enumerate() {
        expressions.push((format!("sort[{i}].expression"), clause.expression.as_str()));
    }
    if let Some(source) = &transform {
        expressions.push(("transform".into(), source.as_str()));
    }

    for (field, source) in expressions {
        engine.compile(source).map_err(|e| field_error(&field, e))?;
    }
    Ok(())
}

/// Reject data sets that reach themselves through joins or lookups
fn check_cycles(config: &DataSourceConfig) -> Result<()> {
    let edges: HashMap<&str, Vec<&str>> = config
        .data_sets
        .iter()
        .map(|(name, ds)| {
            let targets = ds
                .joins
                .iter()
                .map(|j| j.data_set.as_str())
                .chain(ds.lookups.iter().map(|l| l.data_set.as_str()))
                .collect();
            (name.as_str(), targets)
        })
        .collect();

    let mut done = HashSet::new();
    for name in edges.keys() {
        let mut path = Vec::new();
        visit(name, &edges, &mut path, &mut done)?;
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Result<()> {
    if done.contains(name) {
        return Ok(());
    }
    if path.contains(&name) {
        path.push(name);
        return Err(Error::config(format!(
            "Data set reference cycle: {}",
            path.join(" -> ")
        )));
    }

    path.push(name);
    for target in edges.get(name).into_iter().flatten() {
        visit(target, edges, path, done)?;
    }
    path.pop();
    done.insert(name);
    Ok(())
}
