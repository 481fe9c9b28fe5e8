//! Service data iterator
//!
//! Runs a data set once per element of an iteration plan.
//!
//! # Overview
//!
//! A plan is an iterable array of single-key objects (`{ projectId: "p1" }`)
//! built from a data set's rows or from a criteria value run through a
//! registered transformer. The caller slices the plan with
//! [`ServiceDataIterator::slices`] and hands each slice to
//! [`ServiceDataIterator::iterate_data_flow`], which merges every iterand
//! into the params and accumulates the pipeline results.

mod transformers;
mod types;

pub use transformers::{csv_to_iterable, CriteriaTransformer, TransformerRegistry, CSV_TO_ITERABLE};
pub use types::{
    CriteriaIteratorSource, DataSetIteratorSource, IterableObject, IteratorLayer, IteratorPlan,
    IteratorSource,
};

use crate::error::{Error, Result};
use crate::pipeline::{CompleteResult, DataSetResult, DataSource, FetchMode};
use crate::template::{resolve_tokens, TokenContext};
use crate::types::{JsonObject, ResultKind};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Largest iterable array a plan may hold
pub const MAX_ITERABLE_LENGTH: usize = 10_000;

/// Elements checked for shape at the head of a plan
const SAMPLE_SIZE: usize = 3;

/// Layer number of the principal iterator
pub const PRINCIPAL_LAYER: u32 = 1;

/// Find layer `layer` among the definitions
pub fn extract_iterator_layer(layers: &[IteratorLayer], layer: u32) -> Result<&IteratorLayer> {
    layers
        .iter()
        .find(|l| l.layer == layer)
        .ok_or_else(|| Error::iterator(format!("iterator layer {layer} is not defined")))
}

/// Validate an iterable array and convert it to iterable objects
///
/// The array must be non-empty and at most [`MAX_ITERABLE_LENGTH`] long.
/// The first three elements must be objects holding exactly the iterand
/// key; every element must be an object.
pub fn validate_iterable_array(items: Vec<Value>, iterand_key: &str) -> Result<Vec<IterableObject>> {
    if items.is_empty() {
        return Err(Error::iterable("iterable array is empty"));
    }
    if items.len() > MAX_ITERABLE_LENGTH {
        return Err(Error::iterable(format!(
            "iterable array has {} elements, the maximum is {MAX_ITERABLE_LENGTH}",
            items.len()
        )));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(object) = item else {
                return Err(Error::iterable(format!(
                    "element at index {index} is {}, expected an object",
                    ResultKind::describe(&item)
                )));
            };
            if index < SAMPLE_SIZE {
                if !object.contains_key(iterand_key) {
                    return Err(Error::iterable(format!(
                        "element at index {index} has no '{iterand_key}' property"
                    )));
                }
                if object.len() > 1 {
                    let keys: Vec<&str> = object.keys().map(String::as_str).collect();
                    return Err(Error::iterable(format!(
                        "element at index {index} has {} properties ({}), only '{iterand_key}' is allowed",
                        object.len(),
                        keys.join(", ")
                    )));
                }
            }
            Ok(object)
        })
        .collect()
}

/// Drives repeated data set fetches over an iteration plan
#[derive(Debug)]
pub struct ServiceDataIterator {
    source: Arc<DataSource>,
    layers: Vec<IteratorLayer>,
    principal: IteratorLayer,
    transformers: TransformerRegistry,
}

impl ServiceDataIterator {
    /// Create an iterator with the builtin transformers
    pub fn new(source: Arc<DataSource>, layers: Vec<IteratorLayer>) -> Result<Self> {
        Self::with_transformers(source, layers, TransformerRegistry::with_builtins())
    }

    /// Create an iterator with a specific transformer registry
    pub fn with_transformers(
        source: Arc<DataSource>,
        layers: Vec<IteratorLayer>,
        transformers: TransformerRegistry,
    ) -> Result<Self> {
        let principal = extract_iterator_layer(&layers, PRINCIPAL_LAYER)?.clone();

        if principal.sub_array_size == Some(0) {
            return Err(Error::iterator("subArraySize must be greater than 0"));
        }
        if principal.iterand_key.trim().is_empty() {
            return Err(Error::iterator("iterandKey cannot be empty"));
        }

        match &principal.source {
            IteratorSource::DataSet(ds) => {
                let name = ds
                    .data_set
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| Error::iterator("dataSet is required for a dataSet iterator"))?;
                if source.config().data_set(name).is_none() {
                    return Err(Error::iterator(format!(
                        "dataSet '{name}' is not defined in the data source"
                    )));
                }
            }
            IteratorSource::Criteria(criteria) => {
                if criteria.criteria_property.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::iterator(
                        "criteriaProperty is required for a criteria iterator",
                    ));
                }
                let transformer = criteria.criteria_transformer.as_deref().ok_or_else(|| {
                    Error::iterator("criteriaTransformer is required for a criteria iterator")
                })?;
                if !transformers.contains(transformer) {
                    return Err(Error::iterator(format!(
                        "unknown criteriaTransformer '{transformer}', expected one of: {}",
                        transformers.names().join(", ")
                    )));
                }
            }
        }

        Ok(Self {
            source,
            layers,
            principal,
            transformers,
        })
    }

    /// The principal (layer 1) iterator
    pub fn layer(&self) -> &IteratorLayer {
        &self.principal
    }

    /// Every layer definition
    pub fn layers(&self) -> &[IteratorLayer] {
        &self.layers
    }

    /// Elements per slice
    pub fn sub_array_size(&self) -> usize {
        self.principal.sub_array_size.unwrap_or(1)
    }

    /// Whether slices carry more than one element
    pub fn is_batched(&self) -> bool {
        self.sub_array_size() > 1
    }

    /// Chunk a plan into the slices handed to `iterate_data_flow`
    pub fn slices<'a>(&self, plan: &'a [IterableObject]) -> std::slice::Chunks<'a, IterableObject> {
        plan.chunks(self.sub_array_size())
    }

    /// Build and validate the iterable array
    ///
    /// A data set iterator fetches every page of its data set with the
    /// data set params, the layer's own params (tokens resolved against the
    /// data set params) and the iterator params layered in that order. A
    /// criteria iterator reads its property from the iterator params, then
    /// the data set params.
    pub async fn generate_iterator_plan(
        &self,
        data_set_params: Option<&JsonObject>,
        iterator_params: Option<&JsonObject>,
        metadata: Option<&Value>,
    ) -> Result<IteratorPlan> {
        let empty = JsonObject::new();
        let data_set_params = data_set_params.unwrap_or(&empty);
        let iterator_params = iterator_params.unwrap_or(&empty);
        let key = &self.principal.iterand_key;

        let items = match &self.principal.source {
            IteratorSource::DataSet(ds) => {
                let name = ds.data_set.as_deref().unwrap_or_default();
                let ctx = TokenContext::with_criteria(Value::Object(data_set_params.clone()));
                let mut params = data_set_params.clone();
                if let Value::Object(resolved) =
                    resolve_tokens(&Value::Object(ds.params.clone()), &ctx, false)?
                {
                    params.extend(resolved);
                }
                params.extend(iterator_params.clone());

                let result = self
                    .source
                    .get_data_with_mode(name, &params, metadata, None, FetchMode::Aggregate)
                    .await?;
                match result {
                    DataSetResult::Complete(result) => match result.data {
                        Value::Array(items) => items,
                        other => {
                            return Err(Error::iterator(format!(
                                "iterator data set '{name}' returned {}, expected an array",
                                ResultKind::describe(&other)
                            )))
                        }
                    },
                    DataSetResult::Pending(pending) => return Ok(IteratorPlan::Pending(pending)),
                }
            }
            IteratorSource::Criteria(criteria) => {
                let property = criteria.criteria_property.as_deref().unwrap_or_default();
                let name = criteria.criteria_transformer.as_deref().unwrap_or_default();
                let value = iterator_params
                    .get(property)
                    .or_else(|| data_set_params.get(property))
                    .ok_or_else(|| {
                        Error::iterator(format!("criteria property '{property}' was not supplied"))
                    })?;
                let transformer = self.transformers.get(name).ok_or_else(|| {
                    Error::iterator(format!("unknown criteriaTransformer '{name}'"))
                })?;
                transformer(value, key.as_str())?
                    .into_iter()
                    .map(Value::Object)
                    .collect()
            }
        };

        let plan = validate_iterable_array(items, key)?;
        info!(
            iterand = %key,
            elements = plan.len(),
            sub_array_size = self.sub_array_size(),
            "Generated iterator plan"
        );
        Ok(IteratorPlan::Complete(plan))
    }

    /// Run a data set once per element of a slice and merge the results
    ///
    /// Each element's iterand value overwrites the same-named param. Array
    /// data is concatenated and other non-null data appended. Source,
    /// headers and context come from the last call. `page` and the returned
    /// `next_page` only apply to single-element slices. A pending call
    /// stops the iteration and is returned as is.
    pub async fn iterate_data_flow(
        &self,
        data_set: &str,
        slice: &[IterableObject],
        params: Option<&JsonObject>,
        page: Option<&str>,
        metadata: Option<&Value>,
        organization: Option<&str>,
    ) -> Result<DataSetResult> {
        let key = &self.principal.iterand_key;
        let single = slice.len() == 1;
        let page = if single { page } else { None };

        let mut rows = Vec::new();
        let mut last = CompleteResult::default();
        for (index, element) in slice.iter().enumerate() {
            let value = element.get(key).ok_or_else(|| {
                Error::iterable(format!("element at index {index} has no '{key}' property"))
            })?;
            let mut merged = params.cloned().unwrap_or_default();
            merged.insert(key.clone(), value.clone());
            debug!(data_set, index, iterand = %value, "Iterating");

            match self
                .source
                .get_data(data_set, Some(&merged), page, metadata, organization)
                .await?
            {
                DataSetResult::Complete(mut result) => {
                    match std::mem::take(&mut result.data) {
                        Value::Array(items) => rows.extend(items),
                        Value::Null => {}
                        other => rows.push(other),
                    }
                    last = result;
                }
                pending @ DataSetResult::Pending(_) => return Ok(pending),
            }
        }

        Ok(DataSetResult::Complete(CompleteResult {
            data: Value::Array(rows),
            source: last.source,
            headers: last.headers,
            next_page: if single { last.next_page } else { None },
            context: last.context,
        }))
    }
}

#[cfg(test)]
mod tests;
