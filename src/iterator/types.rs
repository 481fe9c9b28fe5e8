//! Iterator types

use crate::http::PendingResult;
use crate::types::JsonObject;
use serde::{Deserialize, Serialize};

/// One element of an iteration plan: `{ <iterandKey>: value }`
pub type IterableObject = JsonObject;

/// An iterator layer definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IteratorLayer {
    /// Layer number; layer 1 is the principal iterator
    pub layer: u32,

    /// Key each iterable object carries
    pub iterand_key: String,

    /// Elements handed to each `iterate_data_flow` call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_array_size: Option<usize>,

    /// Where the iterable array comes from
    pub source: IteratorSource,
}

/// Source of an iterable array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IteratorSource {
    /// Rows of a data set
    DataSet(DataSetIteratorSource),
    /// A criteria value run through a registered transformer
    Criteria(CriteriaIteratorSource),
}

/// Data set sourced iterator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSetIteratorSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_set: Option<String>,

    /// Params for the data set fetch, may contain tokens
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub params: JsonObject,
}

/// Criteria sourced iterator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaIteratorSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_property: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_transformer: Option<String>,
}

/// Outcome of plan generation
#[derive(Debug, Clone)]
pub enum IteratorPlan {
    /// The validated iterable array
    Complete(Vec<IterableObject>),
    /// The data set fetch was throttled
    Pending(PendingResult),
}
