//! Criteria field options
//!
//! Builds value/label pairs for a criteria field from a data set's rows.

use super::{CriteriaOption, CriteriaOptionsResult, DataSetResult, DataSource, FetchMode};
use crate::error::Result;
use crate::expression::compare_values;
use crate::types::JsonObject;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

impl DataSource {
    /// Build the options for a criteria field
    ///
    /// The data set is fetched with every page aggregated. Each row yields
    /// one option; rows whose value is `null` are skipped and duplicate
    /// values keep their first label. Options are sorted by label, stably,
    /// so identical inputs always give the same order.
    pub async fn get_criteria_field_options(
        &self,
        data_set: &str,
        value_expression: &str,
        label_expression: &str,
        params: Option<&JsonObject>,
    ) -> Result<CriteriaOptionsResult> {
        let value = self.engine().compile(value_expression)?;
        let label = self.engine().compile(label_expression)?;

        let empty = JsonObject::new();
        let result = self
            .get_data_with_mode(
                data_set,
                params.unwrap_or(&empty),
                None,
                None,
                FetchMode::Aggregate,
            )
            .await?;
        let data = match result {
            DataSetResult::Complete(result) => result.data,
            DataSetResult::Pending(pending) => return Ok(CriteriaOptionsResult::Pending(pending)),
        };

        let rows = match data {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            row => vec![row],
        };

        let mut seen = HashSet::new();
        let mut options = Vec::with_capacity(rows.len());
        for row in &rows {
            let option_value = value.evaluate(row)?;
            if option_value.is_null() || !seen.insert(option_value.to_string()) {
                continue;
            }
            options.push(CriteriaOption {
                value: option_value,
                label: label.evaluate(row)?,
            });
        }
        options.sort_by(|a, b| compare_values(&a.label, &b.label));

        debug!(data_set, options = options.len(), "Built criteria options");
        Ok(CriteriaOptionsResult::Complete(options))
    }
}
