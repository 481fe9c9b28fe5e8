//! Criteria transformers
//!
//! Named functions turning a criteria value into an iterable array.

use super::IterableObject;
use crate::error::{Error, Result};
use crate::expression::stringify;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Transformer signature: `(criteria value, iterand key) -> iterable array`
pub type CriteriaTransformer =
    Arc<dyn Fn(&Value, &str) -> Result<Vec<IterableObject>> + Send + Sync>;

/// Name of the builtin comma-separated transformer
pub const CSV_TO_ITERABLE: &str = "csvToIterable";

/// Registry of criteria transformers, owned by the iterator
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, CriteriaTransformer>,
}

impl TransformerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `csvToIterable`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(CSV_TO_ITERABLE, csv_to_iterable);
        registry
    }

    /// Register a transformer
    pub fn register<F>(&mut self, name: impl Into<String>, transformer: F)
    where
        F: Fn(&Value, &str) -> Result<Vec<IterableObject>> + Send + Sync + 'static,
    {
        self.transformers.insert(name.into(), Arc::new(transformer));
    }

    pub fn get(&self, name: &str) -> Option<&CriteriaTransformer> {
        self.transformers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transformers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Split a comma-separated value into one iterable object per token
///
/// Tokens are trimmed and empty tokens dropped. Numbers and booleans are
/// split by their display form.
pub fn csv_to_iterable(value: &Value, iterand_key: &str) -> Result<Vec<IterableObject>> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(_) | Value::Bool(_) => stringify(value),
        other => {
            return Err(Error::iterator(format!(
                "{CSV_TO_ITERABLE} expects a comma-separated string, got {}",
                crate::types::ResultKind::describe(other)
            )))
        }
    };

    Ok(text
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let mut object = IterableObject::new();
            object.insert(iterand_key.to_string(), Value::String(token.to_string()));
            object
        })
        .collect())
}
