//! Function registry for path expressions
//!
//! Functions are looked up by name at evaluation time. The registry is
//! owned by the engine, so callers (and tests) can register their own.

use super::compare::{is_truthy, stringify};
use crate::error::{Error, Result};
use crate::types::JsonObject;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A callable exposed to expressions
pub type ExprFunction = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Static lookup tables addressed by `vlookup(table, value)`
pub type LookupTables = HashMap<String, JsonObject>;

/// Named functions available to compiled expressions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ExprFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the builtin functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("string", |args| Ok(Value::String(stringify(arg(args, 0)))));
        registry.register("number", |args| to_number(arg(args, 0)));
        registry.register("boolean", |args| Ok(Value::Bool(is_truthy(arg(args, 0)))));
        registry.register("not", |args| Ok(Value::Bool(!is_truthy(arg(args, 0)))));
        registry.register("exists", |args| Ok(Value::Bool(!arg(args, 0).is_null())));
        registry.register("count", |args| {
            Ok(Value::from(match arg(args, 0) {
                Value::Array(a) => a.len(),
                Value::Null => 0,
                _ => 1,
            }))
        });
        registry.register("length", |args| {
            Ok(Value::from(stringify(arg(args, 0)).chars().count()))
        });
        registry.register("lowercase", |args| {
            Ok(Value::String(stringify(arg(args, 0)).to_lowercase()))
        });
        registry.register("uppercase", |args| {
            Ok(Value::String(stringify(arg(args, 0)).to_uppercase()))
        });
        registry.register("trim", |args| {
            Ok(Value::String(stringify(arg(args, 0)).trim().to_string()))
        });
        registry.register("join", |args| {
            let separator = stringify(arg(args, 1));
            let joined = match arg(args, 0) {
                Value::Array(items) => items
                    .iter()
                    .map(stringify)
                    .collect::<Vec<_>>()
                    .join(&separator),
                other => stringify(other),
            };
            Ok(Value::String(joined))
        });
        registry.register("sum", |args| {
            let total: f64 = match arg(args, 0) {
                Value::Array(items) => items.iter().filter_map(Value::as_f64).sum(),
                other => other.as_f64().unwrap_or(0.0),
            };
            Ok(super::eval::number_value(total))
        });
        registry
    }

    /// Register (or replace) a function
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Register a shared function value
    pub fn insert(&mut self, name: impl Into<String>, function: ExprFunction) {
        self.functions.insert(name.into(), function);
    }

    /// Get a function by name
    pub fn get(&self, name: &str) -> Option<&ExprFunction> {
        self.functions.get(name)
    }

    /// Check whether a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&Value::Null)
}

fn to_number(value: &Value) -> Result<Value> {
    match value {
        Value::Number(_) | Value::Null => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::from(u8::from(*b))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(super::eval::number_value)
            .map_err(|_| Error::Other(format!("Cannot convert '{s}' to a number"))),
        other => Err(Error::Other(format!("Cannot convert {other} to a number"))),
    }
}

// ============================================================================
// Lookup Functions
// ============================================================================

/// Build `vlookup(table, value[, default])` over the given lookup tables
///
/// The value is matched by its display form. A missing entry yields the
/// default when one is passed and is an error otherwise.
pub fn vlookup(tables: Arc<LookupTables>) -> ExprFunction {
    Arc::new(move |args: &[Value]| {
        let table_name = match args.first() {
            Some(Value::String(name)) => name.as_str(),
            _ => {
                return Err(Error::lookup_table(
                    stringify(arg(args, 0)),
                    "first argument to vlookup must be a table name",
                ))
            }
        };
        let table = tables
            .get(table_name)
            .ok_or_else(|| Error::lookup_table(table_name, "no such lookup table"))?;

        let key = stringify(arg(args, 1));
        match table.get(&key) {
            Some(found) => Ok(found.clone()),
            None => match args.get(2) {
                Some(default) => Ok(default.clone()),
                None => Err(Error::lookup_table(
                    table_name,
                    format!("value '{key}' not found and no default given"),
                )),
            },
        }
    })
}

/// Deprecated alias of [`vlookup`] that warns on every call
pub fn mlookup(tables: Arc<LookupTables>) -> ExprFunction {
    let inner = vlookup(tables);
    Arc::new(move |args: &[Value]| {
        warn!("mlookup() is deprecated, use vlookup() instead");
        inner(args)
    })
}
