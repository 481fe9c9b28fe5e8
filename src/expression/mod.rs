//! Path expression module
//!
//! Compiles the declarative expression strings used by data sets
//! (`property`, `filter`, `sort`, `transform`, join predicates) and
//! evaluates them against JSON.
//!
//! # Overview
//!
//! The evaluator is a pluggable capability: the pipeline only sees the
//! [`ExpressionEngine`] and [`CompiledExpression`] traits. [`PathEngine`] is
//! the default implementation, supporting:
//!
//! - dotted paths with array flattening (`items.tags`)
//! - indexes and predicates (`items[0]`, `items[state = 'open']`)
//! - object and array constructors (`{ "id": id }`)
//! - operators (`&`, `+`, `=`, `<`, `and`, `or`, `? :`)
//! - registered functions (`vlookup('status', code)`)

mod ast;
mod compare;
mod eval;
mod functions;
mod parser;

pub use ast::{BinaryOp, Expr};
pub use compare::{compare_values, is_truthy, loose_equals, stringify};
pub use functions::{mlookup, vlookup, ExprFunction, FunctionRegistry, LookupTables};

use crate::error::Result;
use eval::Evaluator;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A compiled expression, ready to evaluate against data
pub trait CompiledExpression: Send + Sync + fmt::Debug {
    /// The expression text this was compiled from
    fn source(&self) -> &str;

    /// Evaluate against a JSON value; undefined results are `null`
    fn evaluate(&self, data: &Value) -> Result<Value>;
}

/// Compiles expression strings
pub trait ExpressionEngine: Send + Sync {
    /// Compile an expression, failing on syntax errors
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>>;
}

// ============================================================================
// Default Engine
// ============================================================================

/// Default expression engine
#[derive(Debug, Clone)]
pub struct PathEngine {
    functions: Arc<FunctionRegistry>,
}

impl Default for PathEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PathEngine {
    /// Create an engine with the builtin functions
    pub fn new() -> Self {
        Self::with_functions(FunctionRegistry::with_builtins())
    }

    /// Create an engine with a specific function registry
    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Self {
            functions: Arc::new(functions),
        }
    }

    /// Create an engine with builtins plus `vlookup`/`mlookup` over the tables
    pub fn with_lookup_tables(tables: LookupTables) -> Self {
        let tables = Arc::new(tables);
        let mut functions = FunctionRegistry::with_builtins();
        functions.insert("vlookup", vlookup(Arc::clone(&tables)));
        functions.insert("mlookup", mlookup(tables));
        Self::with_functions(functions)
    }

    /// Function registry used by compiled expressions
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}

impl ExpressionEngine for PathEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>> {
        let ast = parser::parse(source)?;
        Ok(Arc::new(PathExpression {
            source: source.to_string(),
            ast,
            functions: Arc::clone(&self.functions),
        }))
    }
}

/// An expression compiled by [`PathEngine`]
pub struct PathExpression {
    source: String,
    ast: Expr,
    functions: Arc<FunctionRegistry>,
}

impl PathExpression {
    /// Parsed syntax tree
    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}

impl fmt::Debug for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathExpression")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CompiledExpression for PathExpression {
    fn source(&self) -> &str {
        &self.source
    }

    fn evaluate(&self, data: &Value) -> Result<Value> {
        let evaluator = Evaluator {
            source: &self.source,
            functions: &self.functions,
            root: data,
        };
        Ok(evaluator.eval(&self.ast, Some(data))?.unwrap_or(Value::Null))
    }
}
