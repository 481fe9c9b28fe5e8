//! Expression evaluation
//!
//! Evaluation works on `Option<Value>`: `None` is "undefined" (a missing
//! field), which is distinct from JSON `null` until the final result, where
//! it collapses to `null`.

use super::ast::{BinaryOp, Expr};
use super::compare::{compare_values, is_truthy, loose_equals, stringify};
use super::functions::FunctionRegistry;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Build a JSON number, keeping integral values as integers
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

pub(crate) struct Evaluator<'a> {
    pub source: &'a str,
    pub functions: &'a FunctionRegistry,
    pub root: &'a Value,
}

impl Evaluator<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::expression(self.source, message)
    }

    pub fn eval(&self, expr: &Expr, ctx: Option<&Value>) -> Result<Option<Value>> {
        match expr {
            Expr::Literal(v) => Ok(Some(v.clone())),
            Expr::Context => Ok(ctx.cloned()),
            Expr::Root => Ok(Some(self.root.clone())),
            Expr::Name(name) => Ok(ctx.and_then(|c| field(c, name))),
            Expr::Wildcard => Ok(ctx.and_then(wildcard)),
            Expr::Child(lhs, rhs) => {
                let Some(base) = self.eval(lhs, ctx)? else {
                    return Ok(None);
                };
                match base {
                    Value::Array(items) => {
                        let mut out = Vec::new();
                        for item in &items {
                            match self.eval(rhs, Some(item))? {
                                Some(Value::Array(nested)) => out.extend(nested),
                                Some(v) => out.push(v),
                                None => {}
                            }
                        }
                        Ok(non_empty(out))
                    }
                    other => self.eval(rhs, Some(&other)),
                }
            }
            Expr::Subscript(lhs, index) => {
                let Some(base) = self.eval(lhs, ctx)? else {
                    return Ok(None);
                };
                self.subscript(base, index)
            }
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, value_expr) in fields {
                    if let Some(v) = self.eval(value_expr, ctx)? {
                        map.insert(key.clone(), v);
                    }
                }
                Ok(Some(Value::Object(map)))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(v) = self.eval(item, ctx)? {
                        out.push(v);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Expr::Negate(operand) => match self.eval(operand, ctx)? {
                None => Ok(None),
                Some(Value::Number(n)) => Ok(Some(number_value(-n.as_f64().unwrap_or(0.0)))),
                Some(other) => Err(self.error(format!("cannot negate {other}"))),
            },
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, ctx),
            Expr::Condition(cond, then, otherwise) => {
                let test = self.eval(cond, ctx)?;
                if test.as_ref().is_some_and(is_truthy) {
                    self.eval(then, ctx)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise, ctx)
                } else {
                    Ok(None)
                }
            }
            Expr::Call(name, args) => {
                let function = self
                    .functions
                    .get(name)
                    .ok_or_else(|| self.error(format!("unknown function '{name}'")))?;
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(a, ctx)?.unwrap_or(Value::Null));
                }
                function(&values).map(Some)
            }
        }
    }

    fn subscript(&self, base: Value, index: &Expr) -> Result<Option<Value>> {
        let items = match base {
            Value::Array(items) => items,
            other => vec![other],
        };

        // Constant numeric index selects a single element
        if let Some(n) = constant_index(index) {
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let idx = if n < 0 { items.len() as i64 + n } else { n };
            if idx < 0 {
                return Ok(None);
            }
            return Ok(items.into_iter().nth(idx as usize));
        }

        let mut kept = Vec::new();
        for (position, item) in items.into_iter().enumerate() {
            let keep = match self.eval(index, Some(&item))? {
                Some(Value::Number(n)) => n.as_f64() == Some(position as f64),
                Some(v) => is_truthy(&v),
                None => false,
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(non_empty(kept))
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        ctx: Option<&Value>,
    ) -> Result<Option<Value>> {
        // Short-circuit the logical operators
        match op {
            BinaryOp::And => {
                let l = self.eval(lhs, ctx)?;
                if !l.as_ref().is_some_and(is_truthy) {
                    return Ok(Some(Value::Bool(false)));
                }
                let r = self.eval(rhs, ctx)?;
                return Ok(Some(Value::Bool(r.as_ref().is_some_and(is_truthy))));
            }
            BinaryOp::Or => {
                let l = self.eval(lhs, ctx)?;
                if l.as_ref().is_some_and(is_truthy) {
                    return Ok(Some(Value::Bool(true)));
                }
                let r = self.eval(rhs, ctx)?;
                return Ok(Some(Value::Bool(r.as_ref().is_some_and(is_truthy))));
            }
            _ => {}
        }

        let l = self.eval(lhs, ctx)?;
        let r = self.eval(rhs, ctx)?;

        match op {
            BinaryOp::Concat => {
                let ls = l.as_ref().map(stringify).unwrap_or_default();
                let rs = r.as_ref().map(stringify).unwrap_or_default();
                Ok(Some(Value::String(ls + &rs)))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let equal = loose_equals(&l, &r);
                Ok(Some(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal })))
            }
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let ord = compare_values(&l, &r);
                let result = match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Lte => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                Ok(Some(Value::Bool(result)))
            }
            _ => {
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(None);
                };
                let (Some(x), Some(y)) = (l.as_f64(), r.as_f64()) else {
                    return Err(self.error(format!(
                        "operator '{}' requires numbers, got {l} and {r}",
                        op.symbol()
                    )));
                };
                let n = match op {
                    BinaryOp::Add => x + y,
                    BinaryOp::Sub => x - y,
                    BinaryOp::Mul => x * y,
                    BinaryOp::Div => {
                        if y == 0.0 {
                            return Err(self.error("division by zero"));
                        }
                        x / y
                    }
                    _ => {
                        if y == 0.0 {
                            return Err(self.error("division by zero"));
                        }
                        x % y
                    }
                };
                Ok(Some(number_value(n)))
            }
        }
    }
}

fn constant_index(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(Value::Number(n)) => n.as_i64(),
        Expr::Negate(inner) => constant_index(inner).map(|n| -n),
        _ => None,
    }
}

fn non_empty(values: Vec<Value>) -> Option<Value> {
    if values.is_empty() {
        None
    } else {
        Some(Value::Array(values))
    }
}

/// Select a field, mapping over arrays and flattening one level
fn field(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(name).cloned(),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                match field(item, name) {
                    Some(Value::Array(nested)) => out.extend(nested),
                    Some(v) => out.push(v),
                    None => {}
                }
            }
            non_empty(out)
        }
        _ => None,
    }
}

fn wildcard(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let mut out = Vec::new();
            for v in map.values() {
                match v {
                    Value::Array(nested) => out.extend(nested.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            non_empty(out)
        }
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                if let Some(Value::Array(nested)) = wildcard(item) {
                    out.extend(nested);
                }
            }
            non_empty(out)
        }
        _ => None,
    }
}
