//! Token resolution for data set declarations
//!
//! Handles `{{ path }}` placeholders in URLs, query strings and bodies.
//! Placeholders resolve against a layered [`TokenContext`]:
//! `{{ criteria.projectId }}`, `{{ source.id }}`, `{{ messages.title }}`.

use crate::error::{Error, Result};
use crate::expression::stringify;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching placeholders: {{ layer.path.to.value }}
static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_$@][a-zA-Z0-9_$@-]*(?:\.[a-zA-Z0-9_$@-]+)*)\s*\}\}").unwrap()
});

/// Layered context for token resolution
#[derive(Debug, Clone, Default)]
pub struct TokenContext {
    /// Caller-supplied parameters
    pub criteria: Value,
    /// Static lookup tables
    pub lookups: Value,
    /// Static messages
    pub messages: Value,
    /// Connector constants
    pub constants: Value,
    /// Current row (lookups only)
    pub source: Value,
    /// Additional data
    pub data: Value,
    /// Organization the request is made for
    pub organization: Value,
}

impl TokenContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with criteria values
    pub fn with_criteria(criteria: Value) -> Self {
        Self {
            criteria,
            ..Default::default()
        }
    }

    /// Set criteria values
    pub fn set_criteria(&mut self, criteria: Value) -> &mut Self {
        self.criteria = criteria;
        self
    }

    /// Set lookup tables
    pub fn set_lookups(&mut self, lookups: Value) -> &mut Self {
        self.lookups = lookups;
        self
    }

    /// Set static messages
    pub fn set_messages(&mut self, messages: Value) -> &mut Self {
        self.messages = messages;
        self
    }

    /// Set constants
    pub fn set_constants(&mut self, constants: Value) -> &mut Self {
        self.constants = constants;
        self
    }

    /// Set the current source row
    pub fn set_source(&mut self, source: Value) -> &mut Self {
        self.source = source;
        self
    }

    /// Set additional data
    pub fn set_data(&mut self, data: Value) -> &mut Self {
        self.data = data;
        self
    }

    /// Set organization
    pub fn set_organization(&mut self, organization: Option<&str>) -> &mut Self {
        self.organization = organization.map_or(Value::Null, |o| Value::String(o.to_string()));
        self
    }

    /// Get a value by path (e.g., "criteria.projectId")
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();

        // First part determines the layer
        let root = match parts[0] {
            "criteria" => &self.criteria,
            "lookups" => &self.lookups,
            "messages" => &self.messages,
            "constants" => &self.constants,
            "source" => &self.source,
            "data" => &self.data,
            "organization" => &self.organization,
            // Bare names resolve against criteria, then constants
            _ => {
                if let Some(val) = get_nested_value(&self.criteria, &parts) {
                    return Some(val);
                }
                return get_nested_value(&self.constants, &parts);
            }
        };

        let found = if parts.len() == 1 {
            Some(root)
        } else {
            get_nested_value(root, &parts[1..])
        };
        found.filter(|v| !v.is_null() || parts.len() > 1)
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        current = match current {
            Value::Object(map) => map.get(*part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a template string, interpolating every placeholder
///
/// A `{{` that does not open a well-formed placeholder is a template error.
pub fn render(template: &str, ctx: &TokenContext) -> Result<String> {
    render_with(template, ctx, stringify)
}

/// Render a URL template, percent-encoding every interpolated value
///
/// A template that is exactly one placeholder is taken as a whole URL and
/// inserted as is.
pub fn render_url(template: &str, ctx: &TokenContext) -> Result<String> {
    if sole_token(template).is_some() {
        return render(template, ctx);
    }
    render_with(template, ctx, |value| encode_path_value(&stringify(value)))
}

/// Percent-encode a value for use inside a URL path
fn encode_path_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .map(|part| if part == "+" { "%20" } else { part })
        .collect()
}

fn render_with<F>(template: &str, ctx: &TokenContext, format: F) -> Result<String>
where
    F: Fn(&Value) -> String,
{
    if template.matches("{{").count() > TOKEN_REGEX.find_iter(template).count() {
        return Err(Error::template(format!("malformed placeholder in '{template}'")));
    }

    let mut errors = Vec::new();
    let result = TOKEN_REGEX.replace_all(template, |cap: &regex::Captures<'_>| {
        let var_path = &cap[1];
        if let Some(value) = ctx.get(var_path) {
            format(value)
        } else {
            errors.push(var_path.to_string());
            cap[0].to_string()
        }
    });

    if errors.is_empty() {
        Ok(result.into_owned())
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Render a template, leaving undefined placeholders as-is
pub fn render_optional(template: &str, ctx: &TokenContext) -> String {
    TOKEN_REGEX
        .replace_all(template, |cap: &regex::Captures<'_>| {
            ctx.get(&cap[1])
                .map_or_else(|| cap[0].to_string(), stringify)
        })
        .into_owned()
}

/// Check if a string contains placeholders
pub fn has_tokens(s: &str) -> bool {
    TOKEN_REGEX.is_match(s)
}

/// Extract all placeholder paths from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TOKEN_REGEX
        .captures_iter(template)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// If the whole string is exactly one placeholder, return its path
fn sole_token(s: &str) -> Option<&str> {
    let cap = TOKEN_REGEX.captures(s)?;
    let whole = cap.get(0)?;
    if whole.start() == 0 && whole.end() == s.len() {
        cap.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

/// Resolve placeholders throughout a JSON value
///
/// A string that is exactly one placeholder resolves to the raw value, so
/// `"{{ criteria.limit }}"` stays a number. Object keys are resolved too.
/// With `suppress_errors`, undefined placeholders are left verbatim.
pub fn resolve_tokens(template: &Value, ctx: &TokenContext, suppress_errors: bool) -> Result<Value> {
    match template {
        Value::String(s) => {
            if !has_tokens(s) {
                return Ok(template.clone());
            }
            if let Some(path) = sole_token(s) {
                if let Some(value) = ctx.get(path) {
                    return Ok(value.clone());
                }
                if suppress_errors {
                    return Ok(template.clone());
                }
                return Err(Error::undefined_var(path));
            }
            if suppress_errors {
                Ok(Value::String(render_optional(s, ctx)))
            } else {
                Ok(Value::String(render(s, ctx)?))
            }
        }
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (k, v) in map {
                let new_key = if !has_tokens(k) {
                    k.clone()
                } else if suppress_errors {
                    render_optional(k, ctx)
                } else {
                    render(k, ctx)?
                };
                new_map.insert(new_key, resolve_tokens(v, ctx, suppress_errors)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => {
            let new_arr: Result<Vec<Value>> = arr
                .iter()
                .map(|v| resolve_tokens(v, ctx, suppress_errors))
                .collect();
            Ok(Value::Array(new_arr?))
        }
        _ => Ok(template.clone()),
    }
}

/// Resolve placeholders in a plain string
pub fn resolve_str(template: &str, ctx: &TokenContext, suppress_errors: bool) -> Result<String> {
    if suppress_errors {
        Ok(render_optional(template, ctx))
    } else {
        render(template, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_substitution() {
        let ctx = TokenContext::with_criteria(json!({"projectId": "p-1"}));
        let result = render("/projects/{{ criteria.projectId }}/items", &ctx).unwrap();
        assert_eq!(result, "/projects/p-1/items");
    }

    #[test]
    fn test_bare_name_falls_back_to_constants() {
        let mut ctx = TokenContext::with_criteria(json!({"a": "1"}));
        ctx.set_constants(json!({"apiVersion": "v2"}));

        assert_eq!(render("{{a}}/{{apiVersion}}", &ctx).unwrap(), "1/v2");
    }

    #[test]
    fn test_all_layers() {
        let mut ctx = TokenContext::new();
        ctx.set_criteria(json!({"c": 1}))
            .set_lookups(json!({"l": {"x": "y"}}))
            .set_messages(json!({"m": "hello"}))
            .set_constants(json!({"k": "const"}))
            .set_source(json!({"id": 42}))
            .set_data(json!({"d": true}))
            .set_organization(Some("org-1"));

        let result = render(
            "{{criteria.c}} {{lookups.l.x}} {{messages.m}} {{constants.k}} {{source.id}} {{data.d}} {{organization}}",
            &ctx,
        )
        .unwrap();
        assert_eq!(result, "1 y hello const 42 true org-1");
    }

    #[test]
    fn test_array_index_segment() {
        let ctx = TokenContext::with_criteria(json!({"ids": ["a", "b"]}));
        assert_eq!(render("{{ criteria.ids.1 }}", &ctx).unwrap(), "b");
    }

    #[test]
    fn test_undefined_variable() {
        let ctx = TokenContext::new();
        let result = render("{{ criteria.missing }}", &ctx);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("criteria.missing"));
    }

    #[test]
    fn test_malformed_placeholder() {
        let ctx = TokenContext::with_criteria(json!({"id": 1}));
        let err = render("/a/{{criteria.id}}/{{ not valid }}", &ctx).unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
    }

    #[test]
    fn test_unset_organization_is_undefined() {
        let ctx = TokenContext::new();
        assert!(render("{{ organization }}", &ctx).is_err());
    }

    #[test]
    fn test_render_optional() {
        let ctx = TokenContext::with_criteria(json!({"key": "value"}));
        assert_eq!(render_optional("x {{ criteria.key }}", &ctx), "x value");
        assert_eq!(
            render_optional("x {{ criteria.missing }}", &ctx),
            "x {{ criteria.missing }}"
        );
    }

    #[test]
    fn test_has_tokens_and_extract() {
        assert!(has_tokens("{{ criteria.key }}"));
        assert!(!has_tokens("{ not a token }"));
        assert_eq!(
            extract_variables("{{ criteria.a }} and {{ source.b }}"),
            vec!["criteria.a", "source.b"]
        );
    }

    #[test]
    fn test_resolve_tokens_keeps_raw_type_for_sole_token() {
        let ctx = TokenContext::with_criteria(json!({"limit": 25, "ids": [1, 2]}));
        let body = json!({
            "limit": "{{ criteria.limit }}",
            "ids": "{{criteria.ids}}",
            "label": "limit={{ criteria.limit }}"
        });

        let result = resolve_tokens(&body, &ctx, false).unwrap();
        assert_eq!(
            result,
            json!({"limit": 25, "ids": [1, 2], "label": "limit=25"})
        );
    }

    #[test]
    fn test_resolve_tokens_keys_and_arrays() {
        let ctx = TokenContext::with_criteria(json!({"field": "name", "v": "x"}));
        let result = resolve_tokens(&json!({"{{criteria.field}}": ["{{criteria.v}}", 1]}), &ctx, false)
            .unwrap();
        assert_eq!(result, json!({"name": ["x", 1]}));
    }

    #[test]
    fn test_resolve_tokens_suppress_errors() {
        let ctx = TokenContext::new();
        let template = json!({"a": "{{ criteria.missing }}", "b": "x{{criteria.missing}}"});
        assert!(resolve_tokens(&template, &ctx, false).is_err());
        assert_eq!(resolve_tokens(&template, &ctx, true).unwrap(), template);
    }

    #[test]
    fn test_render_url_encodes_values() {
        let ctx = TokenContext::with_criteria(json!({"id": "a b&c/d+e", "n": 7}));
        assert_eq!(
            render_url("/items/{{criteria.id}}/{{criteria.n}}", &ctx).unwrap(),
            "/items/a%20b%26c%2Fd%2Be/7"
        );
        assert_eq!(render_url("/items/{{criteria.n}}?q=1", &ctx).unwrap(), "/items/7?q=1");
    }

    #[test]
    fn test_render_url_sole_placeholder_is_whole_url() {
        let ctx = TokenContext::with_criteria(json!({"next": "https://api.test/items?page=2"}));
        assert_eq!(
            render_url("{{criteria.next}}", &ctx).unwrap(),
            "https://api.test/items?page=2"
        );
    }

    #[test]
    fn test_resolve_str() {
        let ctx = TokenContext::with_criteria(json!({"id": 7}));
        assert_eq!(resolve_str("/a/{{criteria.id}}", &ctx, false).unwrap(), "/a/7");
        assert_eq!(resolve_str("/a/{{criteria.x}}", &ctx, true).unwrap(), "/a/{{criteria.x}}");
    }
}
