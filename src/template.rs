//! Template engine for dynamic responses.
//!
//! Response templates are JSON values whose strings may embed placeholders:
//!
//! - `{{timestamp}}` - the render instant, RFC 3339 in UTC
//! - `{{randomId}}` - a fresh 9 character `[a-z0-9]` identifier per occurrence
//! - `{{query.<name>}}`, `{{body.<name>}}`, `{{params.<name>}}` - request values
//!
//! Substitution happens inside string leaves and object keys, so inserted
//! values never break the JSON structure. Placeholders that cannot be resolved
//! are left in the output verbatim.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Alphabet used for generated identifiers.
pub const RANDOM_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated identifiers.
pub const RANDOM_ID_LEN: usize = 9;

/// Per-request values available to placeholders.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Top-level fields of the JSON request body
    pub body: Map<String, Value>,
    /// Path parameters from pattern matching
    pub params: HashMap<String, String>,
}

/// Template engine for rendering dynamic responses.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        Self
    }

    /// Render a template with the given context.
    ///
    /// All `{{timestamp}}` placeholders within one call share the same instant.
    pub fn render(&self, template: &Value, ctx: &TemplateContext) -> Value {
        let scope = RenderScope {
            ctx,
            timestamp: format_timestamp(Utc::now()),
        };
        scope.render_value(template)
    }
}

struct RenderScope<'a> {
    ctx: &'a TemplateContext,
    timestamp: String,
}

impl RenderScope<'_> {
    fn render_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.render_str(s).into_owned()),
            Value::Array(arr) => Value::Array(arr.iter().map(|v| self.render_value(v)).collect()),
            Value::Object(obj) => {
                let mut rendered = Map::new();
                for (k, v) in obj {
                    rendered.insert(self.render_str(k).into_owned(), self.render_value(v));
                }
                Value::Object(rendered)
            }
            _ => value.clone(),
        }
    }

    /// Substitute placeholders in a single left-to-right pass.
    ///
    /// Inserted text is never rescanned.
    fn render_str<'s>(&self, s: &'s str) -> Cow<'s, str> {
        if !s.contains(OPEN) {
            return Cow::Borrowed(s);
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s;

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let candidate = &rest[start..];

            let resolved = candidate[OPEN.len()..].find(CLOSE).and_then(|end| {
                let expr = &candidate[OPEN.len()..OPEN.len() + end];
                self.resolve(expr)
                    .map(|value| (value, OPEN.len() + end + CLOSE.len()))
            });

            match resolved {
                Some((value, consumed)) => {
                    out.push_str(&value);
                    rest = &candidate[consumed..];
                }
                None => {
                    // Unresolved: keep one brace and retry from the next character
                    out.push('{');
                    rest = &candidate[1..];
                }
            }
        }

        out.push_str(rest);
        Cow::Owned(out)
    }

    fn resolve(&self, expr: &str) -> Option<Cow<'_, str>> {
        match expr {
            "timestamp" => return Some(Cow::Borrowed(self.timestamp.as_str())),
            "randomId" => return Some(Cow::Owned(generate_random_id())),
            _ => {}
        }

        let (namespace, key) = expr.split_once('.')?;
        match namespace {
            "query" => self.ctx.query.get(key).map(|v| Cow::Borrowed(v.as_str())),
            "body" => self.ctx.body.get(key).map(coerce_to_text),
            "params" => self.ctx.params.get(key).map(|v| Cow::Borrowed(v.as_str())),
            _ => None,
        }
    }
}

/// Text form of a context value.
///
/// Strings verbatim, booleans as `True`/`False`, null as `None`, numbers in
/// decimal form, arrays and objects as compact JSON.
pub fn coerce_to_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bool(true) => Cow::Borrowed("True"),
        Value::Bool(false) => Cow::Borrowed("False"),
        Value::Null => Cow::Borrowed("None"),
        other => Cow::Owned(other.to_string()),
    }
}

/// Generate a random `[a-z0-9]{9}` identifier. Not suitable for security use.
pub fn generate_random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_ID_LEN)
        .map(|_| RANDOM_ID_ALPHABET[rng.gen_range(0..RANDOM_ID_ALPHABET.len())] as char)
        .collect()
}

/// Format an instant the way `{{timestamp}}` renders it.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
