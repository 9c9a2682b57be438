//! # Placeholder Resolution
//!
//! Step parameters may reference values recorded by earlier steps with the
//! `${step_N_key}` syntax, where `N` is the 1-based number of the producing step
//! and `key` is one of the fields that step recorded (`element_ids`, `count`,
//! `elements`, or a tool's surfaced fields).
//!
//! ## Substitution rules
//!
//! - A string that is exactly one placeholder (ignoring surrounding whitespace)
//!   is replaced by the recorded value itself, so lists stay lists and numbers
//!   stay numbers.
//! - A placeholder embedded in a longer string is replaced by the value's
//!   display form (see [`display_form`]).
//! - A placeholder that names a step at or after the current one, or a key that
//!   was never recorded, is left untouched and a warning is logged.
//!
//! ## Usage
//!
//! ```rust
//! use hostlink_engine::resolve::{ChainedValues, resolve_placeholders};
//! use serde_json::json;
//!
//! let mut chained = ChainedValues::new();
//! chained.insert("step_1_element_ids".into(), json!(["1", "2", "3"]));
//!
//! let params = json!({
//!     "element_ids": "${step_1_element_ids}",
//!     "note": "ids: ${step_1_element_ids}"
//! });
//!
//! let resolved = resolve_placeholders(&params, &chained, 2);
//! assert_eq!(resolved["element_ids"], json!(["1", "2", "3"]));
//! assert_eq!(resolved["note"], "ids: ['1', '2', '3']");
//! ```

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Number, Value};
use tracing::warn;

/// Values recorded by completed steps, keyed `step_{n}_{key}`.
pub type ChainedValues = IndexMap<String, Value>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{step_(\d+)_([^}]+)\}").expect("placeholder pattern"));

/// Builds the chain key for field `key` of step `step_number`.
pub fn chain_key(step_number: usize, key: &str) -> String {
    format!("step_{step_number}_{key}")
}

/// Recursively substitutes placeholders in `value` for the step numbered `current_step`.
///
/// Only values recorded by steps `1..current_step` are visible. Object keys are never rewritten.
pub fn resolve_placeholders(value: &Value, chained: &ChainedValues, current_step: usize) -> Value {
    match value {
        Value::String(text) => resolve_string(text, chained, current_step),
        Value::Array(items) => Value::Array(items.iter().map(|item| resolve_placeholders(item, chained, current_step)).collect()),
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve_placeholders(value, chained, current_step));
            }
            Value::Object(resolved)
        }
        _ => value.clone(),
    }
}

/// Resolves placeholders in a parameter map.
pub fn resolve_params(params: &Map<String, Value>, chained: &ChainedValues, current_step: usize) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), resolve_placeholders(value, chained, current_step)))
        .collect()
}

/// One `${step_N_key}` occurrence inside a parameter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRef {
    pub step_number: usize,
    pub key: String,
    /// The placeholder exactly as written.
    pub text: String,
}

/// Every placeholder in `value`, in document order.
pub fn placeholder_references(value: &Value) -> Vec<PlaceholderRef> {
    let mut references = Vec::new();
    collect_references(value, &mut references);
    references
}

fn collect_references(value: &Value, references: &mut Vec<PlaceholderRef>) {
    match value {
        Value::String(text) => {
            for captures in PLACEHOLDER.captures_iter(text) {
                // Step numbers too large for usize can never resolve.
                let step_number = captures[1].parse().unwrap_or(usize::MAX);
                references.push(PlaceholderRef {
                    step_number,
                    key: captures[2].to_string(),
                    text: captures[0].to_string(),
                });
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, references)),
        Value::Object(map) => map.values().for_each(|item| collect_references(item, references)),
        _ => {}
    }
}

fn resolve_string(text: &str, chained: &ChainedValues, current_step: usize) -> Value {
    let trimmed = text.trim();
    if let Some(captures) = PLACEHOLDER.captures(trimmed)
        && captures[0].len() == trimmed.len()
    {
        return match lookup(&captures, chained, current_step) {
            Some(value) => value.clone(),
            None => {
                warn_unresolved(&captures, current_step);
                Value::String(text.to_string())
            }
        };
    }

    if !PLACEHOLDER.is_match(text) {
        return Value::String(text.to_string());
    }

    let replaced = PLACEHOLDER.replace_all(text, |captures: &Captures<'_>| match lookup(captures, chained, current_step) {
        Some(value) => display_form(value),
        None => {
            warn_unresolved(captures, current_step);
            captures[0].to_string()
        }
    });
    Value::String(replaced.into_owned())
}

fn lookup<'a>(captures: &Captures<'_>, chained: &'a ChainedValues, current_step: usize) -> Option<&'a Value> {
    let step_number: usize = captures[1].parse().ok()?;
    if step_number >= current_step {
        return None;
    }
    chained.get(&chain_key(step_number, &captures[2]))
}

fn warn_unresolved(captures: &Captures<'_>, current_step: usize) {
    warn!(placeholder = &captures[0], step = current_step, "placeholder not found in workflow results");
}

/// Renders a value for splicing into a longer string.
///
/// Strings appear bare; everything else uses the notation planners echo back in
/// prose: `['1', '2', '3']`, `{'name': 'Level 1'}`, `True`, `None`.
pub fn display_form(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => literal_form(other),
    }
}

fn literal_form(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(number) => number_form(number),
        Value::String(text) => quoted(text),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(literal_form).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}: {}", quoted(key), literal_form(value)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

fn number_form(number: &Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() => {
            if float.is_finite() && float.fract() == 0.0 && float.abs() < 1e16 {
                format!("{float:.1}")
            } else {
                float.to_string()
            }
        }
        _ => number.to_string(),
    }
}

fn quoted(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    let mut rendered = String::with_capacity(text.len() + 2);
    rendered.push(quote);
    for character in text.chars() {
        match character {
            '\\' => rendered.push_str("\\\\"),
            '\n' => rendered.push_str("\\n"),
            '\r' => rendered.push_str("\\r"),
            '\t' => rendered.push_str("\\t"),
            c if c == quote => {
                rendered.push('\\');
                rendered.push(c);
            }
            c => rendered.push(c),
        }
    }
    rendered.push(quote);
    rendered
}
