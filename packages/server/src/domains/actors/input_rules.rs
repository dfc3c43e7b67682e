//! Table-driven input normalization.
//!
//! Clients send camelCase forms with loosely typed values ("50", "true",
//! "coffee, tea"). The scraping worker reads snake_case keys with real types.
//! Each actor carries a rule table describing the reshaping.

use serde_json::{Map, Number, Value};

use crate::domains::runs::errors::{RunError, RunResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    None,
    Integer,
    Float,
    Boolean,
    /// A single string becomes a one-element list; commas split.
    StringList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRule {
    pub source: &'static str,
    pub target: &'static str,
    pub coercion: Coercion,
}

impl InputRule {
    pub const fn new(source: &'static str, target: &'static str, coercion: Coercion) -> Self {
        Self {
            source,
            target,
            coercion,
        }
    }
}

/// Apply `rules` in order to a client input.
///
/// `null` is treated as an empty object; any other non-object input is a
/// validation error. Keys no rule mentions pass through untouched.
pub fn normalize_input(rules: &[InputRule], input: Value) -> RunResult<Value> {
    let mut fields = match input {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => return Err(RunError::validation("input", "must be a JSON object")),
    };

    for rule in rules {
        if rule.source != rule.target {
            if let Some(value) = fields.remove(rule.source) {
                fields.entry(rule.target).or_insert(value);
            }
        }

        if let Some(value) = fields.get_mut(rule.target) {
            if !value.is_null() {
                let coerced = coerce(rule.coercion, value.take())
                    .ok_or_else(|| invalid(rule))?;
                *value = coerced;
            }
        }
    }

    Ok(Value::Object(fields))
}

fn invalid(rule: &InputRule) -> RunError {
    let expected = match rule.coercion {
        Coercion::None => "a value",
        Coercion::Integer => "an integer",
        Coercion::Float => "a number",
        Coercion::Boolean => "true or false",
        Coercion::StringList => "a string or list of strings",
    };
    RunError::validation("input", format!("{} must be {}", rule.source, expected))
}

fn coerce(coercion: Coercion, value: Value) -> Option<Value> {
    match coercion {
        Coercion::None => Some(value),
        Coercion::Integer => to_integer(&value).map(Value::from),
        Coercion::Float => to_float(&value)
            .and_then(Number::from_f64)
            .map(Value::Number),
        Coercion::Boolean => to_bool(&value).map(Value::Bool),
        Coercion::StringList => to_string_list(value).map(Value::from),
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_string_list(value: Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
