//! Typed predicate tree for rule conditions.
//!
//! Conditions are stored as JSON and parsed into this tree once, when a rule
//! is compiled. Leaves compare a single extracted field with a literal; the
//! `all`/`any`/`not` combinators nest arbitrarily.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::super::domain::FieldValues;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Matches every document.
    Always,
    /// The field is present and not null.
    Exists(String),
    Compare(Comparison),
    /// The field was extracted with at least this confidence.
    MinConfidence { field: String, at_least: f32 },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    StartsWith,
    In,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid rule condition: {0}")]
pub struct ConditionParseError(#[from] serde_json::Error);

impl Condition {
    pub fn parse(raw: &Value) -> Result<Self, ConditionParseError> {
        Ok(serde_json::from_value(raw.clone())?)
    }

    pub fn evaluate(&self, fields: &FieldValues) -> bool {
        match self {
            Condition::Always => true,
            Condition::Exists(field) => fields
                .get(field)
                .map(|extracted| !extracted.value.is_null())
                .unwrap_or(false),
            Condition::Compare(comparison) => fields
                .get(&comparison.field)
                .map(|extracted| compare(comparison.op, &extracted.value, &comparison.value))
                .unwrap_or(false),
            Condition::MinConfidence { field, at_least } => fields
                .get(field)
                .and_then(|extracted| extracted.confidence)
                .map(|confidence| confidence >= *at_least)
                .unwrap_or(false),
            Condition::All(conditions) => conditions.iter().all(|c| c.evaluate(fields)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.evaluate(fields)),
            Condition::Not(inner) => !inner.evaluate(fields),
        }
    }

    /// Every field key the condition reads, in tree order.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Always => {}
            Condition::Exists(field) | Condition::MinConfidence { field, .. } => {
                out.push(field.as_str())
            }
            Condition::Compare(comparison) => out.push(comparison.field.as_str()),
            Condition::All(conditions) | Condition::Any(conditions) => {
                for condition in conditions {
                    condition.collect_fields(out);
                }
            }
            Condition::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn compare(op: CompareOp, actual: &Value, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Lt => ordering(actual, expected) == Some(Ordering::Less),
        CompareOp::Lte => matches!(
            ordering(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(
            ordering(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
        CompareOp::StartsWith => match (actual, expected) {
            (Value::String(text), Value::String(prefix)) => {
                text.to_lowercase().starts_with(&prefix.to_lowercase())
            }
            _ => false,
        },
        CompareOp::In => expected
            .as_array()
            .map(|options| options.iter().any(|option| values_equal(actual, option)))
            .unwrap_or(false),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) if a.is_number() || b.is_number() => (x - y).abs() <= f64::EPSILON,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_number() || b.is_number() {
        return as_number(a)?.partial_cmp(&as_number(b)?);
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Numbers, or strings that read as numbers once thousands separators are dropped.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}
