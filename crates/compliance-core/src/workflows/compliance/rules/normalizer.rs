use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Built-in value normalizers a normalization rule can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationKind {
    DateFormat,
    Currency,
    Percentage,
    TextNormalization,
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%B %d %Y",
];

impl NormalizationKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DateFormat => "date_format",
            Self::Currency => "currency",
            Self::Percentage => "percentage",
            Self::TextNormalization => "text_normalization",
        }
    }

    /// Canonical form of `raw`, or `None` when it cannot be read.
    pub fn normalize(self, raw: &Value) -> Option<Value> {
        match self {
            Self::DateFormat => normalize_date(raw.as_str()?).map(Value::String),
            Self::Currency => match raw {
                Value::Number(_) => Some(raw.clone()),
                Value::String(text) => parse_currency(text).and_then(number),
                _ => None,
            },
            Self::Percentage => match raw {
                Value::Number(n) => n.as_f64().map(percent_fraction).and_then(number),
                Value::String(text) => parse_percentage(text).and_then(number),
                _ => None,
            },
            Self::TextNormalization => raw.as_str().map(|text| Value::String(normalize_text(text))),
        }
    }
}

/// Put the normalizer's result under `value` when the rule output leaves it unset.
pub(crate) fn fill_normalized(kind: NormalizationKind, raw: &Value, output: &mut Value) {
    let Some(normalized) = kind.normalize(raw) else {
        return;
    };

    match output {
        Value::Null => *output = serde_json::json!({ "value": normalized }),
        Value::Object(map) => {
            let slot = map.entry("value").or_insert(Value::Null);
            if slot.is_null() {
                *slot = normalized;
            }
        }
        _ => {}
    }
}

pub(crate) fn normalize_text(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

fn normalize_date(text: &str) -> Option<String> {
    let trimmed = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn parse_currency(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let negative = (trimmed.starts_with('(') && trimmed.ends_with(')')) || trimmed.starts_with('-');
    let digits: String = trimmed
        .trim_start_matches("USD")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let amount: f64 = digits.parse().ok()?;
    Some(if negative { -amount } else { amount })
}

fn parse_percentage(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    match trimmed.strip_suffix('%') {
        Some(number) => number.trim().parse::<f64>().ok().map(|value| value / 100.0),
        None => trimmed.parse::<f64>().ok().map(percent_fraction),
    }
}

/// Bare numbers above 1 are read as whole percentages.
fn percent_fraction(value: f64) -> f64 {
    if value.abs() > 1.0 {
        value / 100.0
    } else {
        value
    }
}

fn number(value: f64) -> Option<Value> {
    Number::from_f64(value).map(Value::Number)
}
