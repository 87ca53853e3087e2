//! Turns the model's free-form reply for one batch into exactly one
//! [`ClassificationResult`] per submitted article.
//!
//! Nothing in here fails outward: a reply that cannot be read degrades to
//! `Absent` for the affected positions, and the returned list always has the
//! length of the batch so position `i` still belongs to article `i`.

use crate::types::{ClassificationPayload, ClassificationResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const REQUIRED_KEYS: [&str; 4] = ["is_selected", "quality_score", "relevance_score", "reason"];
pub const DEFAULT_CATEGORY: &str = "other";

const MIN_SCORE: f64 = 1.0;
const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
enum DecodeError {
    #[error("no JSON array found in reply")]
    MissingArray,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON array, got {0}")]
    NotAnArray(&'static str),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
enum ElementError {
    #[error("element is {0}, not an object")]
    NotAnObject(&'static str),

    #[error("missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("field '{field}' has an unusable value: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Decode a raw reply for a batch of `expected_count` articles.
pub fn decode_batch(raw: &str, expected_count: usize) -> Vec<ClassificationResult> {
    let elements = match parse_array(raw) {
        Ok(elements) => elements,
        Err(e) => {
            warn!("Could not decode batch of {} articles: {}", expected_count, e);
            return vec![ClassificationResult::Absent; expected_count];
        }
    };

    if elements.len() != expected_count {
        warn!(
            "Reply contains {} results for {} articles, reconciling by position",
            elements.len(),
            expected_count
        );
    }

    let mut results: Vec<ClassificationResult> = elements
        .iter()
        .take(expected_count)
        .enumerate()
        .map(|(index, element)| match decode_element(element) {
            Ok(payload) => ClassificationResult::Present(payload),
            Err(e) => {
                debug!("Result {} is unusable: {}", index + 1, e);
                ClassificationResult::Absent
            }
        })
        .collect();

    results.resize(expected_count, ClassificationResult::Absent);
    results
}

fn parse_array(raw: &str) -> Result<Vec<Value>, DecodeError> {
    let start = raw.find('[').ok_or(DecodeError::MissingArray)?;
    let end = raw.rfind(']').ok_or(DecodeError::MissingArray)?;
    if end < start {
        return Err(DecodeError::MissingArray);
    }

    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    match value {
        Value::Array(elements) => Ok(elements),
        other => Err(DecodeError::NotAnArray(kind_of(&other))),
    }
}

fn decode_element(element: &Value) -> Result<ClassificationPayload, ElementError> {
    let object = element
        .as_object()
        .ok_or_else(|| ElementError::NotAnObject(kind_of(element)))?;

    for key in REQUIRED_KEYS {
        if !object.contains_key(key) {
            return Err(ElementError::MissingKey(key));
        }
    }

    Ok(ClassificationPayload {
        is_selected: read_flag(&object["is_selected"])?,
        quality_score: read_score("quality_score", &object["quality_score"])?,
        relevance_score: read_score("relevance_score", &object["relevance_score"])?,
        reason: read_reason(&object["reason"])?,
        key_points: read_key_points(object),
        category: read_category(object),
    })
}

fn read_flag(value: &Value) -> Result<bool, ElementError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) if text.trim().eq_ignore_ascii_case("true") => Ok(true),
        Value::String(text) if text.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(invalid("is_selected", other)),
    }
}

/// Numbers, and strings holding a number, are clamped into the score range.
///
/// Numbers beyond f64 range read as infinite and clamp to the nearest bound.
fn read_score(field: &'static str, value: &Value) -> Result<f64, ElementError> {
    let score = match value {
        Value::Number(number) => number
            .as_f64()
            .or_else(|| number.to_string().parse::<f64>().ok()),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    score
        .filter(|score| !score.is_nan())
        .map(|score| score.clamp(MIN_SCORE, MAX_SCORE))
        .ok_or_else(|| invalid(field, value))
}

fn read_reason(value: &Value) -> Result<String, ElementError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Null => Err(invalid("reason", value)),
        other => Ok(other.to_string()),
    }
}

fn read_key_points(object: &Map<String, Value>) -> Vec<String> {
    match object.get("key_points") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(points)) => points.iter().map(as_text).collect(),
        Some(other) => vec![as_text(other)],
    }
}

fn read_category(object: &Map<String, Value>) -> String {
    match object.get("category") {
        None | Some(Value::Null) => DEFAULT_CATEGORY.to_string(),
        Some(Value::String(text)) if text.trim().is_empty() => DEFAULT_CATEGORY.to_string(),
        Some(other) => as_text(other),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn invalid(field: &'static str, value: &Value) -> ElementError {
    ElementError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
