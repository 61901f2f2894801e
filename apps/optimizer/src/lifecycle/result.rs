//! Completed-task payload and normalization of the list-valued fields.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::optimization::StatusResponse;

/// A list field that could not be turned into strings. Attached to the result
/// instead of failing completion; the field is rendered as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("could not decode {field}: {message}")]
pub struct ResultDecodeError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub relevance_score: Option<f64>,
    pub optimized_score: Option<f64>,
    pub tailored_profile: Option<String>,
    pub project_suggestions: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub optimized_resume: String,
    pub decode_errors: Vec<ResultDecodeError>,
}

impl OptimizationResult {
    /// Builds the result from a `completed` status response.
    pub fn from_response(response: StatusResponse) -> Self {
        let mut decode_errors = Vec::new();

        let project_suggestions =
            match decode_string_list("project_suggestions", response.project_suggestions) {
                Ok(items) => items,
                Err(e) => {
                    warn!("{e}");
                    decode_errors.push(e);
                    Vec::new()
                }
            };

        let missing_keywords =
            match decode_string_list("missing_keywords", response.missing_keywords) {
                Ok(items) => items,
                Err(e) => {
                    warn!("{e}");
                    decode_errors.push(e);
                    Vec::new()
                }
            };

        Self {
            relevance_score: response.relevance_score,
            optimized_score: response.optimized_score,
            tailored_profile: response
                .tailored_profile
                .filter(|profile| !profile.trim().is_empty()),
            project_suggestions,
            missing_keywords,
            optimized_resume: response.optimized_resume.unwrap_or_default(),
            decode_errors,
        }
    }

    /// Points gained by the optimized resume, when both scores are present.
    pub fn score_gain(&self) -> Option<f64> {
        Some(self.optimized_score? - self.relevance_score?)
    }
}

/// Normalizes a field that arrives either as a JSON array of strings or as a
/// string containing one. The string form is parsed exactly once, so a
/// double-encoded payload is an error rather than being unwrapped again.
pub fn decode_string_list(
    field: &'static str,
    raw: Option<Value>,
) -> Result<Vec<String>, ResultDecodeError> {
    let error = |message: String| ResultDecodeError { field, message };

    let items = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(Value::String(encoded)) => {
            if encoded.trim().is_empty() {
                return Ok(Vec::new());
            }
            match serde_json::from_str::<Value>(&encoded) {
                Ok(Value::Array(items)) => items,
                Ok(other) => {
                    return Err(error(format!(
                        "expected a JSON array, found {}",
                        json_kind(&other)
                    )))
                }
                Err(e) => return Err(error(e.to_string())),
            }
        }
        Some(other) => {
            return Err(error(format!(
                "expected an array or JSON string, found {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::String(text) => Ok(text),
            other => Err(error(format!(
                "item {idx} is {}, not a string",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
