use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// `user_id` sent when the operator has not configured one.
pub const DEFAULT_USER_ID: &str = "anonymous";

/// Resume + job description pair submitted for optimization.
/// Consumed by `submit`, so it cannot change after it has been sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationRequest {
    pub resume_text: String,
    pub job_description: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("resume_text cannot be empty")]
    EmptyResume,

    #[error("job_description cannot be empty")]
    EmptyJobDescription,
}

impl OptimizationRequest {
    pub fn new(resume_text: impl Into<String>, job_description: impl Into<String>) -> Self {
        Self {
            resume_text: resume_text.into(),
            job_description: job_description.into(),
            user_id: DEFAULT_USER_ID.to_string(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Both texts must contain something other than whitespace.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.resume_text.trim().is_empty() {
            return Err(ValidationError::EmptyResume);
        }
        if self.job_description.trim().is_empty() {
            return Err(ValidationError::EmptyJobDescription);
        }
        Ok(())
    }
}

/// Opaque, server-assigned identifier of one optimization task. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Returns `None` for an empty or whitespace-only id.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The service keys tasks by integer, but the id is treated as opaque text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTaskId {
    Text(String),
    Integer(i64),
}

impl RawTaskId {
    pub fn into_task_id(self) -> Option<TaskId> {
        match self {
            RawTaskId::Text(text) => TaskId::new(text),
            RawTaskId::Integer(n) => TaskId::new(n.to_string()),
        }
    }
}

impl fmt::Display for RawTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawTaskId::Text(text) => write!(f, "{text:?}"),
            RawTaskId::Integer(n) => write!(f, "{n}"),
        }
    }
}

/// Server-side progress of a task. Only `Completed` and `Failed` end polling;
/// anything else, including values this client does not know, means "not yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Body of `POST /api/optimize/`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub id: RawTaskId,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of `GET /api/optimize/{id}`. Result fields are only populated once
/// `status` is `completed`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: TaskStatus,
    pub relevance_score: Option<f64>,
    pub optimized_score: Option<f64>,
    pub tailored_profile: Option<String>,
    /// Either a JSON array or a string holding a JSON array.
    pub project_suggestions: Option<Value>,
    /// Same encoding as `project_suggestions`.
    pub missing_keywords: Option<Value>,
    pub optimized_resume: Option<String>,
}

/// The service emits RFC 3339 or naive (implicitly UTC) timestamps depending on
/// its database; anything unparseable is dropped rather than failing the submit.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|text| parse_timestamp(&text)))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
