use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lifecycle::result::OptimizationResult;
use crate::models::optimization::TaskId;

pub const SERVER_FAILURE_MESSAGE: &str = "Optimization failed on the server.";
pub const POLL_TIMEOUT_MESSAGE: &str = "Optimization timed out waiting for the server.";

/// The one lifecycle value of a session. Every transition replaces it whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Submitting,
    Processing {
        task_id: TaskId,
        #[serde(skip_serializing_if = "Option::is_none")]
        created_at: Option<DateTime<Utc>>,
    },
    Completed {
        result: OptimizationResult,
    },
    Error {
        message: String,
    },
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Completed { .. } | LifecycleState::Error { .. }
        )
    }

    /// Submitting or Processing: a cycle is running and the form is locked.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            LifecycleState::Submitting | LifecycleState::Processing { .. }
        )
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            LifecycleState::Processing { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Submitting => "submitting",
            LifecycleState::Processing { .. } => "processing",
            LifecycleState::Completed { .. } => "completed",
            LifecycleState::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(LifecycleState::default(), LifecycleState::Idle);
    }

    #[test]
    fn test_terminal_and_busy_are_disjoint() {
        let states = [
            LifecycleState::Idle,
            LifecycleState::Submitting,
            LifecycleState::Processing {
                task_id: TaskId::new("7").unwrap(),
                created_at: None,
            },
            LifecycleState::Error {
                message: SERVER_FAILURE_MESSAGE.to_string(),
            },
        ];
        for state in &states {
            assert!(!(state.is_terminal() && state.is_busy()), "{state:?}");
        }
        assert!(states[1].is_busy());
        assert!(states[2].is_busy());
        assert!(states[3].is_terminal());
        assert!(!states[0].is_busy() && !states[0].is_terminal());
    }

    #[test]
    fn test_processing_serializes_with_status_tag() {
        let state = LifecycleState::Processing {
            task_id: TaskId::new("42").unwrap(),
            created_at: None,
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"status": "processing", "task_id": "42"})
        );
        assert_eq!(state.task_id().map(TaskId::as_str), Some("42"));
    }

    #[test]
    fn test_error_serializes_message() {
        let state = LifecycleState::Error {
            message: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"status": "error", "message": "boom"})
        );
        assert_eq!(state.label(), "error");
    }
}
