//! Optimize client: the only place that talks to the remote optimization service.
//!
//! Two calls exist: one submission per cycle and a status check per poll tick.
//! Neither is retried here; the lifecycle controller decides what a failure means.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, Url};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::models::optimization::{
    OptimizationRequest, StatusResponse, SubmitResponse, TaskId,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Could not reach the optimization service: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status code {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response from the optimization service: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("The optimization service returned an invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("Invalid optimization service URL '{0}'")]
    InvalidBaseUrl(String),
}

/// FastAPI error bodies look like `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
struct ServiceError {
    detail: serde_json::Value,
}

/// A task accepted by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTask {
    pub task_id: TaskId,
    pub created_at: Option<DateTime<Utc>>,
}

/// The remote operations the lifecycle controller depends on.
#[async_trait]
pub trait OptimizeApi: Send + Sync {
    /// `POST /optimize/`
    async fn submit(&self, request: &OptimizationRequest) -> Result<SubmittedTask, ApiError>;

    /// `GET /optimize/{id}`
    async fn check_status(&self, task_id: &TaskId) -> Result<StatusResponse, ApiError>;
}

/// reqwest-backed client for the optimization service.
#[derive(Clone)]
pub struct OptimizeClient {
    client: Client,
    base_url: Url,
}

impl OptimizeClient {
    /// `base_url` is the service's API root, e.g. `http://localhost:8000/api`.
    /// Only a connect timeout is applied; a status check may take as long as
    /// the service needs.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl OptimizeApi for OptimizeClient {
    async fn submit(&self, request: &OptimizationRequest) -> Result<SubmittedTask, ApiError> {
        // Trailing slash matters: the service mounts the route at `/optimize/`.
        let url = self.endpoint(&["optimize", ""])?;
        let response = self.client.post(url).json(request).send().await?;
        let body: SubmitResponse = read_json(response).await?;

        let raw_id = body.id.to_string();
        let task_id = body
            .id
            .into_task_id()
            .ok_or(ApiError::InvalidTaskId(raw_id))?;

        debug!(task_id = %task_id, status = ?body.status, "Optimization submitted");

        Ok(SubmittedTask {
            task_id,
            created_at: body.created_at,
        })
    }

    async fn check_status(&self, task_id: &TaskId) -> Result<StatusResponse, ApiError> {
        let url = self.endpoint(&["optimize", task_id.as_str()])?;
        let response = self.client.get(url).send().await?;
        let body: StatusResponse = read_json(response).await?;

        debug!(task_id = %task_id, status = ?body.status, "Status checked");

        Ok(body)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ServiceError>(&body)
            .map(|e| match e.detail {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            })
            .ok()
            .filter(|message| !message.is_empty())
            .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
        return Err(ApiError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}
