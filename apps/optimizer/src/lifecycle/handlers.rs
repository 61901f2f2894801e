//! Axum route handlers for the optimizer page and its JSON API.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::lifecycle::controller::PollOutcome;
use crate::lifecycle::{LifecycleState, ResetError, SubmitError};
use crate::models::optimization::{OptimizationRequest, TaskId};
use crate::render::FormDraft;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OptimizeBody {
    pub resume_text: String,
    pub job_description: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitAccepted {
    pub task_id: TaskId,
}

#[derive(Debug, Serialize)]
pub struct PollReport {
    pub outcome: &'static str,
    pub state: LifecycleState,
}

// ────────────────────────────────────────────────────────────────────────────
// Page handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /
///
/// The form plus the current lifecycle state.
pub async fn handle_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    render_page(&state, None).map(Html)
}

/// POST /optimize
///
/// Form submission. Invalid input re-renders the form with the message;
/// everything else redirects back to the page, which shows the resulting state.
pub async fn handle_form_submit(
    State(state): State<AppState>,
    Form(form): Form<FormDraft>,
) -> Result<Response, AppError> {
    state.set_draft(form.clone());

    match state.controller.submit(build_request(&state, form)).await {
        Ok(task_id) => {
            info!(%task_id, "Optimization started from form");
            Ok(Redirect::to("/").into_response())
        }
        Err(SubmitError::Validation(e)) => {
            let html = render_page(&state, Some(&e.to_string()))?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(html)).into_response())
        }
        Err(SubmitError::Busy | SubmitError::Transport(_)) => Ok(Redirect::to("/").into_response()),
        Err(e) => Err(e.into()),
    }
}

/// POST /reset
pub async fn handle_form_reset(State(state): State<AppState>) -> Result<Redirect, AppError> {
    match state.controller.reset() {
        Ok(()) | Err(ResetError::Busy) => Ok(Redirect::to("/")),
        Err(e) => Err(e.into()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JSON handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/state
pub async fn handle_get_state(State(state): State<AppState>) -> Json<LifecycleState> {
    Json(state.lifecycle())
}

/// POST /api/poll
///
/// Checks the running task immediately instead of waiting for the next tick.
pub async fn handle_api_poll(State(state): State<AppState>) -> Result<Json<PollReport>, AppError> {
    let task_id = state
        .lifecycle()
        .task_id()
        .cloned()
        .ok_or_else(|| AppError::Conflict("No optimization is in progress".to_string()))?;

    let outcome = state
        .controller
        .poll_once(&task_id)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let outcome = match outcome {
        PollOutcome::Pending(_) => "pending",
        PollOutcome::Completed => "completed",
        PollOutcome::Failed => "failed",
        PollOutcome::Stale => "stale",
    };

    Ok(Json(PollReport {
        outcome,
        state: state.controller.current(),
    }))
}

/// POST /api/optimize
///
/// Returns once the service has accepted the task; poll `/api/state` for the result.
pub async fn handle_api_submit(
    State(state): State<AppState>,
    Json(body): Json<OptimizeBody>,
) -> Result<(StatusCode, Json<SubmitAccepted>), AppError> {
    let form = FormDraft {
        resume_text: body.resume_text,
        job_description: body.job_description,
    };
    state.set_draft(form.clone());

    let task_id = state.controller.submit(build_request(&state, form)).await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitAccepted { task_id })))
}

/// POST /api/reset
pub async fn handle_api_reset(
    State(state): State<AppState>,
) -> Result<Json<LifecycleState>, AppError> {
    state.controller.reset()?;
    Ok(Json(state.controller.current()))
}

fn build_request(state: &AppState, form: FormDraft) -> OptimizationRequest {
    OptimizationRequest::new(form.resume_text, form.job_description)
        .with_user_id(state.config.user_id.clone())
}

fn render_page(state: &AppState, form_error: Option<&str>) -> Result<String, AppError> {
    let refresh_secs = state.controller.settings().interval.as_secs_f64().ceil() as u64;
    state
        .renderer
        .render_page(
            &state.lifecycle(),
            &state.draft(),
            form_error,
            refresh_secs,
        )
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("Failed to render page")))
}
