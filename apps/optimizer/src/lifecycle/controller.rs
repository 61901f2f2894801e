//! Job lifecycle controller. Drives one optimization task from submission to a
//! terminal state by polling the service on a fixed interval.
//!
//! Every cycle gets a new epoch. Transitions carry the epoch they were computed
//! for and are dropped if the cycle has since ended, been reset or disposed, so
//! a late response can never overwrite newer state. The in-flight submission or poll
//! task is tracked through a single abort handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::lifecycle::result::OptimizationResult;
use crate::lifecycle::state::{LifecycleState, POLL_TIMEOUT_MESSAGE, SERVER_FAILURE_MESSAGE};
use crate::models::optimization::{OptimizationRequest, TaskId, TaskStatus, ValidationError};
use crate::optimize_client::{ApiError, OptimizeApi, SubmittedTask};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between status checks. The first check happens one interval
    /// after the task is accepted.
    pub interval: Duration,
    /// Overall limit on time spent in Processing. `None` polls until the
    /// service reports a terminal status.
    pub deadline: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("An optimization is already in progress")]
    Busy,

    #[error(transparent)]
    Transport(#[from] ApiError),

    #[error("The optimizer has been shut down")]
    Disposed,
}

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("Cannot reset while an optimization is in progress")]
    Busy,

    #[error("The optimizer has been shut down")]
    Disposed,
}

/// What a single status check did to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Service is still working; state unchanged.
    Pending(TaskStatus),
    Completed,
    Failed,
    /// The id is not the live Processing task, or the cycle ended while the
    /// request was in flight. Nothing was applied.
    Stale,
}

struct Cycle {
    epoch: u64,
    inflight: Option<AbortHandle>,
    disposed: bool,
}

impl Cycle {
    fn cancel_inflight(&mut self) {
        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }
    }

    fn is_live(&self, epoch: u64) -> bool {
        !self.disposed && self.epoch == epoch
    }
}

struct Shared {
    api: Arc<dyn OptimizeApi>,
    settings: PollSettings,
    state: watch::Sender<LifecycleState>,
    cycle: Mutex<Cycle>,
}

/// Owns the session's `LifecycleState` and the poll timer that advances it.
/// Dropping the controller disposes it.
pub struct JobLifecycleController {
    shared: Arc<Shared>,
}

impl JobLifecycleController {
    pub fn new(api: Arc<dyn OptimizeApi>, settings: PollSettings) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            shared: Arc::new(Shared {
                api,
                settings,
                state,
                cycle: Mutex::new(Cycle {
                    epoch: 0,
                    inflight: None,
                    disposed: false,
                }),
            }),
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.shared.settings
    }

    pub fn current(&self) -> LifecycleState {
        self.shared.state.borrow().clone()
    }

    /// Update channel for the rendering layer. Each value is a complete state.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.shared.state.subscribe()
    }

    /// Starts a new cycle: Submitting, then Processing on success or Error on
    /// failure. Invalid input is rejected before anything changes.
    ///
    /// The network call runs on its own task, so dropping the returned future
    /// does not strand the lifecycle in Submitting.
    pub async fn submit(&self, request: OptimizationRequest) -> Result<TaskId, SubmitError> {
        request.validate()?;

        let handle = self.shared.begin_cycle(request)?;

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SubmitError::Disposed),
        }
    }

    /// Checks the service once for `task_id` and applies a terminal status.
    /// Transport failures are returned without touching the state.
    pub async fn poll_once(&self, task_id: &TaskId) -> Result<PollOutcome, ApiError> {
        let epoch = {
            let cycle = self.shared.lock();
            if cycle.disposed {
                return Ok(PollOutcome::Stale);
            }
            let state = self.shared.state.borrow();
            if state.task_id() != Some(task_id) {
                return Ok(PollOutcome::Stale);
            }
            cycle.epoch
        };

        self.shared.poll(epoch, task_id).await
    }

    /// Returns a finished lifecycle to Idle.
    pub fn reset(&self) -> Result<(), ResetError> {
        let mut cycle = self.shared.lock();
        if cycle.disposed {
            return Err(ResetError::Disposed);
        }
        let current = self.shared.state.borrow().clone();
        if current.is_busy() {
            return Err(ResetError::Busy);
        }
        if current == LifecycleState::Idle {
            return Ok(());
        }

        cycle.epoch += 1;
        cycle.cancel_inflight();
        info!(from = current.label(), "Lifecycle reset to idle");
        self.shared.state.send_replace(LifecycleState::Idle);
        Ok(())
    }

    /// Cancels the poll timer and any in-flight request. Responses that
    /// arrive afterwards are discarded and no further transitions happen.
    pub fn dispose(&self) {
        let mut cycle = self.shared.lock();
        if cycle.disposed {
            return;
        }
        cycle.disposed = true;
        cycle.epoch += 1;
        cycle.cancel_inflight();
        info!("Lifecycle controller disposed");
    }
}

impl Drop for JobLifecycleController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Cycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.lock().is_live(epoch)
    }

    /// Enters Submitting and spawns the submission under one lock, so the new
    /// cycle's abort handle is in place before the task can race ahead.
    fn begin_cycle(
        self: &Arc<Self>,
        request: OptimizationRequest,
    ) -> Result<tokio::task::JoinHandle<Result<TaskId, SubmitError>>, SubmitError> {
        let mut cycle = self.lock();
        if cycle.disposed {
            return Err(SubmitError::Disposed);
        }
        let from = self.state.borrow().label();
        if self.state.borrow().is_busy() {
            return Err(SubmitError::Busy);
        }

        cycle.cancel_inflight();
        cycle.epoch += 1;
        let epoch = cycle.epoch;

        info!(epoch, from, "Submitting optimization request");
        self.state.send_replace(LifecycleState::Submitting);

        let handle = tokio::spawn(Arc::clone(self).run_submission(epoch, request));
        cycle.inflight = Some(handle.abort_handle());
        Ok(handle)
    }

    /// Applies `next` if `epoch` is still live. Leaving Processing always
    /// cancels the poll timer. Entering a terminal state closes the epoch, so
    /// checks still in flight for this cycle come back stale.
    fn transition(&self, epoch: u64, next: LifecycleState) -> bool {
        let mut cycle = self.lock();
        if !cycle.is_live(epoch) || self.state.borrow().is_terminal() {
            debug!(epoch, to = next.label(), "Dropping stale transition");
            return false;
        }

        let from = self.state.borrow().label();
        let leaving_processing = matches!(
            *self.state.borrow(),
            LifecycleState::Processing { .. }
        );
        if !matches!(next, LifecycleState::Processing { .. }) {
            if leaving_processing {
                cycle.cancel_inflight();
            } else {
                // The submission task is finishing on its own; its caller
                // still awaits the result.
                cycle.inflight = None;
            }
        }

        if next.is_terminal() {
            cycle.epoch += 1;
        }

        info!(epoch, from, to = next.label(), "Lifecycle transition");
        self.state.send_replace(next);
        true
    }

    async fn run_submission(
        self: Arc<Self>,
        epoch: u64,
        request: OptimizationRequest,
    ) -> Result<TaskId, SubmitError> {
        match self.api.submit(&request).await {
            Ok(task) => self.start_processing(epoch, task),
            Err(e) => {
                warn!(epoch, error = %e, "Optimization submit failed");
                self.transition(
                    epoch,
                    LifecycleState::Error {
                        message: e.to_string(),
                    },
                );
                Err(SubmitError::Transport(e))
            }
        }
    }

    /// Enters Processing and arms the poll timer in place of the submission
    /// task's handle.
    fn start_processing(
        self: &Arc<Self>,
        epoch: u64,
        task: SubmittedTask,
    ) -> Result<TaskId, SubmitError> {
        let mut cycle = self.lock();
        if !cycle.is_live(epoch) {
            return Err(SubmitError::Disposed);
        }

        info!(epoch, task_id = %task.task_id, "Optimization accepted; polling for result");
        self.state.send_replace(LifecycleState::Processing {
            task_id: task.task_id.clone(),
            created_at: task.created_at,
        });

        let poller = tokio::spawn(Arc::clone(self).run_polling(epoch, task.task_id.clone()));
        cycle.inflight = Some(poller.abort_handle());
        Ok(task.task_id)
    }

    async fn run_polling(self: Arc<Self>, epoch: u64, task_id: TaskId) {
        let interval = self.settings.interval;
        let started = Instant::now();
        let mut ticker = time::interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.is_live(epoch) {
                return;
            }

            if let Some(deadline) = self.settings.deadline {
                if started.elapsed() >= deadline {
                    warn!(%task_id, ?deadline, "Gave up waiting for optimization result");
                    self.transition(
                        epoch,
                        LifecycleState::Error {
                            message: POLL_TIMEOUT_MESSAGE.to_string(),
                        },
                    );
                    return;
                }
            }

            match self.poll(epoch, &task_id).await {
                Ok(PollOutcome::Pending(status)) => {
                    debug!(%task_id, ?status, "Optimization still running");
                }
                Ok(_) => return,
                Err(e) => {
                    warn!(%task_id, error = %e, "Status check failed; retrying on next tick");
                }
            }
        }
    }

    async fn poll(&self, epoch: u64, task_id: &TaskId) -> Result<PollOutcome, ApiError> {
        let response = self.api.check_status(task_id).await?;
        let status = response.status;

        let outcome = match status {
            TaskStatus::Completed => {
                let result = OptimizationResult::from_response(response);
                if self.transition(epoch, LifecycleState::Completed { result }) {
                    PollOutcome::Completed
                } else {
                    PollOutcome::Stale
                }
            }
            TaskStatus::Failed => {
                let error = LifecycleState::Error {
                    message: SERVER_FAILURE_MESSAGE.to_string(),
                };
                if self.transition(epoch, error) {
                    PollOutcome::Failed
                } else {
                    PollOutcome::Stale
                }
            }
            pending if self.is_live(epoch) => PollOutcome::Pending(pending),
            _ => PollOutcome::Stale,
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::optimization::StatusResponse;

    enum Reply {
        Json(Value),
        Status(u16),
    }

    impl Reply {
        fn status(status: &str) -> Self {
            Reply::Json(json!({ "status": status }))
        }
    }

    /// In-memory service: hands out task ids in order and replays scripted
    /// status responses, answering `processing` once the script runs out.
    #[derive(Default)]
    struct ScriptedApi {
        submit_ids: Mutex<VecDeque<Result<String, u16>>>,
        statuses: Mutex<VecDeque<Reply>>,
        submit_delay: Duration,
        status_delay: Duration,
        submit_calls: AtomicUsize,
        status_calls: AtomicUsize,
        polled_ids: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn new(ids: &[&str], statuses: Vec<Reply>) -> Self {
            Self {
                submit_ids: Mutex::new(ids.iter().map(|id| Ok(id.to_string())).collect()),
                statuses: Mutex::new(statuses.into()),
                ..Self::default()
            }
        }

        fn submit_calls(&self) -> usize {
            self.submit_calls.load(Ordering::SeqCst)
        }

        fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OptimizeApi for ScriptedApi {
        async fn submit(
            &self,
            _request: &OptimizationRequest,
        ) -> Result<SubmittedTask, ApiError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if !self.submit_delay.is_zero() {
                time::sleep(self.submit_delay).await;
            }
            let next = self.submit_ids.lock().unwrap().pop_front().unwrap_or(Err(500));
            match next {
                Ok(id) => Ok(SubmittedTask {
                    task_id: TaskId::new(id).unwrap(),
                    created_at: None,
                }),
                Err(status) => Err(ApiError::Api {
                    status,
                    message: "Internal Server Error".to_string(),
                }),
            }
        }

        async fn check_status(&self, task_id: &TaskId) -> Result<StatusResponse, ApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.polled_ids.lock().unwrap().push(task_id.to_string());
            if !self.status_delay.is_zero() {
                time::sleep(self.status_delay).await;
            }
            let reply = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Reply::status("processing"));
            match reply {
                Reply::Json(body) => Ok(serde_json::from_value(body)?),
                Reply::Status(status) => Err(ApiError::Api {
                    status,
                    message: "Bad Gateway".to_string(),
                }),
            }
        }
    }

    fn controller(api: &Arc<ScriptedApi>) -> JobLifecycleController {
        JobLifecycleController::new(api.clone(), PollSettings::default())
    }

    fn request() -> OptimizationRequest {
        OptimizationRequest::new("Jane Doe, Rust engineer", "Senior Rust engineer, tokio")
    }

    fn processing(id: &str) -> LifecycleState {
        LifecycleState::Processing {
            task_id: TaskId::new(id).unwrap(),
            created_at: None,
        }
    }

    fn completed_reply() -> Reply {
        Reply::Json(json!({
            "status": "completed",
            "relevance_score": 72,
            "optimized_score": 88,
            "tailored_profile": "Backend engineer focused on async Rust",
            "project_suggestions": "[\"a\",\"b\"]",
            "optimized_resume": "Jane Doe\nRust engineer"
        }))
    }

    async fn advance(duration: Duration) {
        time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fields_never_reach_network() {
        let api = Arc::new(ScriptedApi::new(&["task-1"], vec![]));
        let controller = controller(&api);

        let err = controller
            .submit(OptimizationRequest::new("", "jd"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::EmptyResume)));

        let err = controller
            .submit(OptimizationRequest::new("cv", " "))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::EmptyJobDescription)
        ));

        advance(Duration::from_secs(5)).await;
        assert_eq!(api.submit_calls(), 0);
        assert_eq!(api.status_calls(), 0);
        assert_eq!(controller.current(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_enters_processing_with_server_id() {
        let api = Arc::new(ScriptedApi::new(&["task-1"], vec![]));
        let controller = controller(&api);

        let task_id = controller.submit(request()).await.unwrap();

        assert_eq!(task_id.as_str(), "task-1");
        assert_eq!(controller.current(), processing("task-1"));
        assert_eq!(api.submit_calls(), 1);
        // First check waits a full interval.
        assert_eq!(api.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_status_keeps_polling() {
        let api = Arc::new(ScriptedApi::new(
            &["task-1"],
            vec![Reply::status("queued"), Reply::status("processing")],
        ));
        let controller = controller(&api);
        controller.submit(request()).await.unwrap();

        advance(Duration::from_millis(4_100)).await;
        assert_eq!(api.status_calls(), 2);
        assert_eq!(controller.current(), processing("task-1"));

        advance(Duration::from_secs(2)).await;
        assert_eq!(api.status_calls(), 3);
        assert_eq!(controller.current(), processing("task-1"));
        assert!(api.polled_ids.lock().unwrap().iter().all(|id| id == "task-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_captures_payload_once_and_stops_polling() {
        let api = Arc::new(ScriptedApi::new(
            &["task-1"],
            vec![Reply::status("processing"), completed_reply()],
        ));
        let controller = controller(&api);

        let mut rx = controller.subscribe();
        let observer = tokio::spawn(async move {
            let mut completions = 0;
            while rx.changed().await.is_ok() {
                if matches!(*rx.borrow_and_update(), LifecycleState::Completed { .. }) {
                    completions += 1;
                }
            }
            completions
        });

        controller.submit(request()).await.unwrap();
        advance(Duration::from_millis(4_100)).await;

        let LifecycleState::Completed { result } = controller.current() else {
            panic!("expected completed, got {:?}", controller.current());
        };
        assert_eq!(result.relevance_score, Some(72.0));
        assert_eq!(result.optimized_score, Some(88.0));
        assert_eq!(result.project_suggestions, vec!["a", "b"]);
        assert_eq!(result.optimized_resume, "Jane Doe\nRust engineer");
        assert_eq!(api.status_calls(), 2);

        advance(Duration::from_secs(5)).await;
        assert_eq!(api.status_calls(), 2);

        drop(controller);
        assert_eq!(observer.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_terminal_error() {
        let api = Arc::new(ScriptedApi::new(&["task-1"], vec![Reply::status("failed")]));
        let controller = controller(&api);
        controller.submit(request()).await.unwrap();

        advance(Duration::from_millis(2_100)).await;
        assert_eq!(
            controller.current(),
            LifecycleState::Error {
                message: "Optimization failed on the server.".to_string()
            }
        );

        advance(Duration::from_secs(5)).await;
        assert_eq!(api.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_is_terminal_and_surfaced() {
        let api = Arc::new(ScriptedApi::default());
        let controller = controller(&api);

        let err = controller.submit(request()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Transport(ApiError::Api { status: 500, .. })));
        assert_eq!(
            controller.current(),
            LifecycleState::Error {
                message: "Request failed with status code 500: Internal Server Error".to_string()
            }
        );

        advance(Duration::from_secs(5)).await;
        assert_eq!(api.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_transport_error_is_swallowed() {
        let api = Arc::new(ScriptedApi::new(
            &["task-1"],
            vec![Reply::Status(502), completed_reply()],
        ));
        let controller = controller(&api);
        controller.submit(request()).await.unwrap();

        advance(Duration::from_millis(2_100)).await;
        assert_eq!(controller.current(), processing("task-1"));

        advance(Duration::from_secs(2)).await;
        assert!(matches!(controller.current(), LifecycleState::Completed { .. }));
        assert_eq!(api.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_discards_inflight_response() {
        let api = Arc::new(ScriptedApi {
            status_delay: Duration::from_secs(1),
            ..ScriptedApi::new(&["task-1"], vec![completed_reply()])
        });
        let controller = controller(&api);
        controller.submit(request()).await.unwrap();

        // The first check is sent at 2s and answers at 3s.
        advance(Duration::from_millis(2_500)).await;
        assert_eq!(api.status_calls(), 1);
        controller.dispose();

        advance(Duration::from_secs(10)).await;
        assert_eq!(controller.current(), processing("task-1"));
        assert_eq!(api.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let api = Arc::new(ScriptedApi::new(&["task-1"], vec![]));
        let controller = controller(&api);
        let mut rx = controller.subscribe();
        controller.submit(request()).await.unwrap();

        drop(controller);
        advance(Duration::from_secs(10)).await;

        assert_eq!(api.status_calls(), 0);
        assert_eq!(*rx.borrow_and_update(), processing("task-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_submit() {
        let api = Arc::new(ScriptedApi {
            submit_delay: Duration::from_secs(1),
            ..ScriptedApi::new(&["task-1"], vec![])
        });
        let controller = Arc::new(controller(&api));

        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.submit(request()).await })
        };
        advance(Duration::from_millis(500)).await;
        assert_eq!(controller.current(), LifecycleState::Submitting);
        controller.dispose();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, SubmitError::Disposed));

        advance(Duration::from_secs(10)).await;
        assert_eq!(api.status_calls(), 0);
        assert!(matches!(
            controller.submit(request()).await,
            Err(SubmitError::Disposed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_in_error() {
        let api = Arc::new(ScriptedApi::new(&["task-1"], vec![]));
        let controller = JobLifecycleController::new(
            api.clone(),
            PollSettings {
                interval: Duration::from_secs(2),
                deadline: Some(Duration::from_secs(5)),
            },
        );
        controller.submit(request()).await.unwrap();

        advance(Duration::from_millis(5_100)).await;
        assert_eq!(controller.current(), processing("task-1"));

        advance(Duration::from_secs(1)).await;
        assert_eq!(
            controller.current(),
            LifecycleState::Error {
                message: POLL_TIMEOUT_MESSAGE.to_string()
            }
        );
        // Checks at 2s and 4s; the 6s tick hits the deadline instead.
        assert_eq!(api.status_calls(), 2);

        advance(Duration::from_secs(5)).await;
        assert_eq!(api.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_while_busy_is_rejected() {
        let api = Arc::new(ScriptedApi::new(&["task-1", "task-2"], vec![]));
        let controller = controller(&api);
        controller.submit(request()).await.unwrap();

        let err = controller.submit(request()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Busy));
        assert_eq!(api.submit_calls(), 1);
        assert_eq!(controller.current(), processing("task-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmit_after_completion_starts_fresh_cycle() {
        let api = Arc::new(ScriptedApi::new(
            &["task-1", "task-2"],
            vec![completed_reply()],
        ));
        let controller = controller(&api);
        controller.submit(request()).await.unwrap();
        advance(Duration::from_millis(2_100)).await;
        assert!(matches!(controller.current(), LifecycleState::Completed { .. }));

        let task_id = controller.submit(request()).await.unwrap();
        assert_eq!(task_id.as_str(), "task-2");
        assert_eq!(controller.current(), processing("task-2"));

        advance(Duration::from_millis(4_100)).await;
        assert_eq!(api.status_calls(), 3);
        let polled = api.polled_ids.lock().unwrap().clone();
        assert_eq!(polled, vec!["task-1", "task-2", "task-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_rules() {
        let api = Arc::new(ScriptedApi::new(&["task-1"], vec![Reply::status("failed")]));
        let controller = controller(&api);

        assert!(controller.reset().is_ok());
        controller.submit(request()).await.unwrap();
        assert!(matches!(controller.reset(), Err(ResetError::Busy)));

        advance(Duration::from_millis(2_100)).await;
        assert!(matches!(controller.current(), LifecycleState::Error { .. }));

        controller.reset().unwrap();
        assert_eq!(controller.current(), LifecycleState::Idle);

        controller.dispose();
        assert!(matches!(controller.reset(), Err(ResetError::Disposed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_for_other_task_is_stale() {
        let api = Arc::new(ScriptedApi::new(&["task-1"], vec![completed_reply()]));
        let controller = controller(&api);
        controller.submit(request()).await.unwrap();

        let outcome = controller
            .poll_once(&TaskId::new("task-9").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Stale);
        assert_eq!(api.status_calls(), 0);

        let outcome = controller
            .poll_once(&TaskId::new("task-1").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Completed);
        assert!(matches!(controller.current(), LifecycleState::Completed { .. }));

        // The timer was cancelled by the manual completion.
        advance(Duration::from_secs(5)).await;
        assert_eq!(api.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_reports_pending_and_transport_errors() {
        let api = Arc::new(ScriptedApi::new(
            &["task-1"],
            vec![Reply::status("pending"), Reply::Status(503)],
        ));
        let controller = controller(&api);
        let task_id = controller.submit(request()).await.unwrap();

        assert_eq!(
            controller.poll_once(&task_id).await.unwrap(),
            PollOutcome::Pending(TaskStatus::Pending)
        );
        assert!(controller.poll_once(&task_id).await.is_err());
        assert_eq!(controller.current(), processing("task-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_check_racing_timer_cannot_reopen_completed() {
        let api = Arc::new(ScriptedApi {
            status_delay: Duration::from_secs(1),
            ..ScriptedApi::new(
                &["task-1"],
                vec![completed_reply(), Reply::status("failed")],
            )
        });
        let controller = Arc::new(controller(&api));
        let task_id = controller.submit(request()).await.unwrap();

        // Timer check goes out at 2s and answers at 3s; the manual one goes
        // out at 2.5s and answers at 3.5s.
        advance(Duration::from_millis(2_500)).await;
        let manual = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.poll_once(&task_id).await })
        };

        advance(Duration::from_millis(600)).await;
        assert!(matches!(controller.current(), LifecycleState::Completed { .. }));

        let outcome = manual.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Stale);
        assert!(matches!(controller.current(), LifecycleState::Completed { .. }));

        advance(Duration::from_secs(5)).await;
        assert_eq!(api.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_completion_after_deadline_is_discarded() {
        let api = Arc::new(ScriptedApi {
            status_delay: Duration::from_secs(1),
            ..ScriptedApi::new(
                &["task-1"],
                vec![
                    Reply::status("processing"),
                    Reply::status("processing"),
                    completed_reply(),
                ],
            )
        });
        let controller = Arc::new(JobLifecycleController::new(
            api.clone(),
            PollSettings {
                interval: Duration::from_secs(2),
                deadline: Some(Duration::from_secs(5)),
            },
        ));
        let task_id = controller.submit(request()).await.unwrap();

        // Timer checks answer at 3s and 5s; the 6s tick hits the deadline
        // while the manual check sent at 5.5s is still out.
        advance(Duration::from_millis(5_500)).await;
        assert_eq!(api.status_calls(), 2);
        let manual = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.poll_once(&task_id).await })
        };

        advance(Duration::from_millis(600)).await;
        let timed_out = LifecycleState::Error {
            message: POLL_TIMEOUT_MESSAGE.to_string(),
        };
        assert_eq!(controller.current(), timed_out);

        let outcome = manual.await.unwrap().unwrap();
        assert_eq!(outcome, PollOutcome::Stale);
        assert_eq!(controller.current(), timed_out);
        assert_eq!(api.status_calls(), 3);
    }
}
