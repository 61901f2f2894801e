use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::config::Config;
use crate::lifecycle::{JobLifecycleController, LifecycleState};
use crate::render::{FormDraft, PageRenderer};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The session's single lifecycle. Disposed on shutdown.
    pub controller: Arc<JobLifecycleController>,
    /// Rendering side of the controller's update channel.
    pub updates: watch::Receiver<LifecycleState>,
    pub renderer: Arc<PageRenderer>,
    /// Text last entered in the form, echoed back on every render.
    pub draft: Arc<RwLock<FormDraft>>,
    pub config: Config,
}

impl AppState {
    pub fn new(controller: JobLifecycleController, renderer: PageRenderer, config: Config) -> Self {
        Self {
            updates: controller.subscribe(),
            controller: Arc::new(controller),
            renderer: Arc::new(renderer),
            draft: Arc::new(RwLock::new(FormDraft::default())),
            config,
        }
    }

    /// Latest lifecycle value, cloned so no lock outlives the call.
    pub fn lifecycle(&self) -> LifecycleState {
        self.updates.borrow().clone()
    }

    pub fn draft(&self) -> FormDraft {
        self.draft
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_draft(&self, draft: FormDraft) {
        *self.draft.write().unwrap_or_else(PoisonError::into_inner) = draft;
    }
}
