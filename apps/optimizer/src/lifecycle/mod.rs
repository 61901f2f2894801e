// Submission/polling lifecycle for one optimization task.
// All traffic to the optimization service goes through optimize_client.

pub mod controller;
pub mod handlers;
pub mod result;
pub mod state;

pub use controller::{JobLifecycleController, PollSettings, ResetError, SubmitError};
pub use state::LifecycleState;
