//! Deferred action scheduling port.
//!
//! The coordinator never blocks waiting on a remote task. It asks the host
//! to call an action back later; each callback is a standalone unit of work
//! with all state externalized in the operation store.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use switchyard_types::operation::ExecutionId;

/// Action name for poll wake-ups.
pub const POLL_ACTION: &str = "poll";

/// A due action delivered back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub name: String,
    pub params: serde_json::Value,
}

impl ScheduledAction {
    /// Decode the params of a [`POLL_ACTION`].
    pub fn poll_params(&self) -> Result<PollParams, SchedulerError> {
        serde_json::from_value(self.params.clone())
            .map_err(|e| SchedulerError::InvalidParams(e.to_string()))
    }
}

/// Params carried by a poll wake-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollParams {
    pub integration: String,
    pub execution_id: ExecutionId,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    #[error("failed to schedule action '{name}': {message}")]
    Schedule { name: String, message: String },

    #[error("invalid action params: {0}")]
    InvalidParams(String),
}

/// Deferred, at-least-once wake-up: "run this action after `delay`".
pub trait ActionScheduler: Send + Sync {
    fn schedule_action_call(
        &self,
        name: &str,
        params: serde_json::Value,
        delay: Duration,
    ) -> impl std::future::Future<Output = Result<(), SchedulerError>> + Send;
}
