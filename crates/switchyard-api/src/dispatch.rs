//! Scheduled-action dispatcher.
//!
//! Drains due actions from the scheduler channel and routes each one to the
//! owning integration. Every action runs on its own task; a slow vendor poll
//! never holds up other wake-ups.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use switchyard_core::completion::coordinator::PollOutcome;
use switchyard_core::completion::scheduler::{ScheduledAction, POLL_ACTION};

use crate::state::AppState;

/// Run until `cancel` fires or the scheduler side of the channel closes.
pub async fn run_dispatcher(
    state: AppState,
    mut actions: mpsc::UnboundedReceiver<ScheduledAction>,
    cancel: CancellationToken,
) {
    tracing::info!("action dispatcher started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            action = actions.recv() => match action {
                Some(action) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        dispatch_action(&state, action).await;
                    });
                }
                None => break,
            },
        }
    }
    tracing::info!("action dispatcher stopped");
}

/// Execute one due action.
///
/// A failed poll has already scheduled its successor inside the
/// coordinator, so the error is only logged here.
pub async fn dispatch_action(state: &AppState, action: ScheduledAction) -> Option<PollOutcome> {
    if action.name != POLL_ACTION {
        tracing::warn!(action = %action.name, "unknown scheduled action");
        return None;
    }

    let params = match action.poll_params() {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "dropping poll with invalid params");
            return None;
        }
    };

    let Some(handle) = state.integration(&params.integration) else {
        tracing::warn!(integration = %params.integration, "poll for unknown integration");
        return None;
    };

    match handle.completion.handle_poll(&params.execution_id).await {
        Ok(outcome) => {
            tracing::debug!(
                execution_id = %params.execution_id,
                integration = %params.integration,
                ?outcome,
                "poll handled"
            );
            Some(outcome)
        }
        Err(e) => {
            tracing::error!(
                execution_id = %params.execution_id,
                integration = %params.integration,
                error = %e,
                "poll failed"
            );
            None
        }
    }
}
