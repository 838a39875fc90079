//! Completion race coordinator.
//!
//! Owns the per-operation state machine `kicked off -> awaiting -> terminal`.
//! The poll handler and the webhook handler may run concurrently for the
//! same operation with no locking. Correctness rests on read-check-write:
//! every path reads the operation, returns early if it is complete, and
//! finishes through [`OperationStore::complete_operation`], whose winner is
//! the only caller allowed to emit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use switchyard_types::error::{RepositoryError, SignatureFailure, VendorError};
use switchyard_types::operation::{
    EmittedEvent, ExecutionId, Outcome, OutputChannels, PendingOperation, RemoteState,
    RemoteStatus,
};
use switchyard_types::secret::Redacted;
use switchyard_types::webhook::WebhookHeaders;

use crate::repository::correlation::{CorrelationStore, resolve_first};
use crate::repository::operation::OperationStore;
use crate::signature::{SignatureContext, SignatureVerifier};
use crate::vendor::task::TaskIntegration;

use super::emitter::{EmitError, Emitter};
use super::scheduler::{ActionScheduler, POLL_ACTION, PollParams, SchedulerError};

/// Delay before the first poll of an operation found open at startup.
const RESUME_DELAY: Duration = Duration::from_secs(1);

/// Source of "now". Replaceable so deadline logic can be tested.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by kickoff, poll and cancel.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The vendor rejected or garbled the start call. Fails the execution.
    #[error("kickoff failed: {0}")]
    Kickoff(#[source] VendorError),

    #[error("execution {0} already has a pending operation")]
    AlreadyStarted(ExecutionId),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("emit error: {0}")]
    Emit(#[from] EmitError),
}

/// Errors surfaced to the vendor by the inbound webhook handler.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("signature verification failed: {0}")]
    Signature(#[from] SignatureFailure),

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// 400 for a malformed envelope, 403 for signature or secret failures,
    /// 500 for internal failures.
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::Signature(failure) => failure.status_code(),
            WebhookError::MalformedPayload(_) => 400,
            WebhookError::Internal(_) => 500,
        }
    }
}

impl From<RepositoryError> for WebhookError {
    fn from(err: RepositoryError) -> Self {
        WebhookError::Internal(err.to_string())
    }
}

impl From<CompletionError> for WebhookError {
    fn from(err: CompletionError) -> Self {
        WebhookError::Internal(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one poll wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// No operation is recorded for the execution.
    Missing,
    /// The operation was already terminal; nothing was done.
    AlreadyComplete,
    /// Still in flight; another poll was scheduled.
    Rescheduled { status: RemoteStatus },
    /// This poll observed the terminal state and emitted on `channel`.
    Completed { channel: &'static str },
    /// The elapsed-time budget ran out; a failure was emitted on `channel`.
    TimedOut { channel: &'static str },
    /// A concurrent handler completed the operation first.
    Superseded,
}

/// Why a webhook delivery was acknowledged without action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Well-formed, but not an event that finishes an operation.
    FilteredEvent,
    /// No candidate correlation id resolved to an execution.
    Unmatched,
    /// The resolved execution already carries a completion timestamp.
    AlreadyComplete,
    /// A concurrent handler completed the operation first.
    Superseded,
}

/// Result of one webhook delivery. Every variant maps to 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Completed {
        execution_id: ExecutionId,
        channel: &'static str,
    },
    Ignored {
        reason: IgnoreReason,
    },
}

impl WebhookOutcome {
    fn ignored(reason: IgnoreReason) -> Self {
        WebhookOutcome::Ignored { reason }
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Missing,
    AlreadyComplete,
    /// Marked cancelled. `remote_acknowledged` is false when the best-effort
    /// vendor cancel failed.
    Cancelled { remote_acknowledged: bool },
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Poll cadence and elapsed-time budget for one integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSettings {
    pub poll_interval: Duration,
    pub timeout_budget: Duration,
}

impl CompletionSettings {
    pub fn from_secs(poll_interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            timeout_budget: Duration::from_secs(timeout_secs),
        }
    }
}

pub struct CompletionCoordinator<I, S, Sch, E> {
    integration: I,
    store: S,
    scheduler: Sch,
    emitter: E,
    verifier: Arc<dyn SignatureVerifier>,
    settings: CompletionSettings,
    clock: Clock,
}

impl<I, S, Sch, E> CompletionCoordinator<I, S, Sch, E>
where
    I: TaskIntegration,
    S: OperationStore + CorrelationStore,
    Sch: ActionScheduler,
    E: Emitter,
{
    pub fn new(
        integration: I,
        store: S,
        scheduler: Sch,
        emitter: E,
        verifier: Arc<dyn SignatureVerifier>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            integration,
            store,
            scheduler,
            emitter,
            verifier,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn integration_name(&self) -> &str {
        self.integration.name()
    }

    pub fn channels(&self) -> OutputChannels {
        self.integration.channels()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Start the remote operation for `execution_id` and schedule the first
    /// poll. Failures are synchronous. If the operation cannot be correlated
    /// or scheduled after the vendor started it, the local record is removed
    /// and the remote task cancelled on a best-effort basis, so the execution
    /// can be kicked off again.
    pub async fn kickoff(
        &self,
        execution_id: ExecutionId,
        request: &serde_json::Value,
    ) -> Result<PendingOperation, CompletionError> {
        if self.store.get_operation(&execution_id).await?.is_some() {
            return Err(CompletionError::AlreadyStarted(execution_id));
        }

        let kickoff = self
            .integration
            .start_task(request)
            .await
            .map_err(CompletionError::Kickoff)?;

        let operation = PendingOperation {
            execution_id,
            integration: self.integration.name().to_string(),
            correlation_key: self.integration.correlation_key().to_string(),
            correlation_value: kickoff.correlation_value,
            remote_task_id: kickoff.remote_task_id,
            kickoff_time: self.now(),
            timeout_secs: self.settings.timeout_budget.as_secs(),
            poll_interval_secs: self.settings.poll_interval.as_secs(),
            last_known_state: kickoff.initial_state,
            completed_at: None,
        };

        self.store.create_operation(&operation).await?;
        if let Err(e) = self.track(&operation).await {
            self.roll_back(&operation).await;
            return Err(e);
        }

        tracing::info!(
            integration = %operation.integration,
            execution_id = %execution_id,
            remote_task_id = %operation.remote_task_id,
            correlation = %operation.correlation_value,
            "remote operation started"
        );
        Ok(operation)
    }

    /// Handle one poll wake-up.
    ///
    /// A poll that fails schedules the next one anyway; the chain of
    /// wake-ups only ends once the operation is complete or gone.
    pub async fn handle_poll(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<PollOutcome, CompletionError> {
        let result = self.poll_once(execution_id).await;
        if let Err(e) = &result {
            match self.schedule_poll(execution_id).await {
                Ok(()) => tracing::warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "poll failed, rescheduled"
                ),
                Err(retry) => tracing::error!(
                    execution_id = %execution_id,
                    error = %e,
                    reschedule_error = %retry,
                    "poll failed and could not be rescheduled"
                ),
            }
        }
        result
    }

    /// Schedule a poll for every operation of this integration that is still
    /// open in the store. Scheduled wake-ups live in memory only, so the host
    /// runs this once its scheduler is up.
    pub async fn resume_open(&self) -> Result<usize, CompletionError> {
        let open = self.store.list_open(self.integration.name()).await?;
        for operation in &open {
            self.schedule_poll_after(&operation.execution_id, RESUME_DELAY)
                .await?;
        }
        if !open.is_empty() {
            tracing::info!(
                integration = %self.integration.name(),
                count = open.len(),
                "resumed polling for open operations"
            );
        }
        Ok(open.len())
    }

    async fn poll_once(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<PollOutcome, CompletionError> {
        let Some(operation) = self.store.get_operation(execution_id).await? else {
            tracing::warn!(execution_id = %execution_id, "poll for unknown execution");
            return Ok(PollOutcome::Missing);
        };
        if operation.is_complete() {
            return Ok(PollOutcome::AlreadyComplete);
        }

        let now = self.now();
        if operation.is_past_deadline(now) {
            let elapsed = now.signed_duration_since(operation.kickoff_time).num_seconds();
            tracing::warn!(
                execution_id = %execution_id,
                elapsed_secs = elapsed,
                timeout_secs = operation.timeout_secs,
                "remote operation timed out"
            );
            let state = RemoteState::new(RemoteStatus::TimedOut, "deadline_exceeded").with_detail(
                json!({
                    "reason": "timeout",
                    "elapsed_secs": elapsed,
                    "timeout_secs": operation.timeout_secs,
                    "last_known_state": operation.last_known_state.vendor_state,
                }),
            );
            return Ok(match self.finish(&operation, state, None).await? {
                Some(channel) => PollOutcome::TimedOut { channel },
                None => PollOutcome::Superseded,
            });
        }

        match self.integration.task_state(&operation.remote_task_id).await {
            Ok(state) if state.is_terminal() => {
                Ok(match self.finish(&operation, state, None).await? {
                    Some(channel) => PollOutcome::Completed { channel },
                    None => PollOutcome::Superseded,
                })
            }
            Ok(state) => {
                let status = state.status;
                if let Err(e) = self.store.update_state(execution_id, &state).await {
                    tracing::warn!(execution_id = %execution_id, error = %e, "failed to record poll state");
                }
                self.schedule_poll(execution_id).await?;
                tracing::debug!(
                    execution_id = %execution_id,
                    vendor_state = %state.vendor_state,
                    "remote operation still in flight"
                );
                Ok(PollOutcome::Rescheduled { status })
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "transient error polling remote state, rescheduling"
                );
                self.schedule_poll(execution_id).await?;
                Ok(PollOutcome::Rescheduled {
                    status: operation.last_known_state.status,
                })
            }
        }
    }

    /// Handle one inbound webhook delivery for this integration.
    ///
    /// `secret` is the owning registration's stored secret.
    pub async fn handle_webhook(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
        secret: Option<&Redacted>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let ctx = SignatureContext::new(secret).at(self.now());
        if let Err(failure) = self.verifier.verify(headers, body, &ctx) {
            tracing::warn!(
                integration = %self.integration.name(),
                scheme = self.verifier.scheme(),
                error = %failure,
                "rejected webhook signature"
            );
            return Err(failure.into());
        }

        let event = match self.integration.parse_event(body) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(WebhookOutcome::ignored(IgnoreReason::FilteredEvent)),
            Err(message) => return Err(WebhookError::MalformedPayload(message)),
        };

        let Some(provisional) = self.integration.state_for_event(&event) else {
            tracing::debug!(category = %event.category, "webhook category does not finish an operation");
            return Ok(WebhookOutcome::ignored(IgnoreReason::FilteredEvent));
        };

        let key = self.integration.correlation_key();
        let Some((matched, execution_id)) = resolve_first(&self.store, key, &event.candidates).await?
        else {
            tracing::debug!(
                category = %event.category,
                candidates = ?event.candidates,
                "webhook did not correlate to a pending execution"
            );
            return Ok(WebhookOutcome::ignored(IgnoreReason::Unmatched));
        };

        let Some(operation) = self.store.get_operation(&execution_id).await? else {
            return Ok(WebhookOutcome::ignored(IgnoreReason::Unmatched));
        };
        if operation.is_complete() {
            tracing::debug!(execution_id = %execution_id, "duplicate webhook for completed execution");
            return Ok(WebhookOutcome::ignored(IgnoreReason::AlreadyComplete));
        }

        tracing::debug!(
            execution_id = %execution_id,
            correlation = %matched,
            category = %event.category,
            "webhook correlated"
        );

        let state = self.enrich(&operation, provisional).await;
        match self.finish(&operation, state, Some(event.payload)).await? {
            Some(channel) => Ok(WebhookOutcome::Completed {
                execution_id,
                channel,
            }),
            None => Ok(WebhookOutcome::ignored(IgnoreReason::Superseded)),
        }
    }

    /// Best-effort remote cancel, then mark the operation cancelled.
    ///
    /// No output is emitted; the cancelling execution owns that decision.
    /// Polls already scheduled still fire and observe the completed state.
    pub async fn cancel(&self, execution_id: &ExecutionId) -> Result<CancelOutcome, CompletionError> {
        let Some(operation) = self.store.get_operation(execution_id).await? else {
            return Ok(CancelOutcome::Missing);
        };
        if operation.is_complete() {
            return Ok(CancelOutcome::AlreadyComplete);
        }

        let remote_acknowledged = match self.integration.cancel_task(&operation.remote_task_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    remote_task_id = %operation.remote_task_id,
                    error = %e,
                    "remote cancel failed, cancelling locally"
                );
                false
            }
        };

        let state = RemoteState::new(RemoteStatus::Cancelled, "cancelled")
            .with_detail(json!({ "remote_acknowledged": remote_acknowledged }));
        if !self
            .store
            .complete_operation(execution_id, &state, self.now())
            .await?
        {
            return Ok(CancelOutcome::AlreadyComplete);
        }

        tracing::info!(execution_id = %execution_id, remote_acknowledged, "remote operation cancelled");
        Ok(CancelOutcome::Cancelled {
            remote_acknowledged,
        })
    }

    /// Current persisted view of an operation.
    pub async fn status(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<PendingOperation>, CompletionError> {
        Ok(self.store.get_operation(execution_id).await?)
    }

    /// Re-query the vendor for authoritative detail. Only a terminal
    /// read-back replaces the event-derived state.
    async fn enrich(&self, operation: &PendingOperation, provisional: RemoteState) -> RemoteState {
        match self.integration.task_state(&operation.remote_task_id).await {
            Ok(state) if state.is_terminal() => state,
            Ok(state) => {
                tracing::debug!(
                    execution_id = %operation.execution_id,
                    vendor_state = %state.vendor_state,
                    "read-back not yet terminal, keeping event-derived state"
                );
                provisional
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %operation.execution_id,
                    error = %e,
                    "enrichment failed, keeping event-derived state"
                );
                provisional
            }
        }
    }

    /// Conditionally complete the operation and, if this caller won, emit.
    ///
    /// Returns the channel emitted on, or `None` if another handler
    /// completed the operation first.
    async fn finish(
        &self,
        operation: &PendingOperation,
        state: RemoteState,
        event: Option<serde_json::Value>,
    ) -> Result<Option<&'static str>, CompletionError> {
        let completed_at = self.now();
        let won = self
            .store
            .complete_operation(&operation.execution_id, &state, completed_at)
            .await?;
        if !won {
            tracing::debug!(
                execution_id = %operation.execution_id,
                "operation completed concurrently, not emitting"
            );
            return Ok(None);
        }

        let outcome = state.status.outcome().unwrap_or(Outcome::Failure);
        let channel = self.integration.channels().route(outcome);
        let mut payload = json!({
            "execution_id": operation.execution_id,
            "integration": operation.integration,
            "outcome": outcome,
            "status": state.status,
            "vendor_state": state.vendor_state,
            "remote_task_id": operation.remote_task_id,
            "correlation": {
                "key": operation.correlation_key,
                "value": operation.correlation_value,
            },
            "detail": state.detail,
            "started_at": operation.kickoff_time,
            "completed_at": completed_at,
        });
        if let (Some(event), Some(map)) = (event, payload.as_object_mut()) {
            map.insert("event".to_string(), event);
        }

        self.emitter
            .emit(EmittedEvent {
                execution_id: operation.execution_id,
                integration: operation.integration.clone(),
                channel: channel.to_string(),
                payload,
                emitted_at: completed_at,
            })
            .await?;

        tracing::info!(
            execution_id = %operation.execution_id,
            integration = %operation.integration,
            status = %state.status,
            channel,
            "remote operation completed"
        );
        Ok(Some(channel))
    }

    /// Correlate and schedule the first poll of a freshly stored operation.
    async fn track(&self, operation: &PendingOperation) -> Result<(), CompletionError> {
        self.store
            .set_correlation(
                &operation.correlation_key,
                &operation.correlation_value,
                &operation.execution_id,
            )
            .await?;
        self.schedule_poll(&operation.execution_id).await?;
        Ok(())
    }

    /// Undo a kickoff nobody would ever observe.
    async fn roll_back(&self, operation: &PendingOperation) {
        if let Err(e) = self.store.discard_operation(&operation.execution_id).await {
            tracing::error!(
                execution_id = %operation.execution_id,
                error = %e,
                "failed to discard untracked operation"
            );
        }
        if let Err(e) = self.integration.cancel_task(&operation.remote_task_id).await {
            tracing::warn!(
                execution_id = %operation.execution_id,
                remote_task_id = %operation.remote_task_id,
                error = %e,
                "failed to cancel untracked remote task"
            );
        }
    }

    async fn schedule_poll(&self, execution_id: &ExecutionId) -> Result<(), SchedulerError> {
        self.schedule_poll_after(execution_id, self.settings.poll_interval)
            .await
    }

    async fn schedule_poll_after(
        &self,
        execution_id: &ExecutionId,
        delay: Duration,
    ) -> Result<(), SchedulerError> {
        let params = serde_json::to_value(PollParams {
            integration: self.integration.name().to_string(),
            execution_id: *execution_id,
        })
        .map_err(|e| SchedulerError::InvalidParams(e.to_string()))?;
        self.scheduler
            .schedule_action_call(POLL_ACTION, params, delay)
            .await
    }
}
