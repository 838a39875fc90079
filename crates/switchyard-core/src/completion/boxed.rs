//! BoxCompletionHandler -- object-safe dynamic dispatch wrapper for
//! [`CompletionCoordinator`].
//!
//! Coordinators are generic over their integration and adapters, so the
//! host keeps one type-erased handler per configured integration and routes
//! kickoff, poll, resume, webhook and cancel calls to it by name.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use switchyard_types::operation::{ExecutionId, OutputChannels, PendingOperation};
use switchyard_types::secret::Redacted;
use switchyard_types::webhook::WebhookHeaders;

use crate::repository::correlation::CorrelationStore;
use crate::repository::operation::OperationStore;
use crate::vendor::task::TaskIntegration;

use super::coordinator::{
    CancelOutcome, CompletionCoordinator, CompletionError, PollOutcome, WebhookError,
    WebhookOutcome,
};
use super::emitter::Emitter;
use super::scheduler::ActionScheduler;

/// Object-safe version of [`CompletionCoordinator`]'s public operations.
pub trait CompletionHandlerDyn: Send + Sync {
    fn integration_name(&self) -> &str;

    fn channels(&self) -> OutputChannels;

    fn kickoff_boxed<'a>(
        &'a self,
        execution_id: ExecutionId,
        request: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<PendingOperation, CompletionError>>;

    fn handle_poll_boxed<'a>(
        &'a self,
        execution_id: &'a ExecutionId,
    ) -> BoxFuture<'a, Result<PollOutcome, CompletionError>>;

    fn resume_open_boxed(&self) -> BoxFuture<'_, Result<usize, CompletionError>>;

    fn handle_webhook_boxed<'a>(
        &'a self,
        headers: &'a WebhookHeaders,
        body: &'a [u8],
        secret: Option<&'a Redacted>,
    ) -> BoxFuture<'a, Result<WebhookOutcome, WebhookError>>;

    fn cancel_boxed<'a>(
        &'a self,
        execution_id: &'a ExecutionId,
    ) -> BoxFuture<'a, Result<CancelOutcome, CompletionError>>;

    fn status_boxed<'a>(
        &'a self,
        execution_id: &'a ExecutionId,
    ) -> BoxFuture<'a, Result<Option<PendingOperation>, CompletionError>>;
}

impl<I, S, Sch, E> CompletionHandlerDyn for CompletionCoordinator<I, S, Sch, E>
where
    I: TaskIntegration,
    S: OperationStore + CorrelationStore,
    Sch: ActionScheduler,
    E: Emitter,
{
    fn integration_name(&self) -> &str {
        CompletionCoordinator::integration_name(self)
    }

    fn channels(&self) -> OutputChannels {
        CompletionCoordinator::channels(self)
    }

    fn kickoff_boxed<'a>(
        &'a self,
        execution_id: ExecutionId,
        request: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<PendingOperation, CompletionError>> {
        Box::pin(self.kickoff(execution_id, request))
    }

    fn handle_poll_boxed<'a>(
        &'a self,
        execution_id: &'a ExecutionId,
    ) -> BoxFuture<'a, Result<PollOutcome, CompletionError>> {
        Box::pin(self.handle_poll(execution_id))
    }

    fn resume_open_boxed(&self) -> BoxFuture<'_, Result<usize, CompletionError>> {
        Box::pin(self.resume_open())
    }

    fn handle_webhook_boxed<'a>(
        &'a self,
        headers: &'a WebhookHeaders,
        body: &'a [u8],
        secret: Option<&'a Redacted>,
    ) -> BoxFuture<'a, Result<WebhookOutcome, WebhookError>> {
        Box::pin(self.handle_webhook(headers, body, secret))
    }

    fn cancel_boxed<'a>(
        &'a self,
        execution_id: &'a ExecutionId,
    ) -> BoxFuture<'a, Result<CancelOutcome, CompletionError>> {
        Box::pin(self.cancel(execution_id))
    }

    fn status_boxed<'a>(
        &'a self,
        execution_id: &'a ExecutionId,
    ) -> BoxFuture<'a, Result<Option<PendingOperation>, CompletionError>> {
        Box::pin(self.status(execution_id))
    }
}

/// Type-erased, cheaply cloneable completion handler.
#[derive(Clone)]
pub struct BoxCompletionHandler {
    inner: Arc<dyn CompletionHandlerDyn>,
}

impl BoxCompletionHandler {
    pub fn new<I, S, Sch, E>(coordinator: CompletionCoordinator<I, S, Sch, E>) -> Self
    where
        I: TaskIntegration + 'static,
        S: OperationStore + CorrelationStore + 'static,
        Sch: ActionScheduler + 'static,
        E: Emitter + 'static,
    {
        Self {
            inner: Arc::new(coordinator),
        }
    }

    pub fn integration_name(&self) -> &str {
        self.inner.integration_name()
    }

    pub fn channels(&self) -> OutputChannels {
        self.inner.channels()
    }

    pub async fn kickoff(
        &self,
        execution_id: ExecutionId,
        request: &serde_json::Value,
    ) -> Result<PendingOperation, CompletionError> {
        self.inner.kickoff_boxed(execution_id, request).await
    }

    pub async fn handle_poll(&self, execution_id: &ExecutionId) -> Result<PollOutcome, CompletionError> {
        self.inner.handle_poll_boxed(execution_id).await
    }

    /// Schedule polls for operations left open by a previous run.
    pub async fn resume_open(&self) -> Result<usize, CompletionError> {
        self.inner.resume_open_boxed().await
    }

    pub async fn handle_webhook(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
        secret: Option<&Redacted>,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.inner.handle_webhook_boxed(headers, body, secret).await
    }

    pub async fn cancel(&self, execution_id: &ExecutionId) -> Result<CancelOutcome, CompletionError> {
        self.inner.cancel_boxed(execution_id).await
    }

    pub async fn status(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<PendingOperation>, CompletionError> {
        self.inner.status_boxed(execution_id).await
    }
}
