//! One-shot action scheduler backed by `tokio-cron-scheduler`.
//!
//! Each `schedule_action_call` adds a one-shot job. When it fires, the action
//! is pushed onto an mpsc channel that the host drains and dispatches. Jobs
//! live in memory only; on startup the host re-arms a poll for every
//! operation still open in the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};

use switchyard_core::completion::scheduler::{ActionScheduler, ScheduledAction, SchedulerError};

/// Delivers due actions on an unbounded channel.
#[derive(Clone)]
pub struct CronActionScheduler {
    inner: Arc<RwLock<Option<JobScheduler>>>,
    sender: mpsc::UnboundedSender<ScheduledAction>,
}

impl CronActionScheduler {
    /// Create a scheduler (not yet started) and the receiver of due actions.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScheduledAction>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Self {
            inner: Arc::new(RwLock::new(None)),
            sender,
        };
        (scheduler, receiver)
    }

    /// Start the underlying job scheduler. Must be called before scheduling.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;

        scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;

        let mut inner = self.inner.write().await;
        *inner = Some(scheduler);

        tracing::info!("action scheduler started");
        Ok(())
    }

    /// Stop the scheduler, dropping any jobs that have not fired yet.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        if let Some(mut scheduler) = inner.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;
            tracing::info!("action scheduler stopped");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

impl ActionScheduler for CronActionScheduler {
    async fn schedule_action_call(
        &self,
        name: &str,
        params: serde_json::Value,
        delay: Duration,
    ) -> Result<(), SchedulerError> {
        let inner = self.inner.read().await;
        let scheduler = inner
            .as_ref()
            .ok_or_else(|| SchedulerError::Unavailable("scheduler not started".to_string()))?;

        let action = ScheduledAction {
            name: name.to_string(),
            params,
        };
        let sender = self.sender.clone();

        let job = Job::new_one_shot_async(delay, move |_uuid, _lock| {
            let sender = sender.clone();
            let action = action.clone();
            Box::pin(async move {
                tracing::debug!(action = %action.name, "scheduled action due");
                if sender.send(action).is_err() {
                    tracing::warn!("action receiver dropped, wake-up lost");
                }
            })
        })
        .map_err(|e| SchedulerError::Schedule {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        let job_id = scheduler.add(job).await.map_err(|e| SchedulerError::Schedule {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(action = name, %job_id, delay_ms = delay.as_millis() as u64, "action scheduled");
        Ok(())
    }
}
