//! Broadcast emitter for terminal operation outputs.

use tokio::sync::broadcast;

use switchyard_core::completion::emitter::{EmitError, Emitter};
use switchyard_types::operation::EmittedEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Publishes every emitted event on a `tokio::sync::broadcast` bus.
///
/// Emitting with no subscribers is not an error: the event is logged and
/// dropped. No deduplication happens here.
#[derive(Clone)]
pub struct BroadcastEmitter {
    sender: broadcast::Sender<EmittedEvent>,
}

impl BroadcastEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EmittedEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter for BroadcastEmitter {
    async fn emit(&self, event: EmittedEvent) -> Result<(), EmitError> {
        tracing::info!(
            execution_id = %event.execution_id,
            integration = %event.integration,
            channel = %event.channel,
            "operation output emitted"
        );
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::trace!(receivers, "emission delivered");
            }
            Err(_) => {
                tracing::debug!("no emission subscribers");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use switchyard_types::operation::{ExecutionId, SUCCESS_CHANNEL};

    fn event() -> EmittedEvent {
        EmittedEvent {
            execution_id: ExecutionId::new(),
            integration: "deploy".to_string(),
            channel: SUCCESS_CHANNEL.to_string(),
            payload: serde_json::json!({"status": "succeeded"}),
            emitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_each_emission() {
        let emitter = BroadcastEmitter::new();
        let mut a = emitter.subscribe();
        let mut b = emitter.subscribe();

        let sent = event();
        emitter.emit(sent.clone()).await.unwrap();

        assert_eq!(a.recv().await.unwrap().execution_id, sent.execution_id);
        assert_eq!(b.recv().await.unwrap().channel, SUCCESS_CHANNEL);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_succeeds() {
        let emitter = BroadcastEmitter::default();
        emitter.emit(event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_emitter_does_not_deduplicate() {
        let emitter = BroadcastEmitter::with_capacity(4);
        let mut rx = emitter.subscribe();
        let sent = event();
        emitter.emit(sent.clone()).await.unwrap();
        emitter.emit(sent.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().execution_id, sent.execution_id);
        assert_eq!(rx.recv().await.unwrap().execution_id, sent.execution_id);
    }
}
