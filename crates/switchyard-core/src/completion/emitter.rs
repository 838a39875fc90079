//! Event emitter port.
//!
//! Terminal delivery of an operation's payload to one named output channel.
//! The emitter carries no deduplication; at-most-once comes from the
//! conditional completion write that precedes every emit.

use thiserror::Error;

use switchyard_types::operation::EmittedEvent;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("emitter closed: {0}")]
    Closed(String),

    #[error("unknown output channel '{0}'")]
    UnknownChannel(String),
}

pub trait Emitter: Send + Sync {
    fn emit(
        &self,
        event: EmittedEvent,
    ) -> impl std::future::Future<Output = Result<(), EmitError>> + Send;
}
