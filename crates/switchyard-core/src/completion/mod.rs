//! Asynchronous completion tracking.
//!
//! A long-running remote operation is started synchronously and finished
//! later by whichever of the poll fallback or the webhook callback first
//! observes a terminal state. Both paths share one conditional write on the
//! persisted operation, which is what makes emission at-most-once.

pub mod boxed;
pub mod coordinator;
pub mod emitter;
pub mod scheduler;
