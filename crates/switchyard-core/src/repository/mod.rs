//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (switchyard-infra) implements. Every write that can race between the poll
//! and webhook paths is expressed as a conditional write so adapters can
//! implement it atomically.

pub mod correlation;
pub mod operation;
pub mod registration;
pub mod secret;
