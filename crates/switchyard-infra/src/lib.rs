//! Infrastructure implementations for Switchyard.
//!
//! Implements the ports defined in `switchyard-core`:
//! - `webhook`: signature verification strategies and the verifier registry
//! - `sqlite`: operations, correlations, registrations and secrets
//! - `scheduler`: one-shot deferred action calls
//! - `emitter`: broadcast emitter for terminal outputs
//! - `integration`: REST clients for the bundled vendors
//! - `config`: TOML configuration loading and validation

pub mod config;
pub mod emitter;
pub mod integration;
pub mod scheduler;
pub mod sqlite;
pub mod webhook;
