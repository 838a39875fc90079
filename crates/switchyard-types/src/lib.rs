//! Shared domain types for Switchyard.
//!
//! This crate contains the types shared by every layer: webhook subscription
//! requests and the physical registrations they multiplex onto, pending
//! remote operations and their observed states, inbound webhook headers,
//! redacted secrets, configuration, and the error enums.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod operation;
pub mod secret;
pub mod subscription;
pub mod webhook;
