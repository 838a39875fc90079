//! Inbound webhook verification.

pub mod registry;
pub mod signature;
