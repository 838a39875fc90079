//! Business logic and port traits for Switchyard.
//!
//! The core crate owns the two cross-cutting protocols:
//! - shared webhook subscription reconciliation (`subscription`)
//! - asynchronous completion tracking (`completion`)
//!
//! Storage, vendor APIs, scheduling, emission and signature verification are
//! expressed as traits here and implemented in `switchyard-infra`. The core
//! crate never depends on a specific storage or HTTP technology.

pub mod completion;
pub mod repository;
pub mod signature;
pub mod subscription;
pub mod vendor;
