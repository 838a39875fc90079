//! Shared webhook subscription reconciliation.
//!
//! Many triggers multiplex onto one physical registration per account:
//! - `merge`: coverage comparison and the widening merge
//! - `reconciler`: idempotent create / update / delete against the vendor
//! - `manager`: trigger reference counting over persisted registrations
//! - `boxed`: type-erased manager for per-integration dispatch

pub mod boxed;
pub mod manager;
pub mod merge;
pub mod reconciler;
