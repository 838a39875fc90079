//! HTTP host for Switchyard.
//!
//! Vendor webhooks arrive at `/webhooks/{registration_id}`; the operator API
//! lives under `/api/v1/`.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
