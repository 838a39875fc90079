//! HTTP request handlers.

pub mod operation;
pub mod subscription;
pub mod webhook;

use crate::http::error::AppError;
use crate::state::{AppState, IntegrationHandle};

/// Look up a configured integration or 404.
pub(crate) fn integration_handle<'a>(
    state: &'a AppState,
    name: &str,
) -> Result<&'a IntegrationHandle, AppError> {
    state
        .integration(name)
        .ok_or_else(|| AppError::NotFound(format!("integration '{name}' is not configured")))
}
