//! Signature verifier port.
//!
//! One strategy per integration, selected at registration time. All
//! strategies report the specific defect so callers can map it to a status
//! code.

use chrono::{DateTime, Utc};

use switchyard_types::error::SignatureFailure;
use switchyard_types::secret::Redacted;
use switchyard_types::webhook::WebhookHeaders;

/// Per-request verification inputs, derived from the owning registration.
#[derive(Debug, Clone, Copy)]
pub struct SignatureContext<'a> {
    /// The registration's stored secret, if any.
    pub secret: Option<&'a Redacted>,
    /// Reference time for replay-window checks.
    pub now: DateTime<Utc>,
}

impl<'a> SignatureContext<'a> {
    pub fn new(secret: Option<&'a Redacted>) -> Self {
        Self {
            secret,
            now: Utc::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// The secret, treating blank as missing.
    pub fn require_secret(&self) -> Result<&'a Redacted, SignatureFailure> {
        match self.secret {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(SignatureFailure::MissingSecret),
        }
    }
}

/// Verifies an inbound webhook against the registration's secret.
///
/// Synchronous and object-safe: verifiers are stored as
/// `Arc<dyn SignatureVerifier>` in a registry keyed by integration.
pub trait SignatureVerifier: Send + Sync {
    /// Short scheme name for logs (`static_header`, `svix`, ...).
    fn scheme(&self) -> &'static str;

    fn verify(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
        ctx: &SignatureContext<'_>,
    ) -> Result<(), SignatureFailure>;
}
