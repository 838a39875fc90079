use serde::{Deserialize, Serialize};

use std::fmt;

/// A wrapper that redacts secret values in Debug and Display output.
///
/// Webhook secrets travel through this type so they can never leak into
/// logs or into structures that are compared or printed. The actual value
/// is accessible via `.expose()`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The secret as raw bytes (HMAC key material).
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// An empty secret is treated the same as a missing one.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Redacted(\"***\")")
    }
}

impl fmt::Display for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}
