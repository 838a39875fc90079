use thiserror::Error;

/// Errors returned by vendor REST calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VendorError {
    #[error("remote object not found: {0}")]
    NotFound(String),

    #[error("vendor API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed vendor response: {0}")]
    MalformedResponse(String),
}

impl VendorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, VendorError::NotFound(_))
    }
}

/// The specific defect found while verifying an inbound webhook signature.
///
/// Each variant maps to an HTTP status via [`SignatureFailure::status_code`]:
/// envelope defects are 400, authentication defects are 403.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureFailure {
    #[error("missing signature header '{0}'")]
    MissingHeader(String),

    #[error("no webhook secret is stored for this registration")]
    MissingSecret,

    #[error("malformed signature header '{0}'")]
    MalformedHeader(String),

    #[error("failed to decode signature: {0}")]
    Decode(String),

    #[error("stored webhook secret is unusable: {0}")]
    InvalidSecret(String),

    #[error("invalid signature timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("signature mismatch")]
    Mismatch,

    #[error("signature timestamp is {skew_secs}s from now (tolerance {tolerance_secs}s)")]
    StaleTimestamp { skew_secs: i64, tolerance_secs: u64 },
}

impl SignatureFailure {
    pub fn status_code(&self) -> u16 {
        match self {
            SignatureFailure::MalformedHeader(_)
            | SignatureFailure::Decode(_)
            | SignatureFailure::InvalidTimestamp(_) => 400,
            SignatureFailure::MissingHeader(_)
            | SignatureFailure::MissingSecret
            | SignatureFailure::InvalidSecret(_)
            | SignatureFailure::Mismatch
            | SignatureFailure::StaleTimestamp { .. } => 403,
        }
    }
}

/// Errors related to repository (storage) operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("environment variable '{0}' is not set")]
    MissingEnv(String),
}
