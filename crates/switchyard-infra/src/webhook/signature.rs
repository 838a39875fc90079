//! Webhook signature verification strategies.
//!
//! Provides three interchangeable [`SignatureVerifier`] implementations:
//! - `StaticHeaderVerifier` -- a header carries the shared secret verbatim
//! - `TimestampedHmacVerifier` -- `t=<unix>,v1=<hex>` over `timestamp || body`
//! - `SvixVerifier` -- base64 HMAC over `id.timestamp.body` with multiple
//!   candidate signatures and a replay window
//!
//! All comparisons are constant-time.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use switchyard_core::signature::{SignatureContext, SignatureVerifier};
use switchyard_types::error::SignatureFailure;
use switchyard_types::webhook::WebhookHeaders;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Prefix marking a base64-encoded Svix signing key.
pub const SVIX_SECRET_PREFIX: &str = "whsec_";

const SVIX_ID_HEADERS: &[&str] = &["svix-id", "webhook-id"];
const SVIX_TIMESTAMP_HEADERS: &[&str] = &["svix-timestamp", "webhook-timestamp"];
const SVIX_SIGNATURE_HEADERS: &[&str] = &["svix-signature", "webhook-signature"];

// ---------------------------------------------------------------------------
// Static header
// ---------------------------------------------------------------------------

/// Compares a request header to the stored secret.
///
/// An optional `Bearer ` prefix on the header value is ignored.
#[derive(Debug, Clone)]
pub struct StaticHeaderVerifier {
    header: String,
}

impl StaticHeaderVerifier {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl SignatureVerifier for StaticHeaderVerifier {
    fn scheme(&self) -> &'static str {
        "static_header"
    }

    fn verify(
        &self,
        headers: &WebhookHeaders,
        _body: &[u8],
        ctx: &SignatureContext<'_>,
    ) -> Result<(), SignatureFailure> {
        let secret = ctx.require_secret()?;
        let provided = headers
            .first_of(&[self.header.as_str()])
            .ok_or_else(|| SignatureFailure::MissingHeader(self.header.clone()))?;
        let token = provided.strip_prefix("Bearer ").unwrap_or(provided);

        if constant_time_eq(secret.as_bytes(), token.as_bytes()) {
            Ok(())
        } else {
            Err(SignatureFailure::Mismatch)
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamped HMAC
// ---------------------------------------------------------------------------

/// `HMAC_SHA256(secret, timestamp || body)` carried as `t=<unix>,v1=<hex>`.
///
/// Several `v1=` entries may be present (secret rotation); any match passes.
#[derive(Debug, Clone)]
pub struct TimestampedHmacVerifier {
    header: String,
    tolerance: Duration,
}

impl TimestampedHmacVerifier {
    pub fn new(header: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            header: header.into(),
            tolerance,
        }
    }
}

impl SignatureVerifier for TimestampedHmacVerifier {
    fn scheme(&self) -> &'static str {
        "timestamped_hmac"
    }

    fn verify(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
        ctx: &SignatureContext<'_>,
    ) -> Result<(), SignatureFailure> {
        let secret = ctx.require_secret()?;
        let value = headers
            .first_of(&[self.header.as_str()])
            .ok_or_else(|| SignatureFailure::MissingHeader(self.header.clone()))?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in value.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = Some(t),
                Some(("v1", sig)) => signatures.push(sig),
                _ => {}
            }
        }
        let (Some(timestamp), false) = (timestamp, signatures.is_empty()) else {
            return Err(SignatureFailure::MalformedHeader(self.header.clone()));
        };
        let unix = parse_timestamp(timestamp)?;

        let expected = compute_hmac_sha256(secret.as_bytes(), &[timestamp.as_bytes(), body])?;
        // Undecodable candidates are skipped; Decode only if none decodes.
        let decoded: Vec<Vec<u8>> = signatures
            .iter()
            .filter_map(|candidate| hex_decode(candidate).ok())
            .collect();
        if decoded.is_empty() {
            return Err(SignatureFailure::Decode(format!(
                "no valid hex signature in '{}'",
                self.header
            )));
        }
        let matched = decoded
            .iter()
            .fold(false, |matched, candidate| matched | constant_time_eq(&expected, candidate));
        if !matched {
            return Err(SignatureFailure::Mismatch);
        }

        check_tolerance(unix, ctx.now, self.tolerance)
    }
}

// ---------------------------------------------------------------------------
// Svix-style
// ---------------------------------------------------------------------------

/// Svix-style multi-field signed-content HMAC.
///
/// Signed content is `id + "." + timestamp + "." + body`. The key is the
/// base64-decoded remainder of a `whsec_`-prefixed secret, otherwise the raw
/// secret. The signature header holds space-separated candidates, each
/// optionally prefixed with `v1,`. A matching signature with a timestamp
/// outside the tolerance window still fails.
#[derive(Debug, Clone)]
pub struct SvixVerifier {
    tolerance: Duration,
}

impl SvixVerifier {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }
}

impl SignatureVerifier for SvixVerifier {
    fn scheme(&self) -> &'static str {
        "svix"
    }

    fn verify(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
        ctx: &SignatureContext<'_>,
    ) -> Result<(), SignatureFailure> {
        let secret = ctx.require_secret()?;
        let id = headers
            .first_of(SVIX_ID_HEADERS)
            .ok_or_else(|| SignatureFailure::MissingHeader(SVIX_ID_HEADERS[0].to_string()))?;
        let timestamp = headers
            .first_of(SVIX_TIMESTAMP_HEADERS)
            .ok_or_else(|| SignatureFailure::MissingHeader(SVIX_TIMESTAMP_HEADERS[0].to_string()))?;
        let signatures = headers
            .first_of(SVIX_SIGNATURE_HEADERS)
            .ok_or_else(|| SignatureFailure::MissingHeader(SVIX_SIGNATURE_HEADERS[0].to_string()))?;

        let unix = parse_timestamp(timestamp)?;
        let key = svix_key(secret.expose())?;
        let expected = STANDARD.encode(compute_hmac_sha256(
            &key,
            &[id.as_bytes(), b".", timestamp.as_bytes(), b".", body],
        )?);

        let matched = signatures
            .split_whitespace()
            .map(|candidate| candidate.strip_prefix("v1,").unwrap_or(candidate))
            .fold(false, |acc, candidate| {
                acc | constant_time_eq(expected.as_bytes(), candidate.as_bytes())
            });
        if !matched {
            return Err(SignatureFailure::Mismatch);
        }

        check_tolerance(unix, ctx.now, self.tolerance)
    }
}

/// Resolve the HMAC key from a stored Svix secret.
fn svix_key(secret: &str) -> Result<Vec<u8>, SignatureFailure> {
    match secret.strip_prefix(SVIX_SECRET_PREFIX) {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map_err(|e| SignatureFailure::InvalidSecret(format!("invalid base64 key: {e}"))),
        None => Ok(secret.as_bytes().to_vec()),
    }
}

// ---------------------------------------------------------------------------
// Signing helpers (outbound test vectors and local tooling)
// ---------------------------------------------------------------------------

/// Build a `t=<unix>,v1=<hex>` header value.
pub fn sign_timestamped(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<String, SignatureFailure> {
    let ts = timestamp.to_string();
    let mac = compute_hmac_sha256(secret, &[ts.as_bytes(), body])?;
    Ok(format!("t={ts},v1={}", hex_encode(&mac)))
}

/// Build a `v1,<base64>` Svix signature for `secret` (raw or `whsec_`).
pub fn sign_svix(secret: &str, id: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureFailure> {
    let key = svix_key(secret)?;
    let ts = timestamp.to_string();
    let mac = compute_hmac_sha256(&key, &[id.as_bytes(), b".", ts.as_bytes(), b".", body])?;
    Ok(format!("v1,{}", STANDARD.encode(mac)))
}

/// Compute HMAC-SHA256 and return hex-encoded signature.
pub fn compute_hmac_sha256_hex(secret: &[u8], body: &[u8]) -> Result<String, SignatureFailure> {
    Ok(hex_encode(&compute_hmac_sha256(secret, &[body])?))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// HMAC-SHA256 over the concatenation of `parts`.
fn compute_hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, SignatureFailure> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| SignatureFailure::InvalidSecret(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

fn parse_timestamp(value: &str) -> Result<i64, SignatureFailure> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| SignatureFailure::InvalidTimestamp(value.to_string()))
}

fn check_tolerance(unix: i64, now: DateTime<Utc>, tolerance: Duration) -> Result<(), SignatureFailure> {
    let skew = now.timestamp().saturating_sub(unix).saturating_abs();
    let tolerance_secs = tolerance.as_secs();
    if skew as u64 > tolerance_secs {
        return Err(SignatureFailure::StaleTimestamp {
            skew_secs: skew,
            tolerance_secs,
        });
    }
    Ok(())
}

/// Decode a hex string to bytes.
fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

/// Encode bytes to a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time byte comparison (XOR-based).
///
/// Returns true if and only if `a == b`. Time taken is independent of
/// how many bytes match.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
