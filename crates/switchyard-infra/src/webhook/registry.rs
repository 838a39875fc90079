//! Verifier registry: integration name -> signature strategy.
//!
//! Strategies are chosen from configuration when integrations are
//! registered at startup, and looked up per inbound request.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use switchyard_core::signature::SignatureVerifier;
use switchyard_types::config::SignatureConfig;

use super::signature::{StaticHeaderVerifier, SvixVerifier, TimestampedHmacVerifier};

/// Build the verifier for a configured signature scheme.
pub fn build_verifier(config: &SignatureConfig, tolerance: Duration) -> Arc<dyn SignatureVerifier> {
    match config {
        SignatureConfig::StaticHeader { header } => Arc::new(StaticHeaderVerifier::new(header)),
        SignatureConfig::TimestampedHmac { header } => {
            Arc::new(TimestampedHmacVerifier::new(header, tolerance))
        }
        SignatureConfig::Svix => Arc::new(SvixVerifier::new(tolerance)),
    }
}

/// Thread-safe registry of per-integration signature verifiers.
///
/// Uses `DashMap` for concurrent read/write access without locking the
/// entire registry.
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: Arc<DashMap<String, Arc<dyn SignatureVerifier>>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the verifier for an integration.
    pub fn register(&self, integration: &str, verifier: Arc<dyn SignatureVerifier>) {
        tracing::info!(integration, scheme = verifier.scheme(), "registered signature verifier");
        self.verifiers.insert(integration.to_string(), verifier);
    }

    /// Build from configuration and register.
    pub fn register_config(
        &self,
        integration: &str,
        config: &SignatureConfig,
        tolerance: Duration,
    ) -> Arc<dyn SignatureVerifier> {
        let verifier = build_verifier(config, tolerance);
        self.register(integration, verifier.clone());
        verifier
    }

    pub fn get(&self, integration: &str) -> Option<Arc<dyn SignatureVerifier>> {
        self.verifiers.get(integration).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}
