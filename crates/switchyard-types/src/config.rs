//! Configuration types for Switchyard.
//!
//! `SwitchyardConfig` represents the top-level `switchyard.toml` that
//! declares the HTTP host, persistence and the integrations to load.

use serde::{Deserialize, Serialize};

/// Default header carrying the shared secret for static-header webhooks.
pub const DEFAULT_SECRET_HEADER: &str = "X-Switchyard-Secret";

/// Default header carrying a `t=<unix>,v1=<hex>` signature.
pub const DEFAULT_HMAC_HEADER: &str = "X-Switchyard-Signature";

/// Top-level configuration.
///
/// All fields have defaults so an empty file (or no file at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    /// Socket address the HTTP host binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Externally reachable base URL used to build webhook URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// SQLite URL. When absent, the data directory default is used.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Replay window for timestamped signatures, in seconds.
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: u64,

    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_signature_tolerance_secs() -> u64 {
    300
}

impl Default for SwitchyardConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_base_url: default_public_base_url(),
            database_url: None,
            signature_tolerance_secs: default_signature_tolerance_secs(),
            integrations: Vec::new(),
        }
    }
}

impl SwitchyardConfig {
    pub fn integration(&self, name: &str) -> Option<&IntegrationConfig> {
        self.integrations.iter().find(|i| i.name == name)
    }
}

/// Which bundled vendor client backs an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Deployment platform (spaces, deployments, server tasks).
    Deploy,
    /// Sandboxed command execution with Svix-signed webhooks.
    Sandbox,
}

impl std::fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationKind::Deploy => write!(f, "deploy"),
            IntegrationKind::Sandbox => write!(f, "sandbox"),
        }
    }
}

/// Signature strategy for an integration's inbound webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum SignatureConfig {
    StaticHeader {
        #[serde(default = "default_secret_header")]
        header: String,
    },
    TimestampedHmac {
        #[serde(default = "default_hmac_header")]
        header: String,
    },
    Svix,
}

fn default_secret_header() -> String {
    DEFAULT_SECRET_HEADER.to_string()
}

fn default_hmac_header() -> String {
    DEFAULT_HMAC_HEADER.to_string()
}

/// One `[[integrations]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Unique name; also the path segment in the HTTP API.
    pub name: String,
    pub kind: IntegrationKind,
    /// Vendor API base URL.
    pub base_url: String,
    /// Environment variable holding the vendor API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Vendor-side scope (space or account id).
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overrides the kind's default signature scheme.
    #[serde(default)]
    pub signature: Option<SignatureConfig>,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    3600
}

impl IntegrationConfig {
    /// The configured signature scheme, or the kind's default.
    pub fn signature_scheme(&self) -> SignatureConfig {
        match (&self.signature, self.kind) {
            (Some(sig), _) => sig.clone(),
            (None, IntegrationKind::Deploy) => SignatureConfig::StaticHeader {
                header: default_secret_header(),
            },
            (None, IntegrationKind::Sandbox) => SignatureConfig::Svix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = SwitchyardConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:8787");
        assert_eq!(config.signature_tolerance_secs, 300);
        assert!(config.database_url.is_none());
        assert!(config.integrations.is_empty());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: SwitchyardConfig = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8787");
        assert_eq!(config.public_base_url, "http://127.0.0.1:8787");
    }

    #[test]
    fn test_config_deserialize_integrations() {
        let toml_str = r#"
public_base_url = "https://hooks.example.com"

[[integrations]]
name = "octo"
kind = "deploy"
base_url = "https://octo.example.com"
api_key_env = "OCTO_API_KEY"
scope_id = "Spaces-1"
poll_interval_secs = 10

[[integrations]]
name = "sandbox"
kind = "sandbox"
base_url = "https://sandbox.example.com"
timeout_secs = 600

[integrations.signature]
scheme = "timestamped_hmac"
"#;
        let config: SwitchyardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.integrations.len(), 2);

        let octo = config.integration("octo").unwrap();
        assert_eq!(octo.kind, IntegrationKind::Deploy);
        assert_eq!(octo.poll_interval_secs, 10);
        assert_eq!(octo.timeout_secs, 3600);
        assert_eq!(
            octo.signature_scheme(),
            SignatureConfig::StaticHeader {
                header: DEFAULT_SECRET_HEADER.to_string()
            }
        );

        let sandbox = config.integration("sandbox").unwrap();
        assert_eq!(sandbox.poll_interval_secs, 30);
        assert_eq!(sandbox.timeout_secs, 600);
        assert_eq!(
            sandbox.signature_scheme(),
            SignatureConfig::TimestampedHmac {
                header: DEFAULT_HMAC_HEADER.to_string()
            }
        );
    }

    #[test]
    fn test_sandbox_defaults_to_svix() {
        let integration = IntegrationConfig {
            name: "sb".into(),
            kind: IntegrationKind::Sandbox,
            base_url: "http://localhost".into(),
            api_key_env: None,
            scope_id: None,
            poll_interval_secs: 30,
            timeout_secs: 3600,
            signature: None,
        };
        assert_eq!(integration.signature_scheme(), SignatureConfig::Svix);
    }
}
