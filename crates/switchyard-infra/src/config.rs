//! Configuration loader for Switchyard.
//!
//! Reads `switchyard.toml` and deserializes it into [`SwitchyardConfig`].
//! A missing file yields the defaults. An unreadable or unparsable file is an
//! error: configuration problems surface at startup and are never retried.

use std::collections::HashSet;
use std::path::Path;

use secrecy::SecretString;

use switchyard_types::config::{IntegrationConfig, SwitchyardConfig};
use switchyard_types::error::ConfigError;

/// Load configuration from `path`.
pub async fn load_config(path: &Path) -> Result<SwitchyardConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return Ok(SwitchyardConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    toml::from_str::<SwitchyardConfig>(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Reject configurations that cannot run.
pub fn validate(config: &SwitchyardConfig) -> Result<(), ConfigError> {
    if config.signature_tolerance_secs == 0 {
        return Err(ConfigError::Invalid(
            "signature_tolerance_secs must be greater than zero".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for integration in &config.integrations {
        if integration.name.trim().is_empty() {
            return Err(ConfigError::Invalid("integration name must not be empty".to_string()));
        }
        if !seen.insert(integration.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate integration name '{}'",
                integration.name
            )));
        }
        if integration.poll_interval_secs == 0 || integration.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "integration '{}': poll_interval_secs and timeout_secs must be greater than zero",
                integration.name
            )));
        }
        if i64::try_from(integration.timeout_secs).is_err() {
            return Err(ConfigError::Invalid(format!(
                "integration '{}': timeout_secs ({}) is out of range",
                integration.name, integration.timeout_secs
            )));
        }
        if integration.poll_interval_secs > integration.timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "integration '{}': poll_interval_secs ({}) exceeds timeout_secs ({})",
                integration.name, integration.poll_interval_secs, integration.timeout_secs
            )));
        }
    }
    Ok(())
}

/// Environment variable holding an integration's API key.
///
/// Defaults to `<NAME>_API_KEY` with the name upper-cased and dashes replaced.
pub fn api_key_env_name(config: &IntegrationConfig) -> String {
    config.api_key_env.clone().unwrap_or_else(|| {
        format!("{}_API_KEY", config.name.to_uppercase().replace('-', "_"))
    })
}

/// Read an integration's API key from the process environment.
pub fn resolve_api_key(config: &IntegrationConfig) -> Result<SecretString, ConfigError> {
    resolve_api_key_with(config, |name| std::env::var(name).ok())
}

/// Read an integration's API key through `lookup`.
pub fn resolve_api_key_with(
    config: &IntegrationConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let name = api_key_env_name(config);
    match lookup(&name) {
        Some(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}
