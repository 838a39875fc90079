//! CLI command definitions for the `switchyard` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const DEFAULT_CONFIG_PATH: &str = "switchyard.toml";

/// Webhook subscription and async completion host.
#[derive(Parser)]
#[command(name = "switchyard", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Detailed output (-v for debug on switchyard crates, -vv for everything).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP host and the scheduled-action dispatcher.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(long, env = "SWITCHYARD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the configured listen address.
        #[arg(long)]
        listen: Option<String>,

        /// Emit JSON log lines.
        #[arg(long)]
        json_logs: bool,

        /// Export spans to stdout via OpenTelemetry.
        #[arg(long)]
        otel: bool,
    },

    /// Load and validate the configuration, then exit.
    CheckConfig {
        #[arg(long, env = "SWITCHYARD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::parse_from([
            "switchyard",
            "-vv",
            "serve",
            "--config",
            "/etc/switchyard.toml",
            "--listen",
            "0.0.0.0:9000",
            "--json-logs",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Serve {
                config,
                listen,
                json_logs,
                otel,
            } => {
                assert_eq!(config, PathBuf::from("/etc/switchyard.toml"));
                assert_eq!(listen.as_deref(), Some("0.0.0.0:9000"));
                assert!(json_logs);
                assert!(!otel);
            }
            Commands::CheckConfig { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::parse_from(["switchyard", "check-config", "--config", "x.toml"]);
        assert!(matches!(cli.command, Commands::CheckConfig { config } if config == PathBuf::from("x.toml")));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }
}
