//! Switchyard CLI and HTTP host entry point.
//!
//! Binary name: `switchyard`
//!
//! Parses CLI arguments, loads configuration, wires integrations against the
//! SQLite store, then either validates and exits or serves webhooks and the
//! operator API until Ctrl+C.

mod cli;
mod dispatch;
mod http;
mod state;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use switchyard_infra::config::{api_key_env_name, load_config, validate};
use switchyard_infra::sqlite::pool::{default_database_url, ensure_parent_dir, DatabasePool};
use switchyard_observe::tracing_setup::{
    filter_for_verbosity, init_tracing, shutdown_tracing, TracingOptions,
};
use switchyard_types::config::SwitchyardConfig;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_filter = filter_for_verbosity(cli.verbose).to_string();

    match cli.command {
        Commands::Serve {
            config,
            listen,
            json_logs,
            otel,
        } => {
            init_tracing(TracingOptions {
                json: json_logs,
                otel,
                default_filter,
            })
            .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

            let result = serve(&config, listen).await;
            shutdown_tracing();
            result?;
        }

        Commands::CheckConfig { config } => {
            init_tracing(TracingOptions {
                default_filter,
                ..TracingOptions::default()
            })
            .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

            check_config(&config).await?;
        }
    }

    Ok(())
}

async fn load_validated(path: &Path) -> anyhow::Result<SwitchyardConfig> {
    let config = load_config(path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

async fn open_database(config: &SwitchyardConfig) -> anyhow::Result<DatabasePool> {
    let url = config
        .database_url
        .clone()
        .unwrap_or_else(default_database_url);
    ensure_parent_dir(&url)
        .await
        .with_context(|| format!("creating data directory for {url}"))?;
    DatabasePool::new(&url)
        .await
        .with_context(|| format!("opening database {url}"))
}

async fn serve(config_path: &Path, listen: Option<String>) -> anyhow::Result<()> {
    let mut config = load_validated(config_path).await?;
    if let Some(listen) = listen {
        config.listen_addr = listen;
    }

    let pool = open_database(&config).await?;
    let (state, actions) = AppState::build(&config, pool.clone(), |name| std::env::var(name).ok())?;
    state.scheduler.start().await?;
    let resumed = state.resume_open_operations().await?;
    if resumed > 0 {
        tracing::info!(resumed, "polling resumed for open operations");
    }

    let cancel = CancellationToken::new();
    let dispatcher = tokio::spawn(dispatch::run_dispatcher(
        state.clone(),
        actions,
        cancel.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    println!(
        "  {} Switchyard listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{}", config.listen_addr)).cyan()
    );
    println!(
        "  {} webhooks: {}/webhooks/{{registration_id}}",
        console::style("↪").dim(),
        config.public_base_url.trim_end_matches('/')
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state.clone());
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cancel.cancel();
    if let Err(e) = dispatcher.await {
        tracing::warn!(error = %e, "dispatcher task ended abnormally");
    }
    state.scheduler.stop().await?;
    pool.close().await;
    served?;

    println!("\n  Server stopped.");
    Ok(())
}

async fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = load_validated(path).await?;

    println!();
    println!(
        "  {} {} is valid",
        console::style("✓").green(),
        console::style(path.display()).cyan()
    );
    println!("  listen: {}", config.listen_addr);
    println!("  public base URL: {}", config.public_base_url);
    println!();

    for integration in &config.integrations {
        let key_env = api_key_env_name(integration);
        let key_present = std::env::var(&key_env).is_ok_and(|v| !v.trim().is_empty());
        let mark = if key_present {
            console::style("✓").green()
        } else {
            console::style("✗").red()
        };
        println!(
            "  {} {} ({}) {} [api key: ${}]",
            mark,
            console::style(&integration.name).bold(),
            integration.kind,
            integration.base_url,
            key_env
        );
    }
    if config.integrations.is_empty() {
        println!("  {}", console::style("no integrations configured").dim());
    }
    println!();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
