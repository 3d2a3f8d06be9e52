// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Augur
//!
//! The `augur` binary hosts the prediction engine behind an HTTP API so a tool
//! interceptor can ask whether a call will succeed before making it, and
//! report how it went afterwards.
//!
//! ## Commands
//!
//! - `augur serve` - Run the HTTP daemon until Ctrl+C / SIGTERM
//! - `augur config show|validate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use augur_cli::commands::{self, ConfigCommand};
use augur_cli::server;
use augur_core::domain::config::{AugurConfig, LogFormat};

/// Augur - tool-call outcome prediction
#[derive(Parser)]
#[command(name = "augur")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "AUGUR_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true, env = "AUGUR_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prediction daemon
    #[command(name = "serve")]
    Serve {
        /// HTTP API host (overrides server.bind_address)
        #[arg(long, env = "AUGUR_HOST")]
        host: Option<String>,

        /// HTTP API port (overrides server.port)
        #[arg(long, env = "AUGUR_PORT")]
        port: Option<u16>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = AugurConfig::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            if let Some(host) = host {
                config.server.bind_address = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate().context("Configuration validation failed")?;

            let level = cli
                .log_level
                .unwrap_or_else(|| config.observability.log_level.clone());
            init_logging(&level, config.observability.log_format)?;

            if let Some(addr) = config.observability.metrics_listen {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .install()
                    .context("Failed to install Prometheus exporter")?;
                info!(%addr, "Prometheus metrics exporter listening");
            }

            server::start_server(config).await
        }
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
