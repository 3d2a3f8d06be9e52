// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use augur_core::domain::config::AugurConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file, env overrides and defaults merged)
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AUGUR_CONFIG_PATH: {}",
            std::env::var("AUGUR_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./augur-config.yaml");
        println!();
    }

    println!("{}", render(config_override)?);
    Ok(())
}

/// Effective configuration as YAML.
pub fn render(config_path: Option<PathBuf>) -> Result<String> {
    let config = AugurConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.to_yaml_string()
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");
    check(config_path)?;
    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

pub fn check(config_path: Option<PathBuf>) -> Result<AugurConfig> {
    let config = AugurConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}
