// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Daemon HTTP server implementation

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use augur_core::{domain::config::AugurConfig, presentation::api, AugurEngine};

pub async fn start_server(config: AugurConfig) -> Result<()> {
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    info!(
        backend = ?config.storage.backend,
        request_deadline_ms = config.synthesis.request_deadline.as_millis() as u64,
        "Augur daemon starting"
    );

    let engine = Arc::new(
        AugurEngine::from_config(config)
            .await
            .context("Failed to initialize the prediction engine")?,
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    axum::serve(listener, api::app(engine.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Daemon shutting down");
    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "Engine shutdown incomplete");
        return Err(e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
