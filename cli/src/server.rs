// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API server
//!
//! Wires the configured record store and upstream Triton clients into
//! the volumes API router and serves it until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use volapi_core::application::{ServiceContext, VolumeSettings};
use volapi_core::domain::config::VolapiConfigManifest;
use volapi_core::presentation::{app, AppState, API_VERSION};

use crate::telemetry;

/// Listener overrides supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Use the in-memory store and simulated Triton services.
    pub standalone: bool,
}

pub fn listen_addr(config: &VolapiConfigManifest, options: &ServeOptions) -> Result<SocketAddr> {
    let host = options
        .host
        .as_deref()
        .unwrap_or(&config.spec.api.bind_address);
    let port = options.port.unwrap_or(config.spec.api.port);
    format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))
}

pub async fn build_context(
    config: &VolapiConfigManifest,
    standalone: bool,
) -> Result<ServiceContext> {
    if standalone {
        warn!("Running in standalone mode: volumes are backed by simulated Triton services");
        return Ok(ServiceContext::standalone(VolumeSettings::from_config(config)));
    }
    ServiceContext::from_config(config).await
}

pub async fn run(config: VolapiConfigManifest, options: ServeOptions) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    telemetry::install_metrics(&config)?;

    let addr = listen_addr(&config, &options)?;
    let context = build_context(&config, options.standalone).await?;
    let router = app(AppState::from_context(&context));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "volapi {} listening on http://{} (store: {:?})",
        API_VERSION, addr, config.spec.store.backend
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("volapi stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
