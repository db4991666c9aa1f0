// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Logging and metrics bootstrap

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use volapi_core::domain::config::VolapiConfigManifest;

/// Log output format accepted by `spec.observability.logging.format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Pick the effective log level: `--log-level` beats the config file.
/// `RUST_LOG` still wins over both inside [`init_logging`].
pub fn resolve_log_level(cli_level: Option<&str>, config: Option<&VolapiConfigManifest>) -> String {
    cli_level
        .map(str::to_string)
        .or_else(|| config.map(|c| c.spec.observability.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string())
}

/// Initialize tracing subscriber for logging
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => builder.json().with_target(true).try_init(),
        LogFormat::Text => builder.with_target(false).compact().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(())
}

/// Start the Prometheus scrape endpoint when `spec.observability.metrics.enabled`.
pub fn install_metrics(config: &VolapiConfigManifest) -> Result<()> {
    let metrics = &config.spec.observability.metrics;
    if !metrics.enabled {
        return Ok(());
    }

    let addr: SocketAddr = format!("{}:{}", config.spec.api.bind_address, metrics.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid metrics address {}:{}",
                config.spec.api.bind_address, metrics.port
            )
        })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Prometheus metrics exposed on http://{}/metrics", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }

    #[test]
    fn test_log_level_precedence() {
        let mut config = VolapiConfigManifest::default();
        config.spec.observability.logging.level = "debug".to_string();

        assert_eq!(resolve_log_level(Some("warn"), Some(&config)), "warn");
        assert_eq!(resolve_log_level(None, Some(&config)), "debug");
        assert_eq!(resolve_log_level(None, None), "info");
    }

    #[test]
    fn test_metrics_disabled_is_noop() {
        let config = VolapiConfigManifest::default();
        assert!(!config.spec.observability.metrics.enabled);
        assert!(install_metrics(&config).is_ok());
    }
}
