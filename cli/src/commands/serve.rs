// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Args;

use volapi_core::domain::config::VolapiConfigManifest;

use crate::server::{self, ServeOptions};

/// Run the volumes API server
#[derive(Args, Debug, Clone)]
pub struct ServeCommand {
    /// Listen address (overrides spec.api.bind_address)
    #[arg(long, env = "VOLAPI_HOST")]
    pub host: Option<String>,

    /// Listen port (overrides spec.api.port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Serve from an in-memory store with simulated VMAPI/PAPI/IMGAPI/NAPI
    #[arg(long)]
    pub standalone: bool,
}

pub async fn execute(command: ServeCommand, config: VolapiConfigManifest) -> Result<()> {
    server::run(
        config,
        ServeOptions {
            host: command.host,
            port: command.port,
            standalone: command.standalone,
        },
    )
    .await
}
