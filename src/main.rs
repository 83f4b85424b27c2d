// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `psu-bridge` - HTTP bridge for a network-attached power supply.
//!
//! Every option can also be given through the environment. Logs go to
//! stdout and to `psu.log` next to the state file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use psu_bridge::BridgeConfig;
use psu_bridge::server::{self, AppState};

const LOG_FILE: &str = "psu.log";

/// REST bridge for a network-attached power supply.
#[derive(Parser, Debug)]
#[command(name = "psu-bridge", version, about)]
struct Cli {
    /// Base URL of the device's web API
    #[arg(long, env = "PSU_BASE", default_value = BridgeConfig::DEFAULT_PSU_BASE)]
    psu_base: String,

    /// Per-request device timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT", default_value_t = 5.0)]
    http_timeout: f64,

    /// Shared secret expected in `X-Api-Key`; empty disables auth
    #[arg(long, env = "API_TOKEN", default_value = "", hide_env_values = true)]
    api_token: String,

    /// Where the last commanded state is stored
    #[arg(long, env = "STATE_FILE", default_value = BridgeConfig::DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    /// Address to listen on
    #[arg(long, env = "BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = BridgeConfig::DEFAULT_PORT)]
    port: u16,

    /// Balanced current sent with every command, clamped to 1..=5 A
    #[arg(long, env = "BALANCED_AMP", default_value_t = 1.0)]
    balanced_amp: f64,
}

impl Cli {
    fn config(&self) -> Result<BridgeConfig> {
        let timeout = Duration::try_from_secs_f64(self.http_timeout)
            .with_context(|| format!("invalid HTTP timeout: {}", self.http_timeout))?;

        Ok(BridgeConfig::new(self.psu_base.clone())
            .with_http_timeout(timeout)
            .with_api_token(Some(self.api_token.clone()))
            .with_state_file(self.state_file.clone())
            .with_bind(SocketAddr::new(self.bind, self.port))
            .with_balanced_amp(self.balanced_amp))
    }
}

/// Logs to stdout and to `psu.log` in `log_dir`. The returned guard must be
/// held until exit so buffered lines are flushed.
fn setup_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE)
        .build(log_dir)
        .context("cannot open log file")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    let log_dir = config
        .state_file()
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let _guard = setup_tracing(log_dir)?;

    tracing::info!(
        psu_base = %config.psu_base(),
        state_file = %config.state_file().display(),
        auth = config.api_token().is_some(),
        "Starting PSU bridge"
    );

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .with_context(|| format!("cannot bind {}", config.bind()))?;
    let state = Arc::new(AppState::new(config).context("cannot create device client")?);

    server::serve(listener, state, shutdown_signal())
        .await
        .context("server error")
}
