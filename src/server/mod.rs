// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP API in front of the bridge.
//!
//! | Method | Path             | Auth      | Rate limit          |
//! |--------|------------------|-----------|---------------------|
//! | GET    | `/health`        | none      | none                |
//! | GET    | `/psu/status`    | `X-Api-Key` | none              |
//! | GET    | `/psu/current`   | `X-Api-Key` | none              |
//! | GET    | `/psu/last_set`  | `X-Api-Key` | none              |
//! | POST   | `/set`           | `X-Api-Key` | shared with `/set_vc` |
//! | POST   | `/set_vc`        | `X-Api-Key` | shared with `/set`  |
//! | POST   | `/set_sequence`  | `X-Api-Key` | own budget          |
//!
//! The rate limiter keys by peer address, so the router must be served
//! through [`serve`] (or with `into_make_service_with_connect_info`).

mod error;
mod rate_limit;
mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;

pub use error::{ApiError, status_for};
pub use rate_limit::RateLimiter;
pub use routes::{API_KEY_HEADER, HealthReport};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::DeviceError;

/// State shared by all handlers.
#[derive(Debug)]
pub struct AppState {
    bridge: Bridge,
    config: BridgeConfig,
    set_limiter: RateLimiter,
    sequence_limiter: RateLimiter,
}

impl AppState {
    /// Builds the bridge and limiters described by `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: BridgeConfig) -> Result<Self, DeviceError> {
        Ok(Self {
            bridge: config.build_bridge()?,
            set_limiter: RateLimiter::new(config.set_rate_limit()),
            sequence_limiter: RateLimiter::new(config.sequence_rate_limit()),
            config,
        })
    }

    /// The bridge serving requests.
    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

/// Builds the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/psu/status", get(routes::psu_status))
        .route("/psu/current", get(routes::psu_current))
        .route("/psu/last_set", get(routes::last_set))
        .route("/set", post(routes::set))
        .route("/set_vc", post(routes::set))
        .route("/set_sequence", post(routes::set_sequence))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` completes.
///
/// # Errors
///
/// Returns error if the server fails while accepting connections.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "PSU bridge listening");
    }
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
