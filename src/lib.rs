// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PSU Bridge - a small REST API in front of a network-attached power supply.
//!
//! The bridge validates setpoints against fixed safety limits, forwards them
//! to the device's embedded web API, and remembers the last commanded state
//! in a JSON file so it survives restarts.
//!
//! # Features
//!
//! - **Validated commands**: voltage and current limits checked before any
//!   device I/O
//! - **Retries**: bounded exponential backoff for connection errors and
//!   timeouts
//! - **Durable state**: atomic file replacement, shared reads, one-second
//!   read cache
//! - **Sequences**: up to ten ordered steps with per-step delays
//! - **HTTP API**: `axum` server with API key auth and per-client rate
//!   limits
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use psu_bridge::BridgeConfig;
//! use psu_bridge::command::CommandRequest;
//! use psu_bridge::server::{self, AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::new("http://192.168.4.1")
//!         .with_state_file("/tmp/psu/state.json");
//!
//!     // Direct use of the command pipeline
//!     let bridge = config.build_bridge()?;
//!     let applied = bridge.apply(&CommandRequest::new(54.0, 6.0, "1")).await?;
//!     println!("state: {:?}", applied.state);
//!
//!     // Or serve the HTTP API
//!     let listener = tokio::net::TcpListener::bind(config.bind()).await?;
//!     let state = Arc::new(AppState::new(config)?);
//!     server::serve(listener, state, std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod protocol;
pub mod sequence;
pub mod server;
pub mod state;
pub mod telemetry;

pub use bridge::{Applied, Bridge, CommandFailure};
pub use config::{BridgeConfig, RateLimit};
pub use error::{DeviceError, Error, ErrorKind, Result, StorageError, ValueError};
