// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::Bridge;
use crate::command::{PayloadBuilder, SafetyLimits};
use crate::error::DeviceError;
use crate::protocol::{DeviceConfig, RetryPolicy};
use crate::state::StateStore;

/// A request budget: at most `max` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub max: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimit {
    /// `max` requests per minute.
    #[must_use]
    pub const fn per_minute(max: u32) -> Self {
        Self {
            max,
            window: Duration::from_secs(60),
        }
    }
}

/// Everything needed to run the bridge.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use psu_bridge::BridgeConfig;
///
/// let config = BridgeConfig::new("http://192.168.4.1")
///     .with_http_timeout(Duration::from_secs(3))
///     .with_api_token(Some("secret".to_string()))
///     .with_state_file("/tmp/psu/state.json");
///
/// assert_eq!(config.psu_base(), "http://192.168.4.1");
/// assert_eq!(config.api_token(), Some("secret"));
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    psu_base: String,
    http_timeout: Duration,
    api_token: Option<String>,
    state_file: PathBuf,
    bind: SocketAddr,
    balanced_amp: f64,
    limits: SafetyLimits,
    retry: RetryPolicy,
    set_rate_limit: RateLimit,
    sequence_rate_limit: RateLimit,
}

impl BridgeConfig {
    /// Default device address.
    pub const DEFAULT_PSU_BASE: &'static str = "http://192.168.4.1";
    /// Default location of the state file.
    pub const DEFAULT_STATE_FILE: &'static str = "/var/lib/psu-bridge/state.json";
    /// Default listening port.
    pub const DEFAULT_PORT: u16 = 8000;

    /// Creates a configuration for the device at `psu_base` with defaults
    /// for everything else.
    #[must_use]
    pub fn new(psu_base: impl Into<String>) -> Self {
        Self {
            psu_base: psu_base.into(),
            http_timeout: DeviceConfig::DEFAULT_TIMEOUT,
            api_token: None,
            state_file: PathBuf::from(Self::DEFAULT_STATE_FILE),
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, Self::DEFAULT_PORT)),
            balanced_amp: 1.0,
            limits: SafetyLimits::default(),
            retry: RetryPolicy::default(),
            set_rate_limit: RateLimit::per_minute(10),
            sequence_rate_limit: RateLimit::per_minute(5),
        }
    }

    /// Sets the per-request device timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets the shared secret. `None` or an empty string disables auth.
    #[must_use]
    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Sets the state file path.
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Sets the listening address.
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the balanced current sent with every command (clamped later).
    #[must_use]
    pub fn with_balanced_amp(mut self, amps: f64) -> Self {
        self.balanced_amp = amps;
        self
    }

    /// Sets the safety limits.
    #[must_use]
    pub fn with_limits(mut self, limits: SafetyLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the device retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the budget shared by `/set` and `/set_vc`.
    #[must_use]
    pub fn with_set_rate_limit(mut self, limit: RateLimit) -> Self {
        self.set_rate_limit = limit;
        self
    }

    /// Sets the budget for `/set_sequence`.
    #[must_use]
    pub fn with_sequence_rate_limit(mut self, limit: RateLimit) -> Self {
        self.sequence_rate_limit = limit;
        self
    }

    /// Device base URL as configured.
    #[must_use]
    pub fn psu_base(&self) -> &str {
        &self.psu_base
    }

    /// Per-request device timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Shared secret, if auth is enabled.
    #[must_use]
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    /// State file path.
    #[must_use]
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Listening address.
    #[must_use]
    pub fn bind(&self) -> SocketAddr {
        self.bind
    }

    /// Budget for `/set` and `/set_vc`.
    #[must_use]
    pub fn set_rate_limit(&self) -> RateLimit {
        self.set_rate_limit
    }

    /// Budget for `/set_sequence`.
    #[must_use]
    pub fn sequence_rate_limit(&self) -> RateLimit {
        self.sequence_rate_limit
    }

    /// Device connection settings derived from this configuration.
    #[must_use]
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.psu_base.clone())
            .with_timeout(self.http_timeout)
            .with_retry(self.retry)
    }

    /// Builds the [`Bridge`] described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn build_bridge(&self) -> Result<Bridge, DeviceError> {
        Ok(Bridge::new(
            self.device_config().into_client()?,
            Arc::new(StateStore::new(self.state_file.clone())),
            self.limits,
            PayloadBuilder::new(self.balanced_amp),
        ))
    }
}
