// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP client for the power supply's embedded web API.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;

use super::retry::{RetryPolicy, retry};
use crate::command::DevicePayload;
use crate::error::DeviceError;

/// Telemetry endpoint.
pub const CHARGE_STATUS_PATH: &str = "/api/chargeStatus";
/// Setpoint endpoint.
pub const SEND_DATA_PATH: &str = "/api/send_data";

/// Longest response body kept in a [`DeviceError::Status`].
const MAX_ERROR_BODY: usize = 256;

// ============================================================================
// DeviceConfig
// ============================================================================

/// Connection parameters for the device.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use psu_bridge::protocol::DeviceConfig;
///
/// let config = DeviceConfig::new("192.168.4.1").with_timeout(Duration::from_secs(2));
/// assert_eq!(config.base_url(), "http://192.168.4.1");
/// assert_eq!(config.timeout(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    base_url: String,
    timeout: Duration,
    pool_max_idle: usize,
    retry: RetryPolicy,
}

impl DeviceConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default number of idle keep-alive connections kept in the pool.
    pub const DEFAULT_POOL_MAX_IDLE: usize = 20;

    /// Creates a configuration for the device at `base`.
    ///
    /// A bare host gets an `http://` prefix; a trailing slash is dropped.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let base = base.trim_end_matches('/');
        let base_url = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("http://{base}")
        };

        Self {
            base_url,
            timeout: Self::DEFAULT_TIMEOUT,
            pool_max_idle: Self::DEFAULT_POOL_MAX_IDLE,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of idle connections kept per host.
    #[must_use]
    pub fn with_pool_max_idle(mut self, max_idle: usize) -> Self {
        self.pool_max_idle = max_idle;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the number of idle connections kept per host.
    #[must_use]
    pub fn pool_max_idle(&self) -> usize {
        self.pool_max_idle
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Creates a [`DeviceClient`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn into_client(self) -> Result<DeviceClient, DeviceError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_max_idle)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| DeviceError::InvalidConfiguration(e.to_string()))?;

        Ok(DeviceClient {
            base_url: self.base_url,
            client,
            retry: self.retry,
        })
    }
}

// ============================================================================
// DeviceClient
// ============================================================================

/// Retrying HTTP client for the device.
///
/// Cloning is cheap; clones share the connection pool.
///
/// # Examples
///
/// ```no_run
/// use psu_bridge::protocol::DeviceConfig;
///
/// # async fn example() -> psu_bridge::Result<()> {
/// let client = DeviceConfig::new("192.168.4.1").into_client()?;
/// let status = client.charge_status().await?;
/// println!("{status}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeviceClient {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
}

impl DeviceClient {
    /// Returns the base URL of the device.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Fetches `path` and parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` once retries are exhausted or on the first
    /// non-retryable failure.
    pub async fn get_json(&self, path: &str) -> Result<Value, DeviceError> {
        let url = self.url(path);
        retry(&self.retry, DeviceError::is_transient, || self.get_once(&url)).await
    }

    /// Posts `payload` as JSON to `path` and returns the body text.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` once retries are exhausted or on the first
    /// non-retryable failure.
    pub async fn post_json<T: Serialize + Sync>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<String, DeviceError> {
        let url = self.url(path);
        retry(&self.retry, DeviceError::is_transient, || {
            self.post_once(&url, payload)
        })
        .await
    }

    /// Reads current telemetry (`GET /api/chargeStatus`).
    ///
    /// # Errors
    ///
    /// See [`DeviceClient::get_json`].
    pub async fn charge_status(&self) -> Result<Value, DeviceError> {
        self.get_json(CHARGE_STATUS_PATH).await
    }

    /// Sends a setpoint (`POST /api/send_data`).
    ///
    /// # Errors
    ///
    /// See [`DeviceClient::post_json`].
    pub async fn send_data(&self, payload: &DevicePayload) -> Result<String, DeviceError> {
        self.post_json(SEND_DATA_PATH, payload).await
    }

    async fn get_once(&self, url: &str) -> Result<Value, DeviceError> {
        tracing::debug!(url = %url, "Sending GET to device");
        let response = self.client.get(url).send().await?;
        let body = read_success_body(response).await?;
        tracing::debug!(body = %body, "Received device response");
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_once<T: Serialize + Sync>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<String, DeviceError> {
        tracing::debug!(url = %url, "Sending POST to device");
        let response = self.client.post(url).json(payload).send().await?;
        let body = read_success_body(response).await?;
        tracing::debug!(body = %body, "Received device response");
        Ok(body)
    }
}

async fn read_success_body(response: Response) -> Result<String, DeviceError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(DeviceError::Status {
            status: status.as_u16(),
            body: truncate(body),
        });
    }
    Ok(body)
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = DeviceConfig::new("192.168.4.1");
        assert_eq!(config.base_url(), "http://192.168.4.1");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.retry(), &RetryPolicy::default());
        assert_eq!(config.pool_max_idle(), 20);
    }

    #[test]
    fn pool_size_is_configurable() {
        let config = DeviceConfig::new("192.168.4.1").with_pool_max_idle(4);
        assert_eq!(config.pool_max_idle(), 4);
        assert!(config.into_client().is_ok());
    }

    #[test]
    fn config_keeps_scheme_and_strips_slash() {
        assert_eq!(
            DeviceConfig::new("https://psu.local/").base_url(),
            "https://psu.local"
        );
        assert_eq!(
            DeviceConfig::new("http://10.0.0.2:8080").base_url(),
            "http://10.0.0.2:8080"
        );
    }

    #[test]
    fn client_urls() {
        let client = DeviceConfig::new("192.168.4.1").into_client().unwrap();
        assert_eq!(client.url(CHARGE_STATUS_PATH), "http://192.168.4.1/api/chargeStatus");
        assert_eq!(client.url(SEND_DATA_PATH), "http://192.168.4.1/api/send_data");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(200);
        let cut = truncate(body);
        assert!(cut.len() <= MAX_ERROR_BODY);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
