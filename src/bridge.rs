// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command pipeline: validate, send to the device, record the new state.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::command::{CommandRequest, DevicePayload, PayloadBuilder, SafetyLimits};
use crate::error::{Error, ErrorKind, StorageError};
use crate::protocol::DeviceClient;
use crate::state::{DeviceState, StateStore};

/// Outcome of a command the device accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applied {
    /// Payload sent to the device.
    pub sent: DevicePayload,
    /// Raw acknowledgement returned by the device.
    pub psu_response: String,
    /// State recorded after the command.
    pub state: DeviceState,
}

/// A failed command, with the payload that was attempted if it got that far.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct CommandFailure {
    /// Payload that was sent or attempted; `None` when validation failed.
    pub sent: Option<DevicePayload>,
    /// The underlying error.
    #[source]
    pub source: Error,
}

impl CommandFailure {
    fn new(sent: Option<DevicePayload>, source: impl Into<Error>) -> Self {
        Self {
            sent,
            source: source.into(),
        }
    }

    /// Returns the coarse category of the underlying error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Ties the device client, the state store and the safety rules together.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use psu_bridge::Bridge;
/// use psu_bridge::command::{CommandRequest, PayloadBuilder, SafetyLimits};
/// use psu_bridge::protocol::DeviceConfig;
/// use psu_bridge::state::StateStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bridge = Bridge::new(
///     DeviceConfig::new("192.168.4.1").into_client()?,
///     Arc::new(StateStore::new("/var/lib/psu-bridge/state.json")),
///     SafetyLimits::default(),
///     PayloadBuilder::default(),
/// );
/// let applied = bridge.apply(&CommandRequest::new(54.0, 6.0, "1")).await?;
/// println!("device said: {}", applied.psu_response);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Bridge {
    client: DeviceClient,
    store: Arc<StateStore>,
    limits: SafetyLimits,
    payloads: PayloadBuilder,
}

impl Bridge {
    /// Creates a bridge from its parts.
    #[must_use]
    pub fn new(
        client: DeviceClient,
        store: Arc<StateStore>,
        limits: SafetyLimits,
        payloads: PayloadBuilder,
    ) -> Self {
        Self {
            client,
            store,
            limits,
            payloads,
        }
    }

    /// The device client.
    #[must_use]
    pub fn client(&self) -> &DeviceClient {
        &self.client
    }

    /// The state store.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The configured safety limits.
    #[must_use]
    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Loads the recorded state on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the state file cannot be read or created.
    pub async fn load_state(&self) -> Result<DeviceState, StorageError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.load()).await?
    }

    /// Saves `state` on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    pub async fn save_state(&self, state: DeviceState) -> Result<DeviceState, StorageError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(state)).await?
    }

    /// Validates, sends and records a single command.
    ///
    /// Nothing reaches the device if validation fails. The state is written
    /// only after the device accepted the command.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandFailure`] carrying the attempted payload, if one
    /// was built.
    pub async fn apply(&self, command: &CommandRequest) -> Result<Applied, CommandFailure> {
        self.limits
            .validate(command.voltage, command.max_current)
            .map_err(|e| CommandFailure::new(None, e))?;

        let payload = self
            .payloads
            .build(command.voltage, command.max_current, &command.access);

        tracing::info!(
            voltage = command.voltage,
            max_current = command.max_current,
            access = %command.access,
            "Setting PSU"
        );

        let psu_response = match self.client.send_data(&payload).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "PSU communication failed");
                return Err(CommandFailure::new(Some(payload), e));
            }
        };

        match self.save_state(DeviceState::commanded(command)).await {
            Ok(state) => Ok(Applied {
                sent: payload,
                psu_response,
                state,
            }),
            Err(e) => {
                tracing::error!(error = %e, "Device accepted command but state was not saved");
                Err(CommandFailure::new(Some(payload), e))
            }
        }
    }
}
