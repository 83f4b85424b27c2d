// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the PSU bridge.
//!
//! The hierarchy mirrors the places a request can fail: input validation,
//! device communication, and persistence of the last commanded state.
//! [`ErrorKind`] collapses all of them into the coarse categories exposed to
//! API callers.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation; nothing was sent to the device.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Communication with the device failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The persisted state could not be read or written.
    #[error("state storage error: {0}")]
    Storage(#[from] StorageError),

    /// Missing or incorrect shared secret.
    #[error("unauthorized")]
    Unauthorized,
}

impl Error {
    /// Returns the coarse category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Value(_) => ErrorKind::Validation,
            Self::Device(err) => err.kind(),
            Self::Storage(_) => ErrorKind::Storage,
            Self::Unauthorized => ErrorKind::Unauthorized,
        }
    }
}

/// Coarse error categories, as reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or out-of-range input.
    Validation,
    /// Connection to the device failed after all retries.
    DeviceUnreachable,
    /// The device did not answer in time after all retries.
    DeviceTimeout,
    /// The device answered with an error status or an unreadable body.
    DeviceProtocol,
    /// Local persistence failed.
    Storage,
    /// Missing or incorrect shared secret.
    Unauthorized,
}

/// Physical quantity a setpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Output voltage in volts.
    Voltage,
    /// Current limit in amperes.
    Current,
}

impl Quantity {
    /// Unit symbol used in messages.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Voltage => "V",
            Self::Current => "A",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voltage => f.write_str("voltage"),
            Self::Current => f.write_str("current"),
        }
    }
}

/// Errors related to request validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// A setpoint is outside its safe interval `(min, max]`.
    #[error("{quantity} {actual} {unit} is outside the safe range ({min}, {max}]", unit = .quantity.unit())]
    OutOfRange {
        /// Which setpoint was rejected.
        quantity: Quantity,
        /// Exclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
        /// The value that was provided.
        actual: f64,
    },

    /// A required field is absent.
    #[error("provide '{0}'")]
    MissingField(&'static str),

    /// A field could not be read as a number.
    #[error("'{field}' is not a number: {value}")]
    NotANumber {
        /// The offending field.
        field: &'static str,
        /// The raw value as received.
        value: String,
    },

    /// A step delay is negative.
    #[error("delay must not be negative, got {0}")]
    NegativeDelay(f64),

    /// A sequence step is not a JSON object.
    #[error("sequence step must be an object")]
    MalformedStep,

    /// The `sequence` field is not a list.
    #[error("sequence must be a list")]
    SequenceNotAList,

    /// The sequence has more steps than allowed.
    #[error("max {max} steps allowed, got {actual}")]
    TooManySteps {
        /// Maximum number of steps.
        max: usize,
        /// Number of steps received.
        actual: usize,
    },
}

/// Errors related to device communication.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The connection to the device could not be established.
    #[error("PSU unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("PSU timeout: {0}")]
    Timeout(#[source] reqwest::Error),

    /// The device answered with a non-2xx status.
    #[error("PSU returned HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The (possibly truncated) response body.
        body: String,
    },

    /// The device answered 2xx but the body is not valid JSON.
    #[error("invalid PSU response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    /// Any other transport-level failure.
    #[error("PSU request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The HTTP client could not be constructed.
    #[error("invalid device configuration: {0}")]
    InvalidConfiguration(String),
}

impl DeviceError {
    /// Returns `true` for failures worth retrying: connection errors and
    /// timeouts. A received response is never transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }

    /// Returns the coarse category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) => ErrorKind::DeviceUnreachable,
            Self::Timeout(_) => ErrorKind::DeviceTimeout,
            Self::Status { .. }
            | Self::InvalidResponse(_)
            | Self::Transport(_)
            | Self::InvalidConfiguration(_) => ErrorKind::DeviceProtocol,
        }
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(err: reqwest::Error) -> Self {
        // A connect timeout counts as unreachable.
        if err.is_connect() {
            Self::Unreachable(err)
        } else if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Transport(err)
        }
    }
}

/// Errors related to the persisted state file.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The state file is not valid JSON.
    #[error("malformed state record: {0}")]
    Json(#[from] serde_json::Error),

    /// The temporary file could not replace the state file.
    #[error("failed to replace state file: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// The blocking task doing the file I/O panicked or was cancelled.
    #[error("state I/O task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
