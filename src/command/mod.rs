// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Setpoint commands: input parsing, safety validation and the device
//! payload.
//!
//! A command travels through three stages before it reaches the device:
//!
//! 1. [`CommandRequest::from_fields`] reads the loosely typed request
//!    (numbers or numeric strings, optional access code).
//! 2. [`SafetyLimits::validate`] rejects setpoints outside the configured
//!    safe intervals.
//! 3. [`PayloadBuilder::build`] produces the exact body the device expects.
//!
//! # Examples
//!
//! ```
//! use psu_bridge::command::{PayloadBuilder, SafetyLimits};
//!
//! let limits = SafetyLimits::default();
//! assert!(limits.validate(54.0, 6.0).is_ok());
//! assert!(limits.validate(0.0, 6.0).is_err());
//!
//! let payload = PayloadBuilder::default().build(54.0, 6.0, "1");
//! assert_eq!(payload.voltage_value, "54.0");
//! assert_eq!(payload.current_value, "6.00");
//! ```

mod payload;

pub use payload::{DevicePayload, PayloadBuilder, clamp_balanced_current};

use serde_json::Value;

use crate::error::{Quantity, ValueError};

/// Default access level code.
pub const DEFAULT_ACCESS: &str = "0";

/// Safe setpoint intervals.
///
/// Lower bounds are exclusive and upper bounds inclusive: zero is never a
/// valid setpoint, the configured maximum is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyLimits {
    /// Exclusive lower voltage bound (V).
    pub volt_min: f64,
    /// Inclusive upper voltage bound (V).
    pub volt_max: f64,
    /// Exclusive lower current bound (A).
    pub curr_min: f64,
    /// Inclusive upper current bound (A).
    pub curr_max: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            volt_min: 0.0,
            volt_max: 100.0,
            curr_min: 0.0,
            curr_max: 50.0,
        }
    }
}

impl SafetyLimits {
    /// Checks both setpoints against their intervals.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` for the first setpoint that falls
    /// outside its interval. NaN is always out of range.
    pub fn validate(&self, voltage: f64, max_current: f64) -> Result<(), ValueError> {
        check(Quantity::Voltage, voltage, self.volt_min, self.volt_max)?;
        check(Quantity::Current, max_current, self.curr_min, self.curr_max)
    }
}

fn check(quantity: Quantity, actual: f64, min: f64, max: f64) -> Result<(), ValueError> {
    if min < actual && actual <= max {
        Ok(())
    } else {
        Err(ValueError::OutOfRange {
            quantity,
            min,
            max,
            actual,
        })
    }
}

/// A single set command as parsed from a request.
///
/// Holds parsed but not yet limit-checked values; see
/// [`SafetyLimits::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    /// Target output voltage (V).
    pub voltage: f64,
    /// Current limit (A).
    pub max_current: f64,
    /// Access level code, passed through to the device.
    pub access: String,
}

impl CommandRequest {
    /// Creates a command from already typed values.
    #[must_use]
    pub fn new(voltage: f64, max_current: f64, access: impl Into<String>) -> Self {
        Self {
            voltage,
            max_current,
            access: access.into(),
        }
    }

    /// Parses a command from loosely typed JSON fields.
    ///
    /// `voltage` and `max_current` may be numbers or numeric strings.
    /// `access` may be absent, a string or a number.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::MissingField` or `ValueError::NotANumber`.
    pub fn from_fields(
        voltage: Option<&Value>,
        max_current: Option<&Value>,
        access: Option<&Value>,
    ) -> Result<Self, ValueError> {
        let voltage = required("voltage", voltage)?;
        let max_current = required("max_current", max_current)?;
        Ok(Self {
            voltage: parse_number("voltage", voltage)?,
            max_current: parse_number("max_current", max_current)?,
            access: access_code(access),
        })
    }
}

fn required<'a>(field: &'static str, value: Option<&'a Value>) -> Result<&'a Value, ValueError> {
    match value {
        None | Some(Value::Null) => Err(ValueError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

/// Reads a number from a JSON number or a numeric string.
///
/// # Errors
///
/// Returns `ValueError::NotANumber` for anything else.
pub fn parse_number(field: &'static str, value: &Value) -> Result<f64, ValueError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ValueError::NotANumber {
        field,
        value: match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    })
}

/// Coerces an access code to its string form, defaulting to `"0"`.
#[must_use]
pub fn access_code(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null | Value::Bool(false)) => DEFAULT_ACCESS.to_string(),
        Some(Value::String(s)) if s.is_empty() => DEFAULT_ACCESS.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
