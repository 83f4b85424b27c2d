// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire format for `POST /api/send_data`.

use serde::Serialize;

use super::DEFAULT_ACCESS;

/// Lower bound accepted by the device for `balancedCurrent`.
pub const BALANCED_CURRENT_MIN: f64 = 1.0;
/// Upper bound accepted by the device for `balancedCurrent`.
pub const BALANCED_CURRENT_MAX: f64 = 5.0;

/// Mode discriminator required by the device.
const MODE: &str = "2";

/// Body of a set command as the device expects it.
///
/// All values are strings; the firmware parses them itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePayload {
    /// Voltage setpoint, one decimal.
    pub voltage_value: String,
    /// Current limit, two decimals.
    pub current_value: String,
    /// Access level code.
    pub accessibility_status: String,
    /// Balanced voltage; always equal to the setpoint.
    pub balanced_voltage: String,
    /// Balanced current, clamped to `[1.0, 5.0]`.
    pub balanced_current: String,
    /// Protocol mode.
    pub mode: String,
}

/// Clamps the balanced current into the range the device accepts.
///
/// NaN falls back to the lower bound.
#[must_use]
pub fn clamp_balanced_current(amps: f64) -> f64 {
    if amps.is_nan() {
        BALANCED_CURRENT_MIN
    } else {
        amps.clamp(BALANCED_CURRENT_MIN, BALANCED_CURRENT_MAX)
    }
}

/// Builds [`DevicePayload`]s from validated setpoints.
///
/// # Examples
///
/// ```
/// use psu_bridge::command::PayloadBuilder;
///
/// let builder = PayloadBuilder::new(9.0);
/// assert_eq!(builder.balanced_amp(), 5.0);
/// assert_eq!(builder.build(12.0, 1.5, "").balanced_current, "5.0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayloadBuilder {
    balanced_amp: f64,
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl PayloadBuilder {
    /// Creates a builder with the configured balanced current, clamped.
    #[must_use]
    pub fn new(balanced_amp: f64) -> Self {
        Self {
            balanced_amp: clamp_balanced_current(balanced_amp),
        }
    }

    /// The effective balanced current after clamping.
    #[must_use]
    pub fn balanced_amp(&self) -> f64 {
        self.balanced_amp
    }

    /// Builds the payload. Pure; does not validate.
    #[must_use]
    pub fn build(&self, voltage: f64, max_current: f64, access: &str) -> DevicePayload {
        let voltage_value = format!("{voltage:.1}");
        let access = if access.is_empty() {
            DEFAULT_ACCESS
        } else {
            access
        };
        DevicePayload {
            balanced_voltage: voltage_value.clone(),
            voltage_value,
            current_value: format!("{max_current:.2}"),
            accessibility_status: access.to_string(),
            balanced_current: format!("{:.1}", self.balanced_amp),
            mode: MODE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn literal_payload() {
        let payload = PayloadBuilder::new(1.0).build(54.0, 6.0, "1");
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "voltageValue": "54.0",
                "currentValue": "6.00",
                "accessibilityStatus": "1",
                "balancedVoltage": "54.0",
                "balancedCurrent": "1.0",
                "mode": "2"
            })
        );
    }

    #[test]
    fn field_order_on_the_wire() {
        let payload = PayloadBuilder::default().build(54.0, 6.0, "1");
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"voltageValue":"54.0","currentValue":"6.00","accessibilityStatus":"1","balancedVoltage":"54.0","balancedCurrent":"1.0","mode":"2"}"#
        );
    }

    #[test]
    fn rounding() {
        let payload = PayloadBuilder::default().build(12.345, 0.127, "0");
        assert_eq!(payload.voltage_value, "12.3");
        assert_eq!(payload.balanced_voltage, "12.3");
        assert_eq!(payload.current_value, "0.13");
    }

    #[test]
    fn empty_access_defaults() {
        let payload = PayloadBuilder::default().build(5.0, 1.0, "");
        assert_eq!(payload.accessibility_status, "0");
    }

    #[test]
    fn balanced_current_is_clamped() {
        assert!((clamp_balanced_current(0.2) - 1.0).abs() < f64::EPSILON);
        assert!((clamp_balanced_current(3.5) - 3.5).abs() < f64::EPSILON);
        assert!((clamp_balanced_current(12.0) - 5.0).abs() < f64::EPSILON);
        assert!((clamp_balanced_current(f64::NAN) - 1.0).abs() < f64::EPSILON);

        assert_eq!(PayloadBuilder::new(0.0).build(5.0, 1.0, "0").balanced_current, "1.0");
        assert_eq!(PayloadBuilder::new(2.5).build(5.0, 1.0, "0").balanced_current, "2.5");
    }
}
