// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live readings from the `chargeStatus` endpoint.
//!
//! Firmware versions disagree on key names and on whether readings carry a
//! unit suffix, so parsing is lenient: `currentNow` or `current_now`, a
//! number or a string such as `"12.5 V"`.
//!
//! # Examples
//!
//! ```
//! use psu_bridge::telemetry::Telemetry;
//!
//! let status = serde_json::json!({"voltageNow": "53.9 V", "current_now": 5.98});
//! let telemetry = Telemetry::from_status(&status);
//! assert_eq!(telemetry.voltage_now, Some(53.9));
//! assert_eq!(telemetry.current_now, Some(5.98));
//! ```

use serde_json::Value;

/// Output readings reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
    /// Measured output current (A).
    pub current_now: Option<f64>,
    /// Measured output voltage (V).
    pub voltage_now: Option<f64>,
}

impl Telemetry {
    /// Extracts readings from a `chargeStatus` document.
    #[must_use]
    pub fn from_status(status: &Value) -> Self {
        Self {
            current_now: reading(status, &["currentNow", "current_now"]),
            voltage_now: reading(status, &["voltageNow", "voltage_now"]),
        }
    }

    /// Current formatted to two decimals; missing reads as `0.00`.
    ///
    /// A missing reading is indistinguishable from a real zero here.
    #[must_use]
    pub fn current_display(&self) -> String {
        format_reading(self.current_now)
    }

    /// Voltage formatted to two decimals; missing reads as `0.00`.
    #[must_use]
    pub fn voltage_display(&self) -> String {
        format_reading(self.voltage_now)
    }
}

fn reading(status: &Value, keys: &[&str]) -> Option<f64> {
    let value = keys.iter().find_map(|key| status.get(key).and_then(parse_reading));
    if value.is_none() {
        tracing::debug!(keys = ?keys, "Telemetry reading missing, reporting 0.0");
    }
    value
}

/// Reads a number, or a string holding a number with an optional `V`/`A`
/// suffix.
#[must_use]
pub fn parse_reading(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| {
                    s.strip_suffix('V')
                        .or_else(|| s.strip_suffix('A'))
                        .and_then(|rest| rest.trim_end().parse().ok())
                })
        }
        _ => None,
    }
}

fn format_reading(value: Option<f64>) -> String {
    format!("{:.2}", value.unwrap_or(0.0))
}
