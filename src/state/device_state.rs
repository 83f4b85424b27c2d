// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last commanded device configuration.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::command::{CommandRequest, DEFAULT_ACCESS, access_code};

/// Wire format of persisted timestamps (`YYYY-MM-DDTHH:MM:SSZ`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Last setpoint the device confirmed, with the time it was persisted.
///
/// Every key is always present in the persisted record. When reading,
/// absent keys fall back to their defaults so older or hand-edited files
/// still load.
///
/// # Examples
///
/// ```
/// use psu_bridge::state::DeviceState;
///
/// let state: DeviceState = serde_json::from_str(r#"{"voltage": 54.0}"#).unwrap();
/// assert_eq!(state.voltage, Some(54.0));
/// assert_eq!(state.max_current, None);
/// assert_eq!(state.access, "0");
/// assert!(state.updated_at.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    /// Commanded output voltage (V).
    pub voltage: Option<f64>,
    /// Commanded current limit (A).
    pub max_current: Option<f64>,
    /// Commanded access level code.
    #[serde(deserialize_with = "deserialize_access")]
    pub access: String,
    /// When this record was last saved (UTC, whole seconds).
    #[serde(with = "iso8601")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            voltage: None,
            max_current: None,
            access: DEFAULT_ACCESS.to_string(),
            updated_at: None,
        }
    }
}

impl DeviceState {
    /// Creates an unsaved state for a commanded setpoint.
    #[must_use]
    pub fn commanded(command: &CommandRequest) -> Self {
        Self {
            voltage: Some(command.voltage),
            max_current: Some(command.max_current),
            access: command.access.clone(),
            updated_at: None,
        }
    }

    /// Stamps `updated_at` with `now`, truncated to whole seconds.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now.trunc_subsecs(0));
    }
}

fn deserialize_access<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(access_code(value.as_ref()))
}

/// `YYYY-MM-DDTHH:MM:SSZ` timestamps, `null` when absent.
mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.collect_str(&at.format(TIMESTAMP_FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|at| Some(at.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}
