// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Communication with the power supply.
//!
//! The device exposes two endpoints: `GET /api/chargeStatus` for telemetry
//! and `POST /api/send_data` for setpoints. [`DeviceClient`] wraps both with
//! a shared connection pool and retries transient failures according to a
//! [`RetryPolicy`].

mod client;
mod retry;

pub use client::{CHARGE_STATUS_PATH, DeviceClient, DeviceConfig, SEND_DATA_PATH};
pub use retry::{RetryPolicy, retry};
