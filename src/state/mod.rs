// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last commanded device state and its durable store.
//!
//! [`DeviceState`] records what the bridge last told the device; it changes
//! only after the device confirmed a command. [`StateStore`] persists it to a
//! single JSON file and keeps a one-second read cache in front of it.
//!
//! # Examples
//!
//! ```no_run
//! use psu_bridge::command::CommandRequest;
//! use psu_bridge::state::{DeviceState, StateStore};
//!
//! # fn example() -> Result<(), psu_bridge::error::StorageError> {
//! let store = StateStore::new("/tmp/psu/state.json");
//! let saved = store.save(DeviceState::commanded(&CommandRequest::new(54.0, 6.0, "1")))?;
//! assert_eq!(store.load()?, saved);
//! # Ok(())
//! # }
//! ```

mod device_state;
mod store;

pub use device_state::{DeviceState, TIMESTAMP_FORMAT};
pub use store::{Clock, StateStore, SystemClock};
