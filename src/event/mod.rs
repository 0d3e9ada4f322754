// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event envelopes and their decoding from native callback arguments.
//!
//! # Overview
//!
//! - [`EventKind`] - The native callback kinds a consumer can subscribe to
//! - [`Event`] - A decoded, owned, immutable notification
//! - [`RawCallback`] - Borrowed native arguments of one callback invocation
//! - [`decode`] - Turns a [`RawCallback`] into an [`Event`]
//!
//! # Examples
//!
//! ```
//! use tellcore_dispatch::config::StringPolicy;
//! use tellcore_dispatch::event::{decode, DeviceMethod, Event, RawCallback};
//!
//! let raw = RawCallback::Device { device_id: 1, method: 2, data: None };
//! let event = decode(&raw, StringPolicy::Strict)?;
//!
//! if let Event::DeviceState(state) = event {
//!     assert_eq!(state.method, DeviceMethod::TurnOff);
//! }
//! # Ok::<(), tellcore_dispatch::error::DecodeError>(())
//! ```

mod decode;
mod envelope;
mod kind;

pub use decode::{RawCallback, decode};
pub use envelope::{
    ControllerEvent, DeviceChangeEvent, DeviceStateEvent, Event, RawDeviceEvent, SensorEvent,
};
pub use kind::{ChangeType, DeviceChange, DeviceMethod, EventKind, SensorDataType};
