// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded event envelopes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ChangeType, DeviceChange, DeviceMethod, EventKind, SensorDataType};

/// A fully decoded native notification.
///
/// An `Event` owns all of its data; nothing in it points into memory owned by
/// the native library. It is produced once per native callback and handed to
/// exactly one delivery step.
///
/// # Examples
///
/// ```
/// use tellcore_dispatch::event::{Event, EventKind, DeviceStateEvent, DeviceMethod};
///
/// let event = Event::DeviceState(DeviceStateEvent {
///     device_id: 3,
///     method: DeviceMethod::Dim,
///     data: Some(128),
/// });
///
/// assert_eq!(event.kind(), EventKind::Device);
/// assert_eq!(event.device_id(), Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A device executed a method.
    DeviceState(DeviceStateEvent),
    /// Raw data received by a controller.
    DeviceStateRaw(RawDeviceEvent),
    /// A device was added, changed or removed.
    DeviceChange(DeviceChangeEvent),
    /// A sensor reported a value.
    Sensor(SensorEvent),
    /// A controller was added, changed or removed.
    Controller(ControllerEvent),
}

impl Event {
    /// Returns the kind of callback this event came from.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::DeviceState(_) => EventKind::Device,
            Self::DeviceStateRaw(_) => EventKind::RawDevice,
            Self::DeviceChange(_) => EventKind::DeviceChange,
            Self::Sensor(_) => EventKind::Sensor,
            Self::Controller(_) => EventKind::Controller,
        }
    }

    /// Returns the device id for device events.
    #[must_use]
    pub const fn device_id(&self) -> Option<i32> {
        match self {
            Self::DeviceState(e) => Some(e.device_id),
            Self::DeviceChange(e) => Some(e.device_id),
            _ => None,
        }
    }

    /// Returns the sensor event, if this is one.
    #[must_use]
    pub const fn as_sensor(&self) -> Option<&SensorEvent> {
        match self {
            Self::Sensor(e) => Some(e),
            _ => None,
        }
    }
}

/// A device executed a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStateEvent {
    /// The device id.
    pub device_id: i32,
    /// The method that was executed.
    pub method: DeviceMethod,
    /// Numeric data attached to the method (the dim level for
    /// [`DeviceMethod::Dim`]).
    pub data: Option<u8>,
}

/// A device was added, changed or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceChangeEvent {
    /// The device id.
    pub device_id: i32,
    /// What happened to the device.
    pub change_event: DeviceChange,
    /// Which attribute changed, when applicable.
    pub change_type: Option<ChangeType>,
}

/// Raw data received by a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDeviceEvent {
    /// The controller that received the data.
    pub controller_id: i32,
    /// The raw `key:value;` payload.
    pub data: String,
}

impl RawDeviceEvent {
    /// Iterates over the `key:value` pairs of the raw payload.
    ///
    /// Segments without a `:` separator are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use tellcore_dispatch::event::RawDeviceEvent;
    ///
    /// let event = RawDeviceEvent {
    ///     controller_id: 1,
    ///     data: "class:sensor;protocol:mandolyn;id:11;temp:21.5;".to_string(),
    /// };
    ///
    /// let fields: Vec<_> = event.fields().collect();
    /// assert_eq!(fields[0], ("class", "sensor"));
    /// assert_eq!(event.field("temp"), Some("21.5"));
    /// ```
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data
            .split(';')
            .filter_map(|segment| segment.split_once(':'))
    }

    /// Returns the value of the first field named `key`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// A sensor reported a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorEvent {
    /// Sensor protocol, e.g. `"mandolyn"`.
    pub protocol: String,
    /// Sensor model, e.g. `"temperaturehumidity"`.
    pub model: String,
    /// Sensor id within the protocol.
    pub sensor_id: i32,
    /// The quantity measured.
    pub data_type: SensorDataType,
    /// The measured value.
    pub value: f64,
    /// When the value was measured.
    pub timestamp: DateTime<Utc>,
}

/// A controller was added, changed or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerEvent {
    /// The controller id.
    pub controller_id: i32,
    /// What happened to the controller.
    pub change_event: DeviceChange,
    /// Which attribute changed, when applicable.
    pub change_type: Option<ChangeType>,
    /// The new value of the changed attribute.
    pub new_value: String,
}
