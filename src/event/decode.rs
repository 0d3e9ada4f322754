// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoding of raw native callback arguments.
//!
//! [`RawCallback`] borrows the arguments exactly as the native library passed
//! them. [`decode`] copies everything it keeps, so the returned [`Event`]
//! stays valid after the native buffers are freed.

use std::borrow::Cow;
use std::ffi::{CStr, c_int};

use chrono::DateTime;

use crate::config::StringPolicy;
use crate::error::DecodeError;

use super::{
    ChangeType, ControllerEvent, DeviceChange, DeviceChangeEvent, DeviceMethod, DeviceStateEvent,
    Event, EventKind, RawDeviceEvent, SensorDataType, SensorEvent,
};

/// Arguments of one native callback invocation, minus the callback id and
/// context pointer.
///
/// String arguments are `None` when the native library passed a null pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawCallback<'a> {
    /// `TDDeviceEvent` arguments.
    Device {
        /// `deviceId`
        device_id: c_int,
        /// `method`
        method: c_int,
        /// `data`
        data: Option<&'a CStr>,
    },
    /// `TDDeviceChangeEvent` arguments.
    DeviceChange {
        /// `deviceId`
        device_id: c_int,
        /// `changeEvent`
        change_event: c_int,
        /// `changeType`
        change_type: c_int,
    },
    /// `TDRawDeviceEvent` arguments.
    RawDevice {
        /// `data`
        data: Option<&'a CStr>,
        /// `controllerId`
        controller_id: c_int,
    },
    /// `TDSensorEvent` arguments.
    Sensor {
        /// `protocol`
        protocol: Option<&'a CStr>,
        /// `model`
        model: Option<&'a CStr>,
        /// `id`
        sensor_id: c_int,
        /// `dataType`
        data_type: c_int,
        /// `value`
        value: Option<&'a CStr>,
        /// `timestamp`
        timestamp: c_int,
    },
    /// `TDControllerEvent` arguments.
    Controller {
        /// `controllerId`
        controller_id: c_int,
        /// `changeEvent`
        change_event: c_int,
        /// `changeType`
        change_type: c_int,
        /// `newValue`
        new_value: Option<&'a CStr>,
    },
}

impl RawCallback<'_> {
    /// Returns the event kind of this callback.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Device { .. } => EventKind::Device,
            Self::DeviceChange { .. } => EventKind::DeviceChange,
            Self::RawDevice { .. } => EventKind::RawDevice,
            Self::Sensor { .. } => EventKind::Sensor,
            Self::Controller { .. } => EventKind::Controller,
        }
    }
}

/// Decodes raw callback arguments into an owned [`Event`].
///
/// # Errors
///
/// Returns a [`DecodeError`] when a required string is null, a string is not
/// valid UTF-8 under [`StringPolicy::Strict`], a code is undocumented, or a
/// numeric value is out of range.
///
/// # Examples
///
/// ```
/// use tellcore_dispatch::config::StringPolicy;
/// use tellcore_dispatch::event::{decode, Event, RawCallback};
///
/// let raw = RawCallback::Sensor {
///     protocol: Some(c"x"),
///     model: Some(c"temperature"),
///     sensor_id: 1,
///     data_type: 1,
///     value: Some(c"21.5"),
///     timestamp: 1000,
/// };
///
/// let Event::Sensor(sensor) = decode(&raw, StringPolicy::Strict)? else {
///     unreachable!()
/// };
/// assert_eq!(sensor.value, 21.5);
/// assert_eq!(sensor.timestamp.timestamp(), 1000);
/// # Ok::<(), tellcore_dispatch::error::DecodeError>(())
/// ```
pub fn decode(raw: &RawCallback<'_>, strings: StringPolicy) -> Result<Event, DecodeError> {
    let event = match *raw {
        RawCallback::Device {
            device_id,
            method,
            data,
        } => Event::DeviceState(DeviceStateEvent {
            device_id,
            method: DeviceMethod::try_from(method)?,
            data: device_data(data, strings)?,
        }),
        RawCallback::DeviceChange {
            device_id,
            change_event,
            change_type,
        } => Event::DeviceChange(DeviceChangeEvent {
            device_id,
            change_event: DeviceChange::try_from(change_event)?,
            change_type: ChangeType::from_optional_code(change_type)?,
        }),
        RawCallback::RawDevice {
            data,
            controller_id,
        } => Event::DeviceStateRaw(RawDeviceEvent {
            controller_id,
            data: required(data, "data", strings)?,
        }),
        RawCallback::Sensor {
            protocol,
            model,
            sensor_id,
            data_type,
            value,
            timestamp,
        } => Event::Sensor(SensorEvent {
            protocol: required(protocol, "protocol", strings)?,
            model: required(model, "model", strings)?,
            sensor_id,
            data_type: SensorDataType::try_from(data_type)?,
            value: sensor_value(&required(value, "value", strings)?)?,
            timestamp: DateTime::from_timestamp(i64::from(timestamp), 0).ok_or_else(|| {
                DecodeError::InvalidValue {
                    field: "timestamp",
                    message: format!("{timestamp} is not a representable time"),
                }
            })?,
        }),
        RawCallback::Controller {
            controller_id,
            change_event,
            change_type,
            new_value,
        } => Event::Controller(ControllerEvent {
            controller_id,
            change_event: DeviceChange::try_from(change_event)?,
            change_type: ChangeType::from_optional_code(change_type)?,
            new_value: optional(new_value, "new value", strings)?.unwrap_or_default(),
        }),
    };
    Ok(event)
}

/// Copies a string argument, applying the string policy.
fn owned(s: &CStr, field: &'static str, strings: StringPolicy) -> Result<String, DecodeError> {
    match strings {
        StringPolicy::Strict => s
            .to_str()
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8(field)),
        StringPolicy::Lossy => Ok(match s.to_string_lossy() {
            Cow::Borrowed(s) => s.to_owned(),
            Cow::Owned(s) => s,
        }),
    }
}

fn required(
    s: Option<&CStr>,
    field: &'static str,
    strings: StringPolicy,
) -> Result<String, DecodeError> {
    let s = s.ok_or(DecodeError::NullString(field))?;
    owned(s, field, strings)
}

fn optional(
    s: Option<&CStr>,
    field: &'static str,
    strings: StringPolicy,
) -> Result<Option<String>, DecodeError> {
    s.map(|s| owned(s, field, strings)).transpose()
}

/// Parses the device event data: empty means no data, otherwise a `u8` level.
fn device_data(data: Option<&CStr>, strings: StringPolicy) -> Result<Option<u8>, DecodeError> {
    let Some(text) = optional(data, "data", strings)? else {
        return Ok(None);
    };
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<u8>()
        .map(Some)
        .map_err(|e| DecodeError::InvalidValue {
            field: "data",
            message: format!("{text:?}: {e}"),
        })
}

fn sensor_value(text: &str) -> Result<f64, DecodeError> {
    let value = text
        .trim()
        .parse::<f64>()
        .map_err(|e| DecodeError::InvalidValue {
            field: "value",
            message: format!("{text:?}: {e}"),
        })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeError::InvalidValue {
            field: "value",
            message: format!("{text:?} is not finite"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(value: &CStr, data_type: c_int) -> RawCallback<'_> {
        RawCallback::Sensor {
            protocol: Some(c"mandolyn"),
            model: Some(c"temperaturehumidity"),
            sensor_id: 11,
            data_type,
            value: Some(value),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn decodes_sensor_event() {
        let event = decode(&sensor(c"-3.25", 1), StringPolicy::Strict).unwrap();
        let Event::Sensor(sensor) = event else {
            panic!("Expected sensor event");
        };
        assert_eq!(sensor.protocol, "mandolyn");
        assert_eq!(sensor.model, "temperaturehumidity");
        assert_eq!(sensor.sensor_id, 11);
        assert_eq!(sensor.data_type, SensorDataType::Temperature);
        assert!((sensor.value + 3.25).abs() < f64::EPSILON);
        assert_eq!(sensor.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn negative_timestamp_is_before_epoch() {
        let raw = RawCallback::Sensor {
            protocol: Some(c"p"),
            model: Some(c"m"),
            sensor_id: 1,
            data_type: 2,
            value: Some(c"40"),
            timestamp: -60,
        };
        let event = decode(&raw, StringPolicy::Strict).unwrap();
        assert_eq!(event.as_sensor().unwrap().timestamp.timestamp(), -60);
    }

    #[test]
    fn non_numeric_sensor_value_is_rejected() {
        let err = decode(&sensor(c"warm", 1), StringPolicy::Strict).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { field: "value", .. }));

        let err = decode(&sensor(c"NaN", 1), StringPolicy::Strict).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { field: "value", .. }));
    }

    #[test]
    fn unknown_data_type_is_rejected() {
        let err = decode(&sensor(c"1", 3), StringPolicy::Strict).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownCode {
                field: "data type",
                code: 3
            }
        );
    }

    #[test]
    fn null_required_string_is_rejected() {
        let raw = RawCallback::Sensor {
            protocol: None,
            model: Some(c"m"),
            sensor_id: 1,
            data_type: 1,
            value: Some(c"1"),
            timestamp: 0,
        };
        assert_eq!(
            decode(&raw, StringPolicy::Strict),
            Err(DecodeError::NullString("protocol"))
        );
    }

    #[test]
    fn device_event_dim_level() {
        let raw = RawCallback::Device {
            device_id: 4,
            method: 16,
            data: Some(c"200"),
        };
        let event = decode(&raw, StringPolicy::Strict).unwrap();
        assert_eq!(
            event,
            Event::DeviceState(DeviceStateEvent {
                device_id: 4,
                method: DeviceMethod::Dim,
                data: Some(200),
            })
        );
    }

    #[test]
    fn device_event_without_data() {
        for data in [None, Some(c"")] {
            let raw = RawCallback::Device {
                device_id: 4,
                method: 1,
                data,
            };
            let Event::DeviceState(state) = decode(&raw, StringPolicy::Strict).unwrap() else {
                panic!("Expected device state event");
            };
            assert_eq!(state.method, DeviceMethod::TurnOn);
            assert_eq!(state.data, None);
        }
    }

    #[test]
    fn dim_level_out_of_range_is_rejected() {
        let raw = RawCallback::Device {
            device_id: 4,
            method: 16,
            data: Some(c"256"),
        };
        let err = decode(&raw, StringPolicy::Strict).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { field: "data", .. }));
    }

    #[test]
    fn invalid_utf8_follows_policy() {
        let bytes = b"caf\xe9\0";
        let data = CStr::from_bytes_with_nul(bytes).unwrap();
        let raw = RawCallback::RawDevice {
            data: Some(data),
            controller_id: 1,
        };

        assert_eq!(
            decode(&raw, StringPolicy::Strict),
            Err(DecodeError::InvalidUtf8("data"))
        );

        let Event::DeviceStateRaw(event) = decode(&raw, StringPolicy::Lossy).unwrap() else {
            panic!("Expected raw device event");
        };
        assert_eq!(event.data, "caf\u{FFFD}");
    }

    #[test]
    fn controller_event_with_null_value() {
        let raw = RawCallback::Controller {
            controller_id: 2,
            change_event: 3,
            change_type: 0,
            new_value: None,
        };
        let event = decode(&raw, StringPolicy::Strict).unwrap();
        assert_eq!(
            event,
            Event::Controller(ControllerEvent {
                controller_id: 2,
                change_event: DeviceChange::Removed,
                change_type: None,
                new_value: String::new(),
            })
        );
    }

    #[test]
    fn device_change_event() {
        let raw = RawCallback::DeviceChange {
            device_id: 7,
            change_event: 2,
            change_type: 1,
        };
        let event = decode(&raw, StringPolicy::Strict).unwrap();
        assert_eq!(raw.kind(), EventKind::DeviceChange);
        assert_eq!(
            event,
            Event::DeviceChange(DeviceChangeEvent {
                device_id: 7,
                change_event: DeviceChange::Changed,
                change_type: Some(ChangeType::Name),
            })
        );
    }

    #[test]
    fn decoded_strings_outlive_native_buffer() {
        let buffer = std::ffi::CString::new("class:sensor;id:1;").unwrap();
        let event = {
            let raw = RawCallback::RawDevice {
                data: Some(buffer.as_c_str()),
                controller_id: 5,
            };
            decode(&raw, StringPolicy::Strict).unwrap()
        };
        drop(buffer);

        let Event::DeviceStateRaw(raw) = event else {
            panic!("Expected raw device event");
        };
        assert_eq!(raw.field("id"), Some("1"));
    }
}
