// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event kinds and the integer codes carried by native callbacks.
//!
//! Every code type converts from the native `int` with [`TryFrom<i32>`] and
//! rejects values the native library does not document, so a decoded event
//! never holds a code nobody can interpret.

use std::fmt;

use serde::Serialize;

use crate::error::DecodeError;

/// The kinds of native callbacks a consumer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A device executed a method (`TDDeviceEvent`).
    Device,
    /// A device was added, changed or removed (`TDDeviceChangeEvent`).
    DeviceChange,
    /// Raw data received by a controller (`TDRawDeviceEvent`).
    RawDevice,
    /// A sensor reported a value (`TDSensorEvent`).
    Sensor,
    /// A controller was added, changed or removed (`TDControllerEvent`).
    Controller,
}

impl EventKind {
    /// All event kinds, in native registration order.
    pub const ALL: [Self; 5] = [
        Self::Device,
        Self::DeviceChange,
        Self::RawDevice,
        Self::Sensor,
        Self::Controller,
    ];

    /// Returns a human readable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::DeviceChange => "device change",
            Self::RawDevice => "raw device",
            Self::Sensor => "sensor",
            Self::Controller => "controller",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generates a code enum with `as_code`, `TryFrom<i32>` and `Display`.
macro_rules! native_code {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Returns the native integer code.
            #[must_use]
            pub const fn as_code(&self) -> i32 {
                match self {
                    $( Self::$variant => $code, )+
                }
            }

            /// Returns a human readable label.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = DecodeError;

            fn try_from(code: i32) -> Result<Self, Self::Error> {
                match code {
                    $( $code => Ok(Self::$variant), )+
                    _ => Err(DecodeError::UnknownCode { field: $field, code }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

native_code! {
    /// A method executed on a device (`TELLSTICK_TURNON` and friends).
    ///
    /// The native constants are bit flags; a single device event carries
    /// exactly one of them.
    DeviceMethod, "method" {
        /// Device turned on.
        TurnOn = 1 => "turn on",
        /// Device turned off.
        TurnOff = 2 => "turn off",
        /// Bell rung.
        Bell = 4 => "bell",
        /// Device toggled.
        Toggle = 8 => "toggle",
        /// Device dimmed; the event carries the dim level.
        Dim = 16 => "dim",
        /// Learn signal sent.
        Learn = 32 => "learn",
        /// Scene executed.
        Execute = 64 => "execute",
        /// Blind moved up.
        Up = 128 => "up",
        /// Blind moved down.
        Down = 256 => "down",
        /// Blind stopped.
        Stop = 512 => "stop",
    }
}

native_code! {
    /// The quantity a sensor value measures (`TELLSTICK_TEMPERATURE` and friends).
    SensorDataType, "data type" {
        /// Temperature in degrees Celsius.
        Temperature = 1 => "temperature",
        /// Relative humidity in percent.
        Humidity = 2 => "humidity",
        /// Rain rate in mm/h.
        RainRate = 4 => "rain rate",
        /// Accumulated rain in mm.
        RainTotal = 8 => "rain total",
        /// Wind direction in degrees.
        WindDirection = 16 => "wind direction",
        /// Average wind speed in m/s.
        WindAverage = 32 => "wind average",
        /// Wind gust speed in m/s.
        WindGust = 64 => "wind gust",
    }
}

native_code! {
    /// What happened to a device or controller (`TELLSTICK_DEVICE_ADDED` and friends).
    DeviceChange, "change event" {
        /// Added to the configuration.
        Added = 1 => "added",
        /// Configuration changed.
        Changed = 2 => "changed",
        /// Removed from the configuration.
        Removed = 3 => "removed",
        /// State changed.
        StateChanged = 4 => "state changed",
    }
}

native_code! {
    /// Which attribute changed (`TELLSTICK_CHANGE_NAME` and friends).
    ChangeType, "change type" {
        /// Name changed.
        Name = 1 => "name",
        /// Protocol changed.
        Protocol = 2 => "protocol",
        /// Model changed.
        Model = 3 => "model",
        /// Supported methods changed.
        Method = 4 => "method",
        /// Availability changed.
        Available = 5 => "available",
        /// Firmware changed.
        Firmware = 6 => "firmware",
    }
}

impl ChangeType {
    /// Decodes an optional change type, where `0` means "not applicable".
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownCode`] for any other undocumented code.
    pub fn from_optional_code(code: i32) -> Result<Option<Self>, DecodeError> {
        if code == 0 {
            Ok(None)
        } else {
            Self::try_from(code).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_codes_are_bit_flags() {
        assert_eq!(DeviceMethod::TurnOn.as_code(), 1);
        assert_eq!(DeviceMethod::Dim.as_code(), 16);
        assert_eq!(DeviceMethod::Stop.as_code(), 512);
        assert_eq!(DeviceMethod::try_from(256), Ok(DeviceMethod::Down));
    }

    #[test]
    fn combined_method_flags_are_rejected() {
        let err = DeviceMethod::try_from(1 | 2).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownCode {
                field: "method",
                code: 3
            }
        );
    }

    #[test]
    fn sensor_data_type_from_code() {
        assert_eq!(
            SensorDataType::try_from(1),
            Ok(SensorDataType::Temperature)
        );
        assert_eq!(SensorDataType::try_from(64), Ok(SensorDataType::WindGust));
        assert!(SensorDataType::try_from(128).is_err());
    }

    #[test]
    fn change_type_zero_is_not_applicable() {
        assert_eq!(ChangeType::from_optional_code(0), Ok(None));
        assert_eq!(
            ChangeType::from_optional_code(5),
            Ok(Some(ChangeType::Available))
        );
        assert!(ChangeType::from_optional_code(-1).is_err());
    }

    #[test]
    fn display_uses_labels() {
        assert_eq!(EventKind::RawDevice.to_string(), "raw device");
        assert_eq!(DeviceChange::StateChanged.to_string(), "state changed");
        assert_eq!(SensorDataType::RainRate.to_string(), "rain rate");
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&SensorDataType::WindDirection).unwrap();
        assert_eq!(json, "\"wind_direction\"");
    }
}
