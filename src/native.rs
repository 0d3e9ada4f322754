// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `extern "C"` entry points handed to the native library.
//!
//! Each trampoline matches one telldus-core callback typedef. It borrows the
//! string arguments for the duration of the call, recovers the
//! [`RegistrationId`] from the `context` pointer and runs the common
//! [`dispatch`] path against the installed [`CallbackRegistry`].
//!
//! A trampoline never unwinds into the native caller: a panic anywhere on the
//! dispatch path is caught and logged.
//!
//! The native subscribe and unsubscribe calls themselves live behind
//! [`CallbackSource`], so the library can be linked, mocked or driven by a
//! test harness.

#![allow(unsafe_code)]

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

use crate::dispatch::dispatch;
use crate::error::DecodeError;
use crate::event::{EventKind, RawCallback};
use crate::registry::{CallbackRegistry, RegistrationId};
use crate::report::{DispatchFailure, FailureReason};

/// `TDDeviceEvent`
pub type DeviceEventFn = unsafe extern "C" fn(
    device_id: c_int,
    method: c_int,
    data: *const c_char,
    callback_id: c_int,
    context: *mut c_void,
);

/// `TDDeviceChangeEvent`
pub type DeviceChangeEventFn = unsafe extern "C" fn(
    device_id: c_int,
    change_event: c_int,
    change_type: c_int,
    callback_id: c_int,
    context: *mut c_void,
);

/// `TDRawDeviceEvent`
pub type RawDeviceEventFn = unsafe extern "C" fn(
    data: *const c_char,
    controller_id: c_int,
    callback_id: c_int,
    context: *mut c_void,
);

/// `TDSensorEvent`
pub type SensorEventFn = unsafe extern "C" fn(
    protocol: *const c_char,
    model: *const c_char,
    id: c_int,
    data_type: c_int,
    value: *const c_char,
    timestamp: c_int,
    callback_id: c_int,
    context: *mut c_void,
);

/// `TDControllerEvent`
pub type ControllerEventFn = unsafe extern "C" fn(
    controller_id: c_int,
    change_event: c_int,
    change_type: c_int,
    new_value: *const c_char,
    callback_id: c_int,
    context: *mut c_void,
);

/// A trampoline together with the native typedef it satisfies.
///
/// A [`CallbackSource`] matches on this to pick the right native
/// registration function (`tdRegisterDeviceEvent` and friends).
#[derive(Debug, Clone, Copy)]
pub enum Trampoline {
    /// For `tdRegisterDeviceEvent`.
    Device(DeviceEventFn),
    /// For `tdRegisterDeviceChangeEvent`.
    DeviceChange(DeviceChangeEventFn),
    /// For `tdRegisterRawDeviceEvent`.
    RawDevice(RawDeviceEventFn),
    /// For `tdRegisterSensorEvent`.
    Sensor(SensorEventFn),
    /// For `tdRegisterControllerEvent`.
    Controller(ControllerEventFn),
}

impl Trampoline {
    /// Returns this crate's trampoline for `kind`.
    #[must_use]
    pub fn for_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::Device => Self::Device(device_event_trampoline),
            EventKind::DeviceChange => Self::DeviceChange(device_change_event_trampoline),
            EventKind::RawDevice => Self::RawDevice(raw_device_event_trampoline),
            EventKind::Sensor => Self::Sensor(sensor_event_trampoline),
            EventKind::Controller => Self::Controller(controller_event_trampoline),
        }
    }

    /// Returns the event kind this trampoline handles.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Device(_) => EventKind::Device,
            Self::DeviceChange(_) => EventKind::DeviceChange,
            Self::RawDevice(_) => EventKind::RawDevice,
            Self::Sensor(_) => EventKind::Sensor,
            Self::Controller(_) => EventKind::Controller,
        }
    }
}

/// The native library's subscribe and unsubscribe calls.
///
/// `subscribe` must arrange for `trampoline` to be called with `context` on
/// every matching native event, and return the native callback id on
/// success or the native error code on failure. Implementations may invoke
/// the trampoline from any thread, including while `subscribe` is still
/// running.
pub trait CallbackSource: Send + Sync {
    /// Registers `trampoline` with the native library.
    ///
    /// # Errors
    ///
    /// Returns the native status code when the library refuses.
    fn subscribe(&self, trampoline: Trampoline, context: *mut c_void) -> Result<c_int, c_int>;

    /// Removes a native subscription by callback id.
    ///
    /// # Errors
    ///
    /// Returns the native status code when the library refuses.
    fn unsubscribe(&self, callback_id: c_int) -> Result<(), c_int>;
}

/// Borrows a native string argument.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
unsafe fn borrow_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null and NUL-terminated per the caller's contract
        Some(unsafe { CStr::from_ptr(ptr) })
    }
}

fn handle(raw: &RawCallback<'_>, callback_id: c_int, context: *mut c_void) {
    let kind = raw.kind();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let Some(registry) = CallbackRegistry::installed() else {
            CallbackRegistry::record_orphan(kind);
            return;
        };

        let Some(id) = RegistrationId::from_context(context) else {
            registry.reporter().report(DispatchFailure::new(
                None,
                kind,
                FailureReason::Decode(DecodeError::MissingContext),
            ));
            return;
        };

        dispatch(&registry, id, callback_id, raw);
    }));

    if outcome.is_err() {
        tracing::error!(kind = %kind, callback_id, "Panic on native callback path");
    }
}

/// Trampoline for `TDDeviceEvent`.
///
/// # Safety
///
/// `data` must be null or a valid NUL-terminated string for the duration of
/// the call.
pub unsafe extern "C" fn device_event_trampoline(
    device_id: c_int,
    method: c_int,
    data: *const c_char,
    callback_id: c_int,
    context: *mut c_void,
) {
    let raw = RawCallback::Device {
        device_id,
        method,
        // SAFETY: upheld by the caller
        data: unsafe { borrow_str(data) },
    };
    handle(&raw, callback_id, context);
}

/// Trampoline for `TDDeviceChangeEvent`.
///
/// # Safety
///
/// Always safe to call; `unsafe` only to match the native typedef.
pub unsafe extern "C" fn device_change_event_trampoline(
    device_id: c_int,
    change_event: c_int,
    change_type: c_int,
    callback_id: c_int,
    context: *mut c_void,
) {
    let raw = RawCallback::DeviceChange {
        device_id,
        change_event,
        change_type,
    };
    handle(&raw, callback_id, context);
}

/// Trampoline for `TDRawDeviceEvent`.
///
/// # Safety
///
/// `data` must be null or a valid NUL-terminated string for the duration of
/// the call.
pub unsafe extern "C" fn raw_device_event_trampoline(
    data: *const c_char,
    controller_id: c_int,
    callback_id: c_int,
    context: *mut c_void,
) {
    let raw = RawCallback::RawDevice {
        // SAFETY: upheld by the caller
        data: unsafe { borrow_str(data) },
        controller_id,
    };
    handle(&raw, callback_id, context);
}

/// Trampoline for `TDSensorEvent`.
///
/// # Safety
///
/// `protocol`, `model` and `value` must each be null or a valid
/// NUL-terminated string for the duration of the call.
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn sensor_event_trampoline(
    protocol: *const c_char,
    model: *const c_char,
    id: c_int,
    data_type: c_int,
    value: *const c_char,
    timestamp: c_int,
    callback_id: c_int,
    context: *mut c_void,
) {
    // SAFETY: upheld by the caller
    let raw = unsafe {
        RawCallback::Sensor {
            protocol: borrow_str(protocol),
            model: borrow_str(model),
            sensor_id: id,
            data_type,
            value: borrow_str(value),
            timestamp,
        }
    };
    handle(&raw, callback_id, context);
}

/// Trampoline for `TDControllerEvent`.
///
/// # Safety
///
/// `new_value` must be null or a valid NUL-terminated string for the
/// duration of the call.
pub unsafe extern "C" fn controller_event_trampoline(
    controller_id: c_int,
    change_event: c_int,
    change_type: c_int,
    new_value: *const c_char,
    callback_id: c_int,
    context: *mut c_void,
) {
    let raw = RawCallback::Controller {
        controller_id,
        change_event,
        change_type,
        // SAFETY: upheld by the caller
        new_value: unsafe { borrow_str(new_value) },
    };
    handle(&raw, callback_id, context);
}
