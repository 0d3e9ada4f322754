// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A fake native library shared by the integration tests.

#![allow(dead_code, unsafe_code)]

use std::collections::HashMap;
use std::ffi::{CStr, c_int, c_void};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;

use parking_lot::Mutex;
use tellcore_dispatch::{CallbackSource, Trampoline};

/// Stands in for the native library: remembers subscriptions and invokes
/// their trampolines on demand, the way telldus-core's event thread would.
#[derive(Clone, Default)]
pub struct FakeTelldus(Arc<FakeInner>);

#[derive(Default)]
struct FakeInner {
    next_id: AtomicI32,
    /// Callback id to trampoline and context address.
    subscriptions: Mutex<HashMap<c_int, (Trampoline, usize)>>,
}

impl CallbackSource for FakeTelldus {
    fn subscribe(&self, trampoline: Trampoline, context: *mut c_void) -> Result<c_int, c_int> {
        let callback_id = self.0.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.0
            .subscriptions
            .lock()
            .insert(callback_id, (trampoline, context.addr()));
        Ok(callback_id)
    }

    fn unsubscribe(&self, callback_id: c_int) -> Result<(), c_int> {
        self.0
            .subscriptions
            .lock()
            .remove(&callback_id)
            .map(drop)
            .ok_or(-1)
    }
}

impl FakeTelldus {
    pub fn snapshot(&self) -> Vec<(c_int, Trampoline, *mut c_void)> {
        let mut subscriptions: Vec<_> = self
            .0
            .subscriptions
            .lock()
            .iter()
            .map(|(id, (trampoline, addr))| (*id, *trampoline, ptr::without_provenance_mut(*addr)))
            .collect();
        subscriptions.sort_by_key(|(id, _, _)| *id);
        subscriptions
    }

    pub fn device_event(&self, device_id: c_int, method: c_int, data: Option<&CStr>) {
        for (callback_id, trampoline, context) in self.snapshot() {
            if let Trampoline::Device(f) = trampoline {
                let data = data.map_or(ptr::null(), CStr::as_ptr);
                // SAFETY: `data` is null or a live C string
                unsafe { f(device_id, method, data, callback_id, context) };
            }
        }
    }

    pub fn sensor_event(&self, protocol: &CStr, id: c_int, data_type: c_int, value: &CStr, ts: c_int) {
        for (callback_id, trampoline, context) in self.snapshot() {
            if let Trampoline::Sensor(f) = trampoline {
                // SAFETY: all strings are live C strings
                unsafe {
                    f(
                        protocol.as_ptr(),
                        c"temperature".as_ptr(),
                        id,
                        data_type,
                        value.as_ptr(),
                        ts,
                        callback_id,
                        context,
                    );
                };
            }
        }
    }

    pub fn raw_device_event(&self, data: &CStr, controller_id: c_int) {
        for (callback_id, trampoline, context) in self.snapshot() {
            if let Trampoline::RawDevice(f) = trampoline {
                // SAFETY: `data` is a live C string
                unsafe { f(data.as_ptr(), controller_id, callback_id, context) };
            }
        }
    }

    pub fn controller_event(&self, controller_id: c_int, change_event: c_int, new_value: Option<&CStr>) {
        for (callback_id, trampoline, context) in self.snapshot() {
            if let Trampoline::Controller(f) = trampoline {
                let new_value = new_value.map_or(ptr::null(), CStr::as_ptr);
                // SAFETY: `new_value` is null or a live C string
                unsafe { f(controller_id, change_event, 0, new_value, callback_id, context) };
            }
        }
    }

    /// Runs `f` on a thread this test does not otherwise touch.
    pub fn on_native_thread(&self, f: impl FnOnce(&Self) + Send + 'static) {
        let fake = self.clone();
        thread::spawn(move || f(&fake)).join().unwrap();
    }
}
