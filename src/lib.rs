// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `tellcore_dispatch` - Thread-safe callback dispatch for Telldus Core.
//!
//! The Telldus Core library reports device, sensor and controller activity
//! by calling registered C function pointers on a thread it owns. This crate
//! turns those calls into owned, typed [`Event`]s and gets them to consumer
//! handlers on the thread of the consumer's choosing.
//!
//! # Supported Callbacks
//!
//! - **Device events**: a device executed a method (on, off, dim, ...)
//! - **Device change events**: a device was added, changed or removed
//! - **Raw device events**: raw `key:value;` data seen by a controller
//! - **Sensor events**: a sensor reported a value
//! - **Controller events**: a controller was added, changed or removed
//!
//! # Dispatchers
//!
//! - [`DirectDispatcher`]: handlers run on the native thread, inline
//! - [`QueuedDispatcher`]: events queue up until a consumer thread drains them
//! - [`EventLoopDispatcher`]: events are drained on a tokio runtime
//!
//! # Quick Start
//!
//! ## Queued Delivery
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tellcore_dispatch::{
//!     CallbackRegistry, DrainMode, DrainOutcome, EventKind, QueuedDispatcher, RawCallback,
//!     dispatch::dispatch,
//! };
//!
//! let registry = CallbackRegistry::new();
//! let dispatcher = Arc::new(QueuedDispatcher::new());
//!
//! let id = registry.register(EventKind::Sensor, dispatcher.clone(), None, |delivery| {
//!     let sensor = delivery.event().as_sensor().ok_or("not a sensor event")?;
//!     println!("{} {} = {}", sensor.protocol, sensor.sensor_id, sensor.value);
//!     Ok(())
//! });
//!
//! // What a trampoline does on the native thread
//! let raw = RawCallback::Sensor {
//!     protocol: Some(c"mandolyn"),
//!     model: Some(c"temperature"),
//!     sensor_id: 11,
//!     data_type: 1,
//!     value: Some(c"21.5"),
//!     timestamp: 1000,
//! };
//! dispatch(&registry, id, 1, &raw);
//!
//! // On the consumer thread
//! let outcome = dispatcher.drain(DrainMode::Timeout(Duration::from_millis(100)));
//! assert!(matches!(outcome, DrainOutcome::Delivered { .. }));
//! ```
//!
//! ## Native Binding
//!
//! A [`Library`] pairs the registry with a [`CallbackSource`] that performs
//! the native `tdRegister*Event` and `tdUnregisterCallback` calls:
//!
//! ```ignore
//! use tellcore_dispatch::{Library, QueuedDispatcher, DrainMode};
//!
//! let dispatcher = Arc::new(QueuedDispatcher::new());
//! let library = Library::new(telldus_core, dispatcher.clone());
//!
//! library.on_device_event(None, |event, _| {
//!     println!("device {} did {}", event.device_id, event.method);
//!     Ok(())
//! })?;
//!
//! dispatcher.drain(DrainMode::Blocking);
//! ```
//!
//! # Failure Reporting
//!
//! Nothing that goes wrong on the native thread is returned to the native
//! library. Decode failures, handler errors and panics, and events dropped
//! after stop or unregister are counted (see [`Dispatcher::stats`]), logged
//! through `tracing` and published on the dispatcher's
//! [`FailureBus`](report::FailureBus).

mod binding;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod native;
pub mod registry;
pub mod report;

pub use binding::Library;
pub use config::{DispatcherConfig, StringPolicy};
pub use dispatch::{
    DirectDispatcher, Dispatcher, DrainMode, DrainOutcome, EventLoopDispatcher, QueuedDispatcher,
};
pub use error::{DecodeError, Error, HandlerError, HandlerResult, Result};
pub use event::{
    ChangeType, ControllerEvent, DeviceChange, DeviceChangeEvent, DeviceMethod, DeviceStateEvent,
    Event, EventKind, RawCallback, RawDeviceEvent, SensorDataType, SensorEvent,
};
pub use native::{CallbackSource, Trampoline};
pub use registry::{CallbackRegistry, Delivery, RegistrationId, UserContext};
pub use report::{DispatchFailure, DispatchStats, FailureReason};
