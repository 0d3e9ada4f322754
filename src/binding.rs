// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Consumer-facing binding that ties registrations to native subscriptions.

use std::collections::HashMap;
use std::ffi::c_int;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatch::Dispatcher;
use crate::error::{Error, HandlerResult, Result};
use crate::event::{
    ControllerEvent, DeviceChangeEvent, DeviceStateEvent, Event, EventKind, RawDeviceEvent,
    SensorEvent,
};
use crate::native::{CallbackSource, Trampoline};
use crate::registry::{CallbackRegistry, Delivery, RegistrationId, UserContext};

/// A handle on the native library's callback machinery.
///
/// Every `Library` shares the process-wide [`CallbackRegistry`]; the registry
/// is installed when the first one is created and torn down when the last
/// one is dropped. Registrations made through a `Library` are owned by it:
/// dropping the `Library` unregisters them from the registry and from the
/// native source.
///
/// # Examples
///
/// ```ignore
/// let dispatcher = Arc::new(QueuedDispatcher::new());
/// let library = Library::new(TelldusCore::load()?, dispatcher.clone());
///
/// library.on_sensor_event(None, |event, _| {
///     println!("{} {}: {}", event.protocol, event.sensor_id, event.value);
///     Ok(())
/// })?;
///
/// loop {
///     dispatcher.drain(DrainMode::Blocking);
/// }
/// ```
pub struct Library<S: CallbackSource> {
    registry: Arc<CallbackRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    source: S,
    /// Native callback id of every registration this library owns.
    owned: Mutex<HashMap<RegistrationId, c_int>>,
}

impl<S: CallbackSource> Library<S> {
    /// Attaches to the process-wide registry.
    ///
    /// Events for every registration made through this library are delivered
    /// by `dispatcher`.
    pub fn new(source: S, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            registry: CallbackRegistry::acquire(),
            dispatcher,
            source,
            owned: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the registry this library registers into.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Returns the dispatcher that delivers this library's events.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Returns the native source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Registers `handler` for events of `kind` and subscribes natively.
    ///
    /// The registry entry is created before the native subscription, so a
    /// callback that fires while `subscribe` is still running is delivered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscribe`] if the native library refuses; the
    /// registry entry is removed again.
    pub fn register<F>(
        &self,
        kind: EventKind,
        context: Option<UserContext>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&Delivery<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self
            .registry
            .register(kind, Arc::clone(&self.dispatcher), context, handler);

        match self
            .source
            .subscribe(Trampoline::for_kind(kind), id.as_context())
        {
            Ok(callback_id) => {
                tracing::debug!(id = %id, kind = %kind, callback_id, "Subscribed natively");
                self.owned.lock().insert(id, callback_id);
                Ok(id)
            }
            Err(code) => {
                tracing::warn!(id = %id, kind = %kind, code, "Native subscribe failed");
                // Nothing can have been queued for an id that was never subscribed
                let _ = self.registry.unregister(id);
                Err(Error::Subscribe { kind, code })
            }
        }
    }

    /// Subscribes to device method events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscribe`] if the native library refuses.
    pub fn on_device_event<F>(
        &self,
        context: Option<UserContext>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&DeviceStateEvent, &Delivery<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(EventKind::Device, context, move |delivery| {
            match delivery.event() {
                Event::DeviceState(event) => handler(event, delivery),
                _ => Ok(()),
            }
        })
    }

    /// Subscribes to device added/changed/removed events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscribe`] if the native library refuses.
    pub fn on_device_change_event<F>(
        &self,
        context: Option<UserContext>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&DeviceChangeEvent, &Delivery<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(EventKind::DeviceChange, context, move |delivery| {
            match delivery.event() {
                Event::DeviceChange(event) => handler(event, delivery),
                _ => Ok(()),
            }
        })
    }

    /// Subscribes to raw controller data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscribe`] if the native library refuses.
    pub fn on_raw_device_event<F>(
        &self,
        context: Option<UserContext>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&RawDeviceEvent, &Delivery<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(EventKind::RawDevice, context, move |delivery| {
            match delivery.event() {
                Event::DeviceStateRaw(event) => handler(event, delivery),
                _ => Ok(()),
            }
        })
    }

    /// Subscribes to sensor values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscribe`] if the native library refuses.
    pub fn on_sensor_event<F>(
        &self,
        context: Option<UserContext>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&SensorEvent, &Delivery<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(EventKind::Sensor, context, move |delivery| {
            match delivery.event() {
                Event::Sensor(event) => handler(event, delivery),
                _ => Ok(()),
            }
        })
    }

    /// Subscribes to controller added/changed/removed events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscribe`] if the native library refuses.
    pub fn on_controller_event<F>(
        &self,
        context: Option<UserContext>,
        handler: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&ControllerEvent, &Delivery<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(EventKind::Controller, context, move |delivery| {
            match delivery.event() {
                Event::Controller(event) => handler(event, delivery),
                _ => Ok(()),
            }
        })
    }

    /// Unregisters `id` and removes its native subscription.
    ///
    /// The registry entry goes first, so native callbacks that arrive after
    /// this returns are not delivered, and neither are events still waiting
    /// in a dispatch queue. A handler call that is already running on another
    /// thread, such as a [`DirectDispatcher`](crate::DirectDispatcher)
    /// delivery on the native thread, may still complete after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] if this library does not own
    /// `id`, or [`Error::Unsubscribe`] if the native library refuses. In the
    /// latter case the registration is still gone from the registry.
    pub fn unregister(&self, id: RegistrationId) -> Result<()> {
        let callback_id = self
            .owned
            .lock()
            .remove(&id)
            .ok_or(Error::InvalidRegistration(id))?;

        // The native subscription is removed even if the registry entry is already gone
        let removed = self.registry.unregister(id);
        self.source
            .unsubscribe(callback_id)
            .map_err(|code| Error::Unsubscribe { id, code })?;

        tracing::debug!(id = %id, callback_id, "Unsubscribed natively");
        removed.map(drop)
    }

    /// Unregisters every registration this library owns.
    ///
    /// Failures are logged and do not stop the remaining removals.
    pub fn unregister_all(&self) {
        for id in self.registration_ids() {
            if let Err(e) = self.unregister(id) {
                tracing::warn!(id = %id, error = %e, "Failed to unregister callback");
            }
        }
    }

    /// Returns the ids this library owns, in ascending order.
    #[must_use]
    pub fn registration_ids(&self) -> Vec<RegistrationId> {
        let mut ids: Vec<_> = self.owned.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<S: CallbackSource> Drop for Library<S> {
    fn drop(&mut self) {
        self.unregister_all();
    }
}

impl<S: CallbackSource> std::fmt::Debug for Library<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("registrations", &self.owned.lock().len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
