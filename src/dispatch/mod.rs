// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delivery strategies for decoded events.
//!
//! Every native callback runs through [`dispatch`] on the native thread:
//!
//! ```text
//! native thread ──► dispatch(registry, id, raw)
//!                      │ lookup id            ──► unknown: counted drop
//!                      │ dispatcher stopped?  ──► counted drop
//!                      │ decode(raw)          ──► error: counted drop
//!                      ▼
//!              Dispatcher::deliver(Pending)
//!                 ├─ DirectDispatcher:    handler runs right here
//!                 ├─ QueuedDispatcher:    queued until a consumer drains
//!                 └─ EventLoopDispatcher: queued, drained on a tokio runtime
//! ```
//!
//! Handler errors and panics are caught in [`Pending::deliver`] and reported
//! through the dispatcher's [`Reporter`]; they never reach the native caller.

mod direct;
mod event_loop;
mod queued;

use std::fmt;

pub use direct::DirectDispatcher;
pub use event_loop::EventLoopDispatcher;
pub use queued::{DrainMode, DrainOutcome, QueuedDispatcher};

use crate::config::DispatcherConfig;
use crate::error::DecodeError;
use crate::event::{Event, RawCallback, decode};
use crate::registry::{CallbackRegistry, Registration, RegistrationId};
use crate::report::{DispatchFailure, DispatchStats, FailureReason, Reporter};

/// A strategy for getting decoded events from the native thread to handlers.
///
/// [`deliver`](Self::deliver) is called on the native callback thread. It
/// must not block indefinitely and must not panic.
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Hands a decoded event over for delivery.
    fn deliver(&self, pending: Pending);

    /// Stops the dispatcher. One-way; later events are dropped and counted.
    fn stop(&self);

    /// Returns `true` once [`stop`](Self::stop) has been called.
    fn is_stopped(&self) -> bool;

    /// Returns the configuration in effect.
    fn config(&self) -> &DispatcherConfig;

    /// Returns the reporter that counts and publishes this dispatcher's failures.
    fn reporter(&self) -> &Reporter;

    /// Returns a snapshot of this dispatcher's counters.
    fn stats(&self) -> DispatchStats {
        self.reporter().stats()
    }
}

/// A decoded event waiting for delivery to one registration.
#[derive(Debug)]
pub struct Pending {
    registration: Registration,
    event: Event,
    native_callback_id: i32,
}

impl Pending {
    /// Pairs an event with the registration it is addressed to.
    #[must_use]
    pub fn new(registration: Registration, event: Event, native_callback_id: i32) -> Self {
        Self {
            registration,
            event,
            native_callback_id,
        }
    }

    /// Returns the registration.
    #[must_use]
    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Returns the event.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Calls the handler on the current thread.
    ///
    /// Returns `None` without calling anything when the registration has been
    /// removed in the meantime. A failing handler still counts as delivered
    /// here; the failure goes to `reporter`.
    pub fn deliver(self, reporter: &Reporter) -> Option<(RegistrationId, Event)> {
        let id = self.registration.id();

        if !self.registration.is_active() {
            reporter.report(DispatchFailure::new(
                Some(id),
                self.event.kind(),
                FailureReason::Unregistered,
            ));
            return None;
        }

        match self
            .registration
            .invoke(&self.event, self.native_callback_id)
        {
            Ok(()) => reporter.record_delivered(),
            Err(message) => reporter.report(DispatchFailure::new(
                Some(id),
                self.event.kind(),
                FailureReason::Handler(message),
            )),
        }
        Some((id, self.event))
    }

    pub(crate) fn reject(self, reporter: &Reporter, reason: FailureReason) {
        reporter.report(DispatchFailure::new(
            Some(self.registration.id()),
            self.event.kind(),
            reason,
        ));
    }
}

/// Routes one native callback to the dispatcher of its registration.
///
/// This is the common path behind every trampoline. It never blocks beyond
/// the registry lock and never panics on bad input: unknown ids, stopped
/// dispatchers and undecodable arguments are counted and reported.
pub fn dispatch(
    registry: &CallbackRegistry,
    id: RegistrationId,
    native_callback_id: i32,
    raw: &RawCallback<'_>,
) {
    let kind = raw.kind();
    tracing::trace!(id = %id, kind = %kind, native_callback_id, "Native callback");

    let Ok(registration) = registry.lookup(id) else {
        registry.reporter().report(DispatchFailure::new(
            Some(id),
            kind,
            FailureReason::UnknownRegistration,
        ));
        return;
    };

    let dispatcher = registration.dispatcher();
    let reporter = dispatcher.reporter();

    if dispatcher.is_stopped() {
        reporter.report(DispatchFailure::new(Some(id), kind, FailureReason::AfterStop));
        return;
    }

    if registration.kind() != kind {
        let mismatch = DecodeError::KindMismatch {
            expected: registration.kind(),
            actual: kind,
        };
        reporter.report(DispatchFailure::new(
            Some(id),
            kind,
            FailureReason::Decode(mismatch),
        ));
        return;
    }

    let event = match decode(raw, dispatcher.config().strings) {
        Ok(event) => event,
        Err(e) => {
            reporter.report(DispatchFailure::new(Some(id), kind, FailureReason::Decode(e)));
            return;
        }
    };

    reporter.record_dispatched();
    let dispatcher = std::sync::Arc::clone(dispatcher);
    dispatcher.deliver(Pending::new(registration, event, native_callback_id));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::event::EventKind;

    fn sensor_raw() -> RawCallback<'static> {
        RawCallback::Sensor {
            protocol: Some(c"x"),
            model: Some(c"temperature"),
            sensor_id: 1,
            data_type: 1,
            value: Some(c"21.5"),
            timestamp: 1000,
        }
    }

    #[test]
    fn dispatch_to_unknown_id_is_counted_on_registry() {
        let registry = CallbackRegistry::new();
        dispatch(&registry, RegistrationId::new(u64::MAX - 1), 1, &sensor_raw());

        assert_eq!(registry.reporter().stats().dropped_unregistered, 1);
    }

    #[test]
    fn dispatch_with_wrong_kind_is_decode_failure() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let id = registry.register(EventKind::Device, dispatcher.clone(), None, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        dispatch(&registry, id, 1, &sensor_raw());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().decode_failures, 1);
    }

    #[test]
    fn undecodable_callback_is_counted() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let id = registry.register(EventKind::Sensor, dispatcher.clone(), None, |_| Ok(()));

        let raw = RawCallback::Sensor {
            protocol: Some(c"x"),
            model: Some(c"temperature"),
            sensor_id: 1,
            data_type: 1,
            value: Some(c"n/a"),
            timestamp: 1000,
        };
        dispatch(&registry, id, 1, &raw);

        let stats = dispatcher.stats();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.dispatched, 0);
    }

    #[test]
    fn pending_for_removed_registration_is_dropped() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let id = registry.register(EventKind::Sensor, dispatcher.clone(), None, |_| Ok(()));
        let registration = registry.lookup(id).unwrap();
        let event = decode(&sensor_raw(), crate::config::StringPolicy::Strict).unwrap();

        registry.unregister(id).unwrap();
        let pending = Pending::new(registration, event, 1);

        assert!(pending.deliver(dispatcher.reporter()).is_none());
        assert_eq!(dispatcher.stats().dropped_unregistered, 1);
    }
}
