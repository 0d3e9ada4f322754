// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Direct delivery on the native callback thread.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::DispatcherConfig;
use crate::report::{FailureReason, Reporter};

use super::{Dispatcher, Pending};

/// Calls handlers synchronously on the native callback thread.
///
/// This is the fastest strategy, but handlers run inside the native
/// library's thread: they must return quickly and must not call back into
/// the native library in ways it does not allow re-entrantly. Intended for
/// advanced use only; prefer [`QueuedDispatcher`](super::QueuedDispatcher)
/// or [`EventLoopDispatcher`](super::EventLoopDispatcher).
#[derive(Debug, Default)]
pub struct DirectDispatcher {
    config: DispatcherConfig,
    reporter: Reporter,
    stopped: AtomicBool,
}

impl DirectDispatcher {
    /// Creates a direct dispatcher with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Creates a direct dispatcher with the given configuration.
    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            reporter: Reporter::with_capacity(config.failure_channel_capacity),
            config,
            stopped: AtomicBool::new(false),
        }
    }
}

impl Dispatcher for DirectDispatcher {
    fn deliver(&self, pending: Pending) {
        if self.is_stopped() {
            pending.reject(&self.reporter, FailureReason::AfterStop);
            return;
        }
        pending.deliver(&self.reporter);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::debug!("Direct dispatcher stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::dispatch::dispatch;
    use crate::event::{EventKind, RawCallback};
    use crate::registry::CallbackRegistry;
    use crate::report::FailureReason;

    fn turn_on() -> RawCallback<'static> {
        RawCallback::Device {
            device_id: 3,
            method: 1,
            data: None,
        }
    }

    #[test]
    fn handler_runs_on_calling_thread() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let caller = std::thread::current().id();
        let ran_on = Arc::new(parking_lot::Mutex::new(None));
        let ran_on_clone = Arc::clone(&ran_on);

        let id = registry.register(EventKind::Device, dispatcher.clone(), None, move |_| {
            *ran_on_clone.lock() = Some(std::thread::current().id());
            Ok(())
        });
        dispatch(&registry, id, 1, &turn_on());

        assert_eq!(*ran_on.lock(), Some(caller));
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    #[test]
    fn failing_handler_does_not_break_later_dispatches() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut failures = dispatcher.reporter().failures().subscribe();

        let id = registry.register(EventKind::Device, dispatcher.clone(), None, move |_| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first call explodes");
            }
            Ok(())
        });

        dispatch(&registry, id, 1, &turn_on());
        dispatch(&registry, id, 1, &turn_on());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stats = dispatcher.stats();
        assert_eq!(stats.handler_failures, 1);
        assert_eq!(stats.delivered, 1);

        let failure = failures.try_recv().unwrap();
        assert_eq!(failure.registration, Some(id));
        assert!(matches!(failure.reason, FailureReason::Handler(ref m) if m.contains("first call explodes")));
    }

    #[test]
    fn handler_error_is_reported() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let id = registry.register(EventKind::Device, dispatcher.clone(), None, |_| {
            Err("relay stuck".into())
        });

        dispatch(&registry, id, 1, &turn_on());

        assert_eq!(dispatcher.stats().handler_failures, 1);
    }

    #[test]
    fn dispatch_after_stop_is_dropped_and_counted() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let id = registry.register(EventKind::Device, dispatcher.clone(), None, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        dispatcher.stop();
        dispatcher.stop();
        dispatch(&registry, id, 1, &turn_on());

        assert!(dispatcher.is_stopped());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().dropped_after_stop, 1);
    }

    #[test]
    fn unregistered_id_is_not_delivered() {
        let registry = CallbackRegistry::new();
        let dispatcher = Arc::new(DirectDispatcher::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let id = registry.register(EventKind::Device, dispatcher.clone(), None, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        registry.unregister(id).unwrap();
        dispatch(&registry, id, 1, &turn_on());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.reporter().stats().dropped_unregistered, 1);
    }
}
