// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Failure reporting for the native callback path.
//!
//! Nothing that goes wrong on the native thread can be returned to the
//! native caller. Instead, every dropped or failed delivery is
//!
//! - counted in [`DispatchCounters`] (read back as a [`DispatchStats`] snapshot),
//! - logged through `tracing`,
//! - published on a [`FailureBus`] for consumers that want to react.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::config::DEFAULT_FAILURE_CHANNEL_CAPACITY;
use crate::error::DecodeError;
use crate::event::EventKind;
use crate::registry::RegistrationId;

/// Why a native callback did not result in a successful handler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The callback referenced a registration id that is not in the registry.
    UnknownRegistration,
    /// The registration was removed while the event was pending.
    Unregistered,
    /// The native arguments could not be decoded.
    Decode(DecodeError),
    /// The handler returned an error or panicked.
    Handler(String),
    /// The dispatcher had already been stopped.
    AfterStop,
    /// The dispatch queue was full.
    Overflow,
    /// The runtime draining the queue shut down.
    RuntimeShutdown,
}

/// A dropped or failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    /// The registration the callback was addressed to, if known.
    pub registration: Option<RegistrationId>,
    /// The callback kind.
    pub kind: EventKind,
    /// What went wrong.
    pub reason: FailureReason,
}

impl DispatchFailure {
    /// Creates a failure record.
    #[must_use]
    pub fn new(registration: Option<RegistrationId>, kind: EventKind, reason: FailureReason) -> Self {
        Self {
            registration,
            kind,
            reason,
        }
    }
}

/// Broadcast channel of [`DispatchFailure`] records.
///
/// Publishing never blocks, so it is safe on the native thread. Slow
/// subscribers lose the oldest records (`RecvError::Lagged`).
#[derive(Debug, Clone)]
pub struct FailureBus {
    sender: broadcast::Sender<DispatchFailure>,
}

impl FailureBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FAILURE_CHANNEL_CAPACITY)
    }

    /// Creates a bus with the given capacity (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to failures published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchFailure> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes a failure. Without subscribers the record is discarded.
    pub fn publish(&self, failure: DispatchFailure) {
        // No subscribers is not an error here
        let _ = self.sender.send(failure);
    }
}

impl Default for FailureBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Live counters of one dispatcher (or of the registry).
#[derive(Debug, Default)]
pub struct DispatchCounters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    dropped_after_stop: AtomicU64,
    dropped_unregistered: AtomicU64,
    dropped_overflow: AtomicU64,
    decode_failures: AtomicU64,
    handler_failures: AtomicU64,
}

impl DispatchCounters {
    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_after_stop: self.dropped_after_stop.load(Ordering::Relaxed),
            dropped_unregistered: self.dropped_unregistered.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }

    fn counter_for(&self, reason: &FailureReason) -> &AtomicU64 {
        match reason {
            FailureReason::UnknownRegistration | FailureReason::Unregistered => {
                &self.dropped_unregistered
            }
            FailureReason::Decode(_) => &self.decode_failures,
            FailureReason::Handler(_) => &self.handler_failures,
            FailureReason::AfterStop | FailureReason::RuntimeShutdown => &self.dropped_after_stop,
            FailureReason::Overflow => &self.dropped_overflow,
        }
    }
}

/// Snapshot of [`DispatchCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events decoded and handed to the dispatcher.
    pub dispatched: u64,
    /// Handler calls that returned successfully.
    pub delivered: u64,
    /// Events dropped because the dispatcher was stopped, or because its
    /// runtime shut down with the events still queued.
    pub dropped_after_stop: u64,
    /// Events dropped because their registration was gone.
    pub dropped_unregistered: u64,
    /// Events dropped because the queue was full.
    pub dropped_overflow: u64,
    /// Callbacks whose arguments could not be decoded.
    pub decode_failures: u64,
    /// Handler calls that returned an error or panicked.
    pub handler_failures: u64,
}

impl DispatchStats {
    /// Returns the total number of events that never reached a handler.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped_after_stop
            + self.dropped_unregistered
            + self.dropped_overflow
            + self.decode_failures
    }
}

/// Counters and failure bus of one reporting scope.
#[derive(Debug, Default)]
pub struct Reporter {
    counters: DispatchCounters,
    bus: FailureBus,
}

impl Reporter {
    /// Creates a reporter whose failure bus has the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counters: DispatchCounters::default(),
            bus: FailureBus::with_capacity(capacity),
        }
    }

    /// Counts, logs and publishes a failure.
    pub fn report(&self, failure: DispatchFailure) {
        self.counters
            .counter_for(&failure.reason)
            .fetch_add(1, Ordering::Relaxed);

        let id = failure.registration.map(|id| id.to_string());
        match &failure.reason {
            FailureReason::Decode(e) => {
                tracing::warn!(registration = ?id, kind = %failure.kind, error = %e, "Dropping undecodable callback");
            }
            FailureReason::Handler(message) => {
                tracing::warn!(registration = ?id, kind = %failure.kind, error = %message, "Event handler failed");
            }
            FailureReason::Overflow => {
                tracing::warn!(registration = ?id, kind = %failure.kind, "Dispatch queue full, dropping event");
            }
            FailureReason::RuntimeShutdown => {
                tracing::warn!(registration = ?id, kind = %failure.kind, "Runtime shut down, dropping queued event");
            }
            reason => {
                tracing::debug!(registration = ?id, kind = %failure.kind, ?reason, "Dropping event");
            }
        }

        self.bus.publish(failure);
    }

    /// Counts an event handed to a dispatcher.
    pub fn record_dispatched(&self) {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a successful handler call.
    pub fn record_delivered(&self) {
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the failure bus.
    #[must_use]
    pub fn failures(&self) -> &FailureBus {
        &self.bus
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}
