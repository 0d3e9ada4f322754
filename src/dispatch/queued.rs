// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Queued delivery drained by the consumer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::DispatcherConfig;
use crate::event::Event;
use crate::registry::RegistrationId;
use crate::report::{FailureReason, Reporter};

use super::{Dispatcher, Pending};

/// How [`QueuedDispatcher::drain`] behaves when the queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Return [`DrainOutcome::Empty`] immediately.
    NonBlocking,
    /// Wait until an event arrives or the dispatcher is stopped.
    Blocking,
    /// Wait at most this long.
    Timeout(Duration),
}

/// Result of one [`QueuedDispatcher::drain`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    /// An event was handed to its handler on the draining thread.
    Delivered {
        /// The registration that received the event.
        id: RegistrationId,
        /// The delivered event.
        event: Event,
    },
    /// No event became available (non-blocking mode, or the timeout elapsed).
    Empty,
    /// The dispatcher has been stopped and the queue is empty.
    Stopped,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    stopped: bool,
}

/// Queues events on the native thread; the consumer drains them on a thread
/// of its choice.
///
/// The native thread only takes the queue lock long enough to push. Events
/// are delivered in the order the native thread produced them. Events whose
/// registration was removed while they were queued are skipped and counted.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use tellcore_dispatch::dispatch::{dispatch, DrainMode, DrainOutcome, QueuedDispatcher};
/// use tellcore_dispatch::event::{EventKind, RawCallback};
/// use tellcore_dispatch::registry::CallbackRegistry;
///
/// let registry = CallbackRegistry::new();
/// let queue = Arc::new(QueuedDispatcher::new());
/// let id = registry.register(EventKind::Device, queue.clone(), None, |_| Ok(()));
///
/// // Normally called from a native library thread through a trampoline.
/// dispatch(&registry, id, 1, &RawCallback::Device { device_id: 1, method: 1, data: None });
///
/// let outcome = queue.drain(DrainMode::Timeout(Duration::from_millis(10)));
/// assert!(matches!(outcome, DrainOutcome::Delivered { .. }));
/// ```
#[derive(Debug, Default)]
pub struct QueuedDispatcher {
    state: Mutex<QueueState>,
    available: Condvar,
    config: DispatcherConfig,
    reporter: Reporter,
}

impl QueuedDispatcher {
    /// Creates a queued dispatcher with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Creates a queued dispatcher with the given configuration.
    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            reporter: Reporter::with_capacity(config.failure_channel_capacity),
            config,
        }
    }

    /// Delivers the next queued event on the calling thread.
    ///
    /// Events queued before [`stop`](Dispatcher::stop) are still delivered;
    /// once the queue is empty a stopped dispatcher returns
    /// [`DrainOutcome::Stopped`], and a drain blocked at the time of the stop
    /// wakes up and returns it.
    pub fn drain(&self, mode: DrainMode) -> DrainOutcome {
        // A timeout too large to represent waits like `Blocking`
        let deadline = match mode {
            DrainMode::Timeout(timeout) => Instant::now().checked_add(timeout),
            DrainMode::NonBlocking | DrainMode::Blocking => None,
        };

        loop {
            let pending = match self.next_pending(mode, deadline) {
                Ok(pending) => pending,
                Err(outcome) => return outcome,
            };

            // Handler runs without the queue lock held
            if let Some((id, event)) = pending.deliver(&self.reporter) {
                return DrainOutcome::Delivered { id, event };
            }
        }
    }

    /// Delivers every event currently queued without blocking.
    ///
    /// Returns the number of events delivered.
    pub fn drain_pending(&self) -> usize {
        let mut delivered = 0;
        while let DrainOutcome::Delivered { .. } = self.drain(DrainMode::NonBlocking) {
            delivered += 1;
        }
        delivered
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` if no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pops the next event, waiting according to `mode`.
    ///
    /// Returns the outcome to report instead when nothing arrived in time or
    /// the dispatcher is stopped with an empty queue.
    fn next_pending(
        &self,
        mode: DrainMode,
        deadline: Option<Instant>,
    ) -> Result<Pending, DrainOutcome> {
        let mut state = self.state.lock();
        loop {
            if let Some(pending) = state.pending.pop_front() {
                return Ok(pending);
            }
            if state.stopped {
                return Err(DrainOutcome::Stopped);
            }
            match (mode, deadline) {
                (DrainMode::NonBlocking, _) => return Err(DrainOutcome::Empty),
                (_, None) => self.available.wait(&mut state),
                (_, Some(deadline)) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return state.pending.pop_front().ok_or(if state.stopped {
                            DrainOutcome::Stopped
                        } else {
                            DrainOutcome::Empty
                        });
                    }
                }
            }
        }
    }
}

impl Dispatcher for QueuedDispatcher {
    fn deliver(&self, pending: Pending) {
        let mut state = self.state.lock();

        if state.stopped {
            drop(state);
            pending.reject(&self.reporter, FailureReason::AfterStop);
            return;
        }

        if let Some(capacity) = self.config.queue_capacity
            && state.pending.len() >= capacity
        {
            drop(state);
            pending.reject(&self.reporter, FailureReason::Overflow);
            return;
        }

        state.pending.push_back(pending);
        drop(state);
        self.available.notify_one();
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        let queued = state.pending.len();
        drop(state);

        tracing::debug!(queued, "Queued dispatcher stopped");
        self.available.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}
