// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Queued delivery drained on a tokio runtime.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::report::{FailureReason, Reporter};

use super::{Dispatcher, Pending};

#[derive(Debug, Default)]
struct LoopState {
    pending: VecDeque<Pending>,
    /// A drain task has been spawned and has not yet seen an empty queue.
    scheduled: bool,
    stopped: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<LoopState>,
    config: DispatcherConfig,
    reporter: Reporter,
    stopped: watch::Sender<bool>,
}

impl Shared {
    /// Stops the dispatcher after its runtime dropped the drain task.
    ///
    /// Everything still queued is rejected, and later dispatches are dropped
    /// as after-stop.
    fn abandon(&self) {
        let orphaned: Vec<Pending> = {
            let mut state = self.state.lock();
            state.scheduled = false;
            state.stopped = true;
            state.pending.drain(..).collect()
        };

        tracing::warn!(
            dropped = orphaned.len(),
            "Runtime dropped the drain task, event loop dispatcher stopped"
        );
        for pending in orphaned {
            pending.reject(&self.reporter, FailureReason::RuntimeShutdown);
        }
        self.stopped.send_replace(true);
    }
}

/// The spawned drain task.
///
/// Dropping it before the queue was seen empty means the runtime shut down
/// or cancelled it, possibly before it was ever polled.
struct DrainTask {
    shared: Arc<Shared>,
    finished: bool,
}

impl DrainTask {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            finished: false,
        }
    }

    /// Delivers queued events until the queue is empty.
    async fn run(mut self) {
        loop {
            let batch: Vec<Pending> = {
                let mut state = self.shared.state.lock();
                if state.pending.is_empty() {
                    state.scheduled = false;
                    self.finished = true;
                    return;
                }
                state.pending.drain(..).collect()
            };

            tracing::trace!(count = batch.len(), "Draining events on runtime");
            for pending in batch {
                pending.deliver(&self.shared.reporter);
            }

            // Let other tasks on the runtime run between batches
            tokio::task::yield_now().await;
        }
    }
}

impl Drop for DrainTask {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.abandon();
        }
    }
}

/// Queues events on the native thread and drains them on a tokio runtime.
///
/// Each dispatch pushes the event and, if no drain is already scheduled,
/// spawns one through the runtime [`Handle`]. `Handle::spawn` is safe to call
/// from the foreign native thread, and the handler then runs on the runtime's
/// own threads. On a current-thread runtime this bridges the native thread
/// into a single-threaded event loop without blocking either side.
///
/// At most one drain task exists at a time, so events are delivered in the
/// order the native thread produced them.
///
/// If the runtime shuts down, the dispatcher stops itself. Events still
/// queued are reported as [`FailureReason::RuntimeShutdown`] and later ones
/// as after-stop drops.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use tellcore_dispatch::dispatch::EventLoopDispatcher;
/// use tellcore_dispatch::event::EventKind;
/// use tellcore_dispatch::registry::CallbackRegistry;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> tellcore_dispatch::Result<()> {
///     let dispatcher = Arc::new(EventLoopDispatcher::current()?);
///     let registry = CallbackRegistry::acquire();
///
///     registry.register(EventKind::Sensor, dispatcher.clone(), None, |delivery| {
///         println!("{:?}", delivery.event());
///         Ok(())
///     });
///
///     dispatcher.stopped().await;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EventLoopDispatcher {
    shared: Arc<Shared>,
    handle: Handle,
}

impl EventLoopDispatcher {
    /// Creates a dispatcher that drains on the runtime behind `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self::with_config(handle, DispatcherConfig::default())
    }

    /// Creates a dispatcher with the given configuration.
    #[must_use]
    pub fn with_config(handle: Handle, config: DispatcherConfig) -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState::default()),
                reporter: Reporter::with_capacity(config.failure_channel_capacity),
                config,
                stopped,
            }),
            handle,
        }
    }

    /// Creates a dispatcher that drains on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`](crate::Error::NoRuntime) when called
    /// outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Ok(Self::new(Handle::try_current()?))
    }

    /// Returns the number of events waiting for the drain task.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Returns `true` if no events are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completes once the dispatcher has been stopped.
    pub async fn stopped(&self) {
        let mut rx = self.shared.stopped.subscribe();
        // The sender lives in `shared`, which `self` keeps alive
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Dispatcher for EventLoopDispatcher {
    fn deliver(&self, pending: Pending) {
        let mut state = self.shared.state.lock();

        if state.stopped {
            drop(state);
            pending.reject(&self.shared.reporter, FailureReason::AfterStop);
            return;
        }

        if let Some(capacity) = self.shared.config.queue_capacity
            && state.pending.len() >= capacity
        {
            drop(state);
            pending.reject(&self.shared.reporter, FailureReason::Overflow);
            return;
        }

        state.pending.push_back(pending);
        let schedule = !state.scheduled;
        state.scheduled = true;
        drop(state);

        if schedule {
            // On a shut down runtime the task is dropped right here
            self.handle
                .spawn(DrainTask::new(Arc::clone(&self.shared)).run());
        }
    }

    fn stop(&self) {
        let mut state = self.shared.state.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        drop(state);

        tracing::debug!("Event loop dispatcher stopped");
        self.shared.stopped.send_replace(true);
    }

    fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopped
    }

    fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    fn reporter(&self) -> &Reporter {
        &self.shared.reporter
    }
}
