// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registration handles and the data handed to consumer handlers.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dispatch::Dispatcher;
use crate::error::HandlerResult;
use crate::event::{Event, EventKind};

/// Opaque value attached to a registration and handed back on every delivery.
pub type UserContext = Arc<dyn Any + Send + Sync>;

/// Handler invoked for every delivered event.
pub(crate) type Handler = Arc<dyn Fn(&Delivery<'_>) -> HandlerResult + Send + Sync>;

/// Unique identifier for a registration.
///
/// Ids come from a process-wide monotonic counter and are never reused, so a
/// late callback for a removed registration can never be attributed to a
/// newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Encodes this id as the opaque context pointer passed to the native
    /// library.
    ///
    /// The pointer is never dereferenced; it only carries the id back into
    /// the trampoline.
    #[must_use]
    pub fn as_context(&self) -> *mut c_void {
        usize::try_from(self.0).map_or(ptr::null_mut(), ptr::without_provenance_mut)
    }

    /// Recovers an id from a native context pointer.
    ///
    /// Returns `None` for a null pointer.
    #[must_use]
    pub fn from_context(context: *mut c_void) -> Option<Self> {
        match context.addr() {
            0 => None,
            addr => u64::try_from(addr).ok().map(Self),
        }
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reg({})", self.0)
    }
}

/// What a handler receives for one event.
pub struct Delivery<'a> {
    id: RegistrationId,
    native_callback_id: i32,
    event: &'a Event,
    context: Option<&'a UserContext>,
}

impl<'a> Delivery<'a> {
    /// The registration being delivered to.
    #[must_use]
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// The callback id the native library passed with this invocation.
    #[must_use]
    pub fn native_callback_id(&self) -> i32 {
        self.native_callback_id
    }

    /// The decoded event.
    #[must_use]
    pub fn event(&self) -> &'a Event {
        self.event
    }

    /// The user context, if it was registered with one of type `T`.
    #[must_use]
    pub fn context<T: Any>(&self) -> Option<&'a T> {
        self.context.and_then(|context| context.downcast_ref::<T>())
    }
}

/// A live subscription: handler, context and the dispatcher in charge.
///
/// Cloning is cheap and every clone observes [`is_active`](Self::is_active)
/// flipping to `false` once the registration is removed from its registry.
#[derive(Clone)]
pub struct Registration {
    inner: Arc<Inner>,
}

struct Inner {
    id: RegistrationId,
    kind: EventKind,
    handler: Handler,
    context: Option<UserContext>,
    dispatcher: Arc<dyn Dispatcher>,
    active: AtomicBool,
}

impl Registration {
    pub(crate) fn new(
        id: RegistrationId,
        kind: EventKind,
        handler: Handler,
        context: Option<UserContext>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                kind,
                handler,
                context,
                dispatcher,
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Returns the registration id.
    #[must_use]
    pub fn id(&self) -> RegistrationId {
        self.inner.id
    }

    /// Returns the event kind this registration receives.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.inner.kind
    }

    /// Returns the dispatcher that delivers this registration's events.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.inner.dispatcher
    }

    /// Returns the user context.
    #[must_use]
    pub fn context(&self) -> Option<&UserContext> {
        self.inner.context.as_ref()
    }

    /// Returns `false` once the registration has been removed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.inner.active.store(false, Ordering::Release);
    }

    /// Calls the handler, converting an error or a panic into a message.
    pub(crate) fn invoke(&self, event: &Event, native_callback_id: i32) -> Result<(), String> {
        let delivery = Delivery {
            id: self.inner.id,
            native_callback_id,
            event,
            context: self.inner.context.as_ref(),
        };

        match panic::catch_unwind(AssertUnwindSafe(|| (self.inner.handler)(&delivery))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
