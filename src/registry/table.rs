// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The callback registry and its process-wide installation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::dispatch::Dispatcher;
use crate::error::{Error, HandlerResult, Result};
use crate::event::EventKind;
use crate::report::Reporter;

use super::{Delivery, Registration, RegistrationId, UserContext};

/// Process-wide id counter; ids are never reused.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The registry native trampolines route through, if one is installed.
static INSTALLED: Mutex<Weak<CallbackRegistry>> = Mutex::new(Weak::new());

/// Callbacks that arrived while no registry was installed.
static ORPHANED: AtomicU64 = AtomicU64::new(0);

/// Table of registrations, looked up by id on every native callback.
///
/// All mutation happens under a single `parking_lot::RwLock` that is only
/// held to insert, remove or clone a [`Registration`]; handlers are never
/// called with the lock held.
///
/// # Process-wide installation
///
/// Native trampolines are plain functions and cannot capture state, so they
/// reach the registry through [`CallbackRegistry::installed`]. The first call
/// to [`CallbackRegistry::acquire`] installs a registry; every later call
/// shares it until the last handle is dropped, which tears it down.
pub struct CallbackRegistry {
    registrations: RwLock<HashMap<RegistrationId, Registration>>,
    reporter: Reporter,
}

impl CallbackRegistry {
    /// Creates a standalone registry that is not installed process-wide.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            reporter: Reporter::default(),
        }
    }

    /// Returns the installed registry, installing a new one if needed.
    #[must_use]
    pub fn acquire() -> Arc<Self> {
        let mut installed = INSTALLED.lock();
        if let Some(registry) = installed.upgrade() {
            return registry;
        }

        tracing::debug!("Installing process-wide callback registry");
        let registry = Arc::new(Self::new());
        *installed = Arc::downgrade(&registry);
        registry
    }

    /// Returns the installed registry without installing one.
    #[must_use]
    pub fn installed() -> Option<Arc<Self>> {
        INSTALLED.lock().upgrade()
    }

    /// Returns how many callbacks arrived while no registry was installed.
    #[must_use]
    pub fn orphaned_callbacks() -> u64 {
        ORPHANED.load(Ordering::Relaxed)
    }

    pub(crate) fn record_orphan(kind: EventKind) {
        ORPHANED.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = %kind, "Dropping callback, no registry installed");
    }

    fn next_id() -> RegistrationId {
        RegistrationId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a handler for events of `kind`, delivered by `dispatcher`.
    ///
    /// The registration is visible to lookups as soon as this returns.
    pub fn register<F>(
        &self,
        kind: EventKind,
        dispatcher: Arc<dyn Dispatcher>,
        context: Option<UserContext>,
        handler: F,
    ) -> RegistrationId
    where
        F: Fn(&Delivery<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let id = Self::next_id();
        let registration = Registration::new(id, kind, Arc::new(handler), context, dispatcher);
        self.registrations.write().insert(id, registration);
        tracing::debug!(id = %id, kind = %kind, "Registered callback");
        id
    }

    /// Removes a registration.
    ///
    /// Events for this id that are still waiting in a dispatch queue are
    /// dropped when they reach the front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] if the id is unknown.
    pub fn unregister(&self, id: RegistrationId) -> Result<Registration> {
        let registration = self
            .registrations
            .write()
            .remove(&id)
            .ok_or(Error::InvalidRegistration(id))?;
        registration.deactivate();
        tracing::debug!(id = %id, kind = %registration.kind(), "Unregistered callback");
        Ok(registration)
    }

    /// Looks up a registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistration`] if the id is unknown.
    pub fn lookup(&self, id: RegistrationId) -> Result<Registration> {
        self.registrations
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::InvalidRegistration(id))
    }

    /// Removes every registration.
    pub fn clear(&self) {
        let removed: Vec<_> = self.registrations.write().drain().collect();
        for (_, registration) in &removed {
            registration.deactivate();
        }
    }

    /// Returns the ids of all registrations, in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<RegistrationId> {
        let mut ids: Vec<_> = self.registrations.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns `true` if there are no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reports callbacks that could not be attributed to any dispatcher.
    #[must_use]
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallbackRegistry {
    fn drop(&mut self) {
        for registration in self.registrations.get_mut().values() {
            registration.deactivate();
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registrations", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DirectDispatcher;

    fn direct() -> Arc<dyn Dispatcher> {
        Arc::new(DirectDispatcher::new())
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = CallbackRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_then_lookup() {
        let registry = CallbackRegistry::new();
        let id = registry.register(EventKind::Sensor, direct(), None, |_| Ok(()));

        let registration = registry.lookup(id).unwrap();
        assert_eq!(registration.id(), id);
        assert_eq!(registration.kind(), EventKind::Sensor);
        assert!(registration.is_active());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_deactivates_outstanding_clones() {
        let registry = CallbackRegistry::new();
        let id = registry.register(EventKind::Device, direct(), None, |_| Ok(()));
        let held = registry.lookup(id).unwrap();

        registry.unregister(id).unwrap();

        assert!(!held.is_active());
        assert!(matches!(
            registry.lookup(id),
            Err(Error::InvalidRegistration(missing)) if missing == id
        ));
    }

    #[test]
    fn unregister_unknown_id_fails() {
        let registry = CallbackRegistry::new();
        let err = registry.unregister(RegistrationId::new(u64::MAX)).unwrap_err();
        assert!(matches!(err, Error::InvalidRegistration(_)));
    }

    #[test]
    fn unregister_twice_fails() {
        let registry = CallbackRegistry::new();
        let id = registry.register(EventKind::Device, direct(), None, |_| Ok(()));

        assert!(registry.unregister(id).is_ok());
        assert!(registry.unregister(id).is_err());
    }

    #[test]
    fn ids_are_never_reused() {
        let registry = CallbackRegistry::new();
        let first = registry.register(EventKind::Device, direct(), None, |_| Ok(()));
        registry.unregister(first).unwrap();
        let second = registry.register(EventKind::Device, direct(), None, |_| Ok(()));

        assert!(second > first);
        assert_eq!(registry.ids(), vec![second]);
    }

    #[test]
    fn ids_are_unique_across_registries() {
        let a = CallbackRegistry::new();
        let b = CallbackRegistry::new();

        let id_a = a.register(EventKind::Sensor, direct(), None, |_| Ok(()));
        let id_b = b.register(EventKind::Sensor, direct(), None, |_| Ok(()));

        assert_ne!(id_a, id_b);
    }

    #[test]
    fn clear_removes_everything() {
        let registry = CallbackRegistry::new();
        let id = registry.register(EventKind::Device, direct(), None, |_| Ok(()));
        registry.register(EventKind::Sensor, direct(), None, |_| Ok(()));
        let held = registry.lookup(id).unwrap();

        registry.clear();

        assert!(registry.is_empty());
        assert!(!held.is_active());
    }

    #[test]
    fn concurrent_register_and_unregister() {
        let registry = Arc::new(CallbackRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let id = registry.register(EventKind::Sensor, direct(), None, |_| Ok(()));
                        assert!(registry.lookup(id).is_ok());
                        registry.unregister(id).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn debug_shows_count() {
        let registry = CallbackRegistry::new();
        registry.register(EventKind::Device, direct(), None, |_| Ok(()));

        let debug = format!("{registry:?}");
        assert!(debug.contains("CallbackRegistry"));
        assert!(debug.contains("registrations: 1"));
    }
}
