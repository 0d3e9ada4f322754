// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback registry.
//!
//! # Overview
//!
//! - [`RegistrationId`] - Opaque, never-reused handle for a registration
//! - [`Registration`] - Handler, user context and dispatcher of one subscription
//! - [`Delivery`] - What a handler receives for one event
//! - [`CallbackRegistry`] - Thread-safe table of registrations
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use tellcore_dispatch::dispatch::DirectDispatcher;
//! use tellcore_dispatch::event::EventKind;
//! use tellcore_dispatch::registry::CallbackRegistry;
//!
//! let registry = CallbackRegistry::new();
//! let id = registry.register(
//!     EventKind::Sensor,
//!     Arc::new(DirectDispatcher::new()),
//!     None,
//!     |delivery| {
//!         println!("{:?}", delivery.event());
//!         Ok(())
//!     },
//! );
//!
//! registry.unregister(id)?;
//! # Ok::<(), tellcore_dispatch::Error>(())
//! ```

mod registration;
mod table;

pub use registration::{Delivery, Registration, RegistrationId, UserContext};
pub use table::CallbackRegistry;
