// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the callback dispatch core.
//!
//! Errors fall in two groups: the ones returned to consumer code (bad
//! registration ids, a native subscribe call that failed, no runtime to
//! integrate with) and the ones that arise on the native callback thread
//! (decode failures, handler failures, dispatch after stop). The second group
//! is never returned across the native boundary; it is reported through a
//! [`FailureBus`](crate::report::FailureBus) and the dispatcher counters.

use thiserror::Error;

use crate::event::EventKind;
use crate::registry::RegistrationId;

/// Boxed error returned by a consumer handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by consumer handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The registration id is unknown (never issued, or already removed).
    #[error("invalid registration: {0}")]
    InvalidRegistration(RegistrationId),

    /// Native callback arguments could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A consumer handler returned an error or panicked during delivery.
    #[error("handler for {id} failed: {message}")]
    HandlerFailure {
        /// The registration whose handler failed.
        id: RegistrationId,
        /// Description of the failure.
        message: String,
    },

    /// An event reached a dispatcher that had already been stopped.
    #[error("dispatch after stop")]
    DispatchAfterStop,

    /// The native library refused a subscription.
    #[error("native subscribe for {kind} failed with code {code}")]
    Subscribe {
        /// The event kind that was being subscribed.
        kind: EventKind,
        /// The status code returned by the native library.
        code: i32,
    },

    /// The native library refused to remove a subscription.
    #[error("native unsubscribe for {id} failed with code {code}")]
    Unsubscribe {
        /// The registration whose native subscription was being removed.
        id: RegistrationId,
        /// The status code returned by the native library.
        code: i32,
    },

    /// No tokio runtime is available to integrate with.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The dispatcher configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Errors raised while turning raw native callback arguments into an
/// [`Event`](crate::event::Event).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A required string argument was a null pointer.
    #[error("required string argument `{0}` was null")]
    NullString(&'static str),

    /// A string argument was not valid UTF-8.
    #[error("string argument `{0}` is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// An integer argument held a code this crate does not know.
    #[error("unknown {field} code {code}")]
    UnknownCode {
        /// The argument that held the code.
        field: &'static str,
        /// The raw code value.
        code: i32,
    },

    /// A numeric argument (or numeric text) is outside its documented range.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The argument that failed to parse.
        field: &'static str,
        /// Description of the parsing failure.
        message: String,
    },

    /// The callback kind does not match the registration's event kind.
    #[error("callback of kind {actual} delivered to a {expected} registration")]
    KindMismatch {
        /// The kind the registration was created for.
        expected: EventKind,
        /// The kind of the callback that arrived.
        actual: EventKind,
    },

    /// The context pointer does not encode a registration id.
    #[error("callback context does not carry a registration id")]
    MissingContext,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
