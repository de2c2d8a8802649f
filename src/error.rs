//! Barrier errors.
//!
//! Everything in here is an error of the barrier infrastructure itself,
//! kept deliberately distinct from the domain errors carried in a
//! [`crate::graphql::Error`], so that a broken barrier is always
//! distinguishable from broken business logic.

use displaydoc::Display;
use thiserror::Error;

use crate::interceptor::FieldCoordinate;

/// Type-erased error, as returned by field post-processors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Violations of the completion registry invariants.
///
/// The first two indicate a defect in the surrounding engine's invocation
/// discipline (a field must resolve exactly once per parent instance) and
/// are not recoverable.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum RegistryError {
    /// field '{field}' is already registered and still unfulfilled
    AlreadyRegistered {
        /// The conflicting field name.
        field: String,
    },

    /// completion signal for field '{field}' was already fulfilled
    AlreadyFulfilled {
        /// The field whose signal fired twice.
        field: String,
    },

    /// field '{field}' was never registered
    Unregistered {
        /// The missing field name.
        field: String,
    },

    /// completion signal for field '{field}' was dropped before fulfillment
    Abandoned {
        /// The field whose signal went away, typically because the engine
        /// tore down the request while siblings were still waiting.
        field: String,
    },
}

/// Errors raised by the resolution interceptor.
#[derive(Error, Display, Debug)]
pub enum BarrierError {
    /// completion registry invariant violated: {0}
    Registry(#[from] RegistryError),

    /// post-processing for '{coordinate}' failed: {reason}
    PostProcess {
        /// The field whose post-processor failed.
        coordinate: FieldCoordinate,
        /// The reason the post-processor failed.
        reason: String,
    },
}
