//! A per-request sibling completion barrier for GraphQL field resolution.
//!
//! Field resolvers in a query execution engine run concurrently and settle
//! in an unpredictable order: some fields are cheap lookups, others are
//! expensive computed values. Post-processing logic for one field sometimes
//! needs the *finished* value of a sibling field that has not resolved yet.
//!
//! This crate wraps every resolver invocation in a two-phase interceptor:
//! the pre-hook records a pending completion signal for the field, and the
//! post-hook fulfills that signal with the resolver's settled outcome, then
//! awaits the signals of every sibling under the same parent type and merges
//! their values onto a shared result object. Only then does the field's own
//! post-processing run, with every available sibling value in view.
//!
//! The barrier never alters a field's own resolved value; it only enriches
//! the shared object around it. On success it is invisible to the caller.

#![warn(unreachable_pub)]

pub mod context;
pub mod error;
pub mod graphql;
pub mod interceptor;
pub mod json_ext;
pub mod registry;
pub mod result;

pub use context::Context;
pub use error::BarrierError;
pub use error::BoxError;
pub use error::RegistryError;
pub use interceptor::FieldCoordinate;
pub use interceptor::FieldPostProcessor;
pub use interceptor::Interceptor;
pub use interceptor::InterceptorConfig;
pub use interceptor::ResolvingField;
pub use registry::CompletionRegistry;
pub use registry::FieldOutcome;
pub use result::SharedResult;
