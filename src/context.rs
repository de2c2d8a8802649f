//! Per-request state.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::registry::CompletionRegistry;

/// Context for one query execution.
///
/// Created once per incoming query and discarded when execution
/// completes, success or failure. Cloning is cheap and every clone shares
/// the same [`CompletionRegistry`]; nothing in here is shared across
/// requests or survives the request.
#[derive(Clone)]
pub struct Context {
    request_id: Uuid,
    registry: Arc<CompletionRegistry>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            registry: Arc::new(CompletionRegistry::new()),
        }
    }

    /// A unique identifier for this request, used in logs.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// This request's completion registry.
    pub fn registry(&self) -> &CompletionRegistry {
        &self.registry
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .finish()
    }
}
