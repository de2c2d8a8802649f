//! The shared result object for one parent instance.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::json_ext::Object;

/// The in-progress output object for one parent instance, shared by all
/// sibling field resolutions under that parent.
///
/// Mutation is append-only: a key is written once and never overwritten,
/// which makes interleaved merges of the same sibling by different
/// post-hooks idempotent. The engine serializes this same object as the
/// field's parent value in the response payload.
#[derive(Clone, Debug, Default)]
pub struct SharedResult {
    inner: Arc<Mutex<Object>>,
}

impl SharedResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the object with values already present before any resolver
    /// ran, such as columns fetched together with the parent row.
    pub fn from_object(object: Object) -> Self {
        Self {
            inner: Arc::new(Mutex::new(object)),
        }
    }

    /// Write `value` under `key`, unless the key is already present.
    pub fn insert_if_absent(&self, key: impl Into<ByteString>, value: Value) {
        self.inner.lock().entry(key.into()).or_insert(value);
    }

    /// Read a single key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    /// Clone the current contents.
    pub fn snapshot(&self) -> Object {
        self.inner.lock().clone()
    }

    /// The current contents as a JSON value, ready to serialize into a
    /// response.
    pub fn to_value(&self) -> Value {
        Value::Object(self.snapshot())
    }
}
