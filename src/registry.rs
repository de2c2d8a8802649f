//! Per-request completion registry.
//!
//! The registry maps each resolving field to a single-use completion
//! signal tagged with the field's parent type. A signal starts
//! unfulfilled, fires exactly once with the field's settled outcome, and
//! can be awaited by any number of readers before or after it fires.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json_bytes::Value;
use tokio::sync::watch;

use crate::error::RegistryError;
use crate::graphql;

/// The settled outcome of one field resolver: the resolved JSON value, or
/// the error the resolver failed with.
pub type FieldOutcome = Result<Value, graphql::Error>;

/// The read half of a completion signal.
pub(crate) type Signal = watch::Receiver<Option<FieldOutcome>>;

struct FieldEntry {
    parent_type: String,
    /// Taken on fulfillment, so a signal can only ever fire once.
    sender: Option<watch::Sender<Option<FieldOutcome>>>,
    receiver: Signal,
}

/// Per-request mapping from field name to completion signal.
///
/// Owned exclusively by one request's [`crate::Context`] and discarded
/// with it. A field name is unique within its parent for one resolution
/// pass, not globally across the query; registering an already fulfilled
/// name again starts a fresh pass for that name.
#[derive(Default)]
pub struct CompletionRegistry {
    fields: Mutex<HashMap<String, FieldEntry>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending completion signal for `field_name` under
    /// `parent_type`.
    ///
    /// Registering a field that is still unfulfilled means the engine
    /// invoked a resolver twice for the same field instance. That is a
    /// fatal invariant violation, not a recoverable condition.
    pub fn register(&self, field_name: &str, parent_type: &str) -> Result<(), RegistryError> {
        let mut fields = self.fields.lock();
        if let Some(entry) = fields.get(field_name) {
            if entry.sender.is_some() {
                return Err(RegistryError::AlreadyRegistered {
                    field: field_name.to_string(),
                });
            }
        }
        let (sender, receiver) = watch::channel(None);
        fields.insert(
            field_name.to_string(),
            FieldEntry {
                parent_type: parent_type.to_string(),
                sender: Some(sender),
                receiver,
            },
        );
        Ok(())
    }

    /// Fulfill the signal for `field_name` with the resolver's settled
    /// outcome. Exactly-once: a second fulfillment is rejected.
    pub fn fulfill(&self, field_name: &str, outcome: FieldOutcome) -> Result<(), RegistryError> {
        let mut fields = self.fields.lock();
        let entry = fields
            .get_mut(field_name)
            .ok_or_else(|| RegistryError::Unregistered {
                field: field_name.to_string(),
            })?;
        let sender = entry
            .sender
            .take()
            .ok_or_else(|| RegistryError::AlreadyFulfilled {
                field: field_name.to_string(),
            })?;
        // The entry keeps a receiver alive, so this send cannot fail.
        let _ = sender.send(Some(outcome));
        Ok(())
    }

    /// Names of the fields registered under `parent_type` at the time of
    /// the call.
    ///
    /// Registration happens concurrently with other fields still
    /// resolving, so this is a snapshot: a sibling that registers later
    /// will not be in it, and callers must tolerate that.
    pub fn siblings(&self, parent_type: &str) -> Vec<String> {
        self.fields
            .lock()
            .iter()
            .filter(|(_, entry)| entry.parent_type == parent_type)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Snapshot of the sibling signals under `parent_type`, excluding
    /// `exclude` itself.
    pub(crate) fn sibling_signals(&self, parent_type: &str, exclude: &str) -> Vec<(String, Signal)> {
        self.fields
            .lock()
            .iter()
            .filter(|(name, entry)| {
                entry.parent_type == parent_type && name.as_str() != exclude
            })
            .map(|(name, entry)| (name.clone(), entry.receiver.clone()))
            .collect()
    }

    /// Suspend until the signal for `field_name` fires, then return its
    /// outcome. Never blocks once the signal has fired.
    pub async fn wait(&self, field_name: &str) -> Result<FieldOutcome, RegistryError> {
        let signal = self
            .fields
            .lock()
            .get(field_name)
            .map(|entry| entry.receiver.clone())
            .ok_or_else(|| RegistryError::Unregistered {
                field: field_name.to_string(),
            })?;
        wait_signal(field_name, signal).await
    }
}

/// Await a cloned signal, outside the registry lock.
pub(crate) async fn wait_signal(
    field_name: &str,
    mut signal: Signal,
) -> Result<FieldOutcome, RegistryError> {
    let fulfilled = signal
        .wait_for(Option::is_some)
        .await
        .map_err(|_| RegistryError::Abandoned {
            field: field_name.to_string(),
        })?;
    let outcome = fulfilled
        .clone()
        .expect("wait_for only returns a fulfilled signal");
    Ok(outcome)
}
