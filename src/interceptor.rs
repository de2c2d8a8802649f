//! Resolution interceptor.
//!
//! Wraps every field resolver invocation in a two-phase hook. The
//! pre-hook ([`Interceptor::on_resolver_start`]) registers a pending
//! completion signal for the field and hands back a [`ResolvingField`]
//! guard. Once the resolver settles, the post-hook
//! ([`ResolvingField::on_resolver_settled`]) fulfills that signal, awaits
//! every sibling signal under the same parent type, merges the sibling
//! values onto the shared result object and only then runs the field's
//! registered post-processing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json_bytes::Value;

use crate::context::Context;
use crate::error::BarrierError;
use crate::error::BoxError;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::registry::wait_signal;
use crate::registry::FieldOutcome;
use crate::result::SharedResult;

/// Identifies one field of one parent type, displayed as
/// `Parent.field`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FieldCoordinate {
    /// The parent object type that owns the field.
    pub parent_type: String,
    /// The field name, unique within the parent for one resolution pass.
    pub field_name: String,
}

impl FieldCoordinate {
    pub fn new(parent_type: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            parent_type: parent_type.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for FieldCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.parent_type, self.field_name)
    }
}

/// Field-specific logic that runs after the sibling barrier.
///
/// Registered per field coordinate on the [`Interceptor`]; by the time
/// [`FieldPostProcessor::process`] runs, every sibling that was already
/// resolving has been merged into `merged`, which is the entire reason
/// the barrier exists.
#[async_trait]
pub trait FieldPostProcessor: Send + Sync + 'static {
    /// `own` is this field's settled outcome, `merged` a snapshot of the
    /// shared result object after the sibling merge.
    async fn process(
        &self,
        coordinate: &FieldCoordinate,
        own: &FieldOutcome,
        merged: &Object,
    ) -> Result<(), BoxError>;
}

/// Plain functions work as post-processors.
#[async_trait]
impl<F> FieldPostProcessor for F
where
    F: Fn(&FieldCoordinate, &FieldOutcome, &Object) -> Result<(), BoxError>
        + Send
        + Sync
        + 'static,
{
    async fn process(
        &self,
        coordinate: &FieldCoordinate,
        own: &FieldOutcome,
        merged: &Object,
    ) -> Result<(), BoxError> {
        self(coordinate, own, merged)
    }
}

/// Interceptor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InterceptorConfig {
    /// How long a field's post-hook waits for any one sibling before
    /// giving up on it and merging an explicit `null` in its place.
    ///
    /// Without a bound, a sibling whose signal never fires (for instance
    /// because the engine aborted the execution) would suspend the
    /// post-hook indefinitely.
    #[serde(with = "humantime_serde")]
    pub sibling_wait_timeout: Duration,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            sibling_wait_timeout: Duration::from_secs(30),
        }
    }
}

/// Wraps every field resolver invocation with the sibling completion
/// barrier.
///
/// Built once and shared across requests; all per-request state lives in
/// the [`Context`] and the [`SharedResult`] supplied by the engine.
#[derive(Default)]
pub struct Interceptor {
    config: InterceptorConfig,
    post_processors: HashMap<FieldCoordinate, Arc<dyn FieldPostProcessor>>,
}

impl Interceptor {
    pub fn new(config: InterceptorConfig) -> Self {
        Self {
            config,
            post_processors: HashMap::new(),
        }
    }

    /// Register field-specific post-processing for `coordinate`.
    ///
    /// One handler per coordinate; registering again replaces the
    /// previous handler.
    pub fn post_processor(
        mut self,
        coordinate: FieldCoordinate,
        processor: impl FieldPostProcessor,
    ) -> Self {
        self.post_processors.insert(coordinate, Arc::new(processor));
        self
    }

    /// Pre-hook: call immediately before the resolver for `coordinate`
    /// runs.
    ///
    /// Registers the pending completion signal and returns the guard
    /// whose [`ResolvingField::on_resolver_settled`] must be called with
    /// the resolver's settled outcome. An error here means the engine
    /// invoked a resolver for a field that is still resolving.
    pub fn on_resolver_start(
        &self,
        context: &Context,
        coordinate: FieldCoordinate,
        root: SharedResult,
    ) -> Result<ResolvingField, BarrierError> {
        context
            .registry()
            .register(&coordinate.field_name, &coordinate.parent_type)?;
        tracing::debug!(
            request_id = %context.request_id(),
            coordinate = %coordinate,
            "field resolution started"
        );
        let post_processor = self.post_processors.get(&coordinate).cloned();
        Ok(ResolvingField {
            context: context.clone(),
            coordinate,
            root,
            post_processor,
            wait_timeout: self.config.sibling_wait_timeout,
        })
    }
}

/// The in-flight half of one intercepted resolution: produced by the
/// pre-hook, consumed exactly once by the post-hook.
pub struct ResolvingField {
    context: Context,
    coordinate: FieldCoordinate,
    root: SharedResult,
    post_processor: Option<Arc<dyn FieldPostProcessor>>,
    wait_timeout: Duration,
}

impl std::fmt::Debug for ResolvingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvingField")
            .field("coordinate", &self.coordinate)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

impl ResolvingField {
    /// The field this resolution belongs to.
    pub fn coordinate(&self) -> &FieldCoordinate {
        &self.coordinate
    }

    /// Post-hook: call with the resolver's settled outcome, success or
    /// error.
    ///
    /// Fulfills this field's completion signal, awaits the signals of
    /// every sibling already registered under the same parent type,
    /// merges their values onto the shared result object and runs the
    /// field's post-processor.
    ///
    /// A sibling that failed, timed out or was abandoned does not fail
    /// this field: its key is merged as an explicit `null` and a GraphQL
    /// error marker is returned instead, for the engine to append to its
    /// error collection. The field's own resolved value is never altered
    /// by the barrier.
    pub async fn on_resolver_settled(
        self,
        outcome: FieldOutcome,
    ) -> Result<Vec<graphql::Error>, BarrierError> {
        let registry = self.context.registry();

        // Fulfill before awaiting anyone, so a field can never deadlock
        // on its own signal.
        registry.fulfill(&self.coordinate.field_name, outcome.clone())?;

        // Snapshot taken once: the barrier guarantees mutual visibility
        // among fields already resolving when any one of them finishes.
        // A sibling registering after this point is not waited for.
        let siblings = registry.sibling_signals(
            &self.coordinate.parent_type,
            &self.coordinate.field_name,
        );
        tracing::trace!(
            request_id = %self.context.request_id(),
            coordinate = %self.coordinate,
            siblings = siblings.len(),
            "awaiting sibling completion"
        );

        let wait_timeout = self.wait_timeout;
        let waits = siblings.into_iter().map(|(name, signal)| async move {
            let settled =
                tokio::time::timeout(wait_timeout, wait_signal(&name, signal)).await;
            (name, settled)
        });

        let mut markers = Vec::new();
        for (name, settled) in join_all(waits).await {
            match settled {
                Ok(Ok(Ok(value))) => self.root.insert_if_absent(name, value),
                Ok(Ok(Err(error))) => {
                    self.root.insert_if_absent(name.as_str(), Value::Null);
                    markers.push(self.sibling_marker(
                        &name,
                        "SIBLING_FAILED",
                        format!("sibling field '{name}' failed: {error}"),
                    ));
                }
                Ok(Err(_abandoned)) => {
                    self.root.insert_if_absent(name.as_str(), Value::Null);
                    markers.push(self.sibling_marker(
                        &name,
                        "SIBLING_ABANDONED",
                        format!("sibling field '{name}' was abandoned before resolving"),
                    ));
                }
                Err(_elapsed) => {
                    self.root.insert_if_absent(name.as_str(), Value::Null);
                    markers.push(self.sibling_marker(
                        &name,
                        "SIBLING_TIMEOUT",
                        format!(
                            "sibling field '{name}' did not resolve within {:?}",
                            wait_timeout
                        ),
                    ));
                }
            }
        }

        if let Some(processor) = &self.post_processor {
            let merged = self.root.snapshot();
            processor
                .process(&self.coordinate, &outcome, &merged)
                .await
                .map_err(|error| BarrierError::PostProcess {
                    coordinate: self.coordinate.clone(),
                    reason: error.to_string(),
                })?;
        }

        tracing::debug!(
            request_id = %self.context.request_id(),
            coordinate = %self.coordinate,
            unavailable_siblings = markers.len(),
            "field resolution settled"
        );
        Ok(markers)
    }

    fn sibling_marker(&self, field_name: &str, code: &str, message: String) -> graphql::Error {
        tracing::debug!(
            request_id = %self.context.request_id(),
            coordinate = %self.coordinate,
            sibling = field_name,
            code,
            "sibling unavailable, merging explicit null"
        );
        graphql::Error::builder()
            .message(message)
            .path(Path::from_field(field_name))
            .extension_code(code)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json_bytes::json;

    use super::*;
    use crate::error::RegistryError;

    type Captured = Arc<Mutex<Option<(FieldOutcome, Object)>>>;

    fn capture_into(captured: Captured) -> impl FieldPostProcessor {
        move |_: &FieldCoordinate, own: &FieldOutcome, merged: &Object| -> Result<(), BoxError> {
            *captured.lock() = Some((own.clone(), merged.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_field_with_zero_siblings_settles_immediately() {
        let captured: Captured = Default::default();
        let interceptor = Interceptor::default().post_processor(
            FieldCoordinate::new("Review", "score"),
            capture_into(captured.clone()),
        );
        let context = Context::new();
        let root = SharedResult::new();

        let field = interceptor
            .on_resolver_start(&context, FieldCoordinate::new("Review", "score"), root.clone())
            .unwrap();
        let markers = field.on_resolver_settled(Ok(json!(5))).await.unwrap();

        assert!(markers.is_empty());
        // No sibling merge happened, and post-processing still ran.
        assert_eq!(root.snapshot(), Object::new());
        let (own, merged) = captured.lock().clone().unwrap();
        assert_eq!(own, Ok(json!(5)));
        assert!(merged.is_empty());
    }

    #[tokio::test]
    async fn starting_the_same_field_twice_is_fatal() {
        let interceptor = Interceptor::default();
        let context = Context::new();
        let root = SharedResult::new();

        let _field = interceptor
            .on_resolver_start(&context, FieldCoordinate::new("Review", "score"), root.clone())
            .unwrap();
        let error = interceptor
            .on_resolver_start(&context, FieldCoordinate::new("Review", "score"), root)
            .unwrap_err();

        assert!(matches!(
            error,
            BarrierError::Registry(RegistryError::AlreadyRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn siblings_observe_each_other() {
        let interceptor = Interceptor::default();
        let context = Context::new();
        let root = SharedResult::new();

        let score = interceptor
            .on_resolver_start(&context, FieldCoordinate::new("Review", "score"), root.clone())
            .unwrap();
        let summary = interceptor
            .on_resolver_start(
                &context,
                FieldCoordinate::new("Review", "summary"),
                root.clone(),
            )
            .unwrap();

        let (score_markers, summary_markers) = tokio::join!(
            score.on_resolver_settled(Ok(json!(5))),
            summary.on_resolver_settled(Ok(json!("great"))),
        );

        assert!(score_markers.unwrap().is_empty());
        assert!(summary_markers.unwrap().is_empty());
        assert_eq!(
            root.to_value(),
            json!({ "score": 5, "summary": "great" })
        );
    }

    #[tokio::test]
    async fn a_failed_sibling_is_merged_as_null_with_a_marker() {
        let interceptor = Interceptor::default();
        let context = Context::new();
        let root = SharedResult::new();

        let score = interceptor
            .on_resolver_start(&context, FieldCoordinate::new("Review", "score"), root.clone())
            .unwrap();
        let summary = interceptor
            .on_resolver_start(
                &context,
                FieldCoordinate::new("Review", "summary"),
                root.clone(),
            )
            .unwrap();

        let failure = graphql::Error::builder()
            .message("summary backend is down")
            .extension_code("SUMMARY_UNAVAILABLE")
            .build();
        let (score_markers, summary_markers) = tokio::join!(
            score.on_resolver_settled(Ok(json!(5))),
            summary.on_resolver_settled(Err(failure)),
        );

        let score_markers = score_markers.unwrap();
        assert_eq!(score_markers.len(), 1);
        assert_eq!(
            score_markers[0].extension_code().as_deref(),
            Some("SIBLING_FAILED")
        );
        assert_eq!(score_markers[0].path, Some(Path::from_field("summary")));

        // The failing field still observed its healthy sibling.
        assert!(summary_markers.unwrap().is_empty());
        assert_eq!(root.to_value(), json!({ "score": 5, "summary": null }));
    }

    #[tokio::test(start_paused = true)]
    async fn a_sibling_that_never_settles_times_out() {
        let interceptor = Interceptor::new(InterceptorConfig {
            sibling_wait_timeout: Duration::from_millis(250),
        });
        let context = Context::new();
        let root = SharedResult::new();

        let score = interceptor
            .on_resolver_start(&context, FieldCoordinate::new("Review", "score"), root.clone())
            .unwrap();
        // Registered, but its resolver never settles.
        let _summary = interceptor
            .on_resolver_start(
                &context,
                FieldCoordinate::new("Review", "summary"),
                root.clone(),
            )
            .unwrap();

        let markers = score.on_resolver_settled(Ok(json!(5))).await.unwrap();

        assert_eq!(markers.len(), 1);
        assert_eq!(
            markers[0].extension_code().as_deref(),
            Some("SIBLING_TIMEOUT")
        );
        assert_eq!(root.to_value(), json!({ "summary": null }));
    }

    #[tokio::test]
    async fn a_failing_post_processor_surfaces_as_a_barrier_error() {
        let interceptor = Interceptor::default().post_processor(
            FieldCoordinate::new("Review", "score"),
            |_: &FieldCoordinate, _: &FieldOutcome, _: &Object| -> Result<(), BoxError> {
                Err("post-processing exploded".into())
            },
        );
        let context = Context::new();
        let root = SharedResult::new();

        let field = interceptor
            .on_resolver_start(&context, FieldCoordinate::new("Review", "score"), root)
            .unwrap();
        let error = field.on_resolver_settled(Ok(json!(5))).await.unwrap_err();

        assert!(matches!(error, BarrierError::PostProcess { .. }));
    }
}
