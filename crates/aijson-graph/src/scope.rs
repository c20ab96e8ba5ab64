//! Scoped capture entry point.

use crate::capturable::{Capturable, Captured, NodeHandle};
use crate::config::DumpConfig;
use crate::disposer::{Disposer, FormatRegistry};
use crate::document::{BlobSet, SerializedDocument};
use crate::interceptor::Interceptor;
use crate::registry::{CaptureGraph, CaptureRegistry};
use crate::serialize::{build_document, serialize};
use aijson_core::{NodeId, Result, ScopeId};
use aijson_observability::spans;
use std::fmt;
use tracing::info;

/// Opens a capture scope on `registry`, runs `body` and releases the
/// registry on every exit path, including panics.
///
/// Fails with `StateError::AlreadyActive` if a scope is already open on the
/// registry; the open scope is left untouched in that case.
pub fn capture_scope<T, F>(registry: &CaptureRegistry, body: F) -> Result<T>
where
    F: FnOnce(&CaptureScope<'_>) -> Result<T>,
{
    run_scope(registry, None, body)
}

/// Like [`capture_scope`], and hands the final graph to `disposer` when the
/// body succeeds.
pub fn capture_scope_with<T, F>(
    registry: &CaptureRegistry,
    disposer: &dyn Disposer,
    body: F,
) -> Result<T>
where
    F: FnOnce(&CaptureScope<'_>) -> Result<T>,
{
    run_scope(registry, Some(disposer), body)
}

fn run_scope<T, F>(
    registry: &CaptureRegistry,
    disposer: Option<&dyn Disposer>,
    body: F,
) -> Result<T>
where
    F: FnOnce(&CaptureScope<'_>) -> Result<T>,
{
    let scope_id = registry.activate()?;
    let _release = ReleaseGuard { registry };
    let span = spans::capture_scope(&scope_id);
    let _guard = span.enter();

    info!(scope_id = %scope_id, "capture scope opened");
    registry.begin_draining()?;
    let scope = CaptureScope { registry, scope_id };
    let value = body(&scope)?;
    if let Some(disposer) = disposer {
        scope.dump_with(disposer)?;
    }
    info!(
        scope_id = %scope.scope_id,
        nodes = registry.node_count(),
        "capture scope closed"
    );
    Ok(value)
}

struct ReleaseGuard<'r> {
    registry: &'r CaptureRegistry,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.registry.release();
    }
}

/// Handle given to the body of a capture scope.
pub struct CaptureScope<'r> {
    registry: &'r CaptureRegistry,
    scope_id: ScopeId,
}

impl<'r> CaptureScope<'r> {
    pub fn id(&self) -> &ScopeId {
        &self.scope_id
    }

    pub fn registry(&self) -> &'r CaptureRegistry {
        self.registry
    }

    pub fn interceptor(&self) -> Interceptor<'r> {
        Interceptor::new(self.registry)
    }

    pub fn construct<T, F>(&self, ctor: F) -> Result<Captured<T>>
    where
        T: Capturable,
        F: FnOnce() -> T,
    {
        self.interceptor().construct(ctor)
    }

    pub fn try_construct<T, F>(&self, ctor: F) -> Result<Captured<T>>
    where
        T: Capturable,
        F: FnOnce() -> Result<T>,
    {
        self.interceptor().try_construct(ctor)
    }

    pub fn capture<T: Capturable>(&self, captured: &Captured<T>) -> Result<NodeId> {
        self.interceptor().capture(captured)
    }

    pub fn capture_handle(&self, handle: &NodeHandle) -> Result<NodeId> {
        self.interceptor().capture_handle(handle)
    }

    /// Snapshot of the nodes captured so far.
    pub fn graph(&self) -> Result<CaptureGraph> {
        self.registry.current_graph()
    }

    pub fn node_count(&self) -> usize {
        self.registry.node_count()
    }

    /// Document and payload blobs for the current graph. `root` defaults to
    /// the most recently registered node.
    pub fn serialize(&self, root: Option<NodeId>) -> Result<(SerializedDocument, BlobSet)> {
        serialize(&self.graph()?, root)
    }

    /// Document only, without exporting payloads.
    pub fn document(&self, root: Option<NodeId>) -> Result<SerializedDocument> {
        build_document(&self.graph()?, root)
    }

    /// Writes the current graph with the disposer `config.format` selects.
    pub fn dump(&self, config: &DumpConfig) -> Result<()> {
        let disposer = FormatRegistry::default().disposer(config)?;
        self.dump_with(disposer.as_ref())
    }

    pub fn dump_with(&self, disposer: &dyn Disposer) -> Result<()> {
        let (document, blobs) = self.serialize(None)?;
        disposer.write(&document, &blobs)
    }
}

impl fmt::Display for CaptureScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .document(None)
            .and_then(|document| document.to_json_string(true));
        match rendered {
            Ok(text) => f.write_str(&text),
            Err(err) => write!(f, "<capture graph unavailable: {err}>"),
        }
    }
}

impl fmt::Debug for CaptureScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureScope")
            .field("scope_id", &self.scope_id)
            .field("summary", &self.registry.summary())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Arguments;
    use aijson_core::{AijsonError, StateError};
    use tracing_test::traced_test;

    struct Probe(u32);

    impl Capturable for Probe {
        fn type_tag(&self) -> &str {
            "tests.Probe"
        }

        fn snapshot_arguments(&self) -> Arguments {
            Arguments::new().with("value", self.0)
        }
    }

    #[test]
    #[traced_test]
    fn scope_logs_open_and_close() {
        let registry = CaptureRegistry::new();
        capture_scope(&registry, |scope| {
            scope.construct(|| Probe(1))?;
            Ok(())
        })
        .expect("scope");
        assert!(logs_contain("capture scope opened"));
        assert!(logs_contain("capture scope closed"));
        assert!(logs_contain("registered capture node"));
    }

    #[test]
    fn nested_scope_is_rejected_and_outer_scope_survives() {
        let registry = CaptureRegistry::new();
        capture_scope(&registry, |scope| {
            scope.construct(|| Probe(1))?;
            let err = capture_scope(&registry, |_| Ok(())).unwrap_err();
            assert!(matches!(err, AijsonError::State(StateError::AlreadyActive { .. })));
            assert!(registry.is_active());
            assert_eq!(scope.node_count(), 1);
            Ok(())
        })
        .expect("outer scope");
        assert!(!registry.is_active());
    }

    #[test]
    fn display_renders_document() {
        let registry = CaptureRegistry::new();
        capture_scope(&registry, |scope| {
            scope.construct(|| Probe(7))?;
            let text = scope.to_string();
            let value: serde_json::Value = serde_json::from_str(&text).expect("json");
            assert_eq!(value["nodes"]["0"]["type_tag"], "tests.Probe");
            assert_eq!(value["nodes"]["0"]["arguments"]["value"], 7);
            assert_eq!(value["root"], "0");
            Ok(())
        })
        .expect("scope");
    }

    #[test]
    fn dump_with_unknown_format_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = CaptureRegistry::new();
        let config = DumpConfig::new(dir.path().join("model.ai.xml")).with_format("xml");
        let err = capture_scope(&registry, |scope| {
            scope.construct(|| Probe(2))?;
            scope.dump(&config)
        })
        .unwrap_err();
        assert!(matches!(err, AijsonError::UnsupportedFormat { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
        assert_eq!(registry.node_count(), 0);
    }
}
