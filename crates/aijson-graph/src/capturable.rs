//! The capturable contract and the handles that carry captured objects.

use crate::types::Arguments;
use aijson_core::{NodeId, Result};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

static NODE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> NodeId {
    NodeId::from_counter(NODE_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Behaviour an object needs to participate in the capture graph.
///
/// `snapshot_arguments` returns the values the object was constructed
/// with, not values re-derived from its current state. The snapshot is
/// taken once, right after construction.
pub trait Capturable: Send + Sync + 'static {
    /// Names the concrete type for reconstruction.
    fn type_tag(&self) -> &str;

    fn snapshot_arguments(&self) -> Arguments;

    /// External binary state. Types without a payload are fully described
    /// by their constructor arguments.
    fn payload(&self) -> Option<&dyn Payload> {
        None
    }

    fn payload_mut(&mut self) -> Option<&mut dyn Payload> {
        None
    }
}

/// Binary state that is written next to the document instead of inline.
pub trait Payload {
    /// File extension of the externalized blob, e.g. `.pt`.
    fn extension(&self) -> &str;

    fn export_payload(&self) -> Result<Vec<u8>>;

    fn import_payload(&mut self, bytes: &[u8]) -> Result<()>;
}

struct CapturedCell<T> {
    id: NodeId,
    type_tag: String,
    arguments: Arguments,
    payload_extension: Option<String>,
    object: RwLock<T>,
}

/// A constructed capturable object together with its graph identity and
/// construction-time argument snapshot.
///
/// Cloning the handle shares the object; two clones have the same
/// [`NodeId`] and are captured as one node.
pub struct Captured<T: Capturable> {
    cell: Arc<CapturedCell<T>>,
}

impl<T: Capturable> Captured<T> {
    /// Wraps `object` without registering it anywhere.
    ///
    /// Use an [`Interceptor`](crate::Interceptor) or a capture scope to
    /// record construction; a detached object is registered the first time
    /// it is passed as an argument inside an active scope.
    pub fn new(object: T) -> Self {
        let arguments = object.snapshot_arguments();
        let payload_extension = object.payload().map(|payload| payload.extension().to_string());
        Self {
            cell: Arc::new(CapturedCell {
                id: next_node_id(),
                type_tag: object.type_tag().to_string(),
                arguments,
                payload_extension,
                object: RwLock::new(object),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.cell.id
    }

    pub fn type_tag(&self) -> &str {
        &self.cell.type_tag
    }

    /// Arguments as snapshotted at construction.
    pub fn arguments(&self) -> &Arguments {
        &self.cell.arguments
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.cell.object.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutable access to the object. Mutation never changes the captured
    /// arguments; payload bytes are exported from the current state.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.cell.object.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle(self.cell.clone())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Capturable> Clone for Captured<T> {
    fn clone(&self) -> Self {
        Self { cell: self.cell.clone() }
    }
}

impl<T: Capturable> fmt::Debug for Captured<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Captured")
            .field("id", &self.cell.id)
            .field("type_tag", &self.cell.type_tag)
            .finish()
    }
}

trait CapturedNode: Send + Sync {
    fn node_id(&self) -> NodeId;
    fn type_tag(&self) -> &str;
    fn arguments(&self) -> &Arguments;
    fn payload_extension(&self) -> Option<&str>;
    fn export_payload(&self) -> Result<Option<Vec<u8>>>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Capturable> CapturedNode for CapturedCell<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    fn payload_extension(&self) -> Option<&str> {
        self.payload_extension.as_deref()
    }

    fn export_payload(&self) -> Result<Option<Vec<u8>>> {
        let object = self.object.read().unwrap_or_else(PoisonError::into_inner);
        match object.payload() {
            Some(payload) => payload.export_payload().map(Some),
            None => Ok(None),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Type-erased handle to a captured object.
#[derive(Clone)]
pub struct NodeHandle(Arc<dyn CapturedNode>);

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.0.node_id()
    }

    pub fn type_tag(&self) -> &str {
        self.0.type_tag()
    }

    pub fn arguments(&self) -> &Arguments {
        self.0.arguments()
    }

    pub fn payload_extension(&self) -> Option<&str> {
        self.0.payload_extension()
    }

    /// Current payload bytes, `None` for objects without a payload.
    pub fn export_payload(&self) -> Result<Option<Vec<u8>>> {
        self.0.export_payload()
    }

    /// Recovers the typed handle if the object is a `T`.
    pub fn downcast<T: Capturable>(&self) -> Option<Captured<T>> {
        self.0
            .clone()
            .into_any()
            .downcast::<CapturedCell<T>>()
            .ok()
            .map(|cell| Captured { cell })
    }

    pub fn is<T: Capturable>(&self) -> bool {
        self.downcast::<T>().is_some()
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id())
            .field("type_tag", &self.type_tag())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Arg;

    struct Counter {
        start: i64,
        current: i64,
    }

    impl Capturable for Counter {
        fn type_tag(&self) -> &str {
            "tests.Counter"
        }

        fn snapshot_arguments(&self) -> Arguments {
            Arguments::new().with("start", self.start)
        }
    }

    struct Other;

    impl Capturable for Other {
        fn type_tag(&self) -> &str {
            "tests.Other"
        }

        fn snapshot_arguments(&self) -> Arguments {
            Arguments::new()
        }
    }

    #[test]
    fn snapshot_is_not_affected_by_later_mutation() {
        let counter = Captured::new(Counter { start: 3, current: 3 });
        counter.write().start = 10;
        counter.write().current += 1;
        assert!(matches!(
            counter.arguments().get("start"),
            Some(Arg::Literal(value)) if *value == serde_json::json!(3)
        ));
        assert_eq!(counter.read().current, 4);
    }

    #[test]
    fn handle_downcasts_to_original_type_only() {
        let counter = Captured::new(Counter { start: 1, current: 1 });
        let handle = counter.handle();
        let typed = handle.downcast::<Counter>().expect("downcast counter");
        assert!(typed.ptr_eq(&counter));
        assert!(handle.downcast::<Other>().is_none());
    }

    #[test]
    fn every_instance_gets_a_new_identity() {
        let first = Captured::new(Other);
        let second = Captured::new(Other);
        assert_ne!(first.id(), second.id());
        assert_eq!(first.clone().id(), first.id());
    }
}
