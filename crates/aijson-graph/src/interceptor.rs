//! Capture interceptor: wraps construction and records the new node.

use crate::capturable::{Capturable, Captured, NodeHandle};
use crate::registry::{CaptureGraph, CaptureRegistry};
use crate::types::{Arg, ArgumentValue, NodeRecord, REF_MARKER};
use aijson_core::{AijsonError, CaptureError, NodeId, Result, StateError};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::trace;

/// Records construction of capturable objects into a registry.
///
/// Construction always runs first and the object is usable whatever the
/// registry state. When the registry is inactive no graph bookkeeping
/// happens at all.
#[derive(Debug, Clone, Copy)]
pub struct Interceptor<'r> {
    registry: &'r CaptureRegistry,
}

impl<'r> Interceptor<'r> {
    pub fn new(registry: &'r CaptureRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r CaptureRegistry {
        self.registry
    }

    /// Runs `ctor` and, if a scope is open, registers the result together
    /// with any capturable arguments not yet in the graph.
    pub fn construct<T, F>(&self, ctor: F) -> Result<Captured<T>>
    where
        T: Capturable,
        F: FnOnce() -> T,
    {
        self.adopt(ctor())
    }

    /// Like [`construct`](Self::construct) for fallible constructors.
    pub fn try_construct<T, F>(&self, ctor: F) -> Result<Captured<T>>
    where
        T: Capturable,
        F: FnOnce() -> Result<T>,
    {
        self.adopt(ctor()?)
    }

    /// Wraps an already constructed object.
    ///
    /// The phase check and the registration happen under one lock, so a
    /// scope closing on another thread never turns into a failed
    /// construction.
    pub fn adopt<T: Capturable>(&self, object: T) -> Result<Captured<T>> {
        let captured = Captured::new(object);
        match self.capture_handle(&captured.handle()) {
            Ok(_) => {}
            Err(AijsonError::State(StateError::Inactive)) => {
                trace!(node_id = %captured.id(), "no active capture scope, skipping registration");
            }
            Err(err) => return Err(err),
        }
        Ok(captured)
    }

    /// Registers `captured` (and its dependencies first) in the active
    /// scope. Capturing an already registered object is a no-op.
    pub fn capture<T: Capturable>(&self, captured: &Captured<T>) -> Result<NodeId> {
        self.capture_handle(&captured.handle())
    }

    pub fn capture_handle(&self, handle: &NodeHandle) -> Result<NodeId> {
        self.registry.transaction(|state| {
            let planned = plan_records(state.graph(), handle)?;
            state.insert_all(planned)?;
            Ok(handle.id())
        })
    }
}

/// Records to insert so that `root` and every capturable it references are
/// in the graph, dependencies first. Nothing is returned if any argument in
/// the tree cannot be represented.
fn plan_records(
    graph: &CaptureGraph,
    root: &NodeHandle,
) -> std::result::Result<Vec<NodeRecord>, CaptureError> {
    let mut planner = Planner { graph, planned: Vec::new(), seen: HashSet::new() };
    planner.visit(root)?;
    Ok(planner.planned)
}

struct Planner<'g> {
    graph: &'g CaptureGraph,
    planned: Vec<NodeRecord>,
    seen: HashSet<NodeId>,
}

impl Planner<'_> {
    fn visit(&mut self, handle: &NodeHandle) -> std::result::Result<(), CaptureError> {
        let id = handle.id();
        if self.graph.contains(id) || self.seen.contains(&id) {
            return Ok(());
        }
        let mut arguments = BTreeMap::new();
        for (name, arg) in handle.arguments().iter() {
            let value = self.resolve(arg, name.to_string())?;
            arguments.insert(name.to_string(), value);
        }
        self.seen.insert(id);
        self.planned.push(NodeRecord::new(handle.clone(), arguments));
        Ok(())
    }

    fn resolve(&mut self, arg: &Arg, path: String) -> std::result::Result<ArgumentValue, CaptureError> {
        match arg {
            Arg::Literal(value) => {
                check_literal(value, &path)?;
                Ok(ArgumentValue::Literal(value.clone()))
            }
            Arg::Node(child) => {
                self.visit(child)?;
                Ok(ArgumentValue::Reference(child.id()))
            }
            Arg::List(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| self.resolve(item, format!("{path}[{idx}]")))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(ArgumentValue::List),
            Arg::Map(entries) => {
                if is_reserved_map(entries.keys()) {
                    return Err(CaptureError::ReservedKey { path });
                }
                let mut resolved = BTreeMap::new();
                for (key, value) in entries {
                    resolved.insert(key.clone(), self.resolve(value, format!("{path}.{key}"))?);
                }
                Ok(ArgumentValue::Map(resolved))
            }
            Arg::Rejected(rejection) => Err(rejection.clone().into_error(path)),
        }
    }
}

fn is_reserved_map<'a>(mut keys: impl ExactSizeIterator<Item = &'a String>) -> bool {
    keys.len() == 1 && keys.next().is_some_and(|key| key == REF_MARKER)
}

fn check_literal(value: &Value, path: &str) -> std::result::Result<(), CaptureError> {
    match value {
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                check_literal(item, &format!("{path}[{idx}]"))?;
            }
            Ok(())
        }
        Value::Object(map) => {
            if is_reserved_map(map.keys()) {
                return Err(CaptureError::ReservedKey { path: path.to_string() });
            }
            for (key, item) in map {
                check_literal(item, &format!("{path}.{key}"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
