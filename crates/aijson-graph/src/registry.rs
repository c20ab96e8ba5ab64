//! Capture registry: the graph being built and its scope lifecycle.
//!
//! A registry is plain owned state. It is injected into every capture-aware
//! operation; [`CaptureRegistry::global`] exists for callers that want a
//! single process-wide instance.

use crate::types::NodeRecord;
use aijson_core::context::generate_scope_id;
use aijson_core::{CaptureError, NodeId, Result, ScopeId, StateError};
use aijson_observability::scope::scope_summary;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, warn};

/// Lifecycle of a capture scope.
///
/// `Inactive -> Active` on scope entry, `Active -> Draining` once the scope
/// body starts, back to `Inactive` on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopePhase {
    #[default]
    Inactive,
    Active,
    Draining,
}

impl ScopePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopePhase::Inactive => "inactive",
            ScopePhase::Active => "active",
            ScopePhase::Draining => "draining",
        }
    }

    pub fn accepts_nodes(&self) -> bool {
        !matches!(self, ScopePhase::Inactive)
    }
}

/// Read-only snapshot of captured nodes in registration order.
#[derive(Debug, Clone, Default)]
pub struct CaptureGraph {
    records: Vec<NodeRecord>,
    index: HashMap<NodeId, usize>,
}

impl CaptureGraph {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.index.get(&id).map(|&position| &self.records[position])
    }

    /// Registration position of `id`; dependencies always have a lower
    /// position than their dependents.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.iter()
    }

    /// Most recently registered node.
    pub fn last(&self) -> Option<&NodeRecord> {
        self.records.last()
    }

    fn insert(&mut self, record: NodeRecord) -> NodeId {
        let id = record.id;
        if self.index.contains_key(&id) {
            return id;
        }
        self.index.insert(id, self.records.len());
        self.records.push(record);
        id
    }

    fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    phase: ScopePhase,
    scope: Option<ScopeId>,
    graph: CaptureGraph,
}

impl RegistryState {
    pub(crate) fn graph(&self) -> &CaptureGraph {
        &self.graph
    }

    /// Inserts records in the given order. Already registered ids are
    /// skipped so that a repeated capture is a no-op.
    ///
    /// Every reference must target a node already in the graph or earlier
    /// in `records`; otherwise nothing is inserted.
    pub(crate) fn insert_all(
        &mut self,
        records: Vec<NodeRecord>,
    ) -> std::result::Result<(), CaptureError> {
        self.check_references(&records)?;
        for record in records {
            debug!(
                node_id = %record.id,
                type_tag = record.type_tag.as_str(),
                position = self.graph.len(),
                "registered capture node"
            );
            self.graph.insert(record);
        }
        Ok(())
    }

    fn check_references(&self, records: &[NodeRecord]) -> std::result::Result<(), CaptureError> {
        let mut batch = HashSet::new();
        for record in records {
            for (path, target) in record.reference_paths() {
                if !self.graph.contains(target) && !batch.contains(&target) {
                    return Err(CaptureError::DanglingReference { node: record.id, path, target });
                }
            }
            batch.insert(record.id);
        }
        Ok(())
    }
}

/// Process-wide capture state: the current graph and its lifecycle.
///
/// Every mutation goes through one mutex, so concurrent constructions inside
/// an open scope register their nodes one at a time.
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    state: Mutex<RegistryState>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily created registry shared by the whole process.
    pub fn global() -> &'static CaptureRegistry {
        static GLOBAL: OnceLock<CaptureRegistry> = OnceLock::new();
        GLOBAL.get_or_init(CaptureRegistry::new)
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| StateError::RegistryPoisoned.into())
    }

    /// Opens a new scope with an empty graph.
    ///
    /// Fails with [`StateError::AlreadyActive`] if a scope is already open on
    /// this registry.
    pub fn activate(&self) -> Result<ScopeId> {
        let mut state = self.lock()?;
        if state.phase.accepts_nodes() {
            let scope = state.scope.clone().unwrap_or_else(generate_scope_id);
            return Err(StateError::AlreadyActive { scope }.into());
        }
        let scope = generate_scope_id();
        state.graph.clear();
        state.phase = ScopePhase::Active;
        state.scope = Some(scope.clone());
        debug!(summary = %summarize(&state), "capture registry activated");
        Ok(scope)
    }

    /// Marks the scope body as running.
    pub fn begin_draining(&self) -> Result<()> {
        let mut state = self.lock()?;
        match state.phase {
            ScopePhase::Active => {
                state.phase = ScopePhase::Draining;
                Ok(())
            }
            ScopePhase::Draining => {
                let scope = state.scope.clone().unwrap_or_else(generate_scope_id);
                Err(StateError::AlreadyActive { scope }.into())
            }
            ScopePhase::Inactive => Err(StateError::Inactive.into()),
        }
    }

    /// Closes the scope without touching the graph.
    pub fn deactivate(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !state.phase.accepts_nodes() {
            return Err(StateError::Inactive.into());
        }
        state.phase = ScopePhase::Inactive;
        state.scope = None;
        Ok(())
    }

    /// Clears all nodes. Idempotent and valid in any phase.
    pub fn reset(&self) {
        let mut state = self.read();
        if !state.graph.is_empty() {
            warn!(
                summary = %summarize(&state),
                "resetting capture registry with recorded nodes"
            );
        }
        state.graph.clear();
    }

    /// Clears all nodes and returns to `Inactive`, whatever the current
    /// phase. Never fails; a poisoned lock is recovered.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.graph.clear();
        state.phase = ScopePhase::Inactive;
        state.scope = None;
        self.state.clear_poison();
    }

    /// Inserts a single record and returns its identity. Registering an
    /// identity twice is a no-op. A record referencing a node that is not in
    /// the graph is rejected with [`CaptureError::DanglingReference`].
    pub fn register(&self, record: NodeRecord) -> Result<NodeId> {
        self.transaction(|state| {
            let id = record.id;
            state.insert_all(vec![record])?;
            Ok(id)
        })
    }

    /// Runs `f` with exclusive access to an active registry.
    pub(crate) fn transaction<R>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.lock()?;
        if !state.phase.accepts_nodes() {
            return Err(StateError::Inactive.into());
        }
        f(&mut state)
    }

    pub fn current_graph(&self) -> Result<CaptureGraph> {
        Ok(self.lock()?.graph.clone())
    }

    /// Read access for the inspection methods. A poisoned lock is
    /// recovered so they report the state the panicking thread left behind;
    /// mutations still fail with [`StateError::RegistryPoisoned`].
    fn read(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> ScopePhase {
        self.read().phase
    }

    pub fn is_active(&self) -> bool {
        self.phase().accepts_nodes()
    }

    pub fn scope_id(&self) -> Option<ScopeId> {
        self.read().scope.clone()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.read().graph.contains(id)
    }

    pub fn node_count(&self) -> usize {
        self.read().graph.len()
    }

    /// Log-friendly description of phase, scope and node count.
    pub fn summary(&self) -> String {
        summarize(&self.read())
    }
}

fn summarize(state: &RegistryState) -> String {
    scope_summary(state.scope.as_ref(), state.phase.as_str(), state.graph.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capturable::{Capturable, Captured};
    use crate::types::{ArgumentValue, Arguments};
    use aijson_core::AijsonError;
    use std::collections::BTreeMap;

    struct Unit;

    impl Capturable for Unit {
        fn type_tag(&self) -> &str {
            "tests.Unit"
        }

        fn snapshot_arguments(&self) -> Arguments {
            Arguments::new()
        }
    }

    fn record() -> NodeRecord {
        NodeRecord::new(Captured::new(Unit).handle(), BTreeMap::new())
    }

    #[test]
    fn register_while_inactive_is_a_state_error() {
        let registry = CaptureRegistry::new();
        let err = registry.register(record()).unwrap_err();
        assert!(matches!(err, AijsonError::State(StateError::Inactive)));
        assert_eq!(registry.node_count(), 0);
    }

    #[test]
    fn record_pointing_outside_the_graph_is_rejected() {
        let registry = CaptureRegistry::new();
        registry.activate().expect("activate");
        let ghost = Captured::new(Unit);
        let arguments =
            BTreeMap::from([("child".to_string(), ArgumentValue::Reference(ghost.id()))]);
        let dangling = NodeRecord::new(Captured::new(Unit).handle(), arguments.clone());

        match registry.register(dangling).unwrap_err() {
            AijsonError::Capture(CaptureError::DanglingReference { path, target, .. }) => {
                assert_eq!(path, "child");
                assert_eq!(target, ghost.id());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.node_count(), 0);

        registry
            .register(NodeRecord::new(ghost.handle(), BTreeMap::new()))
            .expect("register target");
        registry
            .register(NodeRecord::new(Captured::new(Unit).handle(), arguments))
            .expect("target now present");
        assert_eq!(registry.node_count(), 2);
    }

    #[test]
    fn batch_may_reference_earlier_records_only() {
        let registry = CaptureRegistry::new();
        registry.activate().expect("activate");
        let first = record();
        let edge = |target: NodeId| {
            BTreeMap::from([("inner".to_string(), ArgumentValue::Reference(target))])
        };
        let second = NodeRecord::new(Captured::new(Unit).handle(), edge(first.id));

        let backwards = vec![second.clone(), first.clone()];
        let err = registry.transaction(|state| Ok(state.insert_all(backwards)?)).unwrap_err();
        assert!(matches!(err, AijsonError::Capture(CaptureError::DanglingReference { .. })));
        assert_eq!(registry.node_count(), 0, "a rejected batch inserts nothing");

        registry
            .transaction(|state| Ok(state.insert_all(vec![first, second])?))
            .expect("dependencies first");
        assert_eq!(registry.node_count(), 2);
    }

    #[test]
    fn double_activate_is_rejected() {
        let registry = CaptureRegistry::new();
        let scope = registry.activate().expect("activate");
        let err = registry.activate().unwrap_err();
        match err {
            AijsonError::State(StateError::AlreadyActive { scope: active }) => {
                assert_eq!(active, scope)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn phases_follow_scope_lifecycle() {
        let registry = CaptureRegistry::new();
        assert_eq!(registry.phase(), ScopePhase::Inactive);
        registry.activate().expect("activate");
        assert_eq!(registry.phase(), ScopePhase::Active);
        registry.begin_draining().expect("drain");
        assert_eq!(registry.phase(), ScopePhase::Draining);
        registry.register(record()).expect("register");
        registry.release();
        assert_eq!(registry.phase(), ScopePhase::Inactive);
        assert_eq!(registry.node_count(), 0);
        assert!(registry.scope_id().is_none());
    }

    #[test]
    fn registering_same_identity_twice_keeps_one_node() {
        let registry = CaptureRegistry::new();
        registry.activate().expect("activate");
        let record = record();
        let first = registry.register(record.clone()).expect("first");
        let second = registry.register(record).expect("second");
        assert_eq!(first, second);
        assert_eq!(registry.node_count(), 1);
    }

    #[test]
    fn reset_is_idempotent_and_keeps_phase() {
        let registry = CaptureRegistry::new();
        registry.reset();
        registry.activate().expect("activate");
        registry.register(record()).expect("register");
        registry.reset();
        registry.reset();
        assert!(registry.is_active());
        assert_eq!(registry.current_graph().expect("graph").len(), 0);
    }

    #[test]
    fn poisoned_registry_still_reports_its_state() {
        let registry = CaptureRegistry::new();
        let scope = registry.activate().expect("activate");
        let kept = record();
        let kept_id = registry.register(kept).expect("register");

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.transaction(|_| -> Result<()> { panic!("constructor blew up") })
        }));
        assert!(panicked.is_err());

        assert_eq!(registry.phase(), ScopePhase::Active);
        assert!(registry.is_active());
        assert_eq!(registry.scope_id(), Some(scope));
        assert!(registry.contains(kept_id));
        assert_eq!(registry.node_count(), 1);
        assert!(registry.summary().contains("active"));
        assert!(matches!(
            registry.register(record()).unwrap_err(),
            AijsonError::State(StateError::RegistryPoisoned)
        ));

        registry.release();
        assert_eq!(registry.phase(), ScopePhase::Inactive);
        registry.activate().expect("usable after release");
    }

    #[test]
    fn deactivate_requires_open_scope() {
        let registry = CaptureRegistry::new();
        assert!(registry.deactivate().is_err());
        registry.activate().expect("activate");
        registry.deactivate().expect("deactivate");
        assert!(!registry.is_active());
    }
}
