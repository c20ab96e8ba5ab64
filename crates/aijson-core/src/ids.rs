//! Strongly-typed ID wrappers for graph concepts.
//!
//! These newtypes prevent mixing a runtime node identity with the
//! dump-local key that names the same node inside a document.

pub use aijson_id::{
    DerivedConstructible, DerivedId, ExternalConstructible, ExternalId, IdConstruction,
    IdSemantics, MonotonicConstructible, MonotonicId, OrdinalConstructible, OrdinalId,
    TemporalConstructible, TemporalId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(
    /// Capture scope identifier, used for log correlation only.
    ScopeId
);
define_id_type!(
    /// Key naming a node inside one serialized document.
    DocumentKey
);
define_id_type!(
    /// Relative file name of an externalized payload.
    PayloadName
);

/// Runtime identity of a capturable instance.
///
/// Assigned once when the instance is constructed and never reused within
/// the process. It is never written to a document; documents use
/// [`DocumentKey`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(MonotonicId);

impl NodeId {
    pub fn from_counter(counter: u64) -> Self {
        Self(MonotonicId::new("node", counter))
    }

    pub fn counter(&self) -> u64 {
        self.0.counter()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.into_string())
    }
}

impl ScopeId {
    pub fn new(millis: u64, counter: u64) -> Self {
        Self(TemporalId::new("scope", millis, counter).into_string())
    }

    pub fn parse_temporal(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix("scope-")?;
        let mut parts = rest.splitn(2, '-');
        let millis = parts.next()?.parse::<u64>().ok()?;
        let counter = parts.next()?.parse::<u64>().ok()?;
        Some(Self::new(millis, counter))
    }
}

impl DocumentKey {
    pub fn from_ordinal(id: OrdinalId) -> Self {
        Self(id.into_string())
    }

    pub fn from_external(id: ExternalId) -> Self {
        Self(id.into_string())
    }

    pub fn ordinal(&self) -> Option<OrdinalId> {
        OrdinalId::parse_str(&self.0)
    }
}

impl PayloadName {
    /// Payload file name for the node stored under `key`, e.g. `node-2.pt`.
    pub fn for_node(key: &DocumentKey, extension: &str) -> Self {
        let extension = normalize_extension(extension);
        Self(
            DerivedId::from_parts("node", [key.as_str()])
                .with_suffix(&extension)
                .into_string(),
        )
    }

    pub fn from_external(id: ExternalId) -> Self {
        Self(id.into_string())
    }

    /// The same payload under `{namespace}.{name}`, e.g. `model.node-2.pt`
    /// for a manifest named `model.json`.
    pub fn namespaced(&self, namespace: &str) -> Self {
        Self(format!("{namespace}.{}", self.0))
    }

    /// Extension including the leading dot, if the name has one.
    pub fn extension(&self) -> Option<&str> {
        self.0.rfind('.').map(|idx| &self.0[idx..])
    }
}

/// Returns `ext` with exactly one leading dot.
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.'))
}

impl IdSemantics for NodeId {
    const CONSTRUCTION: IdConstruction = IdConstruction::MonotonicCounter { prefix: "node" };
}
impl IdSemantics for ScopeId {
    const CONSTRUCTION: IdConstruction = IdConstruction::TemporalCounter { prefix: "scope" };
}
impl IdSemantics for DocumentKey {
    const CONSTRUCTION: IdConstruction = IdConstruction::Ordinal;
}
impl IdSemantics for PayloadName {
    const CONSTRUCTION: IdConstruction = IdConstruction::Derived;
}

impl MonotonicConstructible for NodeId {}
impl TemporalConstructible for ScopeId {}
impl OrdinalConstructible for DocumentKey {}
impl ExternalConstructible for DocumentKey {}
impl DerivedConstructible for PayloadName {}
impl ExternalConstructible for PayloadName {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_name_normalizes_extension() {
        let key = DocumentKey::from_ordinal(OrdinalId::new(2));
        assert_eq!(PayloadName::for_node(&key, "pt").as_str(), "node-2.pt");
        assert_eq!(PayloadName::for_node(&key, ".pt").as_str(), "node-2.pt");
        assert_eq!(PayloadName::for_node(&key, ".pt").extension(), Some(".pt"));
    }

    #[test]
    fn namespaced_payload_keeps_its_extension() {
        let key = DocumentKey::from_ordinal(OrdinalId::new(0));
        let name = PayloadName::for_node(&key, "pt").namespaced("model.ai");
        assert_eq!(name.as_str(), "model.ai.node-0.pt");
        assert_eq!(name.extension(), Some(".pt"));
    }

    #[test]
    fn scope_id_round_trips_through_parse() {
        let id = ScopeId::new(1700, 4);
        assert_eq!(ScopeId::parse_temporal(id.as_str()), Some(id));
    }

    #[test]
    fn node_id_displays_with_prefix() {
        assert_eq!(NodeId::from_counter(9).to_string(), "node-9");
    }
}
