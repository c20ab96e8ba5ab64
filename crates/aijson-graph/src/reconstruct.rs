//! Document to object graph conversion.

use crate::capturable::{Capturable, Captured, NodeHandle};
use crate::document::{parse_reference, BlobSet, SerializedDocument};
use crate::validate::topological_order;
use aijson_core::{AijsonError, DocumentKey, ReconstructionError, Result};
use aijson_observability::spans;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// An argument with every `$ref` replaced by the already rebuilt object.
#[derive(Debug, Clone)]
pub enum Resolved {
    Literal(Value),
    Node(NodeHandle),
    List(Vec<Resolved>),
    Map(BTreeMap<String, Resolved>),
}

impl Resolved {
    pub fn as_node(&self) -> Option<&NodeHandle> {
        match self {
            Resolved::Node(handle) => Some(handle),
            _ => None,
        }
    }

    /// Plain JSON for values that contain no node.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Resolved::Literal(value) => Some(value.clone()),
            Resolved::Node(_) => None,
            Resolved::List(items) => items
                .iter()
                .map(Resolved::to_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Resolved::Map(entries) => entries
                .iter()
                .map(|(key, value)| value.to_value().map(|value| (key.clone(), value)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(Value::Object),
        }
    }
}

/// Arguments handed to a reconstructor.
#[derive(Debug, Clone)]
pub struct ResolvedArguments {
    key: DocumentKey,
    entries: BTreeMap<String, Resolved>,
}

impl ResolvedArguments {
    /// Document key of the node being rebuilt.
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn mismatch(&self, name: &str, message: impl Into<String>) -> AijsonError {
        ReconstructionError::ArgumentMismatch {
            key: self.key.clone(),
            argument: name.to_string(),
            message: message.into(),
        }
        .into()
    }

    fn require(&self, name: &str) -> Result<&Resolved> {
        self.get(name).ok_or_else(|| self.mismatch(name, "missing argument"))
    }

    pub fn literal<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .require(name)?
            .to_value()
            .ok_or_else(|| self.mismatch(name, "expected a literal, found a node reference"))?;
        serde_json::from_value(value).map_err(|err| self.mismatch(name, err.to_string()))
    }

    pub fn optional_literal<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.get(name) {
            None | Some(Resolved::Literal(Value::Null)) => Ok(None),
            Some(_) => self.literal(name).map(Some),
        }
    }

    pub fn handle(&self, name: &str) -> Result<NodeHandle> {
        self.require(name)?
            .as_node()
            .cloned()
            .ok_or_else(|| self.mismatch(name, "expected a node reference"))
    }

    pub fn node<T: Capturable>(&self, name: &str) -> Result<Captured<T>> {
        let handle = self.handle(name)?;
        handle.downcast::<T>().ok_or_else(|| {
            self.mismatch(name, format!("node of type `{}` has the wrong type", handle.type_tag()))
        })
    }

    /// Heterogeneous list of node references.
    pub fn handles(&self, name: &str) -> Result<Vec<NodeHandle>> {
        match self.require(name)? {
            Resolved::List(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    item.as_node()
                        .cloned()
                        .ok_or_else(|| self.mismatch(name, format!("item {idx} is not a node reference")))
                })
                .collect(),
            _ => Err(self.mismatch(name, "expected a list of node references")),
        }
    }

    pub fn nodes<T: Capturable>(&self, name: &str) -> Result<Vec<Captured<T>>> {
        self.handles(name)?
            .into_iter()
            .enumerate()
            .map(|(idx, handle)| {
                handle.downcast::<T>().ok_or_else(|| {
                    self.mismatch(name, format!("item {idx} of type `{}` has the wrong type", handle.type_tag()))
                })
            })
            .collect()
    }
}

type ReconstructFn =
    Box<dyn Fn(&ResolvedArguments, Option<&[u8]>) -> Result<NodeHandle> + Send + Sync>;

fn boxed<F>(reconstruct: F) -> ReconstructFn
where
    F: Fn(&ResolvedArguments, Option<&[u8]>) -> Result<NodeHandle> + Send + Sync + 'static,
{
    Box::new(reconstruct)
}

/// Maps type tags to functions that rebuild objects from resolved
/// arguments.
#[derive(Default)]
pub struct ReconstructorRegistry {
    reconstructors: HashMap<String, ReconstructFn>,
}

impl ReconstructorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every registration submitted with
    /// [`register_reconstructor!`](crate::register_reconstructor).
    pub fn from_inventory() -> Self {
        let mut registry = Self::new();
        for provider in inventory::iter::<ReconstructorProvider> {
            (provider.0)(&mut registry);
        }
        registry
    }

    /// Registers `build` for `type_tag`. When the document carries a payload
    /// for the node, it is imported into the freshly built object before the
    /// object is handed to its dependents.
    pub fn register<T, F>(&mut self, type_tag: impl Into<String>, build: F) -> &mut Self
    where
        T: Capturable,
        F: Fn(&ResolvedArguments) -> Result<T> + Send + Sync + 'static,
    {
        let type_tag = type_tag.into();
        let tag = type_tag.clone();
        let reconstruct = boxed(move |args, payload| {
            let mut object = build(args)?;
            if let Some(bytes) = payload {
                let target = object.payload_mut().ok_or_else(|| {
                    AijsonError::from(ReconstructionError::PayloadUnsupported {
                        key: args.key().clone(),
                        type_tag: tag.clone(),
                    })
                })?;
                target.import_payload(bytes)?;
            }
            Ok(Captured::new(object).handle())
        });
        self.reconstructors.insert(type_tag, reconstruct);
        self
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.reconstructors.contains_key(type_tag)
    }

    pub fn len(&self) -> usize {
        self.reconstructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reconstructors.is_empty()
    }

    pub fn type_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.reconstructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

/// Registration function collected through `inventory`.
pub struct ReconstructorProvider(pub fn(&mut ReconstructorRegistry));

inventory::collect!(ReconstructorProvider);

#[macro_export]
macro_rules! register_reconstructor {
    ($provider:path) => {
        $crate::inventory::submit! {
            $crate::reconstruct::ReconstructorProvider($provider)
        }
    };
}

/// Objects rebuilt from a document, in dependency order.
#[derive(Debug, Clone, Default)]
pub struct Reconstructed {
    root: Option<DocumentKey>,
    nodes: Vec<(DocumentKey, NodeHandle)>,
    positions: HashMap<DocumentKey, usize>,
}

impl Reconstructed {
    pub fn root(&self) -> Option<&NodeHandle> {
        self.root.as_ref().and_then(|key| self.get(key))
    }

    pub fn root_as<T: Capturable>(&self) -> Result<Captured<T>> {
        let root = self
            .root()
            .ok_or_else(|| AijsonError::InvalidDocument("document has no root".to_string()))?;
        root.downcast::<T>().ok_or_else(|| {
            AijsonError::InvalidDocument(format!("root has type `{}`", root.type_tag()))
        })
    }

    pub fn get(&self, key: &DocumentKey) -> Option<&NodeHandle> {
        self.positions.get(key).map(|&position| &self.nodes[position].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocumentKey, &NodeHandle)> {
        self.nodes.iter().map(|(key, handle)| (key, handle))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Rebuilds every node of `document`.
///
/// Type tags and blobs are checked before anything is built; any failure
/// discards the partially built graph.
pub fn deserialize(
    document: &SerializedDocument,
    blobs: &BlobSet,
    reconstructors: &ReconstructorRegistry,
) -> Result<Reconstructed> {
    let span = spans::reconstruct_document(document.len());
    let _guard = span.enter();

    crate::validate::validate_document(document, blobs)?;
    for (key, node) in &document.nodes {
        if !reconstructors.contains(&node.type_tag) {
            return Err(ReconstructionError::UnknownTypeTag {
                key: key.clone(),
                type_tag: node.type_tag.clone(),
            }
            .into());
        }
    }

    let order = topological_order(document)?;
    let mut built: HashMap<DocumentKey, NodeHandle> = HashMap::with_capacity(order.len());
    let mut nodes = Vec::with_capacity(order.len());
    for position in order {
        let (key, node) = &document.nodes[position];
        let mut entries = BTreeMap::new();
        for (name, value) in &node.arguments {
            entries.insert(name.clone(), resolve(value, key, &built)?);
        }
        let args = ResolvedArguments { key: key.clone(), entries };
        let payload = match &node.payload_ref {
            Some(name) => Some(blobs.get(name).ok_or_else(|| ReconstructionError::MissingBlob {
                key: key.clone(),
                name: name.clone(),
            })?),
            None => None,
        };
        let reconstruct = reconstructors.reconstructors.get(&node.type_tag).ok_or_else(|| {
            ReconstructionError::UnknownTypeTag { key: key.clone(), type_tag: node.type_tag.clone() }
        })?;
        let handle = reconstruct(&args, payload)?;
        debug!(node = key.as_str(), type_tag = node.type_tag.as_str(), "reconstructed node");
        built.insert(key.clone(), handle.clone());
        nodes.push((key.clone(), handle));
    }

    let positions = nodes
        .iter()
        .enumerate()
        .map(|(position, (key, _))| (key.clone(), position))
        .collect();
    Ok(Reconstructed { root: document.root.clone(), nodes, positions })
}

fn resolve(
    value: &Value,
    owner: &DocumentKey,
    built: &HashMap<DocumentKey, NodeHandle>,
) -> Result<Resolved> {
    if let Some(target) = parse_reference(value)? {
        let handle = built.get(&target).cloned().ok_or_else(|| {
            ReconstructionError::DanglingReference { key: owner.clone(), target }
        })?;
        return Ok(Resolved::Node(handle));
    }
    Ok(match value {
        Value::Array(items) => Resolved::List(
            items
                .iter()
                .map(|item| resolve(item, owner, built))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut entries = BTreeMap::new();
            for (name, item) in map {
                entries.insert(name.clone(), resolve(item, owner, built)?);
            }
            Resolved::Map(entries)
        }
        other => Resolved::Literal(other.clone()),
    })
}
