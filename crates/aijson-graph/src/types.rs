use crate::capturable::{Capturable, Captured, NodeHandle};
use crate::finite::non_finite_path;
use aijson_core::ids::normalize_extension;
use aijson_core::{CaptureError, NodeId};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Marker key for a reference edge inside serialized arguments.
pub const REF_MARKER: &str = "$ref";

/// A constructor argument exactly as it was passed.
///
/// Capturable values become reference edges when the node is registered,
/// everything else stays an inline literal. Values that cannot be
/// represented are kept as [`Arg::Rejected`] so that the failure surfaces
/// when the node is captured, with the argument path attached.
#[derive(Debug, Clone)]
pub enum Arg {
    Literal(Value),
    Node(NodeHandle),
    List(Vec<Arg>),
    Map(BTreeMap<String, Arg>),
    Rejected(Rejection),
}

/// Why an argument could not be converted to a literal.
///
/// `NonFiniteNumber` carries the location of the float inside the rejected
/// value (`""` when the value itself is the float, `"[1]"` for the second
/// element of a list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NonFiniteNumber(String),
    NonStringKey(String),
    Unserializable(String),
}

impl Rejection {
    pub(crate) fn into_error(self, path: String) -> CaptureError {
        match self {
            Rejection::NonFiniteNumber(at) => CaptureError::NonFiniteNumber { path: path + &at },
            Rejection::NonStringKey(message) => CaptureError::NonStringKey { path, message },
            Rejection::Unserializable(message) => CaptureError::Unserializable { path, message },
        }
    }
}

impl Arg {
    /// Converts any serializable value to a literal argument.
    pub fn literal<S: Serialize + ?Sized>(value: &S) -> Self {
        if let Some(at) = non_finite_path(value) {
            return Arg::Rejected(Rejection::NonFiniteNumber(at));
        }
        match serde_json::to_value(value) {
            Ok(value) => Arg::Literal(value),
            Err(err) => {
                let message = err.to_string();
                if message.contains("key must be a string") {
                    Arg::Rejected(Rejection::NonStringKey(message))
                } else {
                    Arg::Rejected(Rejection::Unserializable(message))
                }
            }
        }
    }

    pub fn node<T: Capturable>(captured: &Captured<T>) -> Self {
        Arg::Node(captured.handle())
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Arg::Node(_))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Literal(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Literal(Value::Bool(value))
    }
}

macro_rules! impl_integer_arg {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Literal(Value::from(value))
                }
            }
        )*
    };
}

impl_integer_arg!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        match serde_json::Number::from_f64(value) {
            Some(number) => Arg::Literal(Value::Number(number)),
            None => Arg::Rejected(Rejection::NonFiniteNumber(String::new())),
        }
    }
}

impl From<f32> for Arg {
    fn from(value: f32) -> Self {
        Arg::from(f64::from(value))
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Literal(Value::String(value))
    }
}

impl From<NodeHandle> for Arg {
    fn from(value: NodeHandle) -> Self {
        Arg::Node(value)
    }
}

impl From<&NodeHandle> for Arg {
    fn from(value: &NodeHandle) -> Self {
        Arg::Node(value.clone())
    }
}

impl<T: Capturable> From<&Captured<T>> for Arg {
    fn from(value: &Captured<T>) -> Self {
        Arg::Node(value.handle())
    }
}

impl<T: Capturable> From<Captured<T>> for Arg {
    fn from(value: Captured<T>) -> Self {
        Arg::Node(value.handle())
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Arg::Literal(Value::Null))
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(values: Vec<T>) -> Self {
        Arg::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Arg>> From<BTreeMap<String, T>> for Arg {
    fn from(values: BTreeMap<String, T>) -> Self {
        Arg::Map(values.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Arg>> From<HashMap<String, T>> for Arg {
    fn from(values: HashMap<String, T>) -> Self {
        Arg::Map(values.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Construction-argument snapshot, keyed by declared parameter name.
///
/// Order of insertion is kept; setting the same name twice replaces the
/// earlier value.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    entries: Vec<(String, Arg)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.set(name, value);
        self
    }

    /// Adds a serializable value that has no direct `Into<Arg>` conversion.
    pub fn with_literal<S: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &S) -> Self {
        self.set(name, Arg::literal(value));
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Arg>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resolved argument: an inline literal or an edge to another node.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Literal(Value),
    Reference(NodeId),
    List(Vec<ArgumentValue>),
    Map(BTreeMap<String, ArgumentValue>),
}

impl ArgumentValue {
    /// All node ids referenced by this value, in argument order.
    pub fn references(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_references(String::new(), &mut out);
        out.into_iter().map(|(_, id)| id).collect()
    }

    fn collect_references(&self, path: String, out: &mut Vec<(String, NodeId)>) {
        match self {
            ArgumentValue::Literal(_) => {}
            ArgumentValue::Reference(id) => out.push((path, *id)),
            ArgumentValue::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    item.collect_references(format!("{path}[{idx}]"), out);
                }
            }
            ArgumentValue::Map(entries) => {
                for (key, value) in entries {
                    value.collect_references(format!("{path}.{key}"), out);
                }
            }
        }
    }
}

/// One captured object.
///
/// Built once when the object is first registered and never mutated
/// afterwards. The record holds the object's handle so that its payload can
/// be exported when the graph is serialized.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: NodeId,
    pub type_tag: String,
    pub arguments: BTreeMap<String, ArgumentValue>,
    pub payload_extension: Option<String>,
    handle: NodeHandle,
}

impl NodeRecord {
    pub fn new(handle: NodeHandle, arguments: BTreeMap<String, ArgumentValue>) -> Self {
        Self {
            id: handle.id(),
            type_tag: handle.type_tag().to_string(),
            arguments,
            payload_extension: handle.payload_extension().map(normalize_extension),
            handle,
        }
    }

    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Node ids this record has edges to, in argument-name order.
    pub fn references(&self) -> Vec<NodeId> {
        self.arguments
            .values()
            .flat_map(ArgumentValue::references)
            .collect()
    }

    /// Like [`references`](Self::references), paired with the argument path
    /// each edge sits at (`children[1]`, `config.encoder`).
    pub fn reference_paths(&self) -> Vec<(String, NodeId)> {
        let mut out = Vec::new();
        for (name, value) in &self.arguments {
            value.collect_references(name.clone(), &mut out);
        }
        out
    }
}
