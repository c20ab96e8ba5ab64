//! JSON-shaped document and externalized blobs.

use crate::types::REF_MARKER;
use aijson_core::{AijsonError, DocumentKey, PayloadName, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// Serialized capture graph.
///
/// `nodes` keeps registration order; it is written as a JSON object whose
/// keys are [`DocumentKey`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedDocument {
    pub format_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<DocumentKey>,
    #[serde(with = "ordered_nodes")]
    pub nodes: Vec<(DocumentKey, DocumentNode)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub type_tag: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_ref: Option<PayloadName>,
}

impl Default for SerializedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializedDocument {
    pub fn new() -> Self {
        Self { format_version: DOCUMENT_FORMAT_VERSION, root: None, nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, key: &DocumentKey) -> Option<&DocumentNode> {
        self.nodes
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, node)| node)
    }

    pub fn root_node(&self) -> Option<&DocumentNode> {
        self.root.as_ref().and_then(|key| self.node(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &DocumentKey> {
        self.nodes.iter().map(|(key, _)| key)
    }

    pub fn to_json_string(&self, pretty: bool) -> Result<String> {
        let text = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(text)?;
        if document.format_version != DOCUMENT_FORMAT_VERSION {
            return Err(AijsonError::InvalidDocument(format!(
                "unsupported format_version {} (expected {})",
                document.format_version, DOCUMENT_FORMAT_VERSION
            )));
        }
        Ok(document)
    }
}

impl DocumentNode {
    /// Keys of all nodes this node references, in argument-name order.
    pub fn references(&self) -> Result<Vec<DocumentKey>> {
        let mut out = Vec::new();
        for value in self.arguments.values() {
            collect_references(value, &mut out)?;
        }
        Ok(out)
    }
}

pub fn reference_marker(key: &DocumentKey) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(REF_MARKER.to_string(), Value::String(key.as_str().to_string()));
    Value::Object(map)
}

/// `Some(key)` if `value` is a `{"$ref": key}` marker.
///
/// A marker whose target is not a string is malformed.
pub fn parse_reference(value: &Value) -> Result<Option<DocumentKey>> {
    let Value::Object(map) = value else {
        return Ok(None);
    };
    if map.len() != 1 {
        return Ok(None);
    }
    match map.get(REF_MARKER) {
        None => Ok(None),
        Some(Value::String(target)) => Ok(Some(DocumentKey::from_external(
            aijson_core::ids::ExternalId::new(target.clone()),
        ))),
        Some(other) => Err(AijsonError::InvalidDocument(format!(
            "reference marker must be a string, found {other}"
        ))),
    }
}

fn collect_references(value: &Value, out: &mut Vec<DocumentKey>) -> Result<()> {
    if let Some(key) = parse_reference(value)? {
        out.push(key);
        return Ok(());
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_references(item, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_references(item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// One externalized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub name: PayloadName,
    pub bytes: Vec<u8>,
}

/// Named binary payloads that accompany a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobSet {
    blobs: Vec<Blob>,
}

impl BlobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the blob called `name`.
    pub fn insert(&mut self, name: PayloadName, bytes: Vec<u8>) {
        match self.blobs.iter_mut().find(|blob| blob.name == name) {
            Some(blob) => blob.bytes = bytes,
            None => self.blobs.push(Blob { name, bytes }),
        }
    }

    pub fn get(&self, name: &PayloadName) -> Option<&[u8]> {
        self.blobs
            .iter()
            .find(|blob| &blob.name == name)
            .map(|blob| blob.bytes.as_slice())
    }

    pub fn contains(&self, name: &PayloadName) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Blob> {
        self.blobs.iter()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

mod ordered_nodes {
    use super::DocumentNode;
    use aijson_core::DocumentKey;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::collections::HashSet;
    use std::fmt;

    pub fn serialize<S: Serializer>(
        nodes: &[(DocumentKey, DocumentNode)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(nodes.len()))?;
        for (key, node) in nodes {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(DocumentKey, DocumentNode)>, D::Error> {
        deserializer.deserialize_map(NodesVisitor)
    }

    struct NodesVisitor;

    impl<'de> Visitor<'de> for NodesVisitor {
        type Value = Vec<(DocumentKey, DocumentNode)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from node key to node")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut nodes = Vec::with_capacity(access.size_hint().unwrap_or(0));
            let mut seen = HashSet::new();
            while let Some((key, node)) = access.next_entry::<DocumentKey, DocumentNode>()? {
                if !seen.insert(key.clone()) {
                    return Err(de::Error::custom(format!("duplicate node key {key}")));
                }
                nodes.push((key, node));
            }
            Ok(nodes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nodes_keep_file_order_on_read() {
        let text = r#"{
            "format_version": 1,
            "root": "10",
            "nodes": {
                "2": {"type_tag": "B", "arguments": {}},
                "10": {"type_tag": "A", "arguments": {"x": {"$ref": "2"}}}
            }
        }"#;
        let document = SerializedDocument::from_json_str(text).expect("parse");
        let keys: Vec<&str> = document.keys().map(DocumentKey::as_str).collect();
        assert_eq!(keys, vec!["2", "10"]);
        assert_eq!(document.root_node().map(|node| node.type_tag.as_str()), Some("A"));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let text = r#"{"format_version": 1, "nodes": {"0": {"type_tag": "A"}, "0": {"type_tag": "B"}}}"#;
        assert!(matches!(
            SerializedDocument::from_json_str(text),
            Err(AijsonError::Json(_))
        ));
    }

    #[test]
    fn unknown_format_version_is_invalid() {
        let text = r#"{"format_version": 7, "nodes": {}}"#;
        assert!(matches!(
            SerializedDocument::from_json_str(text),
            Err(AijsonError::InvalidDocument(_))
        ));
    }

    #[test]
    fn references_are_found_in_nested_containers() {
        let node = DocumentNode {
            type_tag: "T".to_string(),
            arguments: BTreeMap::from([
                ("children".to_string(), json!([{"$ref": "1"}, {"$ref": "0"}])),
                ("config".to_string(), json!({"inner": {"$ref": "2"}, "n": 3})),
            ]),
            payload_ref: None,
        };
        let keys: Vec<String> = node
            .references()
            .expect("references")
            .into_iter()
            .map(DocumentKey::into_string)
            .collect();
        assert_eq!(keys, vec!["1", "0", "2"]);
    }

    #[test]
    fn non_string_marker_is_malformed() {
        assert!(parse_reference(&json!({"$ref": 3})).is_err());
        assert_eq!(parse_reference(&json!({"$ref": "3", "x": 1})).expect("literal"), None);
    }

    #[test]
    fn blob_set_replaces_existing_names() {
        let name = PayloadName::from_external(aijson_core::ids::ExternalId::new("node-0.pt"));
        let mut blobs = BlobSet::new();
        blobs.insert(name.clone(), vec![1]);
        blobs.insert(name.clone(), vec![2, 3]);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs.get(&name), Some(&[2u8, 3][..]));
    }
}
