//! Graph to document conversion.

use crate::document::{reference_marker, BlobSet, DocumentNode, SerializedDocument};
use crate::registry::CaptureGraph;
use crate::types::ArgumentValue;
use aijson_core::ids::OrdinalId;
use aijson_core::{AijsonError, DocumentKey, NodeId, PayloadName, Result};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Builds the document and exports every node payload.
///
/// All nodes of the graph are written, not only those reachable from the
/// root. `root` defaults to the most recently registered node.
pub fn serialize(graph: &CaptureGraph, root: Option<NodeId>) -> Result<(SerializedDocument, BlobSet)> {
    let document = build_document(graph, root)?;
    let mut blobs = BlobSet::new();
    for (record, (key, node)) in graph.iter().zip(document.nodes.iter()) {
        let Some(name) = &node.payload_ref else {
            continue;
        };
        let bytes = record
            .handle()
            .export_payload()?
            .ok_or_else(|| AijsonError::Payload {
                node: key.to_string(),
                message: format!("{} declared a payload but exported none", record.type_tag),
            })?;
        debug!(node = key.as_str(), payload = name.as_str(), bytes = bytes.len(), "exported payload");
        blobs.insert(name.clone(), bytes);
    }
    Ok((document, blobs))
}

/// Builds the document only. Payload names are assigned but no bytes are
/// exported.
pub fn build_document(graph: &CaptureGraph, root: Option<NodeId>) -> Result<SerializedDocument> {
    let keys: HashMap<NodeId, DocumentKey> = graph
        .iter()
        .enumerate()
        .map(|(position, record)| (record.id, DocumentKey::from_ordinal(OrdinalId::new(position))))
        .collect();

    let mut document = SerializedDocument::new();
    document.root = match root {
        Some(id) => Some(keys.get(&id).cloned().ok_or_else(|| {
            AijsonError::InvalidDocument(format!("root {id} is not part of the captured graph"))
        })?),
        None => graph.last().and_then(|record| keys.get(&record.id).cloned()),
    };

    for record in graph.iter() {
        let key = keys[&record.id].clone();
        let mut arguments = std::collections::BTreeMap::new();
        for (name, value) in &record.arguments {
            arguments.insert(name.clone(), to_json(value, &keys, &key)?);
        }
        let payload_ref = record
            .payload_extension
            .as_deref()
            .map(|extension| PayloadName::for_node(&key, extension));
        document.nodes.push((key, DocumentNode { type_tag: record.type_tag.clone(), arguments, payload_ref }));
    }
    Ok(document)
}

fn to_json(
    value: &ArgumentValue,
    keys: &HashMap<NodeId, DocumentKey>,
    owner: &DocumentKey,
) -> Result<Value> {
    Ok(match value {
        ArgumentValue::Literal(value) => value.clone(),
        ArgumentValue::Reference(id) => {
            let target = keys.get(id).ok_or_else(|| {
                AijsonError::InvalidDocument(format!(
                    "node {owner} references {id}, which is not in the captured graph"
                ))
            })?;
            reference_marker(target)
        }
        ArgumentValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| to_json(item, keys, owner))
                .collect::<Result<Vec<_>>>()?,
        ),
        ArgumentValue::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (name, item) in entries {
                map.insert(name.clone(), to_json(item, keys, owner)?);
            }
            Value::Object(map)
        }
    })
}
