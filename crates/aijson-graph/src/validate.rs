//! Structural checks on a serialized document.

use crate::document::{BlobSet, SerializedDocument, DOCUMENT_FORMAT_VERSION};
use aijson_core::{AijsonError, DocumentKey, ReconstructionError, Result};
use std::collections::{BTreeSet, HashMap};

/// Positions of `document.nodes` ordered so that every node comes after
/// all nodes it references. Ties keep document order.
///
/// Fails on a dangling reference or a reference cycle.
pub fn topological_order(document: &SerializedDocument) -> Result<Vec<usize>> {
    let positions: HashMap<&DocumentKey, usize> = document
        .nodes
        .iter()
        .enumerate()
        .map(|(position, (key, _))| (key, position))
        .collect();

    let count = document.nodes.len();
    let mut pending = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (position, (key, node)) in document.nodes.iter().enumerate() {
        for target in node.references()? {
            let Some(&dependency) = positions.get(&target) else {
                return Err(ReconstructionError::DanglingReference { key: key.clone(), target }.into());
            };
            pending[position] += 1;
            dependents[dependency].push(position);
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&position| pending[position] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(position) = ready.pop_first() {
        order.push(position);
        for &dependent in &dependents[position] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < count {
        let keys = (0..count)
            .filter(|&position| pending[position] > 0)
            .map(|position| document.nodes[position].0.clone())
            .collect();
        return Err(ReconstructionError::Cycle { keys }.into());
    }
    Ok(order)
}

/// Checks everything reconstruction relies on without building objects:
/// version, root, references, acyclicity and payload blobs.
pub fn validate_document(document: &SerializedDocument, blobs: &BlobSet) -> Result<()> {
    if document.format_version != DOCUMENT_FORMAT_VERSION {
        return Err(AijsonError::InvalidDocument(format!(
            "unsupported format_version {}",
            document.format_version
        )));
    }
    if let Some(root) = &document.root {
        if document.node(root).is_none() {
            return Err(ReconstructionError::MissingRoot { key: root.clone() }.into());
        }
    }
    topological_order(document)?;
    for (key, node) in &document.nodes {
        if let Some(name) = &node.payload_ref {
            if !blobs.contains(name) {
                return Err(ReconstructionError::MissingBlob {
                    key: key.clone(),
                    name: name.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}
