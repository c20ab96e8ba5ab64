//! Error types for graph capture and serialization
//!
//! Every failure the capture engine can report is a variant of
//! [`AijsonError`]. None of them are recovered internally; the only
//! automatic recovery is the registry reset performed when a capture
//! scope exits.

use crate::ids::{DocumentKey, NodeId, PayloadName, ScopeId};
use thiserror::Error;

/// Main error type for graph capture, serialization and reconstruction
#[derive(Error, Debug)]
pub enum AijsonError {
    /// Illegal registry transition
    #[error(transparent)]
    State(#[from] StateError),

    /// A constructor argument cannot be represented in the graph
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Output format name has no registered disposer
    #[error("Unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    /// Document could not be turned back into objects
    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    /// A node failed to export or import its binary payload
    #[error("Payload error for node {node}: {message}")]
    Payload { node: String, message: String },

    /// Document is structurally invalid (bad version, malformed marker)
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// I/O error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Illegal capture registry transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("capture scope {scope} is already active")]
    AlreadyActive { scope: ScopeId },
    #[error("capture registry is not active")]
    Inactive,
    #[error("capture registry lock poisoned")]
    RegistryPoisoned,
}

/// Argument value that is neither a JSON primitive, a capturable, nor a
/// standard container of the two. `path` locates the offending value,
/// e.g. `children[1].weights`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("argument {path} is a non-finite number")]
    NonFiniteNumber { path: String },
    #[error("argument {path} has a non-string map key: {message}")]
    NonStringKey { path: String, message: String },
    #[error("argument {path} cannot be represented: {message}")]
    Unserializable { path: String, message: String },
    #[error("argument {path} is a map whose only key is the reserved `$ref` marker")]
    ReservedKey { path: String },
    #[error("argument {path} of node {node} references {target}, which is not in the capture graph")]
    DanglingReference { node: NodeId, path: String, target: NodeId },
}

impl CaptureError {
    pub fn path(&self) -> &str {
        match self {
            CaptureError::NonFiniteNumber { path }
            | CaptureError::NonStringKey { path, .. }
            | CaptureError::Unserializable { path, .. }
            | CaptureError::ReservedKey { path }
            | CaptureError::DanglingReference { path, .. } => path,
        }
    }
}

/// Failure while rebuilding objects from a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("node {key} has unknown type tag `{type_tag}`")]
    UnknownTypeTag { key: DocumentKey, type_tag: String },
    #[error("node {key} references missing node {target}")]
    DanglingReference { key: DocumentKey, target: DocumentKey },
    #[error("reference cycle through nodes: {}", join_keys(.keys))]
    Cycle { keys: Vec<DocumentKey> },
    #[error("node {key} payload {name} has no matching blob")]
    MissingBlob { key: DocumentKey, name: PayloadName },
    #[error("document root {key} is not a node in the document")]
    MissingRoot { key: DocumentKey },
    #[error("node {key} of type `{type_tag}` does not accept a payload")]
    PayloadUnsupported { key: DocumentKey, type_tag: String },
    #[error("node {key} argument `{argument}`: {message}")]
    ArgumentMismatch { key: DocumentKey, argument: String, message: String },
}

fn join_keys(keys: &[DocumentKey]) -> String {
    keys.iter().map(DocumentKey::as_str).collect::<Vec<_>>().join(", ")
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AijsonError>;
