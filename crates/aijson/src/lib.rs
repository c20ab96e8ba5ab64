//! Record how composed objects were built and write them as a JSON graph.
//!
//! Objects implementing [`Capturable`] that are constructed inside a
//! [`capture_scope`] become nodes of a provenance graph, with edges to the
//! capturable objects they were built from. The graph serializes to a JSON
//! document plus sibling payload files and can be rebuilt from them with a
//! [`ReconstructorRegistry`].

pub use aijson_core::{
    AijsonError, CaptureError, DocumentKey, NodeId, PayloadName, ReconstructionError, Result,
    ScopeId, StateError,
};
pub use aijson_core::ids;

#[cfg(feature = "graph")]
pub use aijson_graph::{
    build_document, capture_scope, capture_scope_with, deserialize, load_manifest,
    register_reconstructor, serialize, topological_order, validate_document, Arg, ArgumentValue,
    Arguments, Blob, BlobSet, Capturable, CaptureGraph, CaptureRegistry, CaptureScope, Captured,
    Disposer, DocumentNode, DumpConfig, FormatRegistry, Interceptor, JsonDisposer, NodeHandle,
    NodeRecord, Payload, Reconstructed, ReconstructorProvider, ReconstructorRegistry, Resolved,
    ResolvedArguments, ScopePhase, SerializedDocument, DOCUMENT_FORMAT_VERSION, REF_MARKER,
};

#[cfg(feature = "graph")]
pub mod graph {
    pub use aijson_graph::*;
}

#[cfg(feature = "observability")]
pub mod observability {
    pub use aijson_observability::*;
}
