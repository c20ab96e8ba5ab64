//! Construction capture and graph serialization.
//!
//! Capturable objects built inside a capture scope are recorded into a
//! [`CaptureRegistry`] as nodes with reference edges to the capturable
//! objects they were built from. The graph is written as a JSON document
//! plus externalized payload blobs and can be rebuilt from them.

pub mod capturable;
pub mod config;
pub mod disposer;
pub mod document;
mod finite;
pub mod interceptor;
pub mod reconstruct;
pub mod registry;
pub mod scope;
pub mod serialize;
pub mod types;
pub mod validate;

pub use inventory;

pub use capturable::{Capturable, Captured, NodeHandle, Payload};
pub use config::DumpConfig;
pub use disposer::{load_manifest, Disposer, FormatRegistry, JsonDisposer};
pub use document::{Blob, BlobSet, DocumentNode, SerializedDocument, DOCUMENT_FORMAT_VERSION};
pub use interceptor::Interceptor;
pub use reconstruct::{
    deserialize, Reconstructed, ReconstructorProvider, ReconstructorRegistry, Resolved,
    ResolvedArguments,
};
pub use registry::{CaptureGraph, CaptureRegistry, ScopePhase};
pub use scope::{capture_scope, capture_scope_with, CaptureScope};
pub use serialize::{build_document, serialize};
pub use types::{Arg, ArgumentValue, Arguments, NodeRecord, Rejection, REF_MARKER};
pub use validate::{topological_order, validate_document};
