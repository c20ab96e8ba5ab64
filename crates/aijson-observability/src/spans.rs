//! Named spans for capture, dump and reconstruction.

use aijson_core::ScopeId;
use std::path::Path;
use tracing::{info_span, Span};

pub fn capture_scope(scope_id: &ScopeId) -> Span {
    info_span!("capture_scope", scope_id = %scope_id)
}

pub fn dump_document(path: &Path, format: &str) -> Span {
    info_span!("dump_document", path = %path.display(), format = format)
}

pub fn load_manifest(path: &Path) -> Span {
    info_span!("load_manifest", path = %path.display())
}

pub fn reconstruct_document(node_count: usize) -> Span {
    info_span!("reconstruct_document", node_count = node_count)
}
