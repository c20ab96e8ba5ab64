//! Capture scope attribute helpers for log messages.

use aijson_core::ScopeId;

/// Format the capture registry state for structured logging.
///
/// Returns `scope_id=..., phase=..., nodes=...`, with `scope_id=none` when
/// no scope is open.
#[inline]
pub fn scope_summary(scope: Option<&ScopeId>, phase: &str, nodes: usize) -> String {
    let scope = scope.map(|id| id.as_str()).unwrap_or("none");
    format!("scope_id={}, phase={}, nodes={}", scope, phase, nodes)
}
