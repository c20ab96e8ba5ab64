//! Scope id generation.
//!
//! Scope ids correlate log lines of one capture scope; they carry no
//! meaning in the serialized document.

use crate::ids::ScopeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn generate_scope_id() -> ScopeId {
    let counter = SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed);
    ScopeId::new(now_millis(), counter)
}
