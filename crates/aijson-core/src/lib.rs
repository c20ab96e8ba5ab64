//! Core types shared by the capture engine: ids and the error taxonomy.

pub mod context;
pub mod error;
pub mod ids;

pub use error::{AijsonError, CaptureError, ReconstructionError, Result, StateError};
pub use ids::{DocumentKey, NodeId, PayloadName, ScopeId};
