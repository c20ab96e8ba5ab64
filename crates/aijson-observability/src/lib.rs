//! Observability helpers (spans, tracing setup, scope summaries).

pub mod scope;
pub mod spans;
pub mod tracing_setup;

pub use scope::*;
pub use spans::*;
pub use tracing_setup::*;
