//! Capturable fixture types and their reconstructors.

mod fixtures;

pub use fixtures::*;
