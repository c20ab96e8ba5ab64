//! Shared fixtures for the workspace test suites.

pub mod common;
pub mod support;
