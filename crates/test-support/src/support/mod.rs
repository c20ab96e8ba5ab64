//! Scenario builders used across test suites.

pub mod scenarios;
