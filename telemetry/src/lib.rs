//! Logging setup shared by the data optimizer binary and its tests.

pub mod tracing;
