//! Helpers shared by unit and integration tests.
//!
//! - [`config`] builds configurations with short intervals so loops turn over quickly.
//! - [`fixtures`] builds Adapter rows.
//! - [`wait`] polls for a condition with a timeout so a broken test fails instead of hanging.

pub mod config;
pub mod fixtures;
pub mod wait;
