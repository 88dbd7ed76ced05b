//! Data optimizer: migrates fleet telemetry from the Adapter database into the Optimizer database
//! and derives position and driver columns for fault and status data.
//!
//! The entry point is [`pipeline::DataOptimizer`], generic over the two stores so the whole
//! service runs against Postgres ([`store::postgres`]) or in memory ([`store::memory`]).

pub mod cache;
pub mod concurrency;
pub mod enrichment;
pub mod environment;
pub mod error;
pub mod gate;
mod macros;
pub mod mapping;
pub mod persister;
pub mod pipeline;
pub mod retry;
pub mod schedule;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tracker;
pub mod types;
pub mod workers;
