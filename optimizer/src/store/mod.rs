//! Access to the Adapter and Optimizer databases.
//!
//! Workers only talk to the [`base::AdapterStore`] and [`base::OptimizerStore`] traits. The
//! Postgres implementations are used in production and the in-memory ones in tests.

pub mod base;
pub mod memory;
pub mod postgres;
