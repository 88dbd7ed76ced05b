//! Postgres plumbing shared by the data optimizer crates.
//!
//! Holds pool construction for the adapter and optimizer databases, classification of driver
//! errors into connectivity and conflict failures, and the queries backing the
//! `processor_tracking` table.

pub mod db;
pub mod error;
pub mod tracking;
