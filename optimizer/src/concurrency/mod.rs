//! Process-wide coordination primitives.
//!
//! Workers never talk to each other directly. They share three watch channels: the shutdown
//! signal, the readiness signal raised by the orchestrator once startup validation is done, and
//! the connectivity state acting as a cooperative circuit breaker.

pub mod connectivity;
pub mod shutdown;
pub mod signal;
