mod base;
mod connection;
mod data_optimizer;
mod enrichment;
mod processor;
mod retry;

pub use base::*;
pub use connection::*;
pub use data_optimizer::*;
pub use enrichment::*;
pub use processor::*;
pub use retry::*;
