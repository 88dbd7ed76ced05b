pub mod base;
pub mod driver;
pub mod enrichment;
pub mod etl;
pub mod orchestrator;
pub mod policy;
pub mod processors;
pub mod strategy;
