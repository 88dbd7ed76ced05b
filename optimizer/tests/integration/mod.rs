mod common;
mod connectivity_test;
mod enrichment_test;
mod migration_test;
mod processor_test;
