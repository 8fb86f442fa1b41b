// Pipeline ingestion: reading the source tables into typed rows

pub mod loader;

pub use loader::{LoadedRegion, LoadedTransaction, Loader, RegionTable, TransactionTable};
