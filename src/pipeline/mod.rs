// Analytics pipeline: ingestion, processing, aggregation, and storage

pub mod aggregate;
pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod report;
pub mod storage;
pub mod summary;

// Re-export key types from each stage
pub use orchestrator::{PipelineOrchestrator, RunOutcome, ValidationOutcome};
pub use report::{RunReport, StageStats};
pub use storage::{FsResultStore, InMemoryResultStore, ResultStore, Snapshot, SnapshotHandle};
pub use summary::Summary;
