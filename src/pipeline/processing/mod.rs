// Pipeline processing: validation, join and enrichment

pub mod enrich;
pub mod join;
pub mod validate;

pub use enrich::{enrich, CombinedRow, CombinedTable};
pub use join::{left_join, JoinReport, JoinedTransaction};
pub use validate::{Rule, Severity, ValidatedTables, ValidationReport, Validator, Violation};
