//! Prometheus metrics for pipeline runs and the results server.
//!
//! Recording goes through the `metrics` facade, so every function here is a no-op until
//! [`init`] installs the Prometheus recorder. Tests never install it.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Every metric name the crate emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Ingestion
    RowsLoaded,

    // Validation
    RowsAccepted,
    RowsExcluded,
    ViolationsDetected,

    // Run lifecycle
    StageDuration,
    StageRows,
    RunsSucceeded,
    RunsFailed,

    // Export
    TablesExported,
    RowsExported,
    ExportFailures,

    // Results server
    SnapshotReloads,
    HttpRequests,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RowsLoaded => "retail_rows_loaded_total",
            MetricName::RowsAccepted => "retail_rows_accepted_total",
            MetricName::RowsExcluded => "retail_rows_excluded_total",
            MetricName::ViolationsDetected => "retail_violations_detected_total",
            MetricName::StageDuration => "retail_stage_duration_seconds",
            MetricName::StageRows => "retail_stage_rows",
            MetricName::RunsSucceeded => "retail_runs_succeeded_total",
            MetricName::RunsFailed => "retail_runs_failed_total",
            MetricName::TablesExported => "retail_tables_exported_total",
            MetricName::RowsExported => "retail_rows_exported_total",
            MetricName::ExportFailures => "retail_export_failures_total",
            MetricName::SnapshotReloads => "retail_snapshot_reloads_total",
            MetricName::HttpRequests => "retail_http_requests_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            RowsLoaded,
            RowsAccepted,
            RowsExcluded,
            ViolationsDetected,
            StageDuration,
            StageRows,
            RunsSucceeded,
            RunsFailed,
            TablesExported,
            RowsExported,
            ExportFailures,
            SnapshotReloads,
            HttpRequests,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is a no-op.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();

    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus text exposition, or `None` if [`init`] was never called.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Ingestion
// ============================================================================

pub mod ingestion {
    use super::MetricName;

    pub fn rows_loaded(table: &'static str, count: usize) {
        ::metrics::counter!(MetricName::RowsLoaded.as_str(), "table" => table)
            .increment(count as u64);
    }
}

// ============================================================================
// Validation
// ============================================================================

pub mod validation {
    use super::MetricName;
    use crate::pipeline::processing::{Severity, ValidationReport};

    /// Record the outcome of one validation pass.
    pub fn record(report: &ValidationReport) {
        ::metrics::counter!(MetricName::RowsAccepted.as_str(), "table" => "transactions")
            .increment(report.transactions_accepted as u64);
        ::metrics::counter!(MetricName::RowsExcluded.as_str(), "table" => "transactions")
            .increment(report.transactions_excluded as u64);
        ::metrics::counter!(MetricName::RowsAccepted.as_str(), "table" => "regions")
            .increment(report.regions_accepted as u64);
        ::metrics::counter!(MetricName::RowsExcluded.as_str(), "table" => "regions")
            .increment(report.regions_excluded as u64);

        for violation in &report.violations {
            ::metrics::counter!(
                MetricName::ViolationsDetected.as_str(),
                "rule" => violation.rule.as_str(),
                "severity" => match violation.severity {
                    Severity::Warning => "warning",
                    Severity::Error => "error",
                }
            )
            .increment(1);
        }
    }
}

// ============================================================================
// Run lifecycle
// ============================================================================

pub mod run {
    use super::MetricName;

    pub fn stage_completed(stage: &'static str, secs: f64, rows_out: usize) {
        ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
        ::metrics::gauge!(MetricName::StageRows.as_str(), "stage" => stage).set(rows_out as f64);
    }

    pub fn succeeded() {
        ::metrics::counter!(MetricName::RunsSucceeded.as_str()).increment(1);
    }

    pub fn failed(kind: &'static str) {
        ::metrics::counter!(MetricName::RunsFailed.as_str(), "kind" => kind).increment(1);
    }
}

// ============================================================================
// Export
// ============================================================================

pub mod export {
    use super::MetricName;

    pub fn table_written(table: &str, rows: usize) {
        ::metrics::counter!(MetricName::TablesExported.as_str()).increment(1);
        ::metrics::counter!(MetricName::RowsExported.as_str(), "table" => table.to_string())
            .increment(rows as u64);
    }

    pub fn rejected() {
        ::metrics::counter!(MetricName::ExportFailures.as_str()).increment(1);
    }
}

// ============================================================================
// Results server
// ============================================================================

pub mod server {
    use super::MetricName;

    pub fn request(route: &'static str) {
        ::metrics::counter!(MetricName::HttpRequests.as_str(), "route" => route).increment(1);
    }

    pub fn snapshot_reloaded(ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        ::metrics::counter!(MetricName::SnapshotReloads.as_str(), "outcome" => outcome)
            .increment(1);
    }
}
