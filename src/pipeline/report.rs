use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::observability::metrics;
use crate::pipeline::processing::{JoinReport, Rule, ValidationReport};

/// Rows and wall time for one pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    pub stage: &'static str,
    pub rows_in: usize,
    pub rows_out: usize,
    pub duration_secs: f64,
}

/// Wall clock for one stage. [`StageTimer::finish`] records the stage metrics.
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn finish(self, rows_in: usize, rows_out: usize) -> StageStats {
        let duration_secs = self.started.elapsed().as_secs_f64();
        metrics::run::stage_completed(self.stage, duration_secs, rows_out);
        StageStats {
            stage: self.stage,
            rows_in,
            rows_out,
            duration_secs,
        }
    }
}

/// Audit trail of one run, exported as the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generation: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageStats>,
    pub transactions_in: usize,
    pub transactions_excluded: usize,
    pub regions_in: usize,
    pub regions_excluded: usize,
    /// Excluded transaction rows per rule; a row that broke several rules counts under each
    pub excluded_by_rule: BTreeMap<String, usize>,
    /// Excluded region rows per rule
    pub regions_excluded_by_rule: BTreeMap<String, usize>,
    pub warnings: usize,
    pub unmatched_region_rows: usize,
    pub unmatched_malls: Vec<String>,
    /// Row count per exported table
    pub exported_rows: BTreeMap<String, usize>,
}

impl RunReport {
    pub fn new(generation: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            generation: generation.to_string(),
            started_at,
            finished_at: None,
            stages: Vec::new(),
            transactions_in: 0,
            transactions_excluded: 0,
            regions_in: 0,
            regions_excluded: 0,
            excluded_by_rule: BTreeMap::new(),
            regions_excluded_by_rule: BTreeMap::new(),
            warnings: 0,
            unmatched_region_rows: 0,
            unmatched_malls: Vec::new(),
            exported_rows: BTreeMap::new(),
        }
    }

    pub fn record_validation(&mut self, report: &ValidationReport) {
        self.transactions_in = report.transactions_in;
        self.transactions_excluded = report.transactions_excluded;
        self.regions_in = report.regions_in;
        self.regions_excluded = report.regions_excluded;
        self.excluded_by_rule = rule_names(&report.transactions_excluded_by_rule);
        self.regions_excluded_by_rule = rule_names(&report.regions_excluded_by_rule);
        self.warnings = report.warning_count();
    }

    pub fn record_join(&mut self, report: &JoinReport) {
        self.unmatched_region_rows = report.unmatched_rows;
        self.unmatched_malls = report.unmatched_malls.iter().cloned().collect();
    }

    pub fn stage(&self, name: &str) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

fn rule_names(counts: &BTreeMap<Rule, usize>) -> BTreeMap<String, usize> {
    counts
        .iter()
        .map(|(rule, count)| (rule.as_str().to_string(), *count))
        .collect()
}
