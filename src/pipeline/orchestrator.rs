use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::aggregate::{combined_result, default_aggregators, Aggregator, ResultTable};
use crate::pipeline::ingestion::Loader;
use crate::pipeline::processing::{
    enrich, left_join, CombinedTable, JoinReport, ValidationReport, Validator, Violation,
};
use crate::pipeline::report::{RunReport, StageTimer};
use crate::pipeline::storage::{self, new_generation_id, Generation, ResultStore, Snapshot};
use crate::pipeline::summary::Summary;

/// What a successful run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub snapshot: Snapshot,
    pub report: RunReport,
}

/// Validation and join results without aggregation or export.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub validation: ValidationReport,
    pub join: JoinReport,
}

/// Runs the stages in order: load, validate, join, enrich, aggregate, summarize, export.
pub struct PipelineOrchestrator {
    config: Config,
    aggregators: Vec<Arc<dyn Aggregator>>,
}

impl PipelineOrchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            aggregators: default_aggregators(),
        }
    }

    /// Replace the analytics modules run by this orchestrator.
    pub fn with_aggregators(mut self, aggregators: Vec<Arc<dyn Aggregator>>) -> Self {
        self.aggregators = aggregators;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load, validate, join and enrich. Every stage is recorded on `report`.
    fn prepare(&self, report: &mut RunReport) -> Result<(CombinedTable, Vec<Violation>)> {
        let timer = StageTimer::start("load");
        let loader = Loader::new(&self.config.input);
        let transactions = loader.load_transactions()?;
        let regions = loader.load_regions()?;
        let loaded = transactions.rows.len() + regions.rows.len();
        report.stages.push(timer.finish(loaded, loaded));

        let timer = StageTimer::start("validate");
        let validated = Validator::new(self.config.validation.clone()).validate(transactions, regions)?;
        report.record_validation(&validated.report);
        report
            .stages
            .push(timer.finish(loaded, validated.transactions.len()));

        let timer = StageTimer::start("join");
        let rows_in = validated.transactions.len();
        let (joined, join_report) = left_join(validated.transactions, &validated.regions)?;
        report.record_join(&join_report);
        report.stages.push(timer.finish(rows_in, joined.len()));

        let timer = StageTimer::start("enrich");
        let rows_in = joined.len();
        let combined = enrich(joined);
        report.stages.push(timer.finish(rows_in, combined.len()));

        Ok((combined, validated.report.violations))
    }

    /// Run every aggregator on the blocking pool and collect their tables in registration order.
    #[instrument(skip_all, fields(aggregators = self.aggregators.len(), rows = combined.len()))]
    pub async fn aggregate(&self, combined: Arc<CombinedTable>) -> Result<Vec<ResultTable>> {
        let handles: Vec<_> = self
            .aggregators
            .iter()
            .map(|aggregator| {
                let aggregator = Arc::clone(aggregator);
                let combined = Arc::clone(&combined);
                let name = aggregator.name();
                (
                    name,
                    tokio::task::spawn_blocking(move || aggregator.aggregate(&combined)),
                )
            })
            .collect();

        let mut tables = Vec::new();
        let mut seen = HashSet::new();
        for (name, handle) in handles {
            let produced = handle
                .await
                .map_err(|e| PipelineError::Aggregation(format!("{} aggregator: {}", name, e)))?;
            for table in produced {
                if !seen.insert(table.name.clone()) {
                    return Err(PipelineError::Aggregation(format!(
                        "table '{}' produced twice (second time by {})",
                        table.name, name
                    )));
                }
                tables.push(table);
            }
            info!("Aggregator {} finished", name);
        }
        Ok(tables)
    }

    /// Execute the whole pipeline and publish a new generation to `store`.
    #[instrument(skip_all)]
    pub async fn run(&self, store: &dyn ResultStore) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let generation_id = new_generation_id(started_at);
        info!("🚀 Starting pipeline run {}", generation_id);

        match self.run_generation(store, &generation_id, started_at).await {
            Ok(outcome) => {
                metrics::run::succeeded();
                info!(
                    "🎉 Run {} published {} tables",
                    generation_id,
                    outcome.report.exported_rows.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                metrics::run::failed(e.kind());
                error!("💥 Run {} failed: {}", generation_id, e);
                Err(e)
            }
        }
    }

    async fn run_generation(
        &self,
        store: &dyn ResultStore,
        generation_id: &str,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let mut report = RunReport::new(generation_id, started_at);
        let (combined, violations) = self.prepare(&mut report)?;

        let timer = StageTimer::start("aggregate");
        let rows_in = combined.len();
        let mut tables = vec![combined_result(&combined)];
        let combined = Arc::new(combined);
        tables.extend(self.aggregate(Arc::clone(&combined)).await?);
        report.stages.push(timer.finish(rows_in, tables.len()));

        let timer = StageTimer::start("summary");
        let summary = Summary::from_combined(&combined);
        report.stages.push(timer.finish(rows_in, 1));

        report.exported_rows = tables.iter().map(|t| (t.name.clone(), t.len())).collect();
        report.finished_at = Some(Utc::now());

        let generation = Generation {
            id: generation_id.to_string(),
            created_at: started_at,
            summary,
            tables,
            run: report.clone(),
            violations,
        };

        let timer = StageTimer::start("export");
        let table_count = generation.tables.len();
        let snapshot = storage::export(store, generation).await?;
        report.stages.push(timer.finish(table_count, table_count));

        Ok(RunOutcome { snapshot, report })
    }

    /// Load, validate and join without producing a generation.
    #[instrument(skip_all)]
    pub fn validate(&self) -> Result<ValidationOutcome> {
        let loader = Loader::new(&self.config.input);
        let transactions = loader.load_transactions()?;
        let regions = loader.load_regions()?;
        let validated = Validator::new(self.config.validation.clone()).validate(transactions, regions)?;
        let (_, join) = left_join(validated.transactions, &validated.regions)?;
        Ok(ValidationOutcome {
            validation: validated.report,
            join,
        })
    }
}
