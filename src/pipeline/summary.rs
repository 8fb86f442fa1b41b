//! Headline figures for a run, computed straight from the combined table.
//!
//! The summary does not read any aggregator output, so it stays correct even if an aggregator
//! changes its grouping. Ties are broken by the smallest key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

use crate::error::ComputationError;
use crate::pipeline::processing::{CombinedRow, CombinedTable};
use crate::pipeline::report::RunReport;

const SUMMARY_TABLE: &str = "summary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub data_overview: DataOverview,
    pub top_performers: TopPerformers,
    pub seasonal_insights: SeasonalInsights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataOverview {
    pub total_records: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub total_revenue: f64,
    pub total_transactions: usize,
    pub unique_customers: usize,
    pub total_malls: usize,
    pub total_regions: usize,
    /// Rows whose mall had no region
    pub unmatched_region_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPerformers {
    pub top_mall_by_revenue: Option<String>,
    pub top_region_by_revenue: Option<String>,
    pub top_category_by_revenue: Option<String>,
    pub most_popular_payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalInsights {
    pub best_season: Option<String>,
    pub best_weekday: Option<String>,
    pub peak_month: Option<String>,
}

/// Key with the largest value; the first key wins a tie.
fn arg_max<K: Clone, V: PartialOrd + Copy>(groups: &BTreeMap<K, V>) -> Option<K> {
    let mut best: Option<(&K, V)> = None;
    for (key, value) in groups {
        match best {
            Some((_, top)) if *value <= top => {}
            _ => best = Some((key, *value)),
        }
    }
    best.map(|(k, _)| k.clone())
}

fn revenue_by<K: Ord, F: Fn(&CombinedRow) -> Option<K>>(
    table: &CombinedTable,
    key: F,
) -> BTreeMap<K, f64> {
    let mut groups = BTreeMap::new();
    for row in &table.rows {
        if let Some(k) = key(row) {
            *groups.entry(k).or_insert(0.0) += row.net_revenue;
        }
    }
    groups
}

impl Summary {
    pub fn from_combined(table: &CombinedTable) -> Self {
        let rows = &table.rows;
        let customers: HashSet<&str> = rows
            .iter()
            .map(|r| r.transaction.customer_id.as_str())
            .collect();
        let malls: HashSet<&str> = rows.iter().map(|r| r.transaction.mall.as_str()).collect();
        let regions: HashSet<&str> = rows.iter().filter_map(|r| r.region.as_deref()).collect();

        let data_overview = DataOverview {
            total_records: rows.len(),
            first_date: rows.iter().map(|r| r.transaction.transaction_date).min(),
            last_date: rows.iter().map(|r| r.transaction.transaction_date).max(),
            total_revenue: table.total_net_revenue(),
            total_transactions: rows.len(),
            unique_customers: customers.len(),
            total_malls: malls.len(),
            total_regions: regions.len(),
            unmatched_region_rows: rows.iter().filter(|r| r.region.is_none()).count(),
        };

        let mut payment_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for row in rows {
            *payment_counts
                .entry(row.transaction.payment_method.as_str())
                .or_insert(0) += 1;
        }

        let top_performers = TopPerformers {
            top_mall_by_revenue: arg_max(&revenue_by(table, |r| {
                Some(r.transaction.mall.clone())
            })),
            top_region_by_revenue: arg_max(&revenue_by(table, |r| r.region.clone())),
            top_category_by_revenue: arg_max(&revenue_by(table, |r| {
                Some(r.transaction.category.clone())
            })),
            most_popular_payment_method: arg_max(&payment_counts).map(str::to_string),
        };

        let seasonal_insights = SeasonalInsights {
            best_season: arg_max(&revenue_by(table, |r| Some(r.season)))
                .map(|s| s.as_str().to_string()),
            best_weekday: arg_max(&revenue_by(table, |r| Some(r.weekday_index())))
                .and_then(|i| {
                    rows.iter()
                        .find(|r| r.weekday_index() == i)
                        .map(|r| r.weekday_name().to_string())
                }),
            peak_month: arg_max(&revenue_by(table, |r| Some((r.year, r.month))))
                .map(|(y, m)| format!("{}-{:02}", y, m)),
        };

        Self {
            data_overview,
            top_performers,
            seasonal_insights,
        }
    }

    pub fn check_finite(&self) -> Result<(), ComputationError> {
        let revenue = self.data_overview.total_revenue;
        if revenue.is_finite() {
            return Ok(());
        }
        Err(ComputationError {
            table: SUMMARY_TABLE.to_string(),
            row: 0,
            column: "total_revenue".to_string(),
            value: revenue,
        })
    }

    /// Plain-text report for people: the summary sections followed by the run audit.
    pub fn render_report(&self, run: &RunReport, decimal_places: usize) -> String {
        let mut out = String::new();
        let o = &self.data_overview;
        let t = &self.top_performers;
        let s = &self.seasonal_insights;
        let or_none = |v: &Option<String>| v.clone().unwrap_or_else(|| "n/a".to_string());
        let date = |d: Option<NaiveDate>| d.map_or("n/a".to_string(), |d| d.to_string());

        let _ = writeln!(out, "Retail Analytics Pipeline Summary Report");
        let _ = writeln!(out, "========================================");
        let _ = writeln!(out, "generation: {}", run.generation);
        let _ = writeln!(out);

        let _ = writeln!(out, "DATA_OVERVIEW:");
        let _ = writeln!(out, "  total_records: {}", o.total_records);
        let _ = writeln!(
            out,
            "  date_range: {} to {}",
            date(o.first_date),
            date(o.last_date)
        );
        let _ = writeln!(out, "  total_revenue: {:.*}", decimal_places, o.total_revenue);
        let _ = writeln!(out, "  total_transactions: {}", o.total_transactions);
        let _ = writeln!(out, "  unique_customers: {}", o.unique_customers);
        let _ = writeln!(out, "  total_malls: {}", o.total_malls);
        let _ = writeln!(out, "  total_regions: {}", o.total_regions);
        let _ = writeln!(out, "  rows_without_region: {}", o.unmatched_region_rows);
        let _ = writeln!(out);

        let _ = writeln!(out, "TOP_PERFORMERS:");
        let _ = writeln!(out, "  top_mall_by_revenue: {}", or_none(&t.top_mall_by_revenue));
        let _ = writeln!(out, "  top_region_by_revenue: {}", or_none(&t.top_region_by_revenue));
        let _ = writeln!(
            out,
            "  top_category_by_revenue: {}",
            or_none(&t.top_category_by_revenue)
        );
        let _ = writeln!(
            out,
            "  most_popular_payment_method: {}",
            or_none(&t.most_popular_payment_method)
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "SEASONAL_INSIGHTS:");
        let _ = writeln!(out, "  best_season: {}", or_none(&s.best_season));
        let _ = writeln!(out, "  best_weekday: {}", or_none(&s.best_weekday));
        let _ = writeln!(out, "  peak_month: {}", or_none(&s.peak_month));
        let _ = writeln!(out);

        let _ = writeln!(out, "VALIDATION:");
        let _ = writeln!(
            out,
            "  transactions: {} in, {} excluded",
            run.transactions_in, run.transactions_excluded
        );
        let _ = writeln!(
            out,
            "  regions: {} in, {} excluded",
            run.regions_in, run.regions_excluded
        );
        for (rule, count) in &run.excluded_by_rule {
            let _ = writeln!(out, "  transactions excluded by {}: {}", rule, count);
        }
        for (rule, count) in &run.regions_excluded_by_rule {
            let _ = writeln!(out, "  regions excluded by {}: {}", rule, count);
        }
        let _ = writeln!(out, "  warnings: {}", run.warnings);
        if !run.unmatched_malls.is_empty() {
            let _ = writeln!(
                out,
                "  malls without region: {}",
                run.unmatched_malls.join(", ")
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "EXPORTED_TABLES:");
        for (table, rows) in &run.exported_rows {
            let _ = writeln!(out, "  {}: {} rows", table, rows);
        }
        out
    }
}
