use std::collections::BTreeMap;

use super::{Aggregator, GroupStats, ResultTable, Tabular, Value};
use crate::constants;
use crate::pipeline::processing::CombinedTable;

/// Revenue after discounts, per mall and per category.
pub struct ProfitabilityAggregator;

const METRIC_COLUMNS: [&str; 9] = [
    "gross_revenue",
    "total_discounts",
    "net_revenue",
    "total_quantity",
    "transaction_count",
    "discount_rate_avg",
    "effective_discount_pct",
    "avg_transaction_value",
    "revenue_per_unit",
];

fn metric_cells(stats: &GroupStats) -> Vec<Value> {
    vec![
        stats.gross_revenue.into(),
        stats.discount_amount.into(),
        stats.net_revenue.into(),
        stats.quantity.into(),
        stats.transactions.into(),
        stats.discount_rate_avg().into(),
        stats.effective_discount_pct().into(),
        stats.avg_transaction_value().into(),
        stats.revenue_per_unit().into(),
    ]
}

struct MallRow {
    mall: String,
    region: Option<String>,
    stats: GroupStats,
}

impl Tabular for MallRow {
    const COLUMNS: &'static [&'static str] = &[
        "mall",
        "region",
        METRIC_COLUMNS[0],
        METRIC_COLUMNS[1],
        METRIC_COLUMNS[2],
        METRIC_COLUMNS[3],
        METRIC_COLUMNS[4],
        METRIC_COLUMNS[5],
        METRIC_COLUMNS[6],
        METRIC_COLUMNS[7],
        METRIC_COLUMNS[8],
    ];

    fn cells(&self) -> Vec<Value> {
        let mut cells = vec![self.mall.as_str().into(), self.region.clone().into()];
        cells.extend(metric_cells(&self.stats));
        cells
    }
}

struct CategoryRow {
    category: String,
    stats: GroupStats,
}

impl Tabular for CategoryRow {
    const COLUMNS: &'static [&'static str] = &[
        "category",
        METRIC_COLUMNS[0],
        METRIC_COLUMNS[1],
        METRIC_COLUMNS[2],
        METRIC_COLUMNS[3],
        METRIC_COLUMNS[4],
        METRIC_COLUMNS[5],
        METRIC_COLUMNS[6],
        METRIC_COLUMNS[7],
        METRIC_COLUMNS[8],
    ];

    fn cells(&self) -> Vec<Value> {
        let mut cells = vec![self.category.as_str().into()];
        cells.extend(metric_cells(&self.stats));
        cells
    }
}

impl Aggregator for ProfitabilityAggregator {
    fn name(&self) -> &'static str {
        "profitability"
    }

    fn aggregate(&self, table: &CombinedTable) -> Vec<ResultTable> {
        // A mall maps to one region, so the first row's region stands for the group
        let mut malls: BTreeMap<String, (Option<String>, GroupStats)> = BTreeMap::new();
        let mut categories: BTreeMap<String, GroupStats> = BTreeMap::new();
        for row in &table.rows {
            malls
                .entry(row.transaction.mall.clone())
                .or_insert_with(|| (row.region.clone(), GroupStats::default()))
                .1
                .push(row);
            categories
                .entry(row.transaction.category.clone())
                .or_default()
                .push(row);
        }

        let mall_rows = malls
            .into_iter()
            .map(|(mall, (region, stats))| MallRow { mall, region, stats });
        let category_rows = categories
            .into_iter()
            .map(|(category, stats)| CategoryRow { category, stats });

        vec![
            ResultTable::from_rows(constants::MALL_PROFITABILITY, mall_rows),
            ResultTable::from_rows(constants::CATEGORY_PROFITABILITY, category_rows),
        ]
    }
}
