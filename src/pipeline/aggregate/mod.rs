//! Grouped analytics over the combined table.
//!
//! Every aggregator only reads the [`CombinedTable`] and returns its own result tables, so
//! they can run in any order or side by side. Groups are kept in `BTreeMap`s, which makes
//! row order a function of the grouping key alone.

pub mod daily_sales;
pub mod payments;
pub mod profitability;
pub mod table;
pub mod trends;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::constants;
use crate::pipeline::processing::{CombinedRow, CombinedTable};

pub use daily_sales::DailySalesAggregator;
pub use payments::PaymentAggregator;
pub use profitability::ProfitabilityAggregator;
pub use table::{ColumnKind, ResultTable, Tabular, Value};
pub use trends::TrendsAggregator;

/// One independent analytics module.
pub trait Aggregator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce this module's result tables. Table names must be unique across aggregators.
    fn aggregate(&self, table: &CombinedTable) -> Vec<ResultTable>;
}

/// The four standard analytics modules.
pub fn default_aggregators() -> Vec<Arc<dyn Aggregator>> {
    vec![
        Arc::new(DailySalesAggregator),
        Arc::new(ProfitabilityAggregator),
        Arc::new(TrendsAggregator),
        Arc::new(PaymentAggregator),
    ]
}

/// `num / den`, or `None` when the result is undefined.
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    let r = num / den;
    r.is_finite().then_some(r)
}

/// Running totals for one group of combined rows.
#[derive(Debug, Clone, Default)]
pub struct GroupStats {
    pub transactions: usize,
    pub quantity: i64,
    pub gross_revenue: f64,
    pub discount_amount: f64,
    pub net_revenue: f64,
    pub discount_rate_sum: f64,
    customers: HashSet<String>,
    malls: HashSet<String>,
}

impl GroupStats {
    pub fn push(&mut self, row: &CombinedRow) {
        self.transactions += 1;
        self.quantity += row.transaction.quantity;
        self.gross_revenue += row.gross_revenue;
        self.discount_amount += row.discount_amount;
        self.net_revenue += row.net_revenue;
        self.discount_rate_sum += row.transaction.discount_rate;
        if !self.customers.contains(&row.transaction.customer_id) {
            self.customers.insert(row.transaction.customer_id.clone());
        }
        if !self.malls.contains(&row.transaction.mall) {
            self.malls.insert(row.transaction.mall.clone());
        }
    }

    pub fn unique_customers(&self) -> usize {
        self.customers.len()
    }

    pub fn active_malls(&self) -> usize {
        self.malls.len()
    }

    pub fn avg_transaction_value(&self) -> Option<f64> {
        ratio(self.net_revenue, self.transactions as f64)
    }

    pub fn revenue_per_customer(&self) -> Option<f64> {
        ratio(self.net_revenue, self.customers.len() as f64)
    }

    pub fn revenue_per_unit(&self) -> Option<f64> {
        ratio(self.net_revenue, self.quantity as f64)
    }

    /// Mean of the line discount rates.
    pub fn discount_rate_avg(&self) -> Option<f64> {
        ratio(self.discount_rate_sum, self.transactions as f64)
    }

    /// Total discounts as a percentage of gross revenue.
    pub fn effective_discount_pct(&self) -> Option<f64> {
        ratio(self.discount_amount, self.gross_revenue).map(|r| r * 100.0)
    }
}

/// Group every row of `table` by `key`.
pub fn group_by<K, F>(table: &CombinedTable, key: F) -> BTreeMap<K, GroupStats>
where
    K: Ord,
    F: Fn(&CombinedRow) -> K,
{
    let mut groups: BTreeMap<K, GroupStats> = BTreeMap::new();
    for row in &table.rows {
        groups.entry(key(row)).or_default().push(row);
    }
    groups
}

impl Tabular for CombinedRow {
    const COLUMNS: &'static [&'static str] = &[
        "transaction_id",
        "customer_id",
        "gender",
        "age",
        "category",
        "quantity",
        "unit_price",
        "discount_rate",
        "payment_method",
        "transaction_date",
        "mall",
        "region",
        "gross_revenue",
        "discount_amount",
        "net_revenue",
        "year",
        "month",
        "day",
        "quarter",
        "day_of_year",
        "weekday",
        "weekday_name",
        "season",
    ];

    fn cells(&self) -> Vec<Value> {
        let t = &self.transaction;
        vec![
            t.transaction_id.as_str().into(),
            t.customer_id.as_str().into(),
            t.gender.clone().into(),
            t.age.into(),
            t.category.as_str().into(),
            t.quantity.into(),
            t.unit_price.into(),
            t.discount_rate.into(),
            t.payment_method.as_str().into(),
            t.transaction_date.into(),
            t.mall.as_str().into(),
            self.region.clone().into(),
            self.gross_revenue.into(),
            self.discount_amount.into(),
            self.net_revenue.into(),
            self.year.into(),
            self.month.into(),
            self.day.into(),
            self.quarter.into(),
            self.day_of_year.into(),
            self.weekday_index().into(),
            self.weekday_name().into(),
            self.season.as_str().into(),
        ]
    }
}

/// The combined table in exportable form.
pub fn combined_result(table: &CombinedTable) -> ResultTable {
    ResultTable::from_rows(constants::COMBINED_DATA, table.rows.iter().cloned())
}


#[cfg(test)]
mod tests {
    use super::fixtures::{table, Line};
    use super::*;

    #[test]
    fn test_ratio_guards_division_by_zero() {
        assert_eq!(ratio(10.0, 0.0), None);
        assert_eq!(ratio(0.0, 0.0), None);
        assert_eq!(ratio(10.0, 4.0), Some(2.5));
    }

    #[test]
    fn test_zero_quantity_sum_yields_null_revenue_per_unit() {
        let stats = GroupStats::default();
        assert_eq!(stats.revenue_per_unit(), None);
        assert_eq!(stats.avg_transaction_value(), None);
        assert_eq!(stats.effective_discount_pct(), None);
    }

    #[test]
    fn test_group_stats_counts_distinct_customers_and_malls() {
        let t = table(vec![
            Line { id: "I1", customer: "C1", mall: "M1", ..Default::default() },
            Line { id: "I2", customer: "C1", mall: "M2", ..Default::default() },
            Line { id: "I3", customer: "C2", mall: "M2", ..Default::default() },
        ]);
        let groups = group_by(&t, |_| ());
        let stats = &groups[&()];
        assert_eq!(stats.transactions, 3);
        assert_eq!(stats.unique_customers(), 2);
        assert_eq!(stats.active_malls(), 2);
    }

    #[test]
    fn test_combined_export_has_one_row_per_combined_row() {
        let t = table(vec![
            Line { id: "I1", ..Default::default() },
            Line { id: "I2", region: None, ..Default::default() },
        ]);
        let result = combined_result(&t);
        assert_eq!(result.len(), 2);
        assert_eq!(result.columns.len(), CombinedRow::COLUMNS.len());
        let region_at = result.column_index("region").unwrap();
        assert!(result.rows[1][region_at].is_null());
    }

    #[test]
    fn test_default_aggregators_produce_distinct_table_names() {
        let t = table(vec![Line::default()]);
        let mut names: Vec<String> = default_aggregators()
            .iter()
            .flat_map(|a| a.aggregate(&t))
            .map(|r| r.name)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, constants::ALL_TABLES.len() - 1);
    }
}
