use super::{group_by, ratio, Aggregator, GroupStats, ResultTable, Tabular, Value};
use crate::constants;
use crate::domain::PaymentMethod;
use crate::pipeline::processing::CombinedTable;

/// Payment method usage, overall and sliced by region, category and month.
pub struct PaymentAggregator;

struct MethodRow {
    method: PaymentMethod,
    stats: GroupStats,
    revenue_share: Option<f64>,
    transaction_share: Option<f64>,
}

impl Tabular for MethodRow {
    const COLUMNS: &'static [&'static str] = &[
        "payment_method",
        "total_revenue",
        "avg_transaction_value",
        "transaction_count",
        "total_quantity",
        "unique_customers",
        "revenue_percentage",
        "transaction_percentage",
    ];

    fn cells(&self) -> Vec<Value> {
        vec![
            self.method.as_str().into(),
            self.stats.net_revenue.into(),
            self.stats.avg_transaction_value().into(),
            self.stats.transactions.into(),
            self.stats.quantity.into(),
            self.stats.unique_customers().into(),
            self.revenue_share.into(),
            self.transaction_share.into(),
        ]
    }
}

/// Payment method within one slice (a region or a category).
struct SliceRow {
    slice: Option<String>,
    method: PaymentMethod,
    stats: GroupStats,
}

impl SliceRow {
    fn cells(&self) -> Vec<Value> {
        vec![
            self.slice.clone().into(),
            self.method.as_str().into(),
            self.stats.net_revenue.into(),
            self.stats.transactions.into(),
            self.stats.avg_transaction_value().into(),
        ]
    }
}

struct RegionSlice(SliceRow);
struct CategorySlice(SliceRow);

impl Tabular for RegionSlice {
    const COLUMNS: &'static [&'static str] = &[
        "region",
        "payment_method",
        "total_revenue",
        "transaction_count",
        "avg_transaction_value",
    ];

    fn cells(&self) -> Vec<Value> {
        self.0.cells()
    }
}

impl Tabular for CategorySlice {
    const COLUMNS: &'static [&'static str] = &[
        "category",
        "payment_method",
        "total_revenue",
        "transaction_count",
        "avg_transaction_value",
    ];

    fn cells(&self) -> Vec<Value> {
        self.0.cells()
    }
}

struct MonthlyMethodRow {
    year: i32,
    month: u32,
    method: PaymentMethod,
    stats: GroupStats,
}

impl Tabular for MonthlyMethodRow {
    const COLUMNS: &'static [&'static str] = &[
        "year",
        "month",
        "year_month",
        "payment_method",
        "total_revenue",
        "transaction_count",
    ];

    fn cells(&self) -> Vec<Value> {
        vec![
            self.year.into(),
            self.month.into(),
            format!("{}-{:02}", self.year, self.month).into(),
            self.method.as_str().into(),
            self.stats.net_revenue.into(),
            self.stats.transactions.into(),
        ]
    }
}

impl Aggregator for PaymentAggregator {
    fn name(&self) -> &'static str {
        "payments"
    }

    fn aggregate(&self, table: &CombinedTable) -> Vec<ResultTable> {
        let total_revenue = table.total_net_revenue();
        let total_count = table.len() as f64;

        let methods = group_by(table, |r| r.transaction.payment_method)
            .into_iter()
            .map(|(method, stats)| MethodRow {
                method,
                revenue_share: ratio(stats.net_revenue, total_revenue).map(|r| r * 100.0),
                transaction_share: ratio(stats.transactions as f64, total_count)
                    .map(|r| r * 100.0),
                stats,
            });

        let by_region = group_by(table, |r| (r.region.clone(), r.transaction.payment_method))
            .into_iter()
            .map(|((slice, method), stats)| {
                RegionSlice(SliceRow {
                    slice,
                    method,
                    stats,
                })
            });

        let by_category = group_by(table, |r| {
            (
                r.transaction.category.clone(),
                r.transaction.payment_method,
            )
        })
        .into_iter()
        .map(|((category, method), stats)| {
            CategorySlice(SliceRow {
                slice: Some(category),
                method,
                stats,
            })
        });

        let trends = group_by(table, |r| (r.year, r.month, r.transaction.payment_method))
            .into_iter()
            .map(|((year, month, method), stats)| MonthlyMethodRow {
                year,
                month,
                method,
                stats,
            });

        vec![
            ResultTable::from_rows(constants::PAYMENT_ANALYSIS, methods),
            ResultTable::from_rows(constants::PAYMENT_BY_REGION, by_region),
            ResultTable::from_rows(constants::PAYMENT_BY_CATEGORY, by_category),
            ResultTable::from_rows(constants::PAYMENT_TRENDS, trends),
        ]
    }
}
