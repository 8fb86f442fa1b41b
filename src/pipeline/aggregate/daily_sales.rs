use chrono::NaiveDate;

use super::{group_by, Aggregator, GroupStats, ResultTable, Tabular, Value};
use crate::constants;
use crate::pipeline::processing::CombinedTable;

/// Sales per day and mall, plus a regional roll-up per day.
pub struct DailySalesAggregator;

struct DailySalesRow {
    date: NaiveDate,
    mall: String,
    region: Option<String>,
    stats: GroupStats,
}

impl Tabular for DailySalesRow {
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "mall",
        "region",
        "total_revenue",
        "transaction_count",
        "avg_transaction_value",
        "total_quantity",
        "unique_customers",
        "revenue_per_customer",
    ];

    fn cells(&self) -> Vec<Value> {
        vec![
            self.date.into(),
            self.mall.as_str().into(),
            self.region.clone().into(),
            self.stats.net_revenue.into(),
            self.stats.transactions.into(),
            self.stats.avg_transaction_value().into(),
            self.stats.quantity.into(),
            self.stats.unique_customers().into(),
            self.stats.revenue_per_customer().into(),
        ]
    }
}

struct RegionalDailyRow {
    date: NaiveDate,
    region: Option<String>,
    stats: GroupStats,
}

impl Tabular for RegionalDailyRow {
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "region",
        "total_revenue",
        "transaction_count",
        "avg_transaction_value",
        "total_quantity",
        "unique_customers",
        "active_malls",
    ];

    fn cells(&self) -> Vec<Value> {
        vec![
            self.date.into(),
            self.region.clone().into(),
            self.stats.net_revenue.into(),
            self.stats.transactions.into(),
            self.stats.avg_transaction_value().into(),
            self.stats.quantity.into(),
            self.stats.unique_customers().into(),
            self.stats.active_malls().into(),
        ]
    }
}

impl Aggregator for DailySalesAggregator {
    fn name(&self) -> &'static str {
        "daily_sales"
    }

    fn aggregate(&self, table: &CombinedTable) -> Vec<ResultTable> {
        let by_mall = group_by(table, |r| {
            (
                r.transaction.transaction_date,
                r.transaction.mall.clone(),
                r.region.clone(),
            )
        });
        let daily = by_mall
            .into_iter()
            .map(|((date, mall, region), stats)| DailySalesRow {
                date,
                mall,
                region,
                stats,
            });

        let by_region = group_by(table, |r| (r.transaction.transaction_date, r.region.clone()));
        let regional = by_region
            .into_iter()
            .map(|((date, region), stats)| RegionalDailyRow {
                date,
                region,
                stats,
            });

        vec![
            ResultTable::from_rows(constants::DAILY_SALES, daily),
            ResultTable::from_rows(constants::REGIONAL_DAILY_SALES, regional),
        ]
    }
}
