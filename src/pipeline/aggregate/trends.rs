use chrono::Weekday;

use super::{group_by, Aggregator, GroupStats, ResultTable, Tabular, Value};
use crate::constants;
use crate::domain::Season;
use crate::pipeline::processing::enrich::weekday_name;
use crate::pipeline::processing::CombinedTable;

/// Seasonal, weekly, monthly and quarterly revenue patterns.
pub struct TrendsAggregator;

struct SeasonRow {
    season: Season,
    stats: GroupStats,
}

impl Tabular for SeasonRow {
    const COLUMNS: &'static [&'static str] = &[
        "season",
        "total_revenue",
        "avg_revenue",
        "total_quantity",
        "transaction_count",
    ];

    fn cells(&self) -> Vec<Value> {
        vec![
            self.season.as_str().into(),
            self.stats.net_revenue.into(),
            self.stats.avg_transaction_value().into(),
            self.stats.quantity.into(),
            self.stats.transactions.into(),
        ]
    }
}

struct WeekdayRow {
    index: u32,
    stats: GroupStats,
}

impl Tabular for WeekdayRow {
    const COLUMNS: &'static [&'static str] = &[
        "weekday",
        "weekday_name",
        "total_revenue",
        "avg_revenue",
        "total_quantity",
        "transaction_count",
    ];

    fn cells(&self) -> Vec<Value> {
        let name = Weekday::try_from(self.index as u8)
            .map(weekday_name)
            .unwrap_or_default();
        vec![
            self.index.into(),
            name.into(),
            self.stats.net_revenue.into(),
            self.stats.avg_transaction_value().into(),
            self.stats.quantity.into(),
            self.stats.transactions.into(),
        ]
    }
}

struct MonthRow {
    year: i32,
    month: u32,
    stats: GroupStats,
}

impl Tabular for MonthRow {
    const COLUMNS: &'static [&'static str] = &[
        "year",
        "month",
        "year_month",
        "total_revenue",
        "avg_revenue",
        "total_quantity",
        "transaction_count",
    ];

    fn cells(&self) -> Vec<Value> {
        vec![
            self.year.into(),
            self.month.into(),
            format!("{}-{:02}", self.year, self.month).into(),
            self.stats.net_revenue.into(),
            self.stats.avg_transaction_value().into(),
            self.stats.quantity.into(),
            self.stats.transactions.into(),
        ]
    }
}

struct QuarterRow {
    year: i32,
    quarter: u32,
    stats: GroupStats,
}

impl Tabular for QuarterRow {
    const COLUMNS: &'static [&'static str] = &[
        "year",
        "quarter",
        "total_revenue",
        "avg_revenue",
        "total_quantity",
        "transaction_count",
    ];

    fn cells(&self) -> Vec<Value> {
        vec![
            self.year.into(),
            self.quarter.into(),
            self.stats.net_revenue.into(),
            self.stats.avg_transaction_value().into(),
            self.stats.quantity.into(),
            self.stats.transactions.into(),
        ]
    }
}

impl Aggregator for TrendsAggregator {
    fn name(&self) -> &'static str {
        "trends"
    }

    fn aggregate(&self, table: &CombinedTable) -> Vec<ResultTable> {
        let seasons = group_by(table, |r| r.season)
            .into_iter()
            .map(|(season, stats)| SeasonRow { season, stats });

        let weekdays = group_by(table, |r| r.weekday_index())
            .into_iter()
            .map(|(index, stats)| WeekdayRow { index, stats });

        // The (year, month) key orders the series chronologically
        let months = group_by(table, |r| (r.year, r.month))
            .into_iter()
            .map(|((year, month), stats)| MonthRow { year, month, stats });

        let quarters = group_by(table, |r| (r.year, r.quarter))
            .into_iter()
            .map(|((year, quarter), stats)| QuarterRow {
                year,
                quarter,
                stats,
            });

        vec![
            ResultTable::from_rows(constants::SEASONAL_TRENDS, seasons),
            ResultTable::from_rows(constants::WEEKLY_PATTERNS, weekdays),
            ResultTable::from_rows(constants::MONTHLY_TRENDS, months),
            ResultTable::from_rows(constants::QUARTERLY_TRENDS, quarters),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::fixtures::{table, Line};

    fn find<'a>(tables: &'a [ResultTable], name: &str) -> &'a ResultTable {
        tables.iter().find(|t| t.name == name).unwrap()
    }

    #[test]
    fn test_monthly_series_is_chronological() {
        // Insertion order deliberately scrambled across years
        let t = table(vec![
            Line { id: "I1", date: (2022, 3, 1), ..Default::default() },
            Line { id: "I2", date: (2021, 11, 5), ..Default::default() },
            Line { id: "I3", date: (2022, 1, 9), ..Default::default() },
            Line { id: "I4", date: (2021, 2, 28), ..Default::default() },
            Line { id: "I5", date: (2021, 11, 30), ..Default::default() },
        ]);
        let out = TrendsAggregator.aggregate(&t);
        let monthly = find(&out, constants::MONTHLY_TRENDS);

        let keys: Vec<(i64, i64)> = monthly
            .rows
            .iter()
            .map(|r| match (&r[0], &r[1]) {
                (Value::Integer(y), Value::Integer(m)) => (*y, *m),
                other => panic!("unexpected key {:?}", other),
            })
            .collect();
        assert_eq!(keys, vec![(2021, 2), (2021, 11), (2022, 1), (2022, 3)]);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(monthly.rows[1][2], Value::from("2021-11"));
        assert_eq!(monthly.rows[1][6], Value::Integer(2));
    }

    #[test]
    fn test_seasons_and_weekdays_in_calendar_order() {
        let t = table(vec![
            Line { id: "I1", date: (2021, 10, 4), ..Default::default() }, // Monday, Fall
            Line { id: "I2", date: (2021, 7, 4), ..Default::default() },  // Sunday, Summer
            Line { id: "I3", date: (2021, 12, 24), ..Default::default() }, // Friday, Winter
        ]);
        let out = TrendsAggregator.aggregate(&t);

        let seasons = find(&out, constants::SEASONAL_TRENDS);
        assert_eq!(
            seasons.column("season"),
            vec![&Value::from("Winter"), &Value::from("Summer"), &Value::from("Fall")]
        );

        let weekly = find(&out, constants::WEEKLY_PATTERNS);
        assert_eq!(
            weekly.column("weekday_name"),
            vec![&Value::from("Monday"), &Value::from("Friday"), &Value::from("Sunday")]
        );
    }

    #[test]
    fn test_quarterly_totals() {
        let t = table(vec![
            Line { id: "I1", price: 10.0, date: (2021, 1, 4), ..Default::default() },
            Line { id: "I2", price: 30.0, date: (2021, 3, 4), ..Default::default() },
            Line { id: "I3", price: 5.0, date: (2021, 4, 4), ..Default::default() },
        ]);
        let out = TrendsAggregator.aggregate(&t);
        let quarterly = find(&out, constants::QUARTERLY_TRENDS);

        assert_eq!(quarterly.len(), 2);
        assert_eq!(quarterly.rows[0][2], Value::Number(40.0));
        assert_eq!(quarterly.rows[0][3], Value::Number(20.0));
    }
}
