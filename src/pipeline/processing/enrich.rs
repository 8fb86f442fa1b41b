use chrono::{Datelike, Weekday};
use tracing::{info, instrument};

use crate::domain::{Season, Transaction};
use crate::pipeline::processing::join::JoinedTransaction;

/// A joined transaction with derived financial and calendar columns.
///
/// Derived fields are a pure function of `transaction`, see [`CombinedRow::derive`].
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRow {
    pub transaction: Transaction,
    pub region: Option<String>,
    /// quantity × unit_price
    pub gross_revenue: f64,
    pub discount_amount: f64,
    /// gross_revenue − discount_amount
    pub net_revenue: f64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub quarter: u32,
    pub day_of_year: u32,
    pub weekday: Weekday,
    pub season: Season,
}

impl CombinedRow {
    pub fn derive(joined: JoinedTransaction) -> Self {
        let JoinedTransaction {
            transaction,
            region,
        } = joined;

        let gross_revenue = transaction.gross_amount();
        let discount_amount = gross_revenue * transaction.discount_rate;
        let date = transaction.transaction_date;
        let month = date.month();

        Self {
            gross_revenue,
            discount_amount,
            net_revenue: gross_revenue - discount_amount,
            year: date.year(),
            month,
            day: date.day(),
            quarter: (month - 1) / 3 + 1,
            day_of_year: date.ordinal(),
            weekday: date.weekday(),
            season: Season::from_month(month),
            transaction,
            region,
        }
    }

    /// Recompute the derived columns from the base columns.
    pub fn rederive(self) -> Self {
        Self::derive(JoinedTransaction {
            transaction: self.transaction,
            region: self.region,
        })
    }

    /// Monday = 0 … Sunday = 6
    pub fn weekday_index(&self) -> u32 {
        self.weekday.num_days_from_monday()
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }

    pub fn year_month(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// The joined and enriched table all aggregators read from.
#[derive(Debug, Clone, Default)]
pub struct CombinedTable {
    pub rows: Vec<CombinedRow>,
}

impl CombinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_net_revenue(&self) -> f64 {
        self.rows.iter().map(|r| r.net_revenue).sum()
    }
}

/// Row-wise enrichment of the joined table.
#[instrument(skip_all, fields(rows = joined.len()))]
pub fn enrich(joined: Vec<JoinedTransaction>) -> CombinedTable {
    let rows: Vec<CombinedRow> = joined.into_iter().map(CombinedRow::derive).collect();
    info!("Enriched {} rows", rows.len());
    CombinedTable { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentMethod;
    use chrono::NaiveDate;

    fn joined(quantity: i64, price: f64, discount: f64, date: NaiveDate) -> JoinedTransaction {
        JoinedTransaction {
            transaction: Transaction {
                row: 1,
                transaction_id: "I1".to_string(),
                customer_id: "C1".to_string(),
                gender: None,
                age: None,
                category: "Clothing".to_string(),
                quantity,
                unit_price: price,
                discount_rate: discount,
                payment_method: PaymentMethod::Cash,
                transaction_date: date,
                mall: "M1".to_string(),
            },
            region: Some("North".to_string()),
        }
    }

    #[test]
    fn test_net_revenue_and_calendar_fields() {
        let row = CombinedRow::derive(joined(2, 50.0, 0.1, NaiveDate::from_ymd_opt(2021, 1, 15).unwrap()));

        assert_eq!(row.gross_revenue, 100.0);
        assert!((row.net_revenue - 90.0).abs() < 1e-9);
        assert!((row.discount_amount - 10.0).abs() < 1e-9);
        assert_eq!(row.season, Season::Winter);
        assert_eq!(row.year, 2021);
        assert_eq!(row.month, 1);
        assert_eq!(row.quarter, 1);
        assert_eq!(row.day, 15);
        assert_eq!(row.day_of_year, 15);
        // 2021-01-15 was a Friday
        assert_eq!(row.weekday_name(), "Friday");
        assert_eq!(row.weekday_index(), 4);
        assert_eq!(row.year_month(), "2021-01");
    }

    #[test]
    fn test_quarters_follow_months() {
        for (month, quarter) in [(1, 1), (3, 1), (4, 2), (6, 2), (7, 3), (9, 3), (10, 4), (12, 4)] {
            let date = NaiveDate::from_ymd_opt(2022, month, 1).unwrap();
            assert_eq!(CombinedRow::derive(joined(1, 1.0, 0.0, date)).quarter, quarter);
        }
    }

    #[test]
    fn test_rederive_is_idempotent() {
        let row = CombinedRow::derive(joined(3, 19.99, 0.35, NaiveDate::from_ymd_opt(2023, 11, 30).unwrap()));
        let again = row.clone().rederive().rederive();
        assert_eq!(row, again);
    }

    #[test]
    fn test_net_never_exceeds_gross() {
        for discount in [0.0, 0.05, 0.5, 1.0] {
            let row = CombinedRow::derive(joined(4, 12.5, discount, NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()));
            assert!(row.net_revenue <= row.gross_revenue);
            assert!(row.net_revenue >= 0.0);
        }
    }
}
