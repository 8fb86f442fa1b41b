use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument, warn};

use crate::domain::{Region, Transaction};
use crate::error::{PipelineError, Result};

/// A transaction with its looked-up region, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTransaction {
    pub transaction: Transaction,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub unmatched_rows: usize,
    /// Mall identifiers with no entry in the region lookup
    pub unmatched_malls: BTreeSet<String>,
}

/// Left join of transactions to the region lookup on mall identifier.
///
/// Every transaction yields exactly one output row; malls without a lookup entry get a
/// null region. Region rows are assumed unique per mall (the validator guarantees it).
#[instrument(skip_all, fields(transactions = transactions.len(), regions = regions.len()))]
pub fn left_join(
    transactions: Vec<Transaction>,
    regions: &[Region],
) -> Result<(Vec<JoinedTransaction>, JoinReport)> {
    let lookup: HashMap<&str, &str> = regions
        .iter()
        .map(|r| (r.mall.as_str(), r.region.as_str()))
        .collect();

    let mut report = JoinReport {
        rows_in: transactions.len(),
        ..Default::default()
    };

    let joined: Vec<JoinedTransaction> = transactions
        .into_iter()
        .map(|transaction| {
            let region = lookup.get(transaction.mall.as_str()).map(|r| r.to_string());
            if region.is_none() {
                report.unmatched_rows += 1;
                report.unmatched_malls.insert(transaction.mall.clone());
            }
            JoinedTransaction { transaction, region }
        })
        .collect();

    report.rows_out = joined.len();
    if report.rows_out != report.rows_in {
        return Err(PipelineError::JoinIntegrity {
            expected: report.rows_in,
            actual: report.rows_out,
        });
    }

    if report.unmatched_rows > 0 {
        warn!(
            "{} rows reference malls missing from the region lookup: {:?}",
            report.unmatched_rows, report.unmatched_malls
        );
    }
    info!("Joined {} rows with region lookup", report.rows_out);

    Ok((joined, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentMethod;
    use chrono::NaiveDate;

    fn txn(id: &str, mall: &str) -> Transaction {
        Transaction {
            row: 1,
            transaction_id: id.to_string(),
            customer_id: "C1".to_string(),
            gender: None,
            age: None,
            category: "Books".to_string(),
            quantity: 1,
            unit_price: 10.0,
            discount_rate: 0.0,
            payment_method: PaymentMethod::Cash,
            transaction_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            mall: mall.to_string(),
        }
    }

    fn region(mall: &str, name: &str) -> Region {
        Region {
            mall: mall.to_string(),
            region: name.to_string(),
        }
    }

    #[test]
    fn test_unmatched_mall_keeps_row_with_null_region() {
        let (joined, report) = left_join(
            vec![txn("I1", "M1"), txn("I2", "M9")],
            &[region("M1", "North")],
        )
        .unwrap();

        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].region.as_deref(), Some("North"));
        assert_eq!(joined[1].transaction.transaction_id, "I2");
        assert_eq!(joined[1].region, None);
        assert_eq!(report.unmatched_rows, 1);
        assert!(report.unmatched_malls.contains("M9"));
    }

    #[test]
    fn test_cardinality_is_preserved() {
        let transactions: Vec<Transaction> = (0..50)
            .map(|i| txn(&format!("I{i}"), &format!("M{}", i % 7)))
            .collect();
        let regions = vec![region("M0", "North"), region("M1", "South"), region("M2", "East")];

        let (joined, report) = left_join(transactions, &regions).unwrap();
        assert_eq!(joined.len(), 50);
        assert_eq!(report.rows_in, report.rows_out);
        // Order follows the transaction table
        assert_eq!(joined[10].transaction.transaction_id, "I10");
    }
}
