use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::config::{ValidationConfig, ViolationPolicy};
use crate::constants::MAX_PLAUSIBLE_AGE;
use crate::domain::{Cell, Region, Transaction};
use crate::error::ValidationError;
use crate::observability::metrics;
use crate::pipeline::ingestion::loader::{REGIONS_TABLE, TRANSACTIONS_TABLE};
use crate::pipeline::ingestion::{LoadedRegion, LoadedTransaction, RegionTable, TransactionTable};

/// The domain rule a value broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    MissingValue,
    InvalidNumber,
    InvalidDate,
    UnknownPaymentMethod,
    NonPositiveQuantity,
    NegativeUnitPrice,
    DiscountOutOfRange,
    DuplicateTransactionId,
    DuplicateMall,
    ImplausibleAge,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::MissingValue => "missing_value",
            Rule::InvalidNumber => "invalid_number",
            Rule::InvalidDate => "invalid_date",
            Rule::UnknownPaymentMethod => "unknown_payment_method",
            Rule::NonPositiveQuantity => "non_positive_quantity",
            Rule::NegativeUnitPrice => "negative_unit_price",
            Rule::DiscountOutOfRange => "discount_out_of_range",
            Rule::DuplicateTransactionId => "duplicate_transaction_id",
            Rule::DuplicateMall => "duplicate_mall",
            Rule::ImplausibleAge => "implausible_age",
        }
    }
}

/// Warnings are reported but keep the row; errors exclude it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A single rule violation, addressable back to the source row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub table: &'static str,
    pub row: usize,
    pub transaction_id: Option<String>,
    pub field: &'static str,
    pub rule: Rule,
    pub severity: Severity,
    pub observed: String,
}

/// Counts and violations for one validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub transactions_in: usize,
    pub transactions_accepted: usize,
    pub transactions_excluded: usize,
    pub regions_in: usize,
    pub regions_accepted: usize,
    pub regions_excluded: usize,
    /// Excluded transaction rows per rule. A row that broke several rules is counted once
    /// under each of them, so the counts can add up to more than `transactions_excluded`.
    pub transactions_excluded_by_rule: BTreeMap<Rule, usize>,
    /// Excluded region rows per rule, counted the same way
    pub regions_excluded_by_rule: BTreeMap<Rule, usize>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn warning_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
            .count()
    }

    /// Fraction of transaction rows excluded.
    pub fn exclusion_rate(&self) -> f64 {
        if self.transactions_in == 0 {
            return 0.0;
        }
        self.transactions_excluded as f64 / self.transactions_in as f64
    }
}

/// Output of the validator: typed rows ready to join.
#[derive(Debug, Clone)]
pub struct ValidatedTables {
    pub transactions: Vec<Transaction>,
    pub regions: Vec<Region>,
    pub report: ValidationReport,
}

pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Check both tables, collect violations, and keep rows that passed.
    ///
    /// Required columns were resolved by the loader, so only values are checked here.
    #[instrument(skip_all, fields(transactions = transactions.rows.len(), regions = regions.rows.len()))]
    pub fn validate(
        &self,
        transactions: TransactionTable,
        regions: RegionTable,
    ) -> Result<ValidatedTables, ValidationError> {
        if transactions.rows.is_empty() {
            return Err(ValidationError::EmptyInput {
                table: TRANSACTIONS_TABLE,
            });
        }
        if regions.rows.is_empty() {
            return Err(ValidationError::EmptyInput {
                table: REGIONS_TABLE,
            });
        }

        let mut report = ValidationReport {
            transactions_in: transactions.rows.len(),
            regions_in: regions.rows.len(),
            ..Default::default()
        };

        let mut accepted = Vec::with_capacity(transactions.rows.len());
        let mut seen_ids: HashSet<String> = HashSet::new();
        for row in transactions.rows {
            let mut issues = Vec::new();
            let checked = check_transaction(row, &mut seen_ids, &mut issues);
            let rejected = issues.iter().any(|v| v.severity == Severity::Error);
            for v in &issues {
                debug!(row = v.row, rule = v.rule.as_str(), observed = %v.observed, "violation");
            }
            match checked {
                Some(txn) if !rejected => accepted.push(txn),
                _ => {
                    report.transactions_excluded += 1;
                    count_rules(&mut report.transactions_excluded_by_rule, &issues);
                }
            }
            report.violations.extend(issues);
        }
        report.transactions_accepted = accepted.len();

        let mut lookup = Vec::with_capacity(regions.rows.len());
        let mut seen_malls: HashSet<String> = HashSet::new();
        for row in regions.rows {
            let mut issues = Vec::new();
            match check_region(row, &mut seen_malls, &mut issues) {
                Some(region) => lookup.push(region),
                None => {
                    report.regions_excluded += 1;
                    count_rules(&mut report.regions_excluded_by_rule, &issues);
                }
            }
            report.violations.extend(issues);
        }
        report.regions_accepted = lookup.len();

        metrics::validation::record(&report);
        for (rule, count) in &report.transactions_excluded_by_rule {
            warn!("Transactions excluded by {}: {}", rule.as_str(), count);
        }
        for (rule, count) in &report.regions_excluded_by_rule {
            warn!("Regions excluded by {}: {}", rule.as_str(), count);
        }

        if self.config.on_violation == ViolationPolicy::Abort && report.error_count() > 0 {
            return Err(ValidationError::Rejected {
                violations: report.error_count(),
            });
        }
        if accepted.is_empty() {
            return Err(ValidationError::NothingLeft {
                table: TRANSACTIONS_TABLE,
                total: report.transactions_in,
            });
        }
        if lookup.is_empty() {
            return Err(ValidationError::NothingLeft {
                table: REGIONS_TABLE,
                total: report.regions_in,
            });
        }
        if report.exclusion_rate() > self.config.max_excluded_ratio {
            return Err(ValidationError::TooManyExcluded {
                excluded: report.transactions_excluded,
                total: report.transactions_in,
                max_ratio: self.config.max_excluded_ratio,
            });
        }

        info!(
            "✅ Validation accepted {}/{} transactions ({} excluded, {} warnings)",
            report.transactions_accepted,
            report.transactions_in,
            report.transactions_excluded,
            report.warning_count()
        );

        Ok(ValidatedTables {
            transactions: accepted,
            regions: lookup,
            report,
        })
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

/// Count one excluded row under each distinct error rule it broke.
fn count_rules(counts: &mut BTreeMap<Rule, usize>, issues: &[Violation]) {
    let rules: BTreeSet<Rule> = issues
        .iter()
        .filter(|v| v.severity == Severity::Error)
        .map(|v| v.rule)
        .collect();
    for rule in rules {
        *counts.entry(rule).or_insert(0) += 1;
    }
}

/// Collects violations for one row while unwrapping its cells.
struct RowCheck<'a> {
    table: &'static str,
    row: usize,
    transaction_id: Option<String>,
    issues: &'a mut Vec<Violation>,
}

impl RowCheck<'_> {
    fn push(&mut self, field: &'static str, rule: Rule, severity: Severity, observed: String) {
        self.issues.push(Violation {
            table: self.table,
            row: self.row,
            transaction_id: self.transaction_id.clone(),
            field,
            rule,
            severity,
            observed,
        });
    }

    /// A required cell; `invalid_rule` applies when it failed to parse.
    fn required<T>(&mut self, field: &'static str, cell: Cell<T>, invalid_rule: Rule) -> Option<T> {
        match cell {
            Cell::Value(v) => Some(v),
            Cell::Missing => {
                self.push(field, Rule::MissingValue, Severity::Error, String::new());
                None
            }
            Cell::Invalid(raw) => {
                self.push(field, invalid_rule, Severity::Error, raw);
                None
            }
        }
    }
}

fn check_transaction(
    row: LoadedTransaction,
    seen_ids: &mut HashSet<String>,
    issues: &mut Vec<Violation>,
) -> Option<Transaction> {
    let mut check = RowCheck {
        table: TRANSACTIONS_TABLE,
        row: row.row,
        transaction_id: row.transaction_id.value().cloned(),
        issues,
    };

    let transaction_id = check.required("transaction_id", row.transaction_id, Rule::MissingValue);
    if let Some(id) = &transaction_id {
        if !seen_ids.insert(id.clone()) {
            check.push(
                "transaction_id",
                Rule::DuplicateTransactionId,
                Severity::Error,
                id.clone(),
            );
        }
    }

    let customer_id = check.required("customer_id", row.customer_id, Rule::MissingValue);
    let category = check.required("category", row.category, Rule::MissingValue);
    let mall = check.required("mall", row.mall, Rule::MissingValue);

    let quantity = check
        .required("quantity", row.quantity, Rule::InvalidNumber)
        .filter(|q| {
            let ok = *q > 0;
            if !ok {
                check.push("quantity", Rule::NonPositiveQuantity, Severity::Error, q.to_string());
            }
            ok
        });

    let unit_price = check
        .required("unit_price", row.unit_price, Rule::InvalidNumber)
        .filter(|p| {
            let ok = *p >= 0.0;
            if !ok {
                check.push("unit_price", Rule::NegativeUnitPrice, Severity::Error, p.to_string());
            }
            ok
        });

    let discount_rate = check
        .required("discount_rate", row.discount_rate, Rule::InvalidNumber)
        .filter(|d| {
            let ok = (0.0..=1.0).contains(d);
            if !ok {
                check.push("discount_rate", Rule::DiscountOutOfRange, Severity::Error, d.to_string());
            }
            ok
        });

    let payment_method = check.required("payment_method", row.payment_method, Rule::UnknownPaymentMethod);
    let transaction_date = check.required("transaction_date", row.transaction_date, Rule::InvalidDate);

    // Optional demographics never exclude a row
    let age = match row.age {
        Cell::Value(a) if !(0..=MAX_PLAUSIBLE_AGE).contains(&a) => {
            check.push("age", Rule::ImplausibleAge, Severity::Warning, a.to_string());
            Some(a)
        }
        Cell::Value(a) => Some(a),
        Cell::Invalid(raw) => {
            check.push("age", Rule::InvalidNumber, Severity::Warning, raw);
            None
        }
        Cell::Missing => None,
    };

    Some(Transaction {
        row: row.row,
        transaction_id: transaction_id?,
        customer_id: customer_id?,
        gender: row.gender.into_option(),
        age,
        category: category?,
        quantity: quantity?,
        unit_price: unit_price?,
        discount_rate: discount_rate?,
        payment_method: payment_method?,
        transaction_date: transaction_date?,
        mall: mall?,
    })
}

fn check_region(
    row: LoadedRegion,
    seen_malls: &mut HashSet<String>,
    issues: &mut Vec<Violation>,
) -> Option<Region> {
    let mut check = RowCheck {
        table: REGIONS_TABLE,
        row: row.row,
        transaction_id: None,
        issues,
    };

    let mall = check.required("mall", row.mall, Rule::MissingValue);
    let region = check.required("region", row.region, Rule::MissingValue);
    let mall = mall?;

    // First mapping wins so the join can never fan out
    if !seen_malls.insert(mall.clone()) {
        check.push("mall", Rule::DuplicateMall, Severity::Error, mall);
        return None;
    }

    Some(Region {
        mall,
        region: region?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentMethod;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn loaded(row: usize, id: &str, quantity: i64, price: f64, discount: f64) -> LoadedTransaction {
        LoadedTransaction {
            row,
            transaction_id: Cell::Value(id.to_string()),
            customer_id: Cell::Value(format!("C{row}")),
            gender: Cell::Value("Female".to_string()),
            age: Cell::Value(30),
            category: Cell::Value("Clothing".to_string()),
            quantity: Cell::Value(quantity),
            unit_price: Cell::Value(price),
            discount_rate: Cell::Value(discount),
            payment_method: Cell::Value(PaymentMethod::Cash),
            transaction_date: Cell::Value(NaiveDate::from_ymd_opt(2021, 1, 15).unwrap()),
            mall: Cell::Value("M1".to_string()),
        }
    }

    fn tables(rows: Vec<LoadedTransaction>) -> (TransactionTable, RegionTable) {
        let txns = TransactionTable {
            source: PathBuf::from("t.csv"),
            headers: Vec::new(),
            rows,
        };
        let regions = RegionTable {
            source: PathBuf::from("r.csv"),
            headers: Vec::new(),
            rows: vec![LoadedRegion {
                row: 1,
                mall: Cell::Value("M1".to_string()),
                region: Cell::Value("North".to_string()),
            }],
        };
        (txns, regions)
    }

    #[test]
    fn test_out_of_range_discount_is_excluded_and_counted() {
        let (t, r) = tables(vec![loaded(1, "I1", 2, 50.0, 0.1), loaded(2, "I2", 1, 10.0, 1.5)]);
        let out = Validator::default().validate(t, r).unwrap();

        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].transaction_id, "I1");
        assert_eq!(out.report.transactions_excluded, 1);
        assert_eq!(out.report.transactions_excluded_by_rule.get(&Rule::DiscountOutOfRange), Some(&1));

        let v = &out.report.violations[0];
        assert_eq!(v.row, 2);
        assert_eq!(v.transaction_id.as_deref(), Some("I2"));
        assert_eq!(v.observed, "1.5");
    }

    #[test]
    fn test_numeric_domain_rules() {
        let (t, r) = tables(vec![
            loaded(1, "I1", 0, 10.0, 0.0),
            loaded(2, "I2", 1, -1.0, 0.0),
            loaded(3, "I3", 1, 0.0, 1.0),
        ]);
        let out = Validator::default().validate(t, r).unwrap();

        let counts = &out.report.transactions_excluded_by_rule;
        assert_eq!(counts.get(&Rule::NonPositiveQuantity), Some(&1));
        assert_eq!(counts.get(&Rule::NegativeUnitPrice), Some(&1));
        // Zero price and full discount are inside the domain
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].transaction_id, "I3");
    }

    #[test]
    fn test_duplicate_ids_keep_first_occurrence() {
        let (t, r) = tables(vec![
            loaded(1, "I1", 1, 10.0, 0.0),
            loaded(2, "I1", 3, 10.0, 0.0),
        ]);
        let out = Validator::default().validate(t, r).unwrap();

        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].row, 1);
        assert_eq!(out.report.transactions_excluded_by_rule.get(&Rule::DuplicateTransactionId), Some(&1));
    }

    #[test]
    fn test_invalid_cells_report_observed_text() {
        let mut bad = loaded(1, "I1", 1, 10.0, 0.0);
        bad.payment_method = Cell::Invalid("voucher".to_string());
        bad.transaction_date = Cell::Invalid("2021-13-40".to_string());
        bad.customer_id = Cell::Missing;
        let (t, r) = tables(vec![bad, loaded(2, "I2", 1, 10.0, 0.0)]);
        let out = Validator::default().validate(t, r).unwrap();

        let rules: Vec<Rule> = out.report.violations.iter().map(|v| v.rule).collect();
        assert!(rules.contains(&Rule::UnknownPaymentMethod));
        assert!(rules.contains(&Rule::InvalidDate));
        assert!(rules.contains(&Rule::MissingValue));
        // Three violations, one excluded row
        assert_eq!(out.report.transactions_excluded, 1);
    }

    #[test]
    fn test_exclusions_count_rows_per_rule_and_table() {
        let (t, mut r) = tables(vec![loaded(1, "I1", 0, 10.0, 1.5), loaded(2, "I2", 1, 10.0, 0.0)]);
        r.rows.push(LoadedRegion {
            row: 2,
            mall: Cell::Value("M2".to_string()),
            region: Cell::Missing,
        });
        let out = Validator::default().validate(t, r).unwrap();
        let report = &out.report;

        assert_eq!(report.transactions_excluded, 1);
        assert_eq!(
            report.transactions_excluded_by_rule,
            BTreeMap::from([(Rule::NonPositiveQuantity, 1), (Rule::DiscountOutOfRange, 1)])
        );
        assert_eq!(report.regions_excluded, 1);
        assert_eq!(
            report.regions_excluded_by_rule,
            BTreeMap::from([(Rule::MissingValue, 1)])
        );
    }

    #[test]
    fn test_row_with_repeated_rule_counts_once() {
        let mut bad = loaded(1, "I1", 1, 10.0, 0.0);
        bad.customer_id = Cell::Missing;
        bad.category = Cell::Missing;
        let (t, r) = tables(vec![bad, loaded(2, "I2", 1, 10.0, 0.0)]);
        let out = Validator::default().validate(t, r).unwrap();

        assert_eq!(out.report.error_count(), 2);
        assert_eq!(
            out.report.transactions_excluded_by_rule,
            BTreeMap::from([(Rule::MissingValue, 1)])
        );
    }

    #[test]
    fn test_implausible_age_is_only_a_warning() {
        let mut old = loaded(1, "I1", 1, 10.0, 0.0);
        old.age = Cell::Value(150);
        let (t, r) = tables(vec![old]);
        let out = Validator::default().validate(t, r).unwrap();

        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.report.warning_count(), 1);
        assert!(out.report.transactions_excluded_by_rule.is_empty());
    }

    #[test]
    fn test_abort_policy_rejects_any_error() {
        let (t, r) = tables(vec![loaded(1, "I1", 1, 10.0, 0.0), loaded(2, "I2", 1, 10.0, 2.0)]);
        let validator = Validator::new(ValidationConfig {
            on_violation: ViolationPolicy::Abort,
            ..Default::default()
        });
        let err = validator.validate(t, r).unwrap_err();
        assert!(matches!(err, ValidationError::Rejected { violations: 1 }));
    }

    #[test]
    fn test_excluded_ratio_threshold() {
        let (t, r) = tables(vec![loaded(1, "I1", 1, 10.0, 0.0), loaded(2, "I2", 0, 10.0, 0.0)]);
        let validator = Validator::new(ValidationConfig {
            max_excluded_ratio: 0.25,
            ..Default::default()
        });
        let err = validator.validate(t, r).unwrap_err();
        assert!(matches!(err, ValidationError::TooManyExcluded { excluded: 1, total: 2, .. }));
    }

    #[test]
    fn test_empty_and_fully_excluded_inputs_are_fatal() {
        let (t, r) = tables(Vec::new());
        assert!(matches!(
            Validator::default().validate(t, r),
            Err(ValidationError::EmptyInput { table: TRANSACTIONS_TABLE })
        ));

        let (t, r) = tables(vec![loaded(1, "I1", -1, 10.0, 0.0)]);
        assert!(matches!(
            Validator::default().validate(t, r),
            Err(ValidationError::NothingLeft { total: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_mall_in_lookup_keeps_first() {
        let (t, mut r) = tables(vec![loaded(1, "I1", 1, 10.0, 0.0)]);
        r.rows.push(LoadedRegion {
            row: 2,
            mall: Cell::Value("M1".to_string()),
            region: Cell::Value("South".to_string()),
        });
        let out = Validator::default().validate(t, r).unwrap();

        assert_eq!(out.regions.len(), 1);
        assert_eq!(out.regions[0].region, "North");
        assert_eq!(out.report.regions_excluded, 1);
    }
}
