//! Record shapes shared by every pipeline stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value read from a source file before domain checks.
///
/// Each loaded field is declared up front as one of these, so a missing or malformed value
/// is visible to the validator instead of silently turning into a default.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell<T> {
    Value(T),
    Missing,
    /// The raw text that failed to parse
    Invalid(String),
}

impl<T> Cell<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Cell::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Cell::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Closed set of accepted payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Cash,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
    ];

    /// Accepts `Credit Card`, `credit-card`, `CREDIT_CARD` and the like.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        match folded.as_str() {
            "cash" => Some(PaymentMethod::Cash),
            "credit_card" => Some(PaymentMethod::CreditCard),
            "debit_card" => Some(PaymentMethod::DebitCard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meteorological season. Declaration order is calendar order from December.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// Dec–Feb Winter, Mar–May Spring, Jun–Aug Summer, Sep–Nov Fall.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// 1-based data row in the source file
    pub row: usize,
    pub transaction_id: String,
    pub customer_id: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub category: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount_rate: f64,
    pub payment_method: PaymentMethod,
    pub transaction_date: NaiveDate,
    pub mall: String,
}

impl Transaction {
    pub fn gross_amount(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

/// One entry of the region lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Region {
    pub mall: String,
    pub region: String,
}
