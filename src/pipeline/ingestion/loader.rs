use crate::config::InputConfig;
use crate::domain::{Cell, PaymentMethod};
use crate::error::LoadError;
use crate::observability::metrics;
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const REGIONS_TABLE: &str = "regions";

/// A transaction row as read from the source file, before any domain checks.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTransaction {
    /// 1-based data row (the header is not counted)
    pub row: usize,
    pub transaction_id: Cell<String>,
    pub customer_id: Cell<String>,
    pub gender: Cell<String>,
    pub age: Cell<i64>,
    pub category: Cell<String>,
    pub quantity: Cell<i64>,
    pub unit_price: Cell<f64>,
    pub discount_rate: Cell<f64>,
    pub payment_method: Cell<PaymentMethod>,
    pub transaction_date: Cell<NaiveDate>,
    pub mall: Cell<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRegion {
    pub row: usize,
    pub mall: Cell<String>,
    pub region: Cell<String>,
}

#[derive(Debug, Clone)]
pub struct TransactionTable {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<LoadedTransaction>,
}

#[derive(Debug, Clone)]
pub struct RegionTable {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<LoadedRegion>,
}

/// Reads the two source tables into typed, nullable rows.
pub struct Loader<'a> {
    config: &'a InputConfig,
}

impl<'a> Loader<'a> {
    pub fn new(config: &'a InputConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self), fields(path = %self.config.transactions.display()))]
    pub fn load_transactions(&self) -> Result<TransactionTable, LoadError> {
        let path = &self.config.transactions;
        let reader = self.open(TRANSACTIONS_TABLE, path)?;
        let table = self.read_transactions(reader, path)?;
        info!("Loaded {} transaction rows", table.rows.len());
        metrics::ingestion::rows_loaded(TRANSACTIONS_TABLE, table.rows.len());
        Ok(table)
    }

    #[instrument(skip(self), fields(path = %self.config.regions.display()))]
    pub fn load_regions(&self) -> Result<RegionTable, LoadError> {
        let path = &self.config.regions;
        let reader = self.open(REGIONS_TABLE, path)?;
        let table = self.read_regions(reader, path)?;
        info!("Loaded {} region rows", table.rows.len());
        metrics::ingestion::rows_loaded(REGIONS_TABLE, table.rows.len());
        Ok(table)
    }

    /// Reads transactions from any CSV reader; `source` is only used in errors.
    pub fn read_transactions<R: Read>(
        &self,
        mut reader: csv::Reader<R>,
        source: &Path,
    ) -> Result<TransactionTable, LoadError> {
        let unreadable = |e: csv::Error| LoadError::Unreadable {
            table: TRANSACTIONS_TABLE,
            path: source.to_path_buf(),
            source: e,
        };

        let headers = reader.headers().map_err(unreadable)?.clone();
        let index = HeaderIndex::new(&headers);
        let cols = &self.config.transaction_columns;

        let required = [
            cols.transaction_id.as_str(),
            cols.customer_id.as_str(),
            cols.category.as_str(),
            cols.quantity.as_str(),
            cols.unit_price.as_str(),
            cols.discount_rate.as_str(),
            cols.payment_method.as_str(),
            cols.transaction_date.as_str(),
            cols.mall.as_str(),
        ];
        index.require(TRANSACTIONS_TABLE, &required)?;

        let id_at = index.get(&cols.transaction_id);
        let customer_at = index.get(&cols.customer_id);
        let gender_at = index.get(&cols.gender);
        let age_at = index.get(&cols.age);
        let category_at = index.get(&cols.category);
        let quantity_at = index.get(&cols.quantity);
        let price_at = index.get(&cols.unit_price);
        let discount_at = index.get(&cols.discount_rate);
        let payment_at = index.get(&cols.payment_method);
        let date_at = index.get(&cols.transaction_date);
        let mall_at = index.get(&cols.mall);

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(unreadable)?;
            rows.push(LoadedTransaction {
                row: i + 1,
                transaction_id: text_cell(&record, id_at),
                customer_id: text_cell(&record, customer_at),
                gender: text_cell(&record, gender_at),
                age: integer_cell(&record, age_at),
                category: text_cell(&record, category_at),
                quantity: integer_cell(&record, quantity_at),
                unit_price: number_cell(&record, price_at),
                discount_rate: discount_cell(&record, discount_at),
                payment_method: payment_cell(&record, payment_at),
                transaction_date: date_cell(&record, date_at, &self.config.date_formats),
                mall: text_cell(&record, mall_at),
            });
        }
        debug!("Read {} transaction records from {}", rows.len(), source.display());

        Ok(TransactionTable {
            source: source.to_path_buf(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        })
    }

    pub fn read_regions<R: Read>(
        &self,
        mut reader: csv::Reader<R>,
        source: &Path,
    ) -> Result<RegionTable, LoadError> {
        let unreadable = |e: csv::Error| LoadError::Unreadable {
            table: REGIONS_TABLE,
            path: source.to_path_buf(),
            source: e,
        };

        let headers = reader.headers().map_err(unreadable)?.clone();
        let index = HeaderIndex::new(&headers);
        let cols = &self.config.region_columns;
        index.require(REGIONS_TABLE, &[cols.mall.as_str(), cols.region.as_str()])?;

        let mall_at = index.get(&cols.mall);
        let region_at = index.get(&cols.region);

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(unreadable)?;
            rows.push(LoadedRegion {
                row: i + 1,
                mall: text_cell(&record, mall_at),
                region: text_cell(&record, region_at),
            });
        }

        Ok(RegionTable {
            source: source.to_path_buf(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        })
    }

    fn open(&self, table: &'static str, path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
        if !path.exists() {
            return Err(LoadError::MissingFile {
                table,
                path: path.to_path_buf(),
            });
        }
        self.reader_builder()
            .from_path(path)
            .map_err(|e| LoadError::Unreadable {
                table,
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Ragged records are allowed; short rows surface as missing cells.
    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.config.delimiter as u8)
            .flexible(true)
            .trim(csv::Trim::All);
        builder
    }
}

/// Case-insensitive lookup from header name to column position.
struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let mut positions = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            // First occurrence wins for repeated headers
            positions.entry(normalize_header(h)).or_insert(i);
        }
        Self { positions }
    }

    fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(&normalize_header(name)).copied()
    }

    fn require(&self, table: &'static str, names: &[&str]) -> Result<(), LoadError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| self.get(n).is_none())
            .map(|n| n.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::MissingColumns {
                table,
                columns: missing,
            })
        }
    }
}

fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_lowercase()
}

fn raw<'r>(record: &'r StringRecord, at: Option<usize>) -> Option<&'r str> {
    at.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn text_cell(record: &StringRecord, at: Option<usize>) -> Cell<String> {
    match raw(record, at) {
        Some(s) => Cell::Value(s.to_string()),
        None => Cell::Missing,
    }
}

fn integer_cell(record: &StringRecord, at: Option<usize>) -> Cell<i64> {
    let Some(s) = raw(record, at) else {
        return Cell::Missing;
    };
    if let Ok(v) = s.parse::<i64>() {
        return Cell::Value(v);
    }
    // Whole numbers exported as floats ("3.0")
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
            Cell::Value(v as i64)
        }
        _ => Cell::Invalid(s.to_string()),
    }
}

fn number_cell(record: &StringRecord, at: Option<usize>) -> Cell<f64> {
    let Some(s) = raw(record, at) else {
        return Cell::Missing;
    };
    parse_finite(s).map_or_else(|| Cell::Invalid(s.to_string()), Cell::Value)
}

/// `"10%"` is read as 0.10, anything else as a plain fraction.
fn discount_cell(record: &StringRecord, at: Option<usize>) -> Cell<f64> {
    let Some(s) = raw(record, at) else {
        return Cell::Missing;
    };
    let parsed = match s.strip_suffix('%') {
        Some(pct) => parse_finite(pct.trim()).map(|p| p / 100.0),
        None => parse_finite(s),
    };
    parsed.map_or_else(|| Cell::Invalid(s.to_string()), Cell::Value)
}

fn payment_cell(record: &StringRecord, at: Option<usize>) -> Cell<PaymentMethod> {
    let Some(s) = raw(record, at) else {
        return Cell::Missing;
    };
    PaymentMethod::parse(s).map_or_else(|| Cell::Invalid(s.to_string()), Cell::Value)
}

fn date_cell(record: &StringRecord, at: Option<usize>, formats: &[String]) -> Cell<NaiveDate> {
    let Some(s) = raw(record, at) else {
        return Cell::Missing;
    };
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .map_or_else(|| Cell::Invalid(s.to_string()), Cell::Value)
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str =
        "invoice_no,customer_id,gender,age,category,quantity,price,payment_method,invoice_date,shopping_mall,Discount\n";

    fn load(csv_text: &str) -> Result<TransactionTable, LoadError> {
        let config = InputConfig::default();
        let loader = Loader::new(&config);
        let reader = loader.reader_builder().from_reader(csv_text.as_bytes());
        loader.read_transactions(reader, Path::new("inline.csv"))
    }

    #[test]
    fn test_typed_fields_are_parsed() {
        let table = load(&format!(
            "{HEADER}I1,C1,Female,28,Clothing,2,50,Credit Card,15-01-2021,M1,10%\n"
        ))
        .unwrap();

        let row = &table.rows[0];
        assert_eq!(row.row, 1);
        assert_eq!(row.transaction_id, Cell::Value("I1".to_string()));
        assert_eq!(row.age, Cell::Value(28));
        assert_eq!(row.quantity, Cell::Value(2));
        assert_eq!(row.unit_price, Cell::Value(50.0));
        assert_eq!(row.payment_method, Cell::Value(PaymentMethod::CreditCard));
        assert_eq!(
            row.transaction_date,
            Cell::Value(NaiveDate::from_ymd_opt(2021, 1, 15).unwrap())
        );
        match row.discount_rate {
            Cell::Value(d) => assert!((d - 0.1).abs() < 1e-12),
            ref other => panic!("unexpected discount {:?}", other),
        }
    }

    #[test]
    fn test_iso_dates_and_fractional_discount() {
        let table = load(&format!(
            "{HEADER}I1,C1,,,Books,1,9.5,cash,2021-03-02,M1,0.25\n"
        ))
        .unwrap();

        let row = &table.rows[0];
        assert_eq!(row.gender, Cell::Missing);
        assert_eq!(row.age, Cell::Missing);
        assert_eq!(row.discount_rate, Cell::Value(0.25));
        assert_eq!(
            row.transaction_date.value(),
            Some(&NaiveDate::from_ymd_opt(2021, 3, 2).unwrap())
        );
    }

    #[test]
    fn test_bad_values_keep_observed_text() {
        let table = load(&format!(
            "{HEADER}I1,C1,Male,x,Books,two,NaN,voucher,31-02-2021,M1,abc\n"
        ))
        .unwrap();

        let row = &table.rows[0];
        assert_eq!(row.age, Cell::Invalid("x".to_string()));
        assert_eq!(row.quantity, Cell::Invalid("two".to_string()));
        assert_eq!(row.unit_price, Cell::Invalid("NaN".to_string()));
        assert_eq!(row.payment_method, Cell::Invalid("voucher".to_string()));
        assert_eq!(row.transaction_date, Cell::Invalid("31-02-2021".to_string()));
        assert_eq!(row.discount_rate, Cell::Invalid("abc".to_string()));
    }

    #[test]
    fn test_short_rows_become_missing_cells() {
        let table = load(&format!("{HEADER}I1,C1,Male\n")).unwrap();
        assert_eq!(table.rows[0].mall, Cell::Missing);
        assert_eq!(table.rows[0].quantity, Cell::Missing);
    }

    #[test]
    fn test_missing_required_columns() {
        let err = load("invoice_no,customer_id\nI1,C1\n").unwrap_err();
        match err {
            LoadError::MissingColumns { table, columns } => {
                assert_eq!(table, TRANSACTIONS_TABLE);
                assert!(columns.contains(&"shopping_mall".to_string()));
                assert!(columns.contains(&"Discount".to_string()));
                assert!(!columns.contains(&"customer_id".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_headers_match_case_insensitively() {
        let table = load(
            "INVOICE_NO, Customer_ID ,category,quantity,price,payment_method,invoice_date,shopping_mall,discount\n\
             I1,C1,Books,1,10,cash,01-01-2021,M1,0%\n",
        )
        .unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].customer_id, Cell::Value("C1".to_string()));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let mut config = InputConfig::default();
        config.transactions = PathBuf::from("/nonexistent/transactions.csv");
        let err = Loader::new(&config).load_transactions().unwrap_err();
        assert!(matches!(err, LoadError::MissingFile { .. }));
    }

    #[test]
    fn test_load_regions_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.csv");
        fs::write(&path, "shopping_mall,Region\nM1,North\nM2,\n").unwrap();

        let mut config = InputConfig::default();
        config.regions = path;
        let table = Loader::new(&config).load_regions().unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].region, Cell::Value("North".to_string()));
        assert_eq!(table.rows[1].region, Cell::Missing);
    }
}
