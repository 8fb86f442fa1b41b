use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

use crate::error::{ComputationError, PipelineError};

/// Cell type of a whole column, recorded with every exported table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Number,
    Date,
    Text,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Number => "number",
            ColumnKind::Date => "date",
            ColumnKind::Text => "text",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed cell of a result table. Nulls mark undefined ratios and missing regions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    /// Text form used in exported files.
    pub fn render(&self, decimal_places: usize) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => format!("{:.*}", decimal_places, n),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ColumnKind::Integer),
            Value::Number(_) => Some(ColumnKind::Number),
            Value::Date(_) => Some(ColumnKind::Date),
            Value::Text(_) => Some(ColumnKind::Text),
        }
    }

    /// Read an exported cell back as `kind`. Empty text is null; `None` means the text
    /// does not fit the kind.
    pub fn parse(raw: &str, kind: ColumnKind) -> Option<Self> {
        if raw.is_empty() {
            return Some(Value::Null);
        }
        match kind {
            ColumnKind::Integer => raw.parse().ok().map(Value::Integer),
            ColumnKind::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::Number),
            ColumnKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(Value::Date),
            ColumnKind::Text => Some(Value::Text(raw.to_string())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::Number)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map_or(Value::Null, Value::Text)
    }
}

impl From<Option<&str>> for Value {
    fn from(v: Option<&str>) -> Self {
        v.map_or(Value::Null, |s| Value::Text(s.to_string()))
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map_or(Value::Null, Value::Integer)
    }
}

/// A row type that knows its column layout.
pub trait Tabular {
    const COLUMNS: &'static [&'static str];

    /// One cell per entry of `COLUMNS`, in the same order.
    fn cells(&self) -> Vec<Value>;
}

/// A named, immutable grouped result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn from_rows<T, I>(name: &str, rows: I) -> Self
    where
        T: Tabular,
        I: IntoIterator<Item = T>,
    {
        Self {
            name: name.to_string(),
            columns: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: rows.into_iter().map(|r| r.cells()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// All cells of one column, top to bottom.
    pub fn column(&self, column: &str) -> Vec<&Value> {
        match self.column_index(column) {
            Some(i) => self.rows.iter().filter_map(|r| r.get(i)).collect(),
            None => Vec::new(),
        }
    }

    /// Sum of the numeric cells of a column; nulls count as zero.
    pub fn column_sum(&self, column: &str) -> f64 {
        self.column(column).iter().filter_map(|v| v.as_f64()).sum()
    }

    /// First non-finite number, if any.
    pub fn check_finite(&self) -> Result<(), ComputationError> {
        for (r, row) in self.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let Value::Number(n) = cell {
                    if !n.is_finite() {
                        return Err(ComputationError {
                            table: self.name.clone(),
                            row: r,
                            column: self.columns.get(c).cloned().unwrap_or_default(),
                            value: *n,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_csv<W: Write>(&self, writer: W, decimal_places: usize) -> csv::Result<()> {
        let mut wtr = csv::WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|v| v.render(decimal_places)))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self, decimal_places: usize) -> csv::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, decimal_places)?;
        Ok(buf)
    }

    /// Kind of each column, taken from its first non-null cell. All-null columns and
    /// columns holding more than one kind are text.
    pub fn column_kinds(&self) -> Vec<ColumnKind> {
        (0..self.columns.len())
            .map(|c| {
                let mut kinds = self.rows.iter().filter_map(|r| r.get(c).and_then(Value::kind));
                match kinds.next() {
                    Some(first) if kinds.all(|k| k == first) => first,
                    _ => ColumnKind::Text,
                }
            })
            .collect()
    }

    /// Read an exported table back, typing every cell by its column's recorded kind.
    pub fn read_csv<R: Read>(
        name: &str,
        reader: R,
        kinds: &[ColumnKind],
    ) -> Result<Self, PipelineError> {
        let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        if columns.len() != kinds.len() {
            return Err(PipelineError::Export(format!(
                "{} has {} columns but {} recorded kinds",
                name,
                columns.len(),
                kinds.len()
            )));
        }

        let mut rows = Vec::new();
        for (r, record) in rdr.records().enumerate() {
            let record = record?;
            let mut row = Vec::with_capacity(kinds.len());
            for (c, (raw, kind)) in record.iter().zip(kinds).enumerate() {
                let value = Value::parse(raw, *kind).ok_or_else(|| {
                    PipelineError::Export(format!(
                        "{} row {} column '{}': '{}' is not a valid {}",
                        name, r, columns[c], raw, kind
                    ))
                })?;
                row.push(value);
            }
            rows.push(row);
        }
        Ok(Self {
            name: name.to_string(),
            columns,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        key: &'static str,
        amount: Option<f64>,
    }

    impl Tabular for Pair {
        const COLUMNS: &'static [&'static str] = &["key", "amount"];

        fn cells(&self) -> Vec<Value> {
            vec![self.key.into(), self.amount.into()]
        }
    }

    #[test]
    fn test_csv_rendering_uses_fixed_decimals_and_empty_nulls() {
        let table = ResultTable::from_rows(
            "pairs",
            vec![
                Pair { key: "a", amount: Some(1.0 / 3.0) },
                Pair { key: "b", amount: None },
            ],
        );
        let text = String::from_utf8(table.to_csv_bytes(2).unwrap()).unwrap();
        assert_eq!(text, "key,amount\na,0.33\nb,\n");
    }

    #[test]
    fn test_read_back_uses_recorded_kinds() {
        use ColumnKind::*;
        let table = ResultTable::read_csv(
            "t",
            "date,mall,n,x,region\n2021-01-15,0042,3,90.50,\n".as_bytes(),
            &[Date, Text, Integer, Number, Text],
        )
        .unwrap();

        assert_eq!(
            table.rows[0],
            vec![
                Value::Date(NaiveDate::from_ymd_opt(2021, 1, 15).unwrap()),
                Value::Text("0042".to_string()),
                Value::Integer(3),
                Value::Number(90.5),
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_numeric_looking_text_stays_text() {
        let table = ResultTable::read_csv(
            "t",
            "category,customer\nNaN,007\ninf,1e3\n".as_bytes(),
            &[ColumnKind::Text, ColumnKind::Text],
        )
        .unwrap();
        assert_eq!(table.rows[0], vec![Value::from("NaN"), Value::from("007")]);
        assert_eq!(table.rows[1], vec![Value::from("inf"), Value::from("1e3")]);
    }

    #[test]
    fn test_non_finite_number_is_rejected_on_read() {
        let err = ResultTable::read_csv("t", "x\nNaN\n".as_bytes(), &[ColumnKind::Number])
            .unwrap_err();
        assert!(err.to_string().contains("not a valid number"));
    }

    #[test]
    fn test_column_kinds_skip_nulls() {
        let table = ResultTable::from_rows(
            "pairs",
            vec![
                Pair { key: "a", amount: None },
                Pair { key: "b", amount: Some(2.0) },
            ],
        );
        assert_eq!(table.column_kinds(), vec![ColumnKind::Text, ColumnKind::Number]);

        let empty = ResultTable::from_rows("pairs", vec![Pair { key: "a", amount: None }]);
        assert_eq!(empty.column_kinds()[1], ColumnKind::Text);
    }

    #[test]
    fn test_check_finite_reports_location() {
        let table = ResultTable::from_rows(
            "pairs",
            vec![
                Pair { key: "a", amount: Some(1.0) },
                Pair { key: "b", amount: Some(f64::NAN) },
            ],
        );
        let err = table.check_finite().unwrap_err();
        assert_eq!(err.table, "pairs");
        assert_eq!(err.row, 1);
        assert_eq!(err.column, "amount");
    }

    #[test]
    fn test_json_shape() {
        let table = ResultTable::from_rows("pairs", vec![Pair { key: "a", amount: None }]);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["columns"], serde_json::json!(["key", "amount"]));
        assert_eq!(json["rows"][0], serde_json::json!(["a", null]));
    }
}
