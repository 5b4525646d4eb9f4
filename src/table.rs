//! In-memory record tables with loosely typed cells.
//!
//! Tables arrive from spreadsheets exported by different teams, so nothing here assumes a schema:
//! columns are plain strings and every cell is a [`Value`] that is coerced on demand.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Missing,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Missing, NaN, and blank text all count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Number(n) => n.is_nan(),
            Value::Text(s) => s.trim().is_empty(),
            Value::Bool(_) => false,
        }
    }

    /// String form of a present cell, `None` for missing cells.
    pub fn as_text(&self) -> Option<String> {
        if self.is_missing() {
            return None;
        }
        Some(self.to_string())
    }

    /// String form with missing cells rendered as an empty string.
    pub fn display_text(&self) -> String {
        self.as_text().unwrap_or_default()
    }

    /// Numeric coercion. Unparseable values become `None` rather than an error.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Number(_) | Value::Missing => None,
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => {
                let trimmed = s.trim();
                match trimmed.to_ascii_lowercase().as_str() {
                    "true" => Some(1.0),
                    "false" => Some(0.0),
                    _ => trimmed.parse::<f64>().ok().filter(|n| n.is_finite()),
                }
            }
        }
    }

    /// Permissive date coercion; only text cells can hold dates.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        self.as_datetime().map(|dt| dt.date())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Missing)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%d %b %Y", "%b %d, %Y", "%Y%m%d",
];

/// Parses the date layouts seen in spreadsheet exports. Returns `None` instead of failing.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parses a `YYYY-MM-DD` style bound as accepted by [`parse_datetime`].
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_datetime(raw).map(|dt| dt.date())
}

/// A calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthPeriod {
    pub year: i32,
    pub month: u32,
}

impl MonthPeriod {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The period `n` months later.
    pub fn plus(self, n: u32) -> Self {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) + n as i64;
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn next(self) -> Self {
        self.plus(1)
    }

    /// Every month from `self` through `end`, inclusive.
    pub fn range_to(self, end: MonthPeriod) -> Vec<MonthPeriod> {
        let mut out = Vec::new();
        let mut current = self;
        while current <= end {
            out.push(current);
            current = current.next();
        }
        out
    }
}

impl fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// An ordered set of rows sharing one column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Short rows are padded with missing cells, long rows truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Missing);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table from flat JSON objects; column order follows first appearance.
    pub fn from_json_records(records: &[serde_json::Value]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            if let Some(obj) = record.as_object() {
                for key in obj.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|col| record.get(col).map(json_to_value).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of the first column, used by callers that fall back to it when resolution fails.
    pub fn first_column(&self) -> Option<usize> {
        if self.columns.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    pub fn cell(&self, row: usize, column: usize) -> &Value {
        static MISSING: Value = Value::Missing;
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&MISSING)
    }

    /// All cells of one column, in row order.
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(column).unwrap_or(&Value::Missing))
    }

    /// A copy with one row per index in `indices`.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Missing,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or_default(),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_and_nan_are_missing() {
        assert!(Value::text("   ").is_missing());
        assert!(Value::Number(f64::NAN).is_missing());
        assert!(!Value::Number(0.0).is_missing());
        assert_eq!(Value::Missing.as_text(), None);
    }

    #[test]
    fn numeric_coercion_is_permissive() {
        assert_eq!(Value::text(" 3.5 ").as_number(), Some(3.5));
        assert_eq!(Value::text("high").as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert_eq!(Value::text("False").as_number(), Some(0.0));
    }

    #[test]
    fn parses_common_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(parse_date("2024-03-07"), Some(expected));
        assert_eq!(parse_date("2024-03-07 13:45:00"), Some(expected));
        assert_eq!(parse_date("03/07/2024"), Some(expected));
        assert_eq!(parse_date("2024-03-07T08:00:00Z"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn month_period_arithmetic_wraps_years() {
        let nov = MonthPeriod { year: 2023, month: 11 };
        assert_eq!(nov.plus(3), MonthPeriod { year: 2024, month: 2 });
        assert_eq!(nov.to_string(), "2023-11");
        assert_eq!(nov.range_to(MonthPeriod { year: 2024, month: 1 }).len(), 3);
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn json_records_keep_first_seen_column_order() {
        let records = vec![
            serde_json::json!({"Department": "PVC", "Severity": 3}),
            serde_json::json!({"Status": "Open", "Department": "HSE"}),
        ];
        let table = Table::from_json_records(&records);
        assert_eq!(table.columns(), ["Department", "Severity", "Status"]);
        assert_eq!(table.cell(1, 1), &Value::Missing);
        assert_eq!(table.cell(0, 1).as_number(), Some(3.0));
    }

    #[test]
    fn round_to_handles_negative_zero() {
        assert_eq!(round_to(-0.0001, 2), 0.0);
        assert_eq!(round_to(13.385714, 2), 13.39);
    }
}
