//! Reads the four record tables from CSV or JSON exports.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::DatasetPaths;
use crate::error::{HseError, Result};
use crate::table::{Table, Value};

/// Typed view of one raw CSV field: blanks are missing, numbers and booleans are typed.
pub fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Missing;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(raw.to_string()),
    }
}

pub fn read_csv<R: Read>(reader: R, path: &Path) -> Result<Table> {
    let csv_err = |source| HseError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(parse_cell).collect());
    }
    Ok(Table::new(columns, rows))
}

pub fn read_json(contents: &str, path: &Path) -> Result<Table> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(contents).map_err(|source| HseError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Table::from_json_records(&records))
}

/// Loads a table, choosing the format from the file extension (`.json`, otherwise CSV).
pub fn load_table(path: &Path) -> Result<Table> {
    let io_err = |source| HseError::Io {
        path: path.to_path_buf(),
        source,
    };
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let table = if is_json {
        read_json(&fs::read_to_string(path).map_err(io_err)?, path)?
    } else {
        read_csv(fs::File::open(path).map_err(io_err)?, path)?
    };
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "loaded table"
    );
    Ok(table)
}

/// The four logical tables. Unconfigured ones are empty.
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    pub incident: Table,
    pub hazard: Table,
    pub audit: Table,
    pub inspection: Table,
}

impl Datasets {
    pub fn load(paths: &DatasetPaths) -> Result<Self> {
        let load = |path: &Option<PathBuf>| match path {
            Some(p) => load_table(p),
            None => Ok(Table::empty()),
        };
        Ok(Self {
            incident: load(&paths.incident)?,
            hazard: load(&paths.hazard)?,
            audit: load(&paths.audit)?,
            inspection: load(&paths.inspection)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_typed() {
        assert_eq!(parse_cell(""), Value::Missing);
        assert_eq!(parse_cell("  "), Value::Missing);
        assert_eq!(parse_cell("3"), Value::Number(3.0));
        assert_eq!(parse_cell("TRUE"), Value::Bool(true));
        assert_eq!(parse_cell("2024-01-05"), Value::text("2024-01-05"));
        assert_eq!(parse_cell("NaN"), Value::text("NaN"));
    }

    #[test]
    fn loads_csv_with_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidents.csv");
        fs::write(
            &path,
            "\u{feff}Incident Number,Department,severity_score\nI-1,Ops,3\nI-2,Lab\n",
        )
        .unwrap();
        let table = load_table(&path).unwrap();
        assert_eq!(table.columns()[0], "Incident Number");
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 2), &Value::Number(3.0));
        assert_eq!(table.cell(1, 2), &Value::Missing);
    }

    #[test]
    fn loads_json_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hazards.JSON");
        fs::write(&path, r#"[{"risk_score": 4, "location": "Yard"}, {"location": null}]"#).unwrap();
        let table = load_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        let location = table.column_index("location").unwrap();
        let risk = table.column_index("risk_score").unwrap();
        assert_eq!(table.cell(0, risk), &Value::Number(4.0));
        assert_eq!(table.cell(1, location), &Value::Missing);
    }

    #[test]
    fn reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_table(&dir.path().join("absent.csv")),
            Err(HseError::Io { .. })
        ));
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert!(matches!(load_table(&bad), Err(HseError::Json { .. })));
    }

    #[test]
    fn unconfigured_datasets_are_empty() {
        let sets = Datasets::load(&DatasetPaths::default()).unwrap();
        assert!(sets.incident.is_empty());
        assert!(sets.inspection.is_empty());
    }
}
