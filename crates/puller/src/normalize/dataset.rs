// ABOUTME: Tabular dataset of typed cells used by the normalizer, with CSV reading and writing.
// ABOUTME: Raw puller output reads back as text cells; the normalizer turns them into numbers and dates.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDate;

use crate::error::SinkError;

/// One cell of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Value {
    /// Null or blank text.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Value::Null
        } else {
            Value::Text(s.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// A table with named columns. Every row has one cell per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
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

    /// Appends a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Index of `name`, appending it as an all-null column when missing.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        self.columns.len() - 1
    }

    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            if idx < row.len() {
                row.remove(idx);
            }
        }
        true
    }

    /// Renames a column, replacing any existing column called `to`.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if from == to || self.column_index(from).is_none() {
            return false;
        }
        self.drop_column(to);
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
        true
    }

    /// Removes columns in which every cell is empty.
    pub fn drop_empty_columns(&mut self) {
        let keep: Vec<bool> = (0..self.columns.len())
            .map(|idx| {
                self.rows
                    .iter()
                    .any(|row| row.get(idx).is_some_and(|v| !v.is_empty()))
            })
            .collect();
        let mut it = keep.iter();
        self.columns.retain(|_| *it.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut it = keep.iter();
            row.retain(|_| *it.next().unwrap_or(&true));
        }
    }

    /// Reads a CSV with a header row. Blank cells become nulls, everything
    /// else text.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, SinkError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut data = Dataset::new(columns);
        for record in rdr.records() {
            let record = record?;
            data.push_row(record.iter().map(Value::from).collect());
        }
        Ok(data)
    }

    pub fn from_path(path: &Path) -> Result<Self, SinkError> {
        let file = std::fs::File::open(path)?;
        Self::read_csv(std::io::BufReader::new(file))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), SinkError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_path(&self, path: &Path) -> Result<(), SinkError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn csv_round_trip_keeps_cells() {
        let raw = "listing_id,price,area\n/a,\"1 250,00 zł\",45 m²\n/b,,\n";
        let data = Dataset::read_csv(raw.as_bytes()).unwrap();
        assert_eq!(data.columns, vec!["listing_id", "price", "area"]);
        assert_eq!(data.get(0, "price"), Some(&Value::Text("1 250,00 zł".into())));
        assert_eq!(data.get(1, "price"), Some(&Value::Null));

        let mut out = Vec::new();
        data.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), raw);
    }

    #[test]
    fn short_rows_are_padded() {
        let data = Dataset::read_csv("a,b,c\n1\n".as_bytes()).unwrap();
        assert_eq!(data.rows[0], vec![Value::Text("1".into()), Value::Null, Value::Null]);
    }

    #[test]
    fn column_operations() {
        let mut data = Dataset::new(vec!["a".into(), "b".into()]);
        data.push_row(vec![Value::Number(1.0), Value::Null]);
        assert_eq!(data.ensure_column("c"), 2);
        assert_eq!(data.ensure_column("a"), 0);
        assert!(data.rename_column("a", "c"));
        assert_eq!(data.columns, vec!["c", "b"]);
        data.drop_empty_columns();
        assert_eq!(data.columns, vec!["c"]);
        assert_eq!(data.rows[0], vec![Value::Number(1.0)]);
    }

    #[test]
    fn display_formats() {
        assert_eq!(Value::Number(1250.0).to_string(), "1250");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()).to_string(),
            "2024-03-05"
        );
        assert_eq!(Value::Null.to_string(), "");
    }
}
