// ABOUTME: Per-site normalizer turning raw extracted strings into typed, cleaned columns.
// ABOUTME: Pure and idempotent: typed cells pass through, so process(process(x)) == process(x).

//! Normalization of raw listing datasets.
//!
//! [`Normalizer::process`] applies a site's [`NormalizeSpec`] in a fixed
//! order: column splits, typed column rules, ratio columns, drops, renames
//! and finally removal of all-empty columns. A cell that cannot be parsed
//! becomes null; the pass itself never fails.

pub mod dataset;
pub mod dates;
pub mod numbers;

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use dataset::{Dataset, Value};
pub use dates::MonthNames;

/// Character separating the integer and fractional parts of numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecimalSeparator {
    Comma,
    #[default]
    Dot,
}

/// How a column's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Price,
    Area,
    Rooms,
    Number,
    Date,
}

/// Converts `column`, writing the result to `target` (in place when absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub column: String,
    pub kind: ColumnKind,
    #[serde(default)]
    pub target: Option<String>,
    /// Overrides the site-wide separator, e.g. for coordinates.
    #[serde(default)]
    pub decimal_separator: Option<DecimalSeparator>,
}

/// `target = numerator / denominator` for numeric cells, e.g. price per m².
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioRule {
    pub numerator: String,
    pub denominator: String,
    pub target: String,
}

/// Splits a text column into parts, e.g. "Kadıköy, Moda" into two location columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    pub column: String,
    pub separator: String,
    pub targets: Vec<String>,
}

/// Normalization rules for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NormalizeSpec {
    pub decimal_separator: DecimalSeparator,
    pub month_names: Option<MonthNames>,
    pub date_formats: Vec<String>,
    pub splits: Vec<SplitRule>,
    pub columns: Vec<ColumnRule>,
    pub ratios: Vec<RatioRule>,
    pub drop: Vec<String>,
    pub rename: BTreeMap<String, String>,
    pub drop_empty_columns: bool,
}

/// Column holding the ingestion timestamp, used to fill missing years.
const FETCHED_AT: &str = "fetched_at";

/// Applies a [`NormalizeSpec`] to datasets.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    spec: NormalizeSpec,
}

impl Normalizer {
    pub fn new(spec: NormalizeSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &NormalizeSpec {
        &self.spec
    }

    /// Normalizes a dataset. Pure: the input is consumed and a new dataset returned.
    pub fn process(&self, mut data: Dataset) -> Dataset {
        for split in &self.spec.splits {
            apply_split(&mut data, split);
        }

        let years = row_years(&data);
        for rule in &self.spec.columns {
            self.apply_rule(&mut data, rule, &years);
        }

        for ratio in &self.spec.ratios {
            apply_ratio(&mut data, ratio);
        }
        for column in &self.spec.drop {
            data.drop_column(column);
        }
        for (from, to) in &self.spec.rename {
            data.rename_column(from, to);
        }
        if self.spec.drop_empty_columns {
            data.drop_empty_columns();
        }
        data
    }

    fn apply_rule(&self, data: &mut Dataset, rule: &ColumnRule, years: &[i32]) {
        let Some(src) = data.column_index(&rule.column) else {
            debug!(column = %rule.column, "column not present, skipping rule");
            return;
        };
        let target = rule.target.as_deref().unwrap_or(&rule.column);
        let dst = data.ensure_column(target);
        let decimal = rule.decimal_separator.unwrap_or(self.spec.decimal_separator);

        for (i, row) in data.rows.iter_mut().enumerate() {
            let raw = row.get(src).cloned().unwrap_or(Value::Null);
            let year = years.get(i).copied().unwrap_or_else(|| Utc::now().year());
            let value = self.convert(&rule.column, raw, rule.kind, decimal, year);
            if let Some(cell) = row.get_mut(dst) {
                *cell = value;
            }
        }
    }

    fn convert(
        &self,
        column: &str,
        raw: Value,
        kind: ColumnKind,
        decimal: DecimalSeparator,
        year: i32,
    ) -> Value {
        let text = match raw {
            Value::Text(ref s) if !s.trim().is_empty() => s.as_str(),
            Value::Text(_) | Value::Null => return Value::Null,
            typed => return typed,
        };
        let parsed = match kind {
            ColumnKind::Price | ColumnKind::Area | ColumnKind::Number => {
                numbers::parse_number(text, decimal).map(Value::Number)
            }
            ColumnKind::Rooms => numbers::parse_rooms(text, decimal).map(Value::Number),
            ColumnKind::Date => dates::parse_date(
                text,
                self.spec.month_names,
                &self.spec.date_formats,
                year,
            )
            .map(Value::Date),
        };
        parsed.unwrap_or_else(|| {
            warn!(column, value = text, kind = ?kind, "could not normalize field");
            Value::Null
        })
    }
}

/// Year of each row's `fetched_at`, or the current year.
fn row_years(data: &Dataset) -> Vec<i32> {
    let now = Utc::now().year();
    let Some(idx) = data.column_index(FETCHED_AT) else {
        return vec![now; data.len()];
    };
    data.rows
        .iter()
        .map(|row| match row.get(idx) {
            Some(Value::Date(d)) => d.year(),
            Some(Value::Text(s)) => chrono::DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.year())
                .unwrap_or(now),
            _ => now,
        })
        .collect()
}

fn apply_split(data: &mut Dataset, split: &SplitRule) {
    let Some(src) = data.column_index(&split.column) else {
        return;
    };
    let targets: Vec<usize> = split
        .targets
        .iter()
        .map(|t| data.ensure_column(t))
        .collect();
    for row in &mut data.rows {
        let text = match row.get(src) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v.to_string()),
        };
        let parts: Vec<String> = match text {
            Some(t) => t
                .split(split.separator.as_str())
                .map(|p| p.trim().trim_matches(',').trim().to_string())
                .collect(),
            None => Vec::new(),
        };
        for (i, &dst) in targets.iter().enumerate() {
            let value = match parts.get(i) {
                Some(p) if !p.is_empty() => Value::Text(p.clone()),
                _ => Value::Null,
            };
            if let Some(cell) = row.get_mut(dst) {
                *cell = value;
            }
        }
    }
}

fn apply_ratio(data: &mut Dataset, ratio: &RatioRule) {
    let (Some(num), Some(den)) = (
        data.column_index(&ratio.numerator),
        data.column_index(&ratio.denominator),
    ) else {
        return;
    };
    let dst = data.ensure_column(&ratio.target);
    for row in &mut data.rows {
        let value = match (
            row.get(num).and_then(Value::as_number),
            row.get(den).and_then(Value::as_number),
        ) {
            (Some(a), Some(b)) if b != 0.0 => Value::Number(a / b),
            _ => Value::Null,
        };
        if let Some(cell) = row.get_mut(dst) {
            *cell = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn polish_spec() -> NormalizeSpec {
        serde_json::from_str(
            r#"{
                "decimal_separator": "comma",
                "columns": [
                    {"column": "price", "kind": "price", "target": "price_num"},
                    {"column": "area", "kind": "area", "target": "area_num"},
                    {"column": "rooms", "kind": "rooms"}
                ],
                "ratios": [{"numerator": "price_num", "denominator": "area_num", "target": "price_per_m2"}],
                "rename": {"price": "base_price"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn price_and_area_scenario() {
        let mut data = Dataset::new(vec!["price".into(), "area".into(), "rooms".into()]);
        data.push_row(vec![text("1 250,00 zł"), text("45 m²"), text("2 pokoje")]);
        data.push_row(vec![text("Zapytaj o cenę"), Value::Null, text("?")]);

        let out = Normalizer::new(polish_spec()).process(data);
        assert_eq!(
            out.columns,
            vec!["base_price", "area", "rooms", "price_num", "area_num", "price_per_m2"]
        );
        assert_eq!(out.get(0, "price_num"), Some(&Value::Number(1250.0)));
        assert_eq!(out.get(0, "area_num"), Some(&Value::Number(45.0)));
        assert_eq!(out.get(0, "rooms"), Some(&Value::Number(2.0)));
        assert_eq!(out.get(0, "base_price"), Some(&text("1 250,00 zł")));
        assert_eq!(out.get(1, "price_num"), Some(&Value::Null));
        assert_eq!(out.get(1, "rooms"), Some(&Value::Null));
        assert_eq!(out.get(1, "price_per_m2"), Some(&Value::Null));

        let Some(Value::Number(ppm)) = out.get(0, "price_per_m2") else {
            panic!("price per m2 missing");
        };
        assert!((ppm - 1250.0 / 45.0).abs() < 1e-9);
    }

    #[test]
    fn process_is_idempotent() {
        let spec: NormalizeSpec = serde_json::from_str(
            r#"{
                "decimal_separator": "comma",
                "month_names": "turkish",
                "date_formats": ["%d %m %Y", "%d %m"],
                "splits": [{"column": "Location", "separator": ",", "targets": ["Location 1", "Location 2"]}],
                "columns": [
                    {"column": "Price", "kind": "price", "target": "Price (num)"},
                    {"column": "Date", "kind": "date"},
                    {"column": "Latitude", "kind": "number", "decimal_separator": "dot"}
                ],
                "drop": ["Description"],
                "drop_empty_columns": true
            }"#,
        )
        .unwrap();
        let normalizer = Normalizer::new(spec);

        let mut data = Dataset::new(
            ["Price", "Date", "Location", "Latitude", "Description", "Fees", "fetched_at"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        data.push_row(vec![
            text("1.250.000 TL"),
            text("5 Ekim"),
            text("İstanbul, Kadıköy"),
            text("40.987"),
            text("Deniz manzaralı"),
            Value::Null,
            text("2023-11-02T10:00:00+00:00"),
        ]);

        let once = normalizer.process(data);
        assert_eq!(once.get(0, "Price (num)"), Some(&Value::Number(1_250_000.0)));
        assert_eq!(
            once.get(0, "Date"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2023, 10, 5).unwrap()))
        );
        assert_eq!(once.get(0, "Location 2"), Some(&text("Kadıköy")));
        assert_eq!(once.get(0, "Latitude"), Some(&Value::Number(40.987)));
        assert_eq!(once.column_index("Description"), None);
        assert_eq!(once.column_index("Fees"), None);

        let twice = normalizer.process(once.clone());
        assert_eq!(twice, once);
    }

    #[test]
    fn missing_columns_are_skipped() {
        let mut data = Dataset::new(vec!["title".into()]);
        data.push_row(vec![text("Flat")]);
        let out = Normalizer::new(polish_spec()).process(data.clone());
        assert_eq!(out, data);
    }
}
