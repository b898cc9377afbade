// ABOUTME: Date normalization for listing fields, including Polish and Turkish month names.
// ABOUTME: Tries ISO, then per-site formats (filling a missing year), then dateparser as a fallback.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::adapter::select::normalize_whitespace;

/// Language of month names appearing in a site's dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthNames {
    English,
    Polish,
    Turkish,
}

// Three-letter stems cover both nominative and genitive forms
// ("marzec"/"marca", "Mart", "mayıs").
const POLISH: &[(&str, u32)] = &[
    ("sty", 1),
    ("lut", 2),
    ("mar", 3),
    ("kwi", 4),
    ("maj", 5),
    ("cze", 6),
    ("lip", 7),
    ("sie", 8),
    ("wrz", 9),
    ("paź", 10),
    ("paz", 10),
    ("lis", 11),
    ("gru", 12),
];

const TURKISH: &[(&str, u32)] = &[
    ("oca", 1),
    ("şub", 2),
    ("sub", 2),
    ("mar", 3),
    ("nis", 4),
    ("may", 5),
    ("haz", 6),
    ("tem", 7),
    ("ağu", 8),
    ("agu", 8),
    ("eyl", 9),
    ("eki", 10),
    ("kas", 11),
    ("ara", 12),
];

const ENGLISH: &[(&str, u32)] = &[
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

/// Formats tried when a site declares none.
pub const DEFAULT_FORMATS: &[&str] = &["%d.%m.%Y", "%d-%m-%Y", "%d/%m/%Y", "%d %m %Y"];

impl MonthNames {
    fn table(self) -> &'static [(&'static str, u32)] {
        match self {
            MonthNames::English => ENGLISH,
            MonthNames::Polish => POLISH,
            MonthNames::Turkish => TURKISH,
        }
    }

    /// Month number for a month word, e.g. "marca" -> 3.
    pub fn month_number(self, word: &str) -> Option<u32> {
        let lower = word.to_lowercase();
        if lower.chars().count() < 3 || !lower.chars().all(char::is_alphabetic) {
            return None;
        }
        let stem: String = lower.chars().take(3).collect();
        self.table()
            .iter()
            .find(|(prefix, _)| *prefix == stem)
            .map(|(_, n)| *n)
    }
}

/// Replaces month words with their numbers: "12 Mart 2024" -> "12 3 2024".
pub fn translate_months(text: &str, names: MonthNames) -> String {
    text.split_whitespace()
        .map(|token| {
            let word = token.trim_matches(|c: char| c == ',' || c == '.');
            match names.month_number(word) {
                Some(n) => n.to_string(),
                None => token.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_year(format: &str) -> bool {
    format.contains("%Y") || format.contains("%y")
}

/// Parses a listing date. Formats without a year take `default_year`.
pub fn parse_date(
    text: &str,
    months: Option<MonthNames>,
    formats: &[String],
    default_year: i32,
) -> Option<NaiveDate> {
    let t = normalize_whitespace(text);
    if t.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(&t, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&t) {
        return Some(dt.date_naive());
    }

    let translated = match months {
        Some(names) => translate_months(&t, names),
        None => t.clone(),
    };

    let defaults: Vec<String>;
    let formats = if formats.is_empty() {
        defaults = DEFAULT_FORMATS.iter().map(|f| f.to_string()).collect();
        &defaults
    } else {
        formats
    };
    for fmt in formats {
        if let Ok(d) = NaiveDate::parse_from_str(&translated, fmt) {
            return Some(d);
        }
        if !has_year(fmt) {
            let with_year = format!("{} {}", translated, default_year);
            if let Ok(d) = NaiveDate::parse_from_str(&with_year, &format!("{} %Y", fmt)) {
                return Some(d);
            }
        }
    }

    dateparser::parse(&t).ok().map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fmts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn month_lookup() {
        assert_eq!(MonthNames::Turkish.month_number("Mart"), Some(3));
        assert_eq!(MonthNames::Turkish.month_number("Ağustos"), Some(8));
        assert_eq!(MonthNames::Polish.month_number("marca"), Some(3));
        assert_eq!(MonthNames::Polish.month_number("maja"), Some(5));
        assert_eq!(MonthNames::Polish.month_number("października"), Some(10));
        assert_eq!(MonthNames::Polish.month_number("12"), None);
        assert_eq!(MonthNames::English.month_number("Dec"), Some(12));
    }

    #[test]
    fn turkish_long_dates() {
        let got = parse_date(
            "12 Mart 2024",
            Some(MonthNames::Turkish),
            &fmts(&["%d %m %Y"]),
            2000,
        );
        assert_eq!(got, Some(ymd(2024, 3, 12)));
    }

    #[test]
    fn missing_year_uses_default() {
        let got = parse_date(
            "5 Ekim",
            Some(MonthNames::Turkish),
            &fmts(&["%d %m %Y", "%d %m"]),
            2023,
        );
        assert_eq!(got, Some(ymd(2023, 10, 5)));
    }

    #[test]
    fn numeric_formats() {
        assert_eq!(
            parse_date("24-01-2024", None, &fmts(&["%d-%m-%Y"]), 2000),
            Some(ymd(2024, 1, 24))
        );
        assert_eq!(parse_date("01.02.2024", None, &[], 2000), Some(ymd(2024, 2, 1)));
    }

    #[test]
    fn iso_parses_to_itself() {
        assert_eq!(
            parse_date("2024-03-12", Some(MonthNames::Turkish), &fmts(&["%d %m %Y"]), 2000),
            Some(ymd(2024, 3, 12))
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date("wkrótce", Some(MonthNames::Polish), &[], 2024), None);
        assert_eq!(parse_date("   ", None, &[], 2024), None);
    }
}
