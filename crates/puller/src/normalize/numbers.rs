// ABOUTME: Locale-aware parsing of prices, areas and room counts from raw listing text.
// ABOUTME: Strips currency and unit suffixes, thousands separators and qualitative room labels.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::DecimalSeparator;

/// First run of digits with the separators that may appear inside a number.
static NUMERIC_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d[\d\s.,']*").unwrap());

/// Text that is only thousands groups, like `1.250` or `12.500.000`.
static DOT_GROUPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{1,3}(\.\d{3})+$").unwrap());

static ROOMS_PLUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*\+\s*(\d+)").unwrap());

static ROOMS_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*[-–]\s*(\d+)").unwrap());

const STUDIO_LABELS: &[&str] = &["studio", "stüdyo", "kawalerka", "garsoniera", "garsoniyer"];

/// Parses the first number in `text`, e.g. `"1 250,00 zł"` -> 1250.0 with a
/// comma decimal separator, or `"45 m²"` -> 45.0.
pub fn parse_number(text: &str, decimal: DecimalSeparator) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }

    // Already canonical, unless a comma locale makes "1.250" mean 1250.
    if let Ok(v) = t.parse::<f64>() {
        let ambiguous = decimal == DecimalSeparator::Comma && DOT_GROUPS.is_match(t);
        if v.is_finite() && !ambiguous {
            return Some(v);
        }
    }

    let run = NUMERIC_RUN.find(t)?.as_str();
    let compact: String = run
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();
    let compact = compact.trim_end_matches(['.', ',']);
    let canonical = match decimal {
        DecimalSeparator::Comma => compact.replace('.', "").replace(',', "."),
        DecimalSeparator::Dot => compact.replace(',', ""),
    };
    canonical.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a room count. `"3+1"` counts both parts, a range takes its lower
/// bound and studio labels count as zero rooms.
pub fn parse_rooms(text: &str, decimal: DecimalSeparator) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if STUDIO_LABELS.iter().any(|label| lower.contains(label)) {
        return Some(0.0);
    }
    if let Some(caps) = ROOMS_PLUS.captures(&lower) {
        let a: f64 = caps[1].parse().ok()?;
        let b: f64 = caps[2].parse().ok()?;
        return Some(a + b);
    }
    if let Some(caps) = ROOMS_RANGE.captures(&lower) {
        return caps[1].parse().ok();
    }
    parse_number(&lower, decimal)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMA: DecimalSeparator = DecimalSeparator::Comma;
    const DOT: DecimalSeparator = DecimalSeparator::Dot;

    #[test]
    fn polish_price_and_area() {
        assert_eq!(parse_number("1 250,00 zł", COMMA), Some(1250.0));
        assert_eq!(parse_number("45 m²", COMMA), Some(45.0));
        assert_eq!(parse_number("38,5 m²", COMMA), Some(38.5));
        assert_eq!(parse_number("2\u{a0}900 zł/miesiąc", COMMA), Some(2900.0));
        assert_eq!(parse_number("12 345 zł/m²", COMMA), Some(12345.0));
    }

    #[test]
    fn turkish_thousands_dots() {
        assert_eq!(parse_number("1.250.000 TL", COMMA), Some(1_250_000.0));
        assert_eq!(parse_number("12.500", COMMA), Some(12_500.0));
        assert_eq!(parse_number("750 TL (aylık)", COMMA), Some(750.0));
    }

    #[test]
    fn canonical_numbers_parse_to_themselves() {
        assert_eq!(parse_number("1250", COMMA), Some(1250.0));
        assert_eq!(parse_number("52.2297", COMMA), Some(52.2297));
        assert_eq!(parse_number("-0.5", DOT), Some(-0.5));
        assert_eq!(parse_number("52.229", DOT), Some(52.229));
    }

    #[test]
    fn dot_locale() {
        assert_eq!(parse_number("$1,250.50", DOT), Some(1250.5));
        assert_eq!(parse_number("Price: 3,000", DOT), Some(3000.0));
    }

    #[test]
    fn unparseable_is_none() {
        assert_eq!(parse_number("Zapytaj o cenę", COMMA), None);
        assert_eq!(parse_number("", COMMA), None);
        assert_eq!(parse_number("-", COMMA), None);
        assert_eq!(parse_number("inf", DOT), None);
    }

    #[test]
    fn rooms() {
        assert_eq!(parse_rooms("3+1", COMMA), Some(4.0));
        assert_eq!(parse_rooms("2 + 1 Oda", COMMA), Some(3.0));
        assert_eq!(parse_rooms("2-3", COMMA), Some(2.0));
        assert_eq!(parse_rooms("Stüdyo", COMMA), Some(0.0));
        assert_eq!(parse_rooms("0 (Stüdyo)", COMMA), Some(0.0));
        assert_eq!(parse_rooms("Kawalerka", COMMA), Some(0.0));
        assert_eq!(parse_rooms("4 pokoje", COMMA), Some(4.0));
        assert_eq!(parse_rooms("więcej niż 10", COMMA), Some(10.0));
        assert_eq!(parse_rooms("brak danych", COMMA), None);
    }
}
