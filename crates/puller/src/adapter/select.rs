// ABOUTME: Selector-based value extraction over parsed HTML for the data-driven adapter.
// ABOUTME: Handles CSS text, attributes, JSON inside script elements and regex captures.

//! Selector-based field extraction utilities.
//!
//! Key behaviors:
//! - Selectors are tried in order; the first selector yielding a non-empty
//!   value wins.
//! - Text extraction joins inner text and normalizes whitespace.
//! - Attribute extraction returns the attribute value trimmed.
//! - `allow_multiple` joins every match of the winning selector with ", ".

use scraper::ElementRef;
use serde_json::Value;

use crate::adapter::compiled::{get_or_compile, get_or_compile_regex};
use crate::adapter::spec::{FieldExtractor, SelectorSpec};

/// Collapses runs of whitespace (including non-breaking spaces) into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-normalized text content of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// All descendants of `scope` matching `css`. Invalid selectors match nothing.
pub fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match get_or_compile(css) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

pub fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    get_or_compile(css).and_then(|sel| scope.select(&sel).next())
}

/// Extracts a field using its selectors in order.
pub fn extract_field(scope: ElementRef<'_>, fe: &FieldExtractor) -> Option<String> {
    for spec in &fe.selectors {
        let values = extract_values(scope, spec);
        if values.is_empty() {
            continue;
        }
        if fe.allow_multiple {
            return Some(values.join(", "));
        }
        return values.into_iter().next();
    }
    None
}

/// All non-empty values a single selector spec yields under `scope`.
pub fn extract_values(scope: ElementRef<'_>, spec: &SelectorSpec) -> Vec<String> {
    match spec {
        SelectorSpec::Css(css) => select_all(scope, css)
            .into_iter()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect(),
        SelectorSpec::CssAttr(parts) => {
            let (Some(css), Some(attr)) = (parts.first(), parts.get(1)) else {
                return Vec::new();
            };
            select_all(scope, css)
                .into_iter()
                .filter_map(|el| el.value().attr(attr))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        }
        SelectorSpec::Script { script, pointer } => select_all(scope, script)
            .into_iter()
            .filter_map(|el| {
                let raw: String = el.text().collect();
                let json: Value = serde_json::from_str(raw.trim()).ok()?;
                json.pointer(pointer).and_then(json_scalar)
            })
            .collect(),
        SelectorSpec::Pattern { css, pattern } => {
            let Some(re) = get_or_compile_regex(pattern) else {
                return Vec::new();
            };
            select_all(scope, css)
                .into_iter()
                .filter_map(|el| {
                    let text = element_text(el);
                    let caps = re.captures(&text)?;
                    let m = caps.get(1).or_else(|| caps.get(0))?;
                    let value = m.as_str().trim().to_string();
                    (!value.is_empty()).then_some(value)
                })
                .collect()
        }
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
