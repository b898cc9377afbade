// ABOUTME: Declarative site definitions: selectors, pagination style, detail tables and normalizer rules.
// ABOUTME: SiteRegistry maps site names to definitions and builds adapters bound to a root URL.

//! Site definitions for the data-driven adapter.
//!
//! A [`SiteSpec`] describes everything site-specific: how index pages are
//! addressed, where listings sit in the markup, which selectors yield which
//! fields, and how the raw fields are later normalized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::adapter::compiled::{get_or_compile, get_or_compile_regex};
use crate::adapter::selector_adapter::SelectorAdapter;
use crate::adapter::Site;
use crate::config::validate_root_url;
use crate::error::ConfigError;
use crate::normalize::NormalizeSpec;

/// Specifies how to select a value from the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    /// Text of the matched element, e.g. `"h1.title"`.
    Css(String),
    /// Attribute of the matched element, e.g. `["a.link", "href"]`.
    CssAttr(Vec<String>),
    /// A value inside JSON embedded in a script element, addressed by a
    /// JSON pointer such as `/props/pageProps/ad/location`.
    Script { script: String, pointer: String },
    /// First capture group of a regex applied to the matched element's text.
    Pattern { css: String, pattern: String },
}

impl SelectorSpec {
    /// The CSS selector this spec queries.
    pub fn css(&self) -> Option<&str> {
        match self {
            SelectorSpec::Css(css) => Some(css),
            SelectorSpec::CssAttr(parts) => parts.first().map(String::as_str),
            SelectorSpec::Script { script, .. } => Some(script),
            SelectorSpec::Pattern { css, .. } => Some(css),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SelectorSpec::CssAttr(parts) if parts.len() != 2 => {
                return Err(ConfigError::InvalidSiteSpec(format!(
                    "attribute selector needs [css, attribute], got {:?}",
                    parts
                )));
            }
            SelectorSpec::Script { pointer, .. }
                if !pointer.is_empty() && !pointer.starts_with('/') =>
            {
                return Err(ConfigError::InvalidSiteSpec(format!(
                    "JSON pointer must start with '/': {}",
                    pointer
                )));
            }
            SelectorSpec::Pattern { pattern, .. } if get_or_compile_regex(pattern).is_none() => {
                return Err(ConfigError::InvalidSiteSpec(format!(
                    "invalid pattern: {}",
                    pattern
                )));
            }
            _ => {}
        }
        match self.css() {
            Some(css) => check_css(css),
            None => Err(ConfigError::InvalidSiteSpec("empty selector".to_string())),
        }
    }
}

/// Configuration for extracting a single field.
///
/// Deserializes either from the full form `{"selectors": [...]}` or from a
/// single bare selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "FieldExtractorRepr")]
pub struct FieldExtractor {
    /// Selectors to try in order; the first one yielding a value wins.
    pub selectors: Vec<SelectorSpec>,
    /// Join every match instead of keeping the first.
    pub allow_multiple: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldExtractorRepr {
    Full {
        selectors: Vec<SelectorSpec>,
        #[serde(default)]
        allow_multiple: bool,
    },
    Single(SelectorSpec),
}

impl From<FieldExtractorRepr> for FieldExtractor {
    fn from(repr: FieldExtractorRepr) -> Self {
        match repr {
            FieldExtractorRepr::Full {
                selectors,
                allow_multiple,
            } => Self {
                selectors,
                allow_multiple,
            },
            FieldExtractorRepr::Single(spec) => Self {
                selectors: vec![spec],
                allow_multiple: false,
            },
        }
    }
}

/// A label/value table on a detail page, e.g. "Powierzchnia | 45 m²".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailTable {
    /// Selector for the table rows.
    pub rows: String,
    /// Selector for the label inside a row; the row text when absent.
    #[serde(default)]
    pub label: Option<String>,
    /// Selector for the value inside a row. When absent the label text is
    /// split on `split` instead.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub split: Option<String>,
    /// Site label to field name. An empty map keeps labels as they are.
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    /// Keep labels missing from `translations` under their own name.
    #[serde(default)]
    pub keep_unknown: bool,
}

/// How an index page number is encoded in the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum PageParam {
    /// `/{slug}?{name}={n}`
    Query {
        name: String,
        #[serde(default)]
        omit_first: bool,
    },
    /// `/{slug}/{n}`
    Path {
        #[serde(default)]
        omit_first: bool,
    },
}

impl PageParam {
    /// Builds the URL fragment for a page of `slug`.
    pub fn render(&self, page_number: u32, slug: &str) -> String {
        let slug = slug.trim_matches('/');
        let base = if slug.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", slug)
        };
        match self {
            PageParam::Query { omit_first, .. } | PageParam::Path { omit_first }
                if *omit_first && page_number == 1 =>
            {
                base
            }
            PageParam::Query { name, .. } => {
                let sep = if base.contains('?') { '&' } else { '?' };
                format!("{}{}{}={}", base, sep, name, page_number)
            }
            PageParam::Path { .. } => {
                format!("{}/{}", base.trim_end_matches('/'), page_number)
            }
        }
    }
}

/// Complete definition of one source site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSpec {
    pub site: Site,
    pub root_url: String,
    pub page_param: PageParam,
    /// Element that must exist on a well-formed index page. Its absence is
    /// a parse failure; its presence with no listings is an empty page.
    #[serde(default)]
    pub container: Option<String>,
    /// Selector matching each listing on an index page.
    pub listings: String,
    #[serde(default)]
    pub listing_url: Option<SelectorSpec>,
    #[serde(default)]
    pub listing_key: Option<SelectorSpec>,
    #[serde(default)]
    pub preview: BTreeMap<String, FieldExtractor>,
    #[serde(default)]
    pub details: BTreeMap<String, FieldExtractor>,
    #[serde(default)]
    pub detail_tables: Vec<DetailTable>,
    #[serde(default)]
    pub normalize: NormalizeSpec,
}

impl SiteSpec {
    pub fn has_previews(&self) -> bool {
        !self.preview.is_empty()
    }

    pub fn has_details(&self) -> bool {
        !self.details.is_empty() || !self.detail_tables.is_empty()
    }

    /// Checks URLs, selectors and patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_root_url(&self.root_url)?;
        if let PageParam::Query { name, .. } = &self.page_param {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidSiteSpec(format!(
                    "{}: empty page parameter name",
                    self.site
                )));
            }
        }
        if let Some(css) = &self.container {
            check_css(css)?;
        }
        check_css(&self.listings)?;
        for spec in self.listing_url.iter().chain(self.listing_key.iter()) {
            spec.validate()?;
        }
        for field in self.preview.values().chain(self.details.values()) {
            for spec in &field.selectors {
                spec.validate()?;
            }
        }
        for table in &self.detail_tables {
            check_css(&table.rows)?;
            for css in table.label.iter().chain(table.value.iter()) {
                check_css(css)?;
            }
            if table.value.is_none() && table.split.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::InvalidSiteSpec(format!(
                    "{}: detail table {} needs a value selector or a split separator",
                    self.site, table.rows
                )));
            }
        }
        Ok(())
    }
}

fn check_css(css: &str) -> Result<(), ConfigError> {
    if css.trim().is_empty() || get_or_compile(css).is_none() {
        return Err(ConfigError::InvalidSiteSpec(format!(
            "invalid CSS selector: {:?}",
            css
        )));
    }
    Ok(())
}

/// Registry of site definitions keyed by site name.
#[derive(Debug, Default, Clone)]
pub struct SiteRegistry {
    map: BTreeMap<String, SiteSpec>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, replacing any previous one for the same site.
    pub fn register(&mut self, spec: SiteSpec) {
        self.map.insert(spec.site.as_str().to_string(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&SiteSpec> {
        self.map.get(Site::from(name).as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteSpec> {
        self.map.values()
    }

    /// Builds an adapter for `name`, optionally bound to a different root URL.
    pub fn adapter(
        &self,
        name: &str,
        root_url: Option<&str>,
    ) -> Result<SelectorAdapter, ConfigError> {
        let spec = self
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSite(name.to_string()))?;
        let adapter = SelectorAdapter::new(spec)?;
        match root_url {
            Some(root) => adapter.with_root_url(root),
            None => Ok(adapter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn selector_spec_untagged_forms() {
        let specs: Vec<SelectorSpec> = serde_json::from_str(
            r#"[
                "h1.title",
                ["a.link", "href"],
                {"script": "script#data", "pointer": "/a/b"},
                {"css": "script#cfg", "pattern": "lat=(\\d+)"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            specs,
            vec![
                SelectorSpec::Css("h1.title".to_string()),
                SelectorSpec::CssAttr(vec!["a.link".to_string(), "href".to_string()]),
                SelectorSpec::Script {
                    script: "script#data".to_string(),
                    pointer: "/a/b".to_string()
                },
                SelectorSpec::Pattern {
                    css: "script#cfg".to_string(),
                    pattern: "lat=(\\d+)".to_string()
                },
            ]
        );
    }

    #[test]
    fn field_extractor_shorthand() {
        let fields: BTreeMap<String, FieldExtractor> = serde_json::from_str(
            r#"{
                "title": "h1",
                "price": {"selectors": [["span[itemprop=price]", "content"], "span.price"]},
                "tags": {"selectors": ["li.tag"], "allow_multiple": true}
            }"#,
        )
        .unwrap();
        assert_eq!(fields["title"].selectors.len(), 1);
        assert_eq!(fields["price"].selectors.len(), 2);
        assert!(fields["tags"].allow_multiple);
    }

    #[test]
    fn page_param_rendering() {
        let query = PageParam::Query {
            name: "page".to_string(),
            omit_first: false,
        };
        assert_eq!(query.render(2, "pl/wyniki/wynajem"), "/pl/wyniki/wynajem?page=2");
        assert_eq!(query.render(1, "/search?city=x"), "/search?city=x&page=1");

        let omit = PageParam::Query {
            name: "PageNumber".to_string(),
            omit_first: true,
        };
        assert_eq!(omit.render(1, "mieszkanie"), "/mieszkanie");
        assert_eq!(omit.render(4, "mieszkanie"), "/mieszkanie?PageNumber=4");

        let path = PageParam::Path { omit_first: true };
        assert_eq!(path.render(1, "kiralik-daire/"), "/kiralik-daire");
        assert_eq!(path.render(3, "kiralik-daire/"), "/kiralik-daire/3");
        assert_eq!(path.render(3, ""), "/3");
    }

    #[test]
    fn validate_rejects_bad_selectors() {
        let spec: SiteSpec = serde_json::from_str(
            r#"{
                "site": "example",
                "root_url": "https://example.com",
                "page_param": {"style": "query", "name": "page"},
                "listings": "li[[",
                "listing_url": ["a", "href"]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::InvalidSiteSpec(_))
        ));
    }

    #[test]
    fn validate_rejects_table_without_value_source() {
        let spec: SiteSpec = serde_json::from_str(
            r#"{
                "site": "example",
                "root_url": "https://example.com",
                "page_param": {"style": "path"},
                "listings": "li",
                "detail_tables": [{"rows": "ul.params li", "label": "span"}]
            }"#,
        )
        .unwrap();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn registry_unknown_site() {
        let registry = SiteRegistry::new();
        assert!(registry.is_empty());
        let err = registry.adapter("nowhere", None).unwrap_err();
        assert_eq!(err, ConfigError::UnknownSite("nowhere".to_string()));
    }
}
