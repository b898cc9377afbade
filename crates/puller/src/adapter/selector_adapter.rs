// ABOUTME: SiteAdapter implementation driven entirely by a declarative SiteSpec.
// ABOUTME: Every built-in site is an instance of this adapter bound to its own definition.

use tracing::{debug, warn};

use crate::adapter::select::{element_text, extract_field, extract_values, select_all, select_first};
use crate::adapter::spec::{DetailTable, SiteSpec};
use crate::adapter::{
    resolve_listing_url, AdapterResult, Fields, ListingHandle, Site, SiteAdapter,
};
use crate::config::validate_root_url;
use crate::document::Document;
use crate::error::{AdapterError, ConfigError};

/// Adapter for one site, built from its [`SiteSpec`].
#[derive(Debug, Clone)]
pub struct SelectorAdapter {
    spec: SiteSpec,
}

impl SelectorAdapter {
    /// Validates the definition and binds the adapter to its root URL.
    pub fn new(spec: SiteSpec) -> Result<Self, ConfigError> {
        spec.validate()?;
        Ok(Self { spec })
    }

    /// Rebinds the adapter to another root URL, e.g. a mirror or test server.
    pub fn with_root_url(mut self, root_url: &str) -> Result<Self, ConfigError> {
        validate_root_url(root_url)?;
        self.spec.root_url = root_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn spec(&self) -> &SiteSpec {
        &self.spec
    }

    fn read_table(&self, doc: &Document, table: &DetailTable, fields: &mut Fields) {
        for row in select_all(doc.html().root_element(), &table.rows) {
            let label_text = match &table.label {
                Some(css) => select_first(row, css).map(element_text),
                None => Some(element_text(row)),
            };
            let Some(label_text) = label_text else {
                continue;
            };

            let (label, value) = match (&table.value, &table.split) {
                (Some(css), _) => (
                    label_text,
                    select_first(row, css).map(element_text).unwrap_or_default(),
                ),
                (None, Some(sep)) => match label_text.split_once(sep.as_str()) {
                    Some((l, v)) => (l.to_string(), v.trim().to_string()),
                    None => (label_text, String::new()),
                },
                (None, None) => continue,
            };
            let label = label.trim().trim_end_matches(':').trim();
            if label.is_empty() {
                continue;
            }

            let key = match table.translations.get(label) {
                Some(key) => key.clone(),
                None if table.keep_unknown || table.translations.is_empty() => label.to_string(),
                None => {
                    debug!(site = %self.spec.site, label, "unrecognised listing detail");
                    continue;
                }
            };
            if value.is_empty() {
                continue;
            }
            fields.entry(key).or_insert(value);
        }
    }
}

impl SiteAdapter for SelectorAdapter {
    fn site(&self) -> Site {
        self.spec.site.clone()
    }

    fn root_url(&self) -> &str {
        &self.spec.root_url
    }

    fn page_param(&self, page_number: u32, listing_page_slug: &str) -> String {
        self.spec.page_param.render(page_number, listing_page_slug)
    }

    fn get_listings_list(&self, doc: &Document) -> Result<AdapterResult, AdapterError> {
        let root = doc.html().root_element();
        if let Some(container) = &self.spec.container {
            if select_first(root, container).is_none() {
                return Err(AdapterError::parse(format!(
                    "{}: listings container {:?} not found at {}",
                    self.spec.site,
                    container,
                    doc.url()
                )));
            }
        }

        let handles: Vec<ListingHandle> = select_all(root, &self.spec.listings)
            .into_iter()
            .enumerate()
            .map(|(i, el)| ListingHandle::new(i, el.html()))
            .collect();
        if handles.is_empty() {
            Ok(AdapterResult::Empty)
        } else {
            Ok(AdapterResult::Listings(handles))
        }
    }

    fn get_listing_url(&self, handle: &ListingHandle) -> Option<String> {
        let spec = self.spec.listing_url.as_ref()?;
        let fragment = handle.fragment();
        let href = extract_values(fragment.root_element(), spec)
            .into_iter()
            .next()?;
        let resolved = resolve_listing_url(&self.spec.root_url, &href);
        if resolved.is_none() {
            warn!(site = %self.spec.site, href = %href, "listing link rejected");
        }
        resolved
    }

    fn get_listing_preview_data(
        &self,
        handle: &ListingHandle,
    ) -> Result<AdapterResult, AdapterError> {
        if !self.spec.has_previews() {
            return Ok(AdapterResult::NotFound);
        }
        let fragment = handle.fragment();
        let root = fragment.root_element();
        let fields: Fields = self
            .spec
            .preview
            .iter()
            .filter_map(|(name, fe)| extract_field(root, fe).map(|v| (name.clone(), v)))
            .collect();
        Ok(AdapterResult::Fields(fields))
    }

    fn get_listing_details(&self, doc: &Document) -> Result<AdapterResult, AdapterError> {
        if !self.spec.has_details() {
            return Ok(AdapterResult::NotFound);
        }
        let root = doc.html().root_element();
        let mut fields: Fields = self
            .spec
            .details
            .iter()
            .filter_map(|(name, fe)| extract_field(root, fe).map(|v| (name.clone(), v)))
            .collect();
        for table in &self.spec.detail_tables {
            self.read_table(doc, table, &mut fields);
        }
        if fields.is_empty() {
            return Err(AdapterError::parse(format!(
                "{}: no detail fields found at {}",
                self.spec.site,
                doc.url()
            )));
        }
        Ok(AdapterResult::Fields(fields))
    }

    fn listing_key(&self, handle: &ListingHandle) -> Option<String> {
        let spec = self.spec.listing_key.as_ref()?;
        let fragment = handle.fragment();
        extract_values(fragment.root_element(), spec)
            .into_iter()
            .next()
    }

    fn supports_previews(&self) -> bool {
        self.spec.has_previews()
    }

    fn supports_details(&self) -> bool {
        self.spec.has_details()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> SiteSpec {
        serde_json::from_str(
            r#"{
                "site": "example",
                "root_url": "https://homes.example.com",
                "page_param": {"style": "query", "name": "page"},
                "container": "ul.results",
                "listings": "ul.results > li.offer",
                "listing_url": ["a.offer-link", "href"],
                "listing_key": ["li.offer", "data-id"],
                "preview": {
                    "title": "h2",
                    "price": "span.price"
                },
                "details": {
                    "title": "h1",
                    "latitude": ["div#map", "data-lat"]
                },
                "detail_tables": [
                    {
                        "rows": "ul.params > li",
                        "label": "span.name",
                        "value": "span.value",
                        "translations": {"Powierzchnia": "area", "Liczba pokoi": "rooms"}
                    },
                    {
                        "rows": "ul.extra > li",
                        "split": ":",
                        "keep_unknown": true
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    const INDEX: &str = r#"<html><body><ul class="results">
        <li class="offer" data-id="a1"><a class="offer-link" href="/oferta/a1">x</a><h2>Flat A</h2><span class="price">1 000 zł</span></li>
        <li class="offer" data-id="b2"><a class="offer-link" href="https://elsewhere.example.org/b2">x</a><h2>Flat B</h2></li>
        </ul></body></html>"#;

    #[test]
    fn lists_and_previews() {
        let adapter = SelectorAdapter::new(spec()).unwrap();
        let doc = Document::from_html("https://homes.example.com/?page=1", INDEX);
        let AdapterResult::Listings(handles) = adapter.get_listings_list(&doc).unwrap() else {
            panic!("expected listings");
        };
        assert_eq!(handles.len(), 2);

        assert_eq!(
            adapter.get_listing_url(&handles[0]).as_deref(),
            Some("https://homes.example.com/oferta/a1")
        );
        assert_eq!(adapter.get_listing_url(&handles[1]), None);
        assert_eq!(adapter.listing_key(&handles[1]).as_deref(), Some("b2"));

        let preview = adapter
            .get_listing_preview_data(&handles[0])
            .unwrap()
            .into_fields();
        assert_eq!(preview.get("title").map(String::as_str), Some("Flat A"));
        assert_eq!(preview.get("price").map(String::as_str), Some("1 000 zł"));

        let preview_b = adapter
            .get_listing_preview_data(&handles[1])
            .unwrap()
            .into_fields();
        assert!(!preview_b.contains_key("price"));
    }

    #[test]
    fn empty_container_and_missing_container() {
        let adapter = SelectorAdapter::new(spec()).unwrap();
        let empty = Document::from_html("https://homes.example.com/", r#"<ul class="results"></ul>"#);
        assert_eq!(adapter.get_listings_list(&empty).unwrap(), AdapterResult::Empty);

        let broken = Document::from_html("https://homes.example.com/", "<div>maintenance</div>");
        assert!(matches!(
            adapter.get_listings_list(&broken),
            Err(AdapterError::ParseFailure(_))
        ));
    }

    #[test]
    fn details_with_tables() {
        let adapter = SelectorAdapter::new(spec()).unwrap();
        let doc = Document::from_html(
            "https://homes.example.com/oferta/a1",
            r#"<h1>Flat A, Mokotów</h1><div id="map" data-lat="52.19"></div>
               <ul class="params">
                 <li><span class="name">Powierzchnia:</span><span class="value">45 m²</span></li>
                 <li><span class="name">Liczba pokoi</span><span class="value">2</span></li>
                 <li><span class="name">Winda</span><span class="value">tak</span></li>
               </ul>
               <ul class="extra"><li>Umeblowane: Tak</li><li>Prywatne</li></ul>"#,
        );
        let fields = adapter.get_listing_details(&doc).unwrap().into_fields();
        let got: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            got,
            vec![
                ("Umeblowane", "Tak"),
                ("area", "45 m²"),
                ("latitude", "52.19"),
                ("rooms", "2"),
                ("title", "Flat A, Mokotów"),
            ]
        );
    }

    #[test]
    fn details_parse_failure_when_nothing_matches() {
        let adapter = SelectorAdapter::new(spec()).unwrap();
        let doc = Document::from_html("https://homes.example.com/oferta/zz", "<p>removed</p>");
        assert!(matches!(
            adapter.get_listing_details(&doc),
            Err(AdapterError::ParseFailure(_))
        ));
    }

    #[test]
    fn rebinding_root_url() {
        let adapter = SelectorAdapter::new(spec())
            .unwrap()
            .with_root_url("http://127.0.0.1:8080/")
            .unwrap();
        assert_eq!(adapter.root_url(), "http://127.0.0.1:8080");
        assert_eq!(
            adapter.index_url(2, "mieszkania"),
            "http://127.0.0.1:8080/mieszkania?page=2"
        );
        assert!(SelectorAdapter::new(spec())
            .unwrap()
            .with_root_url("not a url")
            .is_err());
    }
}
