// ABOUTME: Pre-compiled CSS selector and regex caches for repeated lookups.
// ABOUTME: Site specs reuse the same selectors on every page, so they are compiled once.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;

static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `None` for invalid selectors; those are cached too.
pub fn get_or_compile(css: &str) -> Option<Selector> {
    if let Ok(cache) = SELECTOR_CACHE.read() {
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Selector::parse(css).ok();
    if let Ok(mut cache) = SELECTOR_CACHE.write() {
        cache
            .entry(css.to_string())
            .or_insert_with(|| compiled.clone());
    }
    compiled
}

/// Gets or compiles a regex, caching the result.
pub fn get_or_compile_regex(pattern: &str) -> Option<Regex> {
    if let Ok(cache) = REGEX_CACHE.read() {
        if let Some(cached) = cache.get(pattern) {
            return cached.clone();
        }
    }

    let compiled = Regex::new(pattern).ok();
    if let Ok(mut cache) = REGEX_CACHE.write() {
        cache
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_selector_is_cached() {
        assert!(get_or_compile("div.listing > ul li").is_some());
        assert!(get_or_compile("div.listing > ul li").is_some());
    }

    #[test]
    fn invalid_selector_returns_none() {
        assert!(get_or_compile("[[[invalid").is_none());
        assert!(get_or_compile("[[[invalid").is_none());
    }

    #[test]
    fn regex_cache() {
        let re = get_or_compile_regex(r"lat\D+(-?\d+\.\d+)").unwrap();
        assert!(re.is_match("lat\\\":52.1"));
        assert!(get_or_compile_regex("(unclosed").is_none());
    }
}
