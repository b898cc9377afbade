// ABOUTME: Loader for site definitions from the embedded catalogue or user-supplied JSON files.
// ABOUTME: Provides load_builtin_sites() to initialize the default SiteRegistry.

//! Site registry loader.
//!
//! The built-in catalogue covers otodom, olx and domiporta (Poland) and
//! zingat, hepsiemlak and emlakjet (Turkey). Extra sites, or replacements
//! for built-in ones, can be read from a JSON file holding an array of
//! [`SiteSpec`] objects.

use std::path::Path;

use tracing::debug;

use crate::adapter::spec::{SiteRegistry, SiteSpec};
use crate::error::ConfigError;

/// Embedded JSON containing the built-in site definitions.
const BUILTIN_SITES_JSON: &str = include_str!("../../data/sites.json");

/// Parses and validates a JSON array of site definitions.
pub fn parse_sites(json: &str) -> Result<Vec<SiteSpec>, ConfigError> {
    let specs: Vec<SiteSpec> =
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidSiteSpec(e.to_string()))?;
    for spec in &specs {
        spec.validate()?;
    }
    Ok(specs)
}

/// Loads the built-in site registry from embedded JSON.
pub fn load_builtin_sites() -> Result<SiteRegistry, ConfigError> {
    let mut registry = SiteRegistry::new();
    for spec in parse_sites(BUILTIN_SITES_JSON)? {
        registry.register(spec);
    }
    Ok(registry)
}

/// Reads site definitions from a file and registers them, replacing
/// built-in definitions with the same name.
pub fn extend_from_file(registry: &mut SiteRegistry, path: &Path) -> Result<usize, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::InvalidSiteSpec(format!("reading {}: {}", path.display(), e))
    })?;
    let specs = parse_sites(&json)?;
    let count = specs.len();
    for spec in specs {
        debug!(site = %spec.site, path = %path.display(), "registered site definition");
        registry.register(spec);
    }
    Ok(count)
}
