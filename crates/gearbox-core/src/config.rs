//! Loading of YAML/JSON configuration documents.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Parse a configuration document. `.json` files are parsed as JSON, anything
/// else as YAML (which also accepts JSON).
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))?;
    parse_document(&content, path)
}

pub fn parse_document<T: DeserializeOwned>(content: &str, path: &Path) -> Result<T> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(content)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    } else {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    }
}
