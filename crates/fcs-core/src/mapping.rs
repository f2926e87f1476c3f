//! Manifest scripts and their mapping onto discovered endpoints

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::ContextValue;
use crate::discovery::{Discovery, DiscoveryItem};

#[derive(Debug, thiserror::Error)]
pub enum ScriptsError {
    #[error("cannot read manifest file {0}: {1}")]
    Io(std::path::PathBuf, String),
    #[error("invalid manifest document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Manifest document, `{"scripts": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl Scripts {
    /// # Errors
    ///
    /// Returns [`ScriptsError::Parse`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, ScriptsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns [`ScriptsError`] if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self, ScriptsError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScriptsError::Io(path.to_path_buf(), e.to_string()))?;
        Self::from_json(&content)
    }
}

/// One manifest-declared test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "refURI", default)]
    pub ref_uri: String,
    #[serde(default)]
    pub detail: String,
    /// `$name` values read the run context, anything else is a literal
    #[serde(default)]
    pub parameters: BTreeMap<String, ContextValue>,
    pub uri: String,
    #[serde(default)]
    pub uri_implementation: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub asserts: Vec<String>,
    #[serde(default)]
    pub keep_context: Vec<String>,
    pub method: String,
    #[serde(default)]
    pub schema_check: bool,
}

impl Script {
    /// Whether the script targets `method path`, lowercasing both sides
    #[must_use]
    pub fn targets(&self, method: &str, path: &str) -> bool {
        self.method.to_lowercase() == method.to_lowercase()
            && self.uri.to_lowercase() == path.to_lowercase()
    }
}

/// Lowercased path -> uppercased method -> manifest test ids
pub type DiscoveryPathsTestIds = BTreeMap<String, BTreeMap<String, Vec<String>>>;

fn map_item(item: &DiscoveryItem, scripts: &Scripts, mapping: &mut DiscoveryPathsTestIds) {
    for endpoint in &item.endpoints {
        let ids: Vec<&str> = scripts
            .scripts
            .iter()
            .filter(|s| s.targets(&endpoint.method, &endpoint.path))
            .map(|s| s.id.as_str())
            .collect();
        if ids.is_empty() {
            continue;
        }
        let entry = mapping
            .entry(endpoint.path.to_lowercase())
            .or_default()
            .entry(endpoint.method.to_uppercase())
            .or_default();
        for id in ids {
            if !entry.iter().any(|existing| existing == id) {
                entry.push(id.to_string());
            }
        }
    }
}

/// Map every discovered `(path, method)` to the manifest tests that target it.
///
/// Paths compare case-insensitively as literal templates; placeholders are
/// opaque. Endpoints no test targets are left out. Ids keep manifest order.
#[must_use]
pub fn map_discovery_endpoints_to_manifest_test_ids(
    discovery: &Discovery,
    scripts: &Scripts,
) -> DiscoveryPathsTestIds {
    let mut mapping = DiscoveryPathsTestIds::new();
    for item in &discovery.model.discovery_items {
        map_item(item, scripts, &mut mapping);
    }
    mapping
}

/// Manifest test ids that matched no discovered endpoint, in manifest order,
/// each reported once
#[must_use]
pub fn find_unmatched_manifest_tests(
    scripts: &Scripts,
    mapping: &DiscoveryPathsTestIds,
) -> Vec<String> {
    let mapped: HashSet<&str> = mapping
        .values()
        .flat_map(BTreeMap::values)
        .flatten()
        .map(String::as_str)
        .collect();
    let mut seen = HashSet::new();
    scripts
        .scripts
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| !mapped.contains(id) && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Scripts that target at least one endpoint of `item`, in manifest order
pub fn scripts_for_item<'a>(
    item: &'a DiscoveryItem,
    scripts: &'a Scripts,
) -> impl Iterator<Item = &'a Script> {
    scripts.scripts.iter().filter(move |s| {
        item.endpoints
            .iter()
            .any(|e| s.targets(&e.method, &e.path))
    })
}
