//! Discovery documents: which endpoints a target implementation exposes

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("cannot read discovery file {0}: {1}")]
    Io(std::path::PathBuf, String),
    #[error("invalid discovery document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level wrapper, `{"discoveryModel": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    #[serde(rename = "discoveryModel")]
    pub model: DiscoveryModel,
}

impl Discovery {
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Parse`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, DiscoveryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::Io(path.to_path_buf(), e.to_string()))?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub discovery_version: String,
    #[serde(default)]
    pub token_acquisition: String,
    #[serde(default)]
    pub discovery_items: Vec<DiscoveryItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_tests: Vec<serde_json::Value>,
}

/// One API specification implemented by the target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryItem {
    pub api_specification: ApiSpecification,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub openid_configuration_uri: String,
    #[serde(default)]
    pub resource_base_uri: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpecification {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub manifest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
}
