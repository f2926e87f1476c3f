//! Run configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::trace::TraceLevel;

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Discovery document (JSON)
    pub discovery: PathBuf,

    /// Manifest scripts (JSON)
    pub manifest: PathBuf,

    /// Assertion library the manifest's asserts refer to
    #[serde(default)]
    pub assertions: Option<PathBuf>,

    /// OpenAPI document used when a test case asks for schema validation
    #[serde(default)]
    pub openapi: Option<PathBuf>,

    /// Client certificates, PEM files
    #[serde(default)]
    pub certificates: Option<CertificatePaths>,

    /// Initial run context, e.g. `access_token` or `consentedAccountId`
    #[serde(default)]
    pub context: BTreeMap<String, String>,

    #[serde(default)]
    pub trace: TraceLevel,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Directory for saved reports (default: ".fcs/reports")
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Signing and transport key pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePaths {
    pub signing_public: PathBuf,
    pub signing_private: PathBuf,
    pub transport_public: PathBuf,
    pub transport_private: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery: PathBuf::from("discovery.json"),
            manifest: PathBuf::from("manifest.json"),
            assertions: None,
            openapi: None,
            certificates: None,
            context: BTreeMap::new(),
            trace: TraceLevel::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            report_dir: None,
        }
    }
}

impl Config {
    /// Load from file (TOML, or JSON by extension)
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from the first default location found in `dir`, else defaults
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default_in(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [".fcs.toml", ".fcs.json", "fcs.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load from the current directory's default location
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_default_in(Path::new("."))
    }

    /// Run context seeded from `[context]`
    #[must_use]
    pub fn run_context(&self) -> Context {
        self.context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn report_dir(&self) -> PathBuf {
        self.report_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".fcs/reports"))
    }

    /// Example config file
    #[must_use]
    pub fn example() -> &'static str {
        r#"# fcs configuration

# Discovery document describing the endpoints the target exposes
discovery = "discovery.json"

# Manifest scripts and the assertion library they reference
manifest = "manifest.json"
# assertions = "assertions.json"

# OpenAPI document for schema-validation checks (JSON or YAML)
# openapi = "account-info-openapi.yaml"

# Values available to test cases from the start of the run
[context]
# access_token = "your-token-here"
consentedAccountId = "500000000000000000000001"

# Client certificates (PEM)
# [certificates]
# signing_public = "certs/signing.pem"
# signing_private = "certs/signing.key"
# transport_public = "certs/transport.pem"
# transport_private = "certs/transport.key"

# Run events: off, info, debug (default: info)
# trace = "debug"

# HTTP timeout in seconds (default: 30)
# timeout_secs = 30

# Where reports are saved (default: ".fcs/reports")
# report_dir = ".fcs/reports"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.discovery, PathBuf::from("discovery.json"));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.trace, TraceLevel::Info);
        assert_eq!(config.report_dir(), PathBuf::from(".fcs/reports"));
    }

    #[test]
    fn parse_toml() {
        let toml = r#"
discovery = "ozone.json"
manifest = "ob_3.1_accounts.json"
openapi = "account-info.yaml"
trace = "debug"
timeout_secs = 5

[context]
access_token = "abc"

[certificates]
signing_public = "s.pem"
signing_private = "s.key"
transport_public = "t.pem"
transport_private = "t.key"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.discovery, PathBuf::from("ozone.json"));
        assert_eq!(config.openapi, Some(PathBuf::from("account-info.yaml")));
        assert_eq!(config.trace, TraceLevel::Debug);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(
            config.certificates.as_ref().map(|c| c.transport_private.clone()),
            Some(PathBuf::from("t.key"))
        );
        assert_eq!(
            config.run_context().get_str("access_token").unwrap(),
            Some("abc")
        );
    }

    #[test]
    fn example_parses() {
        let config: Config = toml::from_str(Config::example()).unwrap();
        assert_eq!(config.manifest, PathBuf::from("manifest.json"));
        assert!(config.certificates.is_none());
        assert_eq!(config.context.len(), 1);
    }

    #[test]
    fn load_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".fcs.json");
        std::fs::write(&path, r#"{"discovery": "d.json", "manifest": "m.json"}"#).unwrap();

        let config = Config::load_default_in(dir.path()).unwrap();
        assert_eq!(config.manifest, PathBuf::from("m.json"));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn load_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_default_in(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fcs.toml");
        std::fs::write(&path, "discovery = [").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
