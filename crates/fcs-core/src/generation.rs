//! Test-case generation from manifest scripts
//!
//! Scripts that target an endpoint a discovery item exposes become
//! [`TestCase`]s. Their expectations come from a named assertion library.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::ContextValue;
use crate::discovery::{ApiSpecification, Discovery, DiscoveryItem};
use crate::mapping::{
    Script, Scripts, find_unmatched_manifest_tests, map_discovery_endpoints_to_manifest_test_ids,
    scripts_for_item,
};
use crate::matching::{Match, MatchError, MatchSpec};
use crate::permissions::DefaultPermission;
use crate::testcase::{BASE_URL_KEY, ContextAccessor, Expect, Input, TestCase};
use crate::trace::{EventSink, RunEvent};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("cannot read assertion library {0}: {1}")]
    Io(std::path::PathBuf, String),
    #[error("invalid assertion library: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("script {script}: unknown assertion '{name}'")]
    UnknownAssertion { script: String, name: String },
    #[error("script {script}: {source}")]
    Match {
        script: String,
        #[source]
        source: MatchError,
    },
}

/// A named expectation fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(default)]
    pub expect: Expect,
}

/// `{"references": {name: {"expect": {...}}}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionLibrary {
    #[serde(default)]
    pub references: BTreeMap<String, Assertion>,
}

impl AssertionLibrary {
    /// # Errors
    ///
    /// Returns [`GenerationError::Parse`] on malformed JSON, including invalid
    /// match regexes.
    pub fn from_json(json: &str) -> Result<Self, GenerationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns [`GenerationError`] if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self, GenerationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GenerationError::Io(path.to_path_buf(), e.to_string()))?;
        Self::from_json(&content)
    }

    fn get(&self, script: &Script, name: &str) -> Result<&Expect, GenerationError> {
        self.references
            .get(name)
            .map(|a| &a.expect)
            .ok_or_else(|| GenerationError::UnknownAssertion {
                script: script.id.clone(),
                name: name.to_string(),
            })
    }
}

/// Generated test cases for one discovered API specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificationTestCases {
    pub specification: ApiSpecification,
    pub test_cases: Vec<TestCase>,
}

/// Generate test cases for every discovery item, one group per item.
///
/// # Errors
///
/// Fails when a script references an assertion the library does not define.
pub fn generate_test_cases(
    scripts: &Scripts,
    discovery: &Discovery,
    library: &AssertionLibrary,
    sink: &dyn EventSink,
) -> Result<Vec<SpecificationTestCases>, GenerationError> {
    let mapping = map_discovery_endpoints_to_manifest_test_ids(discovery, scripts);
    for id in find_unmatched_manifest_tests(scripts, &mapping) {
        if let Some(script) = scripts.scripts.iter().find(|s| s.id == id) {
            sink.emit(RunEvent::ScriptSkipped {
                reason: format!("no {} {} endpoint discovered", script.method, script.uri),
                id,
            });
        }
    }
    discovery
        .model
        .discovery_items
        .iter()
        .map(|item| generate_for_item(scripts, item, library, sink))
        .collect()
}

fn generate_for_item(
    scripts: &Scripts,
    item: &DiscoveryItem,
    library: &AssertionLibrary,
    sink: &dyn EventSink,
) -> Result<SpecificationTestCases, GenerationError> {
    let test_cases = scripts_for_item(item, scripts)
        .map(|script| test_case_from_script(script, item, library))
        .collect::<Result<Vec<_>, _>>()?;

    for tc in &test_cases {
        if let Ok(Some(DefaultPermission::Ambiguous(candidates))) = tc.default_permission() {
            sink.emit(RunEvent::AmbiguousPermission {
                id: tc.id.clone(),
                candidates,
            });
        }
    }

    Ok(SpecificationTestCases {
        specification: item.api_specification.clone(),
        test_cases,
    })
}

/// Build one test case from a script.
///
/// # Errors
///
/// Fails on unknown assertion names.
pub fn test_case_from_script(
    script: &Script,
    item: &DiscoveryItem,
    library: &AssertionLibrary,
) -> Result<TestCase, GenerationError> {
    let mut get_matches = Vec::new();
    let mut tc = TestCase::new(
        script.id.clone(),
        script.description.clone(),
        Input::default(),
        Expect::default(),
    );
    tc.purpose = script.detail.clone();

    for (name, value) in &script.parameters {
        match value {
            ContextValue::String(s) if s.starts_with('$') => {
                let spec = MatchSpec {
                    context_name: s.trim_start_matches('$').to_string(),
                    replace_in_endpoint: format!("{{{name}}}"),
                    ..MatchSpec::default()
                };
                let m = Match::new(spec).map_err(|source| GenerationError::Match {
                    script: script.id.clone(),
                    source,
                })?;
                get_matches.push(m);
            }
            other => tc.context.put(name.clone(), other.clone()),
        }
    }
    let base = item.resource_base_uri.trim_end_matches('/');
    if !base.is_empty() {
        tc.context.put(BASE_URL_KEY, base);
    }

    tc.input = Input {
        method: script.method.to_uppercase(),
        endpoint: script.uri.clone(),
        context_get: ContextAccessor::new(get_matches),
    };
    tc.expect = merge_asserts(script, library)?;
    Ok(tc)
}

fn merge_asserts(script: &Script, library: &AssertionLibrary) -> Result<Expect, GenerationError> {
    let mut expect = Expect {
        schema_validation: script.schema_check,
        ..Expect::default()
    };
    for name in &script.asserts {
        let fragment = library.get(script, name)?;
        if expect.status_code == 0 {
            expect.status_code = fragment.status_code;
        }
        expect.matches.extend(fragment.matches.iter().cloned());
        expect.schema_validation |= fragment.schema_validation;
    }
    for name in &script.keep_context {
        let fragment = library.get(script, name)?;
        let named = fragment
            .matches
            .iter()
            .chain(&fragment.context_put.matches)
            .filter(|m| !m.context_name().is_empty() && m.kind().is_extracting());
        for m in named {
            if !expect.context_put.matches.contains(m) {
                expect.context_put.matches.push(m.clone());
            }
        }
    }
    Ok(expect)
}
