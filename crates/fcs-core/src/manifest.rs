//! Manifest and rule model
//!
//! A manifest lists rules; each rule groups its test cases into sequences
//! that must run in declared order because later cases read context values
//! written by earlier ones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextError};
use crate::permissions::PermissionSet;
use crate::testcase::TestCase;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "@context", default, skip_serializing_if = "String::is_empty")]
    pub json_ld_context: String,
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "baseIri", default, skip_serializing_if = "String::is_empty")]
    pub base_iri: String,
    #[serde(rename = "section_contexts", default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Context>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Manifest {
    /// All test cases across rules and sequences, in run order
    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.rules.iter().flat_map(Rule::test_cases)
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MANIFEST Name: {} Description: {} Rules: {}",
            self.name,
            self.description,
            self.rules.len()
        )
    }
}

/// A location in a specification under test, with the tests that show an
/// implementation conforms to it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub specref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub speclocation: String,
    /// Test sequences; cases inside one sequence run strictly in order
    #[serde(default)]
    pub tests: Vec<Vec<TestCase>>,
}

impl Rule {
    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter().flatten()
    }

    /// Union of included and excluded permissions across the rule's test cases.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if a test case declares permissions as a non-list.
    pub fn permission_sets(&self) -> Result<(PermissionSet, PermissionSet), ContextError> {
        let mut included = PermissionSet::new("included");
        let mut excluded = PermissionSet::new("excluded");
        for tc in self.test_cases() {
            let (i, x) = tc.permissions()?;
            included.add(i);
            excluded.add(x);
        }
        Ok((included, excluded))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RULE Name: {} Purpose: {} SpecRef: {} Spec Location: {} Tests: {}",
            self.name,
            self.purpose,
            self.specref,
            self.speclocation,
            self.tests.len()
        )
    }
}
