//! fcs-core: test-case evaluation engine for API conformance runs
//!
//! This crate holds the pure logic of a run: the shared context, match rules,
//! the test-case lifecycle, permission resolution, manifest/discovery mapping,
//! test-case generation and the report model. Network I/O lives in
//! `fcs-runner`.

pub mod config;
pub mod context;
pub mod discovery;
pub mod generation;
pub mod http;
pub mod manifest;
pub mod mapping;
pub mod matching;
pub mod permissions;
pub mod report;
pub mod schema;
pub mod testcase;
pub mod trace;

pub use config::{CertificatePaths, Config, ConfigError};
pub use context::{Context, ContextError, ContextValue};
pub use discovery::{Discovery, DiscoveryError, DiscoveryItem};
pub use generation::{AssertionLibrary, GenerationError, SpecificationTestCases, generate_test_cases};
pub use http::{CapturedResponse, HttpResponse, PreparedRequest, ResponseHeaders};
pub use manifest::{Manifest, Rule};
pub use mapping::{
    DiscoveryPathsTestIds, Script, Scripts, ScriptsError, find_unmatched_manifest_tests,
    map_discovery_endpoints_to_manifest_test_ids,
};
pub use matching::{ContextPutError, Match, MatchError, MatchFailure, MatchKind, MatchSpec};
pub use permissions::{DefaultPermission, PermissionSet, RequiredToken, TestCasePermission};
pub use report::{Metrics, Report, RunVerdict, Summary, TestResult, VerdictStatus};
pub use schema::{NullValidator, ResponseValidator, SchemaError, SchemaFailure, SchemaInput};
pub use testcase::{Expect, Input, PrepareError, TestCase, ValidateError, Verdict};
pub use trace::{EventSink, NullSink, RunEvent, TraceLevel, TracingSink};
