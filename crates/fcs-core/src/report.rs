//! Run report, verdict and exit code

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::testcase::TestCase;

/// Response measurements for one test case
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metrics {
    /// Milliseconds, fractional
    pub response_time_ms: f64,
    /// Body size in bytes
    pub response_size: usize,
}

impl Metrics {
    #[must_use]
    pub fn new(elapsed: Duration, response_size: usize) -> Self {
        Self {
            response_time_ms: elapsed.as_secs_f64() * 1000.0,
            response_size,
        }
    }
}

/// Outcome of one attempted test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestResult {
    pub id: String,
    pub name: String,
    /// `METHOD endpoint`
    pub endpoint: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl TestResult {
    #[must_use]
    pub fn pass(tc: &TestCase) -> Self {
        Self {
            id: tc.id.clone(),
            name: tc.name.clone(),
            endpoint: tc.endpoint_label(),
            pass: true,
            fail_reason: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn fail(tc: &TestCase, reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            fail_reason: Some(reason.into()),
            ..Self::pass(tc)
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Results for one API specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpecificationReport {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub tests: Vec<TestResult>,
}

/// Results of a run, grouped by specification in run order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub specifications: Vec<SpecificationReport>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_specification(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.specifications.push(SpecificationReport {
            name: name.into(),
            version: version.into(),
            tests: Vec::new(),
        });
    }

    /// Append to the current specification, opening an unnamed one if needed
    pub fn record(&mut self, result: TestResult) {
        if self.specifications.is_empty() {
            self.specifications.push(SpecificationReport::default());
        }
        if let Some(spec) = self.specifications.last_mut() {
            spec.tests.push(result);
        }
    }

    /// Every result in run order
    pub fn tests(&self) -> impl Iterator<Item = &TestResult> {
        self.specifications.iter().flat_map(|s| s.tests.iter())
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.tests().filter(|t| t.pass).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.tests().filter(|t| !t.pass).count()
    }

    /// Final verdict. `aborted` carries the fatal error of an aborted run.
    #[must_use]
    pub fn verdict(&self, aborted: Option<&str>) -> RunVerdict {
        let passed = self.passed();
        let failed = self.failed();
        let total = passed + failed;

        let (status, exit_code, reason) = if let Some(cause) = aborted {
            (VerdictStatus::Fail, 3, format!("Run aborted: {cause}"))
        } else if total == 0 {
            (VerdictStatus::Fail, 1, "No test cases were run".to_string())
        } else if failed == 0 {
            (VerdictStatus::Pass, 0, "All test cases passed".to_string())
        } else {
            (
                VerdictStatus::Fail,
                1,
                format!("{failed} of {total} test cases failed"),
            )
        };
        RunVerdict {
            status,
            exit_code,
            reason,
        }
    }

    #[must_use]
    pub fn summary(&self, aborted: Option<&str>) -> Summary {
        Summary {
            verdict: self.verdict(aborted),
            total: self.passed() + self.failed(),
            passed: self.passed(),
            failed: self.failed(),
            aborted: aborted.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunVerdict {
    pub status: VerdictStatus,
    pub exit_code: i32,
    pub reason: String,
}

/// Counts and verdict, stored next to the full report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub verdict: RunVerdict,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

/// JSON schema of [`Report`]
///
/// # Errors
///
/// Returns the serialization error if the schema cannot be rendered.
pub fn generate_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(Report);
    serde_json::to_string_pretty(&schema)
}
