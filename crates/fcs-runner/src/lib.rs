//! fcs-runner: the I/O side of a conformance run
//!
//! HTTP execution of prepared test cases, OpenAPI response validation and the
//! execution controller that ties them to the test-case lifecycle.

pub mod controller;
pub mod executor;
pub mod openapi;

pub use controller::{AbortCause, RunAborted, RunDefinition, RunOutcome, run_test_cases};
pub use executor::{
    Certificate, CertificateError, ExecutionError, HttpExecutor, ReplayExecutor, TestCaseExecutor,
};
pub use openapi::OpenApiValidator;
