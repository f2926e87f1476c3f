//! Execution controller
//!
//! Drives every test case of every specification through prepare, execute
//! and validate, in declared order, against one shared run context.
//!
//! Failure policy:
//! - a prepare error aborts the run
//! - an executor error fails the test case and the run continues
//! - a validate error aborts the run
//!
//! Ordinary check failures are failing results, never aborts.

use fcs_core::discovery::ApiSpecification;
use fcs_core::report::Metrics;
use fcs_core::{
    Context, EventSink, Manifest, PrepareError, Report, ResponseValidator, RunEvent, SpecificationTestCases,
    TestCase, TestResult, ValidateError, Verdict,
};

use crate::executor::{Certificate, CertificateError, TestCaseExecutor};

/// Everything one run needs
#[derive(Debug, Clone, Default)]
pub struct RunDefinition {
    pub specifications: Vec<SpecificationTestCases>,
    /// Signing and transport certificates, installed once before the first request
    pub certificates: Option<(Certificate, Certificate)>,
    /// Initial run context
    pub context: Context,
}

impl RunDefinition {
    #[must_use]
    pub fn new(specifications: Vec<SpecificationTestCases>, context: Context) -> Self {
        Self {
            specifications,
            certificates: None,
            context,
        }
    }

    /// Every rule's test sequences of `manifest`, in order, as one specification
    #[must_use]
    pub fn from_manifest(manifest: &Manifest, context: Context) -> Self {
        let specification = SpecificationTestCases {
            specification: ApiSpecification {
                name: manifest.name.clone(),
                ..ApiSpecification::default()
            },
            test_cases: manifest.test_cases().cloned().collect(),
        };
        Self::new(vec![specification], context)
    }

    #[must_use]
    pub fn with_certificates(mut self, signing: Certificate, transport: Certificate) -> Self {
        self.certificates = Some((signing, transport));
        self
    }

    fn test_case_count(&self) -> usize {
        self.specifications.iter().map(|s| s.test_cases.len()).sum()
    }
}

/// Cause of a fatal abort
#[derive(Debug, thiserror::Error)]
pub enum AbortCause {
    #[error(transparent)]
    Certificates(#[from] CertificateError),
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    #[error(transparent)]
    Validate(#[from] ValidateError),
}

/// A run stopped early. `report` holds every test case attempted so far,
/// including the one that caused the abort.
#[derive(Debug, thiserror::Error)]
#[error("run aborted: {cause}")]
pub struct RunAborted {
    pub report: Report,
    #[source]
    pub cause: AbortCause,
}

/// Finished run: the report and the context as the last test case left it
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub context: Context,
}

/// Run every test case in `defn`.
///
/// # Errors
///
/// Returns [`RunAborted`] on a certificate, prepare or validate error.
pub fn run_test_cases(
    defn: RunDefinition,
    executor: &mut dyn TestCaseExecutor,
    validator: &dyn ResponseValidator,
    sink: &dyn EventSink,
) -> Result<RunOutcome, Box<RunAborted>> {
    let mut report = Report::new();

    sink.emit(RunEvent::RunStarted {
        specifications: defn.specifications.len(),
        test_cases: defn.test_case_count(),
    });

    if let Some((signing, transport)) = defn.certificates {
        if let Err(e) = executor.set_certificates(signing, transport) {
            sink.emit(RunEvent::RunAborted {
                id: String::new(),
                reason: e.to_string(),
            });
            return Err(Box::new(RunAborted {
                report,
                cause: e.into(),
            }));
        }
    }

    let mut ctx = defn.context;
    for spec in defn.specifications {
        sink.emit(RunEvent::SpecificationStarted {
            name: spec.specification.name.clone(),
        });
        report.begin_specification(&spec.specification.name, &spec.specification.version);

        for mut tc in spec.test_cases {
            if let Err(cause) = run_one(&mut tc, &mut ctx, executor, validator, sink, &mut report) {
                sink.emit(RunEvent::RunAborted {
                    id: tc.id.clone(),
                    reason: cause.to_string(),
                });
                return Err(Box::new(RunAborted { report, cause }));
            }
        }
    }

    sink.emit(RunEvent::RunFinished {
        passed: report.passed(),
        failed: report.failed(),
    });
    Ok(RunOutcome {
        report,
        context: ctx,
    })
}

/// One test case. Every outcome, including the fatal ones, is recorded
/// before returning.
fn run_one(
    tc: &mut TestCase,
    ctx: &mut Context,
    executor: &mut dyn TestCaseExecutor,
    validator: &dyn ResponseValidator,
    sink: &dyn EventSink,
    report: &mut Report,
) -> Result<(), AbortCause> {
    let request = match tc.prepare(ctx) {
        Ok(request) => request,
        Err(e) => {
            report.record(TestResult::fail(tc, e.to_string()));
            return Err(e.into());
        }
    };
    sink.emit(RunEvent::TestPrepared {
        id: tc.id.clone(),
        method: request.method.clone(),
        url: request.url.clone(),
    });

    let response = match executor.execute(&request, tc, ctx) {
        Ok(response) => response,
        Err(e) => {
            let reason = e.to_string();
            report.record(TestResult::fail(tc, &reason));
            sink.emit(RunEvent::TestFailed {
                id: tc.id.clone(),
                reason,
            });
            return Ok(());
        }
    };
    sink.emit(RunEvent::TestExecuted {
        id: tc.id.clone(),
        status: response.status,
        elapsed: response.elapsed,
    });
    let metrics = Metrics::new(response.elapsed, response.body_length);

    match tc.validate(response, ctx, validator) {
        Ok(Verdict::Pass) => {
            report.record(TestResult::pass(tc).with_metrics(metrics));
            sink.emit(RunEvent::TestPassed { id: tc.id.clone() });
            Ok(())
        }
        Ok(Verdict::Fail { reason }) => {
            report.record(TestResult::fail(tc, &reason).with_metrics(metrics));
            sink.emit(RunEvent::TestFailed {
                id: tc.id.clone(),
                reason,
            });
            Ok(())
        }
        Err(e) => {
            report.record(TestResult::fail(tc, e.to_string()).with_metrics(metrics));
            Err(e.into())
        }
    }
}
