//! Test-case executors
//!
//! [`HttpExecutor`] sends prepared requests with reqwest. [`ReplayExecutor`]
//! hands back queued responses and is what controller tests run against.

use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use fcs_core::{CertificatePaths, Context, HttpResponse, PreparedRequest, ResponseHeaders, TestCase};

/// Context key holding the bearer token sent with every request
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Sends one prepared request on behalf of a test case
pub trait TestCaseExecutor {
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when no response could be obtained.
    fn execute(
        &mut self,
        request: &PreparedRequest,
        test_case: &TestCase,
        ctx: &Context,
    ) -> Result<HttpResponse, ExecutionError>;

    /// Install the run's signing and transport certificates
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError`] if the certificates cannot be used.
    fn set_certificates(
        &mut self,
        signing: Certificate,
        transport: Certificate,
    ) -> Result<(), CertificateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("invalid HTTP method '{0}'")]
    Method(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("no response queued for {method} {url}")]
    Exhausted { method: String, url: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("Cannot read {0}: {1}")]
    Io(std::path::PathBuf, String),
    #[error("{0} is not PEM encoded")]
    NotPem(std::path::PathBuf),
    #[error("invalid client identity: {0}")]
    Identity(String),
}

/// A PEM certificate and its private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub public_pem: Vec<u8>,
    pub private_pem: Vec<u8>,
}

impl Certificate {
    /// # Errors
    ///
    /// Returns [`CertificateError`] if either file is unreadable or not PEM.
    pub fn load(public: &Path, private: &Path) -> Result<Self, CertificateError> {
        Ok(Self {
            public_pem: read_pem(public)?,
            private_pem: read_pem(private)?,
        })
    }

    /// Signing and transport pairs from configured paths
    ///
    /// # Errors
    ///
    /// Returns the first [`CertificateError`] encountered.
    pub fn load_pair(paths: &CertificatePaths) -> Result<(Self, Self), CertificateError> {
        Ok((
            Self::load(&paths.signing_public, &paths.signing_private)?,
            Self::load(&paths.transport_public, &paths.transport_private)?,
        ))
    }

    /// Key followed by certificate, the layout reqwest expects for an identity
    fn identity_pem(&self) -> Vec<u8> {
        let mut pem = self.private_pem.clone();
        if !pem.ends_with(b"\n") {
            pem.push(b'\n');
        }
        pem.extend_from_slice(&self.public_pem);
        pem
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, CertificateError> {
    let bytes =
        std::fs::read(path).map_err(|e| CertificateError::Io(path.to_path_buf(), e.to_string()))?;
    if !String::from_utf8_lossy(&bytes).contains("-----BEGIN ") {
        return Err(CertificateError::NotPem(path.to_path_buf()));
    }
    Ok(bytes)
}

/// Blocking reqwest executor
pub struct HttpExecutor {
    client: reqwest::blocking::Client,
    timeout: Duration,
    signing: Option<Certificate>,
}

impl HttpExecutor {
    /// # Errors
    ///
    /// Returns [`ExecutionError::Http`] if the client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ExecutionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Http(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            signing: None,
        })
    }

    /// Signing certificate installed for the run, if any
    #[must_use]
    pub const fn signing(&self) -> Option<&Certificate> {
        self.signing.as_ref()
    }
}

impl TestCaseExecutor for HttpExecutor {
    fn execute(
        &mut self,
        request: &PreparedRequest,
        test_case: &TestCase,
        ctx: &Context,
    ) -> Result<HttpResponse, ExecutionError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ExecutionError::Method(request.method.clone()))?;

        let mut req = self
            .client
            .request(method, &request.url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = access_token(test_case, ctx) {
            req = req.bearer_auth(token);
        }

        let start = Instant::now();
        let resp = req.send().map_err(|e| ExecutionError::Http(e.to_string()))?;
        let status = resp.status().as_u16();
        let headers: ResponseHeaders = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = resp.bytes().map_err(|e| ExecutionError::Http(e.to_string()))?;
        let elapsed = start.elapsed();

        tracing::trace!(id = %test_case.id, status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            elapsed,
            ..HttpResponse::from_bytes(status, headers, &body)
        })
    }

    fn set_certificates(
        &mut self,
        signing: Certificate,
        transport: Certificate,
    ) -> Result<(), CertificateError> {
        let identity = reqwest::Identity::from_pem(&transport.identity_pem())
            .map_err(|e| CertificateError::Identity(e.to_string()))?;
        self.client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .use_rustls_tls()
            .identity(identity)
            .build()
            .map_err(|e| CertificateError::Identity(e.to_string()))?;
        self.signing = Some(signing);
        Ok(())
    }
}

/// Local context first, then the run context. Empty and non-string values
/// are skipped.
fn access_token<'a>(test_case: &'a TestCase, ctx: &'a Context) -> Option<&'a str> {
    [&test_case.context, ctx]
        .into_iter()
        .find_map(|c| c.get_str(ACCESS_TOKEN_KEY).ok().flatten().filter(|t| !t.is_empty()))
}

/// Executor that replays queued outcomes in order and records every request
#[derive(Debug, Default)]
pub struct ReplayExecutor {
    queue: VecDeque<Result<HttpResponse, ExecutionError>>,
    requests: Vec<PreparedRequest>,
    certificates: Option<(Certificate, Certificate)>,
}

impl ReplayExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond(mut self, response: HttpResponse) -> Self {
        self.queue.push_back(Ok(response));
        self
    }

    #[must_use]
    pub fn fail(mut self, error: ExecutionError) -> Self {
        self.queue.push_back(Err(error));
        self
    }

    /// Requests seen so far, in order
    #[must_use]
    pub fn requests(&self) -> &[PreparedRequest] {
        &self.requests
    }

    #[must_use]
    pub const fn certificates(&self) -> Option<&(Certificate, Certificate)> {
        self.certificates.as_ref()
    }
}

impl TestCaseExecutor for ReplayExecutor {
    fn execute(
        &mut self,
        request: &PreparedRequest,
        _test_case: &TestCase,
        _ctx: &Context,
    ) -> Result<HttpResponse, ExecutionError> {
        self.requests.push(request.clone());
        self.queue
            .pop_front()
            .unwrap_or_else(|| {
                Err(ExecutionError::Exhausted {
                    method: request.method.clone(),
                    url: request.url.clone(),
                })
            })
    }

    fn set_certificates(
        &mut self,
        signing: Certificate,
        transport: Certificate,
    ) -> Result<(), CertificateError> {
        self.certificates = Some((signing, transport));
        Ok(())
    }
}
