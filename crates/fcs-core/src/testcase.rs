//! Test case lifecycle: Prepare -> (execute externally) -> Validate
//!
//! A test case owns its declarative `Input` and `Expect`, a local context
//! (base url, permissions, script parameters) and, once run, the built
//! request and the captured response. Each attempt uses a fresh value;
//! stages only move forward.

use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextError};
use crate::http::{CapturedResponse, HttpResponse, PreparedRequest};
use crate::matching::{ContextPutError, Match};
use crate::permissions::{self, DefaultPermission};
use crate::schema::{ResponseValidator, SchemaError, SchemaInput};

/// Local context key holding the base url prepended to the endpoint
pub const BASE_URL_KEY: &str = "baseurl";
/// Local context key listing permissions the access token must include
pub const PERMISSIONS_KEY: &str = "permissions";
/// Local context key listing permissions the access token must not include
pub const PERMISSIONS_EXCLUDED_KEY: &str = "permissions_excluded";

/// The only method this engine prepares requests for
const SUPPORTED_METHOD: &str = "GET";

/// Matches used to read from or write to a context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAccessor {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Match>,
}

impl ContextAccessor {
    #[must_use]
    pub fn new(matches: Vec<Match>) -> Self {
        Self { matches }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Substitute context values into `endpoint`.
    ///
    /// Each match naming a context variable and a `replaceInEndpoint`
    /// placeholder replaces the first occurrence of the placeholder with the
    /// value. Missing variables, empty values and absent placeholders leave the
    /// endpoint untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if a named variable is a list.
    pub fn get_values(&self, endpoint: &mut String, ctx: &Context) -> Result<(), ContextError> {
        for m in &self.matches {
            let spec = m.spec();
            if spec.context_name.is_empty() || spec.replace_in_endpoint.is_empty() {
                continue;
            }
            let Some(value) = ctx.get_scalar(&spec.context_name)? else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            *endpoint = endpoint.replacen(&spec.replace_in_endpoint, &value, 1);
        }
        Ok(())
    }

    /// Run every match's extraction into `ctx`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failing rule's context name and cause.
    pub fn put_values(
        &self,
        response: &CapturedResponse,
        ctx: &mut Context,
    ) -> Result<(), ContextWriteError> {
        for m in &self.matches {
            m.put_value(response, ctx)
                .map_err(|source| ContextWriteError {
                    name: m.context_name().to_string(),
                    rule: m.to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("context put failed for '{name}' [{rule}]: {source}")]
pub struct ContextWriteError {
    pub name: String,
    pub rule: String,
    #[source]
    pub source: ContextPutError,
}

/// Request side of a test case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub method: String,
    /// Endpoint template, may contain `{placeholder}` segments
    #[serde(default)]
    pub endpoint: String,
    #[serde(rename = "contextGet", default, skip_serializing_if = "ContextAccessor::is_empty")]
    pub context_get: ContextAccessor,
}

/// Expected response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expect {
    /// Expected HTTP status; 0 leaves the status unchecked
    #[serde(rename = "status-code", default)]
    pub status_code: u16,
    #[serde(rename = "schema-validation", default)]
    pub schema_validation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Match>,
    #[serde(rename = "contextPut", default, skip_serializing_if = "ContextAccessor::is_empty")]
    pub context_put: ContextAccessor,
}

/// Lifecycle position of a test case
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    New,
    Prepared,
    Validated,
}

/// Outcome of a completed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail { reason: String },
}

impl Verdict {
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("test case {id}: already prepared")]
    AlreadyPrepared { id: String },
    #[error("test case {id}: input empty (method and endpoint are required)")]
    EmptyInput { id: String },
    #[error("test case {id}: method {method} not supported, only GET")]
    MethodNotSupported { id: String, method: String },
    #[error("test case {id}: invalid base url '{base}'")]
    BaseUrl { id: String, base: String },
    #[error("test case {id}: {source}")]
    Context {
        id: String,
        #[source]
        source: ContextError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("test case {id}: validated before it was prepared")]
    NotPrepared { id: String },
    #[error("test case {id}: already validated")]
    AlreadyValidated { id: String },
    #[error("test case {id}: schema validation could not run: {source}")]
    Schema {
        id: String,
        #[source]
        source: SchemaError,
    },
    #[error("test case {id}: {source}")]
    ContextPut {
        id: String,
        #[source]
        source: ContextWriteError,
    },
}

/// A single conformance test against one endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@type", default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purpose: String,
    #[serde(default)]
    pub input: Input,
    /// Request-local context, distinct from the run context
    #[serde(default, skip_serializing_if = "Context::is_empty")]
    pub context: Context,
    #[serde(default)]
    pub expect: Expect,
    #[serde(skip)]
    stage: Stage,
    #[serde(skip)]
    request: Option<PreparedRequest>,
    #[serde(skip)]
    response: Option<CapturedResponse>,
}

impl TestCase {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Input, expect: Expect) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            expect,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Request built by [`TestCase::prepare`]
    #[must_use]
    pub const fn request(&self) -> Option<&PreparedRequest> {
        self.request.as_ref()
    }

    /// Response captured by [`TestCase::validate`]
    #[must_use]
    pub const fn response(&self) -> Option<&CapturedResponse> {
        self.response.as_ref()
    }

    /// `METHOD endpoint` label used in reports
    #[must_use]
    pub fn endpoint_label(&self) -> String {
        format!("{} {}", self.input.method, self.input.endpoint)
    }

    /// Build the outbound request.
    ///
    /// Applies `contextGet` substitutions from the run context, checks the
    /// input, then prefixes the local `baseurl` when one is set.
    ///
    /// # Errors
    ///
    /// Fails on non-GET methods, empty input, a second prepare, or context
    /// values of the wrong shape.
    pub fn prepare(&mut self, run_ctx: &Context) -> Result<PreparedRequest, PrepareError> {
        if self.stage != Stage::New {
            return Err(PrepareError::AlreadyPrepared {
                id: self.id.clone(),
            });
        }
        let method = self.input.method.to_ascii_uppercase();
        if !method.is_empty() && method != SUPPORTED_METHOD {
            return Err(PrepareError::MethodNotSupported {
                id: self.id.clone(),
                method: self.input.method.clone(),
            });
        }

        self.input
            .context_get
            .get_values(&mut self.input.endpoint, run_ctx)
            .map_err(|source| PrepareError::Context {
                id: self.id.clone(),
                source,
            })?;

        if method.is_empty() || self.input.endpoint.is_empty() {
            return Err(PrepareError::EmptyInput {
                id: self.id.clone(),
            });
        }

        let url = self.apply_base_url()?;
        let request = PreparedRequest { method, url };
        self.request = Some(request.clone());
        self.stage = Stage::Prepared;
        Ok(request)
    }

    fn apply_base_url(&self) -> Result<String, PrepareError> {
        let base = self
            .context
            .get_str(BASE_URL_KEY)
            .map_err(|source| PrepareError::Context {
                id: self.id.clone(),
                source,
            })?;
        match base {
            None => Ok(self.input.endpoint.clone()),
            Some(base) if base.starts_with("http://") || base.starts_with("https://") => {
                Ok(format!("{base}{}", self.input.endpoint))
            }
            Some(base) => Err(PrepareError::BaseUrl {
                id: self.id.clone(),
                base: base.to_string(),
            }),
        }
    }

    /// Judge the response.
    ///
    /// Checks run in order: status code, each `Expect` match (the first
    /// failure short-circuits), then schema validation when enabled. Only when
    /// every check passed are the `contextPut` matches written to `run_ctx`.
    ///
    /// # Errors
    ///
    /// Errors mean the response could not be judged (validator failure,
    /// context write failure), as opposed to a failing [`Verdict`].
    pub fn validate(
        &mut self,
        response: HttpResponse,
        run_ctx: &mut Context,
        validator: &dyn ResponseValidator,
    ) -> Result<Verdict, ValidateError> {
        match self.stage {
            Stage::Prepared => {}
            Stage::New => {
                return Err(ValidateError::NotPrepared {
                    id: self.id.clone(),
                });
            }
            Stage::Validated => {
                return Err(ValidateError::AlreadyValidated {
                    id: self.id.clone(),
                });
            }
        }
        self.stage = Stage::Validated;
        let captured = CapturedResponse::from(response);
        let verdict = self.apply_expects(&captured, run_ctx, validator);
        self.response = Some(captured);
        verdict
    }

    fn apply_expects(
        &self,
        captured: &CapturedResponse,
        run_ctx: &mut Context,
        validator: &dyn ResponseValidator,
    ) -> Result<Verdict, ValidateError> {
        let expect = &self.expect;
        if expect.status_code != 0 && expect.status_code != captured.status {
            return Ok(Verdict::fail(format!(
                "({}):{}: HTTP Status code does not match: expected {} got {}",
                self.id, self.name, expect.status_code, captured.status
            )));
        }

        for m in &expect.matches {
            if let Err(failure) = m.check(captured) {
                return Ok(Verdict::fail(failure.to_string()));
            }
        }

        if expect.schema_validation {
            let input = SchemaInput {
                method: &self.input.method,
                path: &self.input.endpoint,
                status: captured.status,
                headers: &captured.headers,
                body: &captured.body,
            };
            let failures = validator
                .validate(&input)
                .map_err(|source| ValidateError::Schema {
                    id: self.id.clone(),
                    source,
                })?;
            if !failures.is_empty() {
                let messages: Vec<&str> = failures.iter().map(|f| f.message.as_str()).collect();
                return Ok(Verdict::fail(format!(
                    "schema validation failed: {}",
                    messages.join("; ")
                )));
            }
        }

        expect
            .context_put
            .put_values(captured, run_ctx)
            .map_err(|source| ValidateError::ContextPut {
                id: self.id.clone(),
                source,
            })?;
        Ok(Verdict::Pass)
    }

    /// Permissions the access token for this test case must include.
    ///
    /// An explicit `permissions` list in the local context is used verbatim.
    /// With neither `permissions` nor `permissions_excluded` declared, the
    /// endpoint's default permission applies; ambiguous defaults yield none.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if a permissions key is not a list.
    pub fn included_permissions(&self) -> Result<Vec<String>, ContextError> {
        if let Some(perms) = self.context.get_list(PERMISSIONS_KEY)? {
            return Ok(perms.to_vec());
        }
        match self.default_permission()? {
            Some(DefaultPermission::Assigned(p)) => Ok(vec![p]),
            _ => Ok(Vec::new()),
        }
    }

    /// Permissions the access token for this test case must not include.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if `permissions_excluded` is not a list.
    pub fn excluded_permissions(&self) -> Result<Vec<String>, ContextError> {
        Ok(self
            .context
            .get_list(PERMISSIONS_EXCLUDED_KEY)?
            .map(<[String]>::to_vec)
            .unwrap_or_default())
    }

    /// Included and excluded permissions together.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if either permissions key is not a list.
    pub fn permissions(&self) -> Result<(Vec<String>, Vec<String>), ContextError> {
        Ok((self.included_permissions()?, self.excluded_permissions()?))
    }

    /// Endpoint-derived default, only when no permissions are declared.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if a permissions key is not a list.
    pub fn default_permission(&self) -> Result<Option<DefaultPermission>, ContextError> {
        let declared = self.context.get_list(PERMISSIONS_KEY)?.is_some()
            || self.context.get_list(PERMISSIONS_EXCLUDED_KEY)?.is_some();
        if declared {
            return Ok(None);
        }
        Ok(Some(permissions::default_permission(&self.input.endpoint)))
    }
}
