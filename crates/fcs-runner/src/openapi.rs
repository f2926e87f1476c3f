//! OpenAPI response validation
//!
//! Loads an OpenAPI 3 document (JSON or YAML), routes a concrete request path
//! to its operation and checks the response against what the operation
//! declares: status code, body schema and Content-Type.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use fcs_core::schema::{ResponseValidator, SchemaError, SchemaFailure, SchemaInput};

const METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

/// Maximum `$ref` expansion depth; circular references stop here
const MAX_REF_DEPTH: u32 = 20;

/// One documented operation
#[derive(Debug, Clone)]
struct Operation {
    method: String,
    path: String,
    declared_statuses: Vec<u16>,
    has_default_response: bool,
    /// Resolved response schemas per status
    response_schemas: HashMap<u16, Value>,
    response_content_types: HashMap<u16, Vec<String>>,
}

impl Operation {
    /// Number of literal segments matched, `None` if the path does not fit
    fn route_score(&self, path: &str) -> Option<usize> {
        let template: Vec<&str> = self.path.trim_end_matches('/').split('/').collect();
        let actual: Vec<&str> = path.trim_end_matches('/').split('/').collect();
        if template.len() != actual.len() {
            return None;
        }
        let mut literal = 0;
        for (t, a) in template.iter().zip(&actual) {
            if t.starts_with('{') && t.ends_with('}') {
                if a.is_empty() {
                    return None;
                }
            } else if t == a {
                literal += 1;
            } else {
                return None;
            }
        }
        Some(literal)
    }
}

/// Validator backed by an OpenAPI document
#[derive(Debug, Clone)]
pub struct OpenApiValidator {
    /// Path part of `servers[0].url`, stripped from incoming paths
    base_path: String,
    operations: Vec<Operation>,
}

impl OpenApiValidator {
    /// Load a document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Schema`] if the file cannot be read, parsed, or
    /// declares no operations.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Schema(format!("cannot read {}: {e}", path.display())))?;
        let doc = parse_document(path, &content)?;
        Self::from_document(&doc)
    }

    /// # Errors
    ///
    /// Returns [`SchemaError::Schema`] if the document declares no operations.
    pub fn from_document(doc: &Value) -> Result<Self, SchemaError> {
        let operations = extract_operations(doc);
        if operations.is_empty() {
            return Err(SchemaError::Schema(
                "no operations found in OpenAPI document".into(),
            ));
        }
        Ok(Self {
            base_path: server_base_path(doc),
            operations,
        })
    }

    fn route(&self, method: &str, path: &str) -> Option<&Operation> {
        let path = path.split('?').next().unwrap_or_default();
        let path = path.strip_prefix(&self.base_path).unwrap_or(path);
        self.operations
            .iter()
            .filter(|op| op.method.eq_ignore_ascii_case(method))
            .filter_map(|op| op.route_score(path).map(|score| (score, op)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, op)| op)
    }
}

impl ResponseValidator for OpenApiValidator {
    fn validate(&self, input: &SchemaInput<'_>) -> Result<Vec<SchemaFailure>, SchemaError> {
        let op = self
            .route(input.method, input.path)
            .ok_or_else(|| SchemaError::NoRoute {
                method: input.method.to_string(),
                path: input.path.to_string(),
            })?;

        let mut failures = Vec::new();
        check_status(op, input, &mut failures);
        check_body(op, input, &mut failures)?;
        check_content_type(op, input, &mut failures);
        Ok(failures)
    }
}

fn check_status(op: &Operation, input: &SchemaInput<'_>, failures: &mut Vec<SchemaFailure>) {
    if op.has_default_response || op.declared_statuses.contains(&input.status) {
        return;
    }
    failures.push(SchemaFailure::new(format!(
        "status {} not declared for {} {} (declared: {:?})",
        input.status, op.method, op.path, op.declared_statuses
    )));
}

/// Body against the status's JSON schema. An empty or missing schema leaves
/// the body unchecked.
fn check_body(
    op: &Operation,
    input: &SchemaInput<'_>,
    failures: &mut Vec<SchemaFailure>,
) -> Result<(), SchemaError> {
    let Some(schema) = op
        .response_schemas
        .get(&input.status)
        .filter(|s| s.as_object().is_some_and(|o| !o.is_empty()))
    else {
        return Ok(());
    };

    let Ok(body) = serde_json::from_str::<Value>(input.body) else {
        if !input.body.is_empty() {
            let end = input
                .body
                .char_indices()
                .nth(200)
                .map_or(input.body.len(), |(i, _)| i);
            failures.push(SchemaFailure::new(format!(
                "response body is not valid JSON: {}",
                &input.body[..end]
            )));
        }
        return Ok(());
    };

    let validator = jsonschema::validator_for(schema).map_err(|e| {
        SchemaError::Schema(format!("{} {} status {}: {e}", op.method, op.path, input.status))
    })?;
    failures.extend(
        validator
            .iter_errors(&body)
            .take(5)
            .map(|e| SchemaFailure::new(e.to_string())),
    );
    Ok(())
}

fn check_content_type(op: &Operation, input: &SchemaInput<'_>, failures: &mut Vec<SchemaFailure>) {
    let Some(expected) = op
        .response_content_types
        .get(&input.status)
        .filter(|types| !types.is_empty())
    else {
        return;
    };
    if input.body.is_empty() {
        return;
    }
    match input.headers.get("Content-Type") {
        Some(actual) => {
            let media = media_type(actual);
            if !expected.iter().any(|t| media_type(t).eq_ignore_ascii_case(media)) {
                failures.push(SchemaFailure::new(format!(
                    "unexpected Content-Type \"{media}\", expected one of {expected:?}"
                )));
            }
        }
        None => failures.push(SchemaFailure::new(format!(
            "missing Content-Type header, expected one of {expected:?}"
        ))),
    }
}

/// Media type without parameters: `application/json; charset=utf-8` is `application/json`
fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// JSON or YAML, by extension, else by sniffing the first character
fn parse_document(path: &Path, content: &str) -> Result<Value, SchemaError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let yaml = |c: &str| {
        serde_yml::from_str::<Value>(c).map_err(|e| SchemaError::Schema(format!("invalid YAML: {e}")))
    };
    let json = |c: &str| {
        serde_json::from_str::<Value>(c).map_err(|e| SchemaError::Schema(format!("invalid JSON: {e}")))
    };
    match ext.as_str() {
        "yaml" | "yml" => yaml(content),
        "json" => json(content),
        _ if content.trim_start().starts_with('{') => json(content),
        _ => yaml(content),
    }
}

fn server_base_path(doc: &Value) -> String {
    let Some(url) = doc
        .pointer("/servers/0/url")
        .and_then(Value::as_str)
    else {
        return String::new();
    };
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = if url.contains("://") {
        without_scheme.find('/').map_or("", |i| &without_scheme[i..])
    } else {
        without_scheme
    };
    path.trim_end_matches('/').to_string()
}

fn extract_operations(doc: &Value) -> Vec<Operation> {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut ops = Vec::new();
    for (path, path_item) in paths {
        for method in METHODS {
            let Some(operation) = path_item.get(method) else {
                continue;
            };
            let responses = operation.get("responses").and_then(Value::as_object);

            let mut declared_statuses = Vec::new();
            let mut has_default_response = false;
            let mut response_schemas = HashMap::new();
            let mut response_content_types = HashMap::new();

            for (status_str, resp) in responses.into_iter().flatten() {
                if status_str == "default" {
                    has_default_response = true;
                    continue;
                }
                let Ok(status) = status_str.parse::<u16>() else {
                    continue;
                };
                declared_statuses.push(status);
                let resp = resolve_refs(resp, doc);
                let Some(content) = resp.get("content").and_then(Value::as_object) else {
                    continue;
                };
                let types: Vec<String> = content.keys().cloned().collect();
                if !types.is_empty() {
                    response_content_types.insert(status, types);
                }
                let schema = content
                    .iter()
                    .find(|(media, _)| media.split(';').next().is_some_and(|m| m.trim().ends_with("json")))
                    .and_then(|(_, media)| media.get("schema"));
                if let Some(schema) = schema {
                    response_schemas.insert(status, schema.clone());
                }
            }

            ops.push(Operation {
                method: method.to_uppercase(),
                path: path.clone(),
                declared_statuses,
                has_default_response,
                response_schemas,
                response_content_types,
            });
        }
    }
    ops
}

/// Expand local `$ref`s (`#/...`) so the result is self-contained.
fn resolve_refs(value: &Value, doc: &Value) -> Value {
    resolve_refs_inner(value, doc, 0)
}

fn resolve_refs_inner(value: &Value, doc: &Value, depth: u32) -> Value {
    if depth > MAX_REF_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(obj) => {
            if let Some(target) = obj
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix('#'))
                .and_then(|pointer| doc.pointer(pointer))
            {
                return resolve_refs_inner(target, doc, depth + 1);
            }
            Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), resolve_refs_inner(v, doc, depth + 1)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_refs_inner(v, doc, depth + 1))
                .collect(),
        ),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcs_core::http::ResponseHeaders;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "openapi": "3.0.0",
            "servers": [{"url": "https://bank.example/open-banking/v3.1/aisp"}],
            "paths": {
                "/accounts/{AccountId}": {
                    "get": {
                        "responses": {
                            "200": {"$ref": "#/components/responses/AccountOk"},
                            "400": {"description": "bad request"}
                        }
                    }
                },
                "/accounts/{AccountId}/balances": {
                    "get": {"responses": {"default": {"description": "anything"}}}
                }
            },
            "components": {
                "responses": {
                    "AccountOk": {
                        "description": "ok",
                        "content": {
                            "application/json; charset=utf-8": {
                                "schema": {"$ref": "#/components/schemas/OBReadAccount"}
                            }
                        }
                    }
                },
                "schemas": {
                    "OBReadAccount": {
                        "type": "object",
                        "required": ["Data"],
                        "properties": {"Data": {"type": "object"}}
                    }
                }
            }
        })
    }

    fn input<'a>(path: &'a str, status: u16, headers: &'a ResponseHeaders, body: &'a str) -> SchemaInput<'a> {
        SchemaInput {
            method: "GET",
            path,
            status,
            headers,
            body,
        }
    }

    fn json_headers() -> ResponseHeaders {
        [("Content-Type", "application/json; charset=utf-8")]
            .into_iter()
            .collect()
    }

    #[test]
    fn conforming_response_passes() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        let headers = json_headers();
        let failures = v
            .validate(&input("/accounts/500000000000000000000001", 200, &headers, r#"{"Data":{}}"#))
            .unwrap();
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn server_base_path_is_stripped() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        let headers = json_headers();
        let failures = v
            .validate(&input("/open-banking/v3.1/aisp/accounts/1?x=1", 200, &headers, r#"{"Data":{}}"#))
            .unwrap();
        assert!(failures.is_empty());
    }

    #[test]
    fn schema_violation_reported() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        let headers = json_headers();
        let failures = v
            .validate(&input("/accounts/1", 200, &headers, r#"{"Meta":{}}"#))
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("Data"));
    }

    #[test]
    fn undeclared_status_and_content_type() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        let headers: ResponseHeaders = [("content-type", "text/html")].into_iter().collect();
        let failures = v
            .validate(&input("/accounts/1", 200, &headers, r#"{"Data":{}}"#))
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.starts_with("unexpected Content-Type \"text/html\""));

        let none = ResponseHeaders::new();
        let failures = v.validate(&input("/accounts/1", 503, &none, "")).unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.starts_with("status 503 not declared"));
    }

    #[test]
    fn content_type_parameters_are_ignored_on_both_sides() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        for sent in ["application/json", "Application/JSON;charset=UTF-8", "application/json; charset=utf-8"] {
            let headers: ResponseHeaders = [("Content-Type", sent)].into_iter().collect();
            let failures = v
                .validate(&input("/accounts/1", 200, &headers, r#"{"Data":{}}"#))
                .unwrap();
            assert!(failures.is_empty(), "{sent}: {failures:?}");
        }
        assert_eq!(media_type(" text/plain ; q=1"), "text/plain");
    }

    #[test]
    fn default_response_accepts_any_status() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        let none = ResponseHeaders::new();
        assert!(v.validate(&input("/accounts/1/balances", 418, &none, "")).unwrap().is_empty());
    }

    #[test]
    fn unknown_route_is_an_error() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        let none = ResponseHeaders::new();
        assert_eq!(
            v.validate(&input("/party", 200, &none, "")).unwrap_err(),
            SchemaError::NoRoute {
                method: "GET".into(),
                path: "/party".into()
            }
        );
    }

    #[test]
    fn non_json_body_reported() {
        let v = OpenApiValidator::from_document(&doc()).unwrap();
        let headers = json_headers();
        let failures = v.validate(&input("/accounts/1", 200, &headers, "<html>")).unwrap();
        assert_eq!(failures[0].message, "response body is not valid JSON: <html>");
    }

    #[test]
    fn loads_yaml_and_rejects_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.yaml");
        std::fs::write(
            &path,
            "openapi: 3.0.0\npaths:\n  /party:\n    get:\n      responses:\n        '200':\n          description: ok\n",
        )
        .unwrap();
        let v = OpenApiValidator::load(&path).unwrap();
        let none = ResponseHeaders::new();
        assert!(v.validate(&input("/party", 200, &none, "")).unwrap().is_empty());

        assert!(OpenApiValidator::from_document(&json!({"paths": {}})).is_err());
    }

    #[test]
    fn literal_segments_win_over_templates() {
        let doc = json!({"paths": {
            "/accounts/{AccountId}": {"get": {"responses": {"200": {"description": "a"}}}},
            "/accounts/export": {"get": {"responses": {"204": {"description": "b"}}}}
        }});
        let v = OpenApiValidator::from_document(&doc).unwrap();
        assert_eq!(v.route("GET", "/accounts/export").map(|o| o.path.as_str()), Some("/accounts/export"));
        assert_eq!(v.route("GET", "/accounts/1").map(|o| o.path.as_str()), Some("/accounts/{AccountId}"));
    }
}
