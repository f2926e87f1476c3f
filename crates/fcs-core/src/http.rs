//! Transport-neutral request/response values exchanged with executors

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Response header list; name lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value of the named header
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Request built by `TestCase::prepare`, handed to an executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
}

/// Response as returned by an executor.
///
/// `body` is the body as text; bytes that are not UTF-8 are replaced.
/// `body_length` is the number of bytes received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: String,
    pub body_length: usize,
    pub elapsed: Duration,
}

impl HttpResponse {
    /// Build a response with no headers and zero elapsed time
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            status,
            headers: ResponseHeaders::new(),
            body_length: body.len(),
            body,
            elapsed: Duration::ZERO,
        }
    }

    /// Build a response from the raw body bytes
    #[must_use]
    pub fn from_bytes(status: u16, headers: ResponseHeaders, body: &[u8]) -> Self {
        Self {
            status,
            headers,
            body: String::from_utf8_lossy(body).into_owned(),
            body_length: body.len(),
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// Headers and body captured on the test case during validation.
/// Match rules are evaluated against this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: String,
    /// Bytes received, which differs from `body.len()` for non-UTF-8 bodies
    #[serde(default)]
    pub body_length: usize,
}

impl CapturedResponse {
    #[must_use]
    pub fn new(status: u16, headers: ResponseHeaders, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            status,
            headers,
            body_length: body.len(),
            body,
        }
    }
}

impl From<HttpResponse> for CapturedResponse {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            body_length: response.body_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let headers: ResponseHeaders = [("X-Fapi-Interaction-Id", "abc")].into_iter().collect();
        assert_eq!(headers.get("x-fapi-interaction-id"), Some("abc"));
        assert_eq!(headers.get("X-FAPI-INTERACTION-ID"), Some("abc"));
        assert!(!headers.contains("x-other"));
    }

    #[test]
    fn raw_body_keeps_received_length() {
        let resp = HttpResponse::from_bytes(200, ResponseHeaders::new(), b"\xe9t\xe9");
        assert_eq!(resp.body_length, 3);
        assert_eq!(resp.body, "\u{fffd}t\u{fffd}");

        let captured = CapturedResponse::from(resp);
        assert_eq!(captured.body_length, 3);
    }

    #[test]
    fn first_value_wins() {
        let mut headers = ResponseHeaders::new();
        headers.append("Link", "first");
        headers.append("link", "second");
        assert_eq!(headers.get("LINK"), Some("first"));
        assert_eq!(headers.iter().count(), 2);
    }
}
