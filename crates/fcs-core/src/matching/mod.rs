//! Match rules - declarative response checks and value extraction
//!
//! A [`Match`] is built from a [`MatchSpec`] (the declarative fields as they
//! appear in manifests). Its [`MatchKind`] is inferred once, at construction,
//! from which fields are populated; regular expressions are compiled at the
//! same time. A constructed `Match` is immutable: evaluating it never changes
//! it, extracted values are returned to the caller instead.

mod checks;

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::http::CapturedResponse;

pub use checks::MatchFailure;

/// Declarative match fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpec {
    /// Purpose of the match, used in reports
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Context variable read or written by this match
    #[serde(rename = "name", default, skip_serializing_if = "String::is_empty")]
    pub context_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub header: String,
    #[serde(rename = "header-present", default, skip_serializing_if = "String::is_empty")]
    pub header_present: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub json: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub numeric: i64,
    /// Expected array count for JSON count matches
    #[serde(default, skip_serializing_if = "is_zero")]
    pub count: i64,
    #[serde(rename = "body-length", default, skip_serializing_if = "Option::is_none")]
    pub body_length: Option<i64>,
    /// Literal placeholder in the endpoint replaced by the context value
    #[serde(rename = "replaceInEndpoint", default, skip_serializing_if = "String::is_empty")]
    pub replace_in_endpoint: String,
    /// Authorisation scheme, currently only `bearer`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authorisation: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// The shape of a match, inferred from its populated fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Unknown,
    HeaderValue,
    HeaderRegex,
    HeaderRegexContext,
    HeaderPresent,
    BodyRegex,
    BodyJsonPresent,
    BodyJsonCount,
    BodyJsonValue,
    BodyJsonRegex,
    BodyLength,
    Authorisation,
}

impl MatchKind {
    /// Infer the kind from populated fields.
    ///
    /// Rules are tried in order and the first hit wins; several field sets
    /// are subsets of earlier ones (`{header, regex}` vs
    /// `{header, regex, name}`), so the order is significant.
    #[must_use]
    pub fn infer(spec: &MatchSpec) -> Self {
        let set = |s: &str| !s.is_empty();

        if set(&spec.authorisation) {
            Self::Authorisation
        } else if set(&spec.header) && set(&spec.value) {
            Self::HeaderValue
        } else if set(&spec.header) && set(&spec.regex) && set(&spec.context_name) {
            Self::HeaderRegexContext
        } else if set(&spec.header) && set(&spec.regex) {
            Self::HeaderRegex
        } else if set(&spec.header_present) {
            Self::HeaderPresent
        } else if set(&spec.json) && set(&spec.regex) {
            Self::BodyJsonRegex
        } else if set(&spec.regex) {
            Self::BodyRegex
        } else if set(&spec.json) && set(&spec.value) {
            Self::BodyJsonValue
        } else if set(&spec.json) && spec.count > 0 {
            Self::BodyJsonCount
        } else if set(&spec.json) {
            Self::BodyJsonPresent
        } else if spec.body_length.is_some() {
            Self::BodyLength
        } else {
            Self::Unknown
        }
    }

    /// Kinds that can write a value into a context
    #[must_use]
    pub const fn is_extracting(self) -> bool {
        matches!(
            self,
            Self::Authorisation
                | Self::HeaderRegex
                | Self::HeaderRegexContext
                | Self::BodyJsonPresent
                | Self::BodyJsonValue
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::HeaderValue => "HeaderValue",
            Self::HeaderRegex => "HeaderRegex",
            Self::HeaderRegexContext => "HeaderRegexContext",
            Self::HeaderPresent => "HeaderPresent",
            Self::BodyRegex => "BodyRegex",
            Self::BodyJsonPresent => "BodyJSONPresent",
            Self::BodyJsonCount => "BodyJSONCount",
            Self::BodyJsonValue => "BodyJSONValue",
            Self::BodyJsonRegex => "BodyJSONRegex",
            Self::BodyLength => "BodyLength",
            Self::Authorisation => "Authorisation",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ContextPutError {
    #[error("{kind} matches cannot write to a context")]
    NotExtracting { kind: MatchKind },
    #[error("match has no context name to write to")]
    MissingName,
    #[error(transparent)]
    Check(#[from] MatchFailure),
}

/// An immutable, classified match rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MatchSpec", into = "MatchSpec")]
pub struct Match {
    spec: MatchSpec,
    kind: MatchKind,
    regex: Option<Regex>,
}

impl Match {
    /// Classify `spec` and compile its regex.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvalidRegex`] if the `regex` field does not compile.
    pub fn new(spec: MatchSpec) -> Result<Self, MatchError> {
        let kind = MatchKind::infer(&spec);
        let regex = if spec.regex.is_empty() {
            None
        } else {
            Some(
                Regex::new(&spec.regex).map_err(|source| MatchError::InvalidRegex {
                    pattern: spec.regex.clone(),
                    source,
                })?,
            )
        };
        Ok(Self { spec, kind, regex })
    }

    #[must_use]
    pub const fn kind(&self) -> MatchKind {
        self.kind
    }

    #[must_use]
    pub const fn spec(&self) -> &MatchSpec {
        &self.spec
    }

    #[must_use]
    pub fn context_name(&self) -> &str {
        &self.spec.context_name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.spec.description
    }

    /// Evaluate the match against a captured response.
    ///
    /// On success returns the extracted value for kinds that extract one.
    ///
    /// # Errors
    ///
    /// Returns a [`MatchFailure`] describing expected versus actual.
    pub fn check(&self, response: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
        checks::run(self, response)
    }

    /// Check the response and write the extracted value to `ctx` under the
    /// match's context name. Nothing is written on any failure.
    ///
    /// # Errors
    ///
    /// Fails for non-extracting kinds, failed checks, and matches without a
    /// context name.
    pub fn put_value(
        &self,
        response: &CapturedResponse,
        ctx: &mut Context,
    ) -> Result<(), ContextPutError> {
        if !self.kind.is_extracting() {
            return Err(ContextPutError::NotExtracting { kind: self.kind });
        }
        let extracted = self.check(response)?;
        if self.spec.context_name.is_empty() {
            return Err(ContextPutError::MissingName);
        }
        ctx.put(
            self.spec.context_name.clone(),
            extracted.unwrap_or_default(),
        );
        Ok(())
    }
}

impl TryFrom<MatchSpec> for Match {
    type Error = MatchError;

    fn try_from(spec: MatchSpec) -> Result<Self, Self::Error> {
        Self::new(spec)
    }
}

impl From<Match> for MatchSpec {
    fn from(m: Match) -> Self {
        m.spec
    }
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl Eq for Match {}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.spec;
        write!(f, "MatchType: {}", self.kind)?;
        let fields = [
            ("Description", s.description.as_str()),
            ("ContextName", s.context_name.as_str()),
            ("Header", s.header.as_str()),
            ("HeaderPresent", s.header_present.as_str()),
            ("Regex", s.regex.as_str()),
            ("JSON", s.json.as_str()),
            ("Value", s.value.as_str()),
        ];
        for (label, value) in fields.iter().filter(|(_, v)| !v.is_empty()) {
            write!(f, " {label}: {value}")?;
        }
        if s.numeric > 0 {
            write!(f, " Numeric: {}", s.numeric)?;
        }
        if s.count > 0 {
            write!(f, " Count: {}", s.count)?;
        }
        if let Some(len) = s.body_length {
            write!(f, " BodyLength: {len}")?;
        }
        if !s.replace_in_endpoint.is_empty() {
            write!(f, " ReplaceEndpoint: {}", s.replace_in_endpoint)?;
        }
        if !s.authorisation.is_empty() {
            write!(f, " Authorisation: {}", s.authorisation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec() -> MatchSpec {
        MatchSpec::default()
    }

    #[test]
    fn infer_order_prefers_earlier_rules() {
        let both = MatchSpec {
            header: "Location".into(),
            value: "x".into(),
            regex: "x".into(),
            ..spec()
        };
        assert_eq!(MatchKind::infer(&both), MatchKind::HeaderValue);

        let with_name = MatchSpec {
            header: "Location".into(),
            regex: "/(.*)$".into(),
            context_name: "ConsentId".into(),
            ..spec()
        };
        assert_eq!(MatchKind::infer(&with_name), MatchKind::HeaderRegexContext);

        let json_regex = MatchSpec {
            json: "Data.Status".into(),
            regex: "^Auth".into(),
            ..spec()
        };
        assert_eq!(MatchKind::infer(&json_regex), MatchKind::BodyJsonRegex);

        let auth_wins = MatchSpec {
            authorisation: "bearer".into(),
            header: "Authorization".into(),
            value: "x".into(),
            ..spec()
        };
        assert_eq!(MatchKind::infer(&auth_wins), MatchKind::Authorisation);
    }

    #[test]
    fn infer_json_variants() {
        let count = MatchSpec {
            json: "Data.Account.#".into(),
            count: 2,
            ..spec()
        };
        assert_eq!(MatchKind::infer(&count), MatchKind::BodyJsonCount);

        let present = MatchSpec {
            json: "Data.Account.#".into(),
            ..spec()
        };
        assert_eq!(MatchKind::infer(&present), MatchKind::BodyJsonPresent);

        let value = MatchSpec {
            json: "Data.Status".into(),
            value: "Active".into(),
            count: 3,
            ..spec()
        };
        assert_eq!(MatchKind::infer(&value), MatchKind::BodyJsonValue);
    }

    #[test]
    fn infer_body_length_and_unknown() {
        let zero_len = MatchSpec {
            body_length: Some(0),
            ..spec()
        };
        assert_eq!(MatchKind::infer(&zero_len), MatchKind::BodyLength);
        assert_eq!(MatchKind::infer(&spec()), MatchKind::Unknown);

        let name_only = MatchSpec {
            context_name: "AccountId".into(),
            replace_in_endpoint: "{AccountId}".into(),
            ..spec()
        };
        assert_eq!(MatchKind::infer(&name_only), MatchKind::Unknown);
    }

    #[test]
    fn invalid_regex_rejected_at_construction() {
        let err = Match::new(MatchSpec {
            regex: "([a-z".into(),
            ..spec()
        })
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid regex '([a-z'"));
    }

    #[test]
    fn deserialize_classifies() {
        let m: Match = serde_json::from_str(
            r#"{"description": "consent id", "json": "Data.ConsentId", "name": "ConsentId"}"#,
        )
        .unwrap();
        assert_eq!(m.kind(), MatchKind::BodyJsonPresent);
        assert_eq!(m.context_name(), "ConsentId");

        let bad = serde_json::from_str::<Match>(r#"{"regex": "("}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn serialize_keeps_manifest_field_names() {
        let m = Match::new(MatchSpec {
            header_present: "x-fapi-interaction-id".into(),
            body_length: Some(0),
            ..spec()
        })
        .unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"header-present": "x-fapi-interaction-id", "body-length": 0})
        );
    }

    #[test]
    fn display_lists_populated_fields() {
        let m = Match::new(MatchSpec {
            description: "status active".into(),
            json: "Data.Status".into(),
            value: "Active".into(),
            ..spec()
        })
        .unwrap();
        insta::assert_snapshot!(
            m.to_string(),
            @"MatchType: BodyJSONValue Description: status active JSON: Data.Status Value: Active"
        );
    }

    fn field() -> impl Strategy<Value = String> {
        prop_oneof![Just(String::new()), "[a-zA-Z]{1,8}"]
    }

    prop_compose! {
        fn arb_spec()(
            header in field(),
            header_present in field(),
            json in field(),
            value in field(),
            context_name in field(),
            authorisation in field(),
            count in 0i64..4,
            body_length in proptest::option::of(0i64..100),
        ) -> MatchSpec {
            MatchSpec {
                header, header_present, json, value, context_name, authorisation,
                count, body_length, ..MatchSpec::default()
            }
        }
    }

    proptest! {
        #[test]
        fn kind_is_stable_across_evaluations(spec in arb_spec()) {
            let m = Match::new(spec.clone()).unwrap();
            let response = CapturedResponse::default();
            let _ = m.check(&response);
            let _ = m.check(&response);
            prop_assert_eq!(m.kind(), MatchKind::infer(&spec));
            prop_assert_eq!(m.spec(), &spec);
        }

        #[test]
        fn inference_ignores_description(spec in arb_spec(), description in "[ -~]{0,20}") {
            let described = MatchSpec { description, ..spec.clone() };
            prop_assert_eq!(MatchKind::infer(&described), MatchKind::infer(&spec));
        }
    }
}
