//! Per-kind match checkers
//!
//! Pure functions over a captured response. Each checker either passes
//! (optionally yielding an extracted value) or explains why it failed.

use crate::http::CapturedResponse;

use super::{Match, MatchKind};

const BEARER_PREFIX: &str = "bearer ";

/// Why a match did not hold
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchFailure {
    #[error("unknown match type fails by default: no recognisable rule shape in [{rule}]")]
    Unknown { rule: String },
    #[error("header value match failed: header ({header}) expected ({expected}) got ({actual})")]
    HeaderValue {
        header: String,
        expected: String,
        actual: String,
    },
    #[error("header match failed: header ({header}) not present")]
    HeaderMissing { header: String },
    #[error("header regex match failed: regex ({regex}) failed on header ({header}) value ({value})")]
    HeaderRegex {
        regex: String,
        header: String,
        value: String,
    },
    #[error(
        "header regex context match failed: regex ({regex}) captured nothing on header ({header}) value ({value})"
    )]
    HeaderRegexCapture {
        regex: String,
        header: String,
        value: String,
    },
    #[error("body regex match failed: regex ({regex}) failed on body")]
    BodyRegex { regex: String },
    #[error("json value match failed: path ({path}) expected ({expected}) got ({actual})")]
    JsonValue {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("json field match failed: no field present for pattern ({path})")]
    JsonMissing { path: String },
    #[error("json count match failed: found ({actual}) not ({expected}) occurrences of pattern ({path})")]
    JsonCount {
        path: String,
        expected: i64,
        actual: i64,
    },
    #[error("json regex match failed: selected field ({value}) does not match regex ({regex})")]
    JsonRegex { value: String, regex: String },
    #[error("body length ({actual}) does not match expected length ({expected})")]
    BodyLength { expected: i64, actual: i64 },
    #[error("authorisation match failed: no Authorisation/Authorization header value found")]
    AuthorisationMissing,
    #[error("authorisation match failed: scheme ({scheme}) is not supported")]
    AuthorisationScheme { scheme: String },
    #[error("authorisation match failed: header value ({value}) has no bearer token")]
    AuthorisationToken { value: String },
}

pub(super) fn run(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    match m.kind {
        MatchKind::Unknown => Err(MatchFailure::Unknown {
            rule: m.to_string(),
        }),
        MatchKind::HeaderValue => header_value(m, resp),
        MatchKind::HeaderRegex => header_regex(m, resp),
        MatchKind::HeaderRegexContext => header_regex_context(m, resp),
        MatchKind::HeaderPresent => header_present(m, resp),
        MatchKind::BodyRegex => body_regex(m, resp),
        MatchKind::BodyJsonPresent => body_json_present(m, resp),
        MatchKind::BodyJsonCount => body_json_count(m, resp),
        MatchKind::BodyJsonValue => body_json_value(m, resp),
        MatchKind::BodyJsonRegex => body_json_regex(m, resp),
        MatchKind::BodyLength => body_length(m, resp),
        MatchKind::Authorisation => authorisation(m, resp),
    }
}

fn header_value(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    let spec = &m.spec;
    let actual = resp.headers.get(&spec.header).unwrap_or_default();
    if actual != spec.value {
        return Err(MatchFailure::HeaderValue {
            header: spec.header.clone(),
            expected: spec.value.clone(),
            actual: actual.to_string(),
        });
    }
    Ok(None)
}

fn present_header<'a>(m: &Match, resp: &'a CapturedResponse) -> Result<&'a str, MatchFailure> {
    resp.headers
        .get(&m.spec.header)
        .ok_or_else(|| MatchFailure::HeaderMissing {
            header: m.spec.header.clone(),
        })
}

fn header_regex(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    let value = present_header(m, resp)?;
    let Some(regex) = &m.regex else {
        return Ok(None);
    };
    match regex.captures(value) {
        // group 1 when the pattern has one, otherwise the whole match
        Some(caps) => Ok(caps
            .get(1)
            .or_else(|| caps.get(0))
            .map(|g| g.as_str().to_string())),
        None => Err(MatchFailure::HeaderRegex {
            regex: m.spec.regex.clone(),
            header: m.spec.header.clone(),
            value: value.to_string(),
        }),
    }
}

fn header_regex_context(
    m: &Match,
    resp: &CapturedResponse,
) -> Result<Option<String>, MatchFailure> {
    let value = present_header(m, resp)?;
    let captured = m
        .regex
        .as_ref()
        .and_then(|re| re.captures(value))
        .and_then(|caps| caps.get(1))
        .map(|g| g.as_str().to_string());
    captured
        .map(Some)
        .ok_or_else(|| MatchFailure::HeaderRegexCapture {
            regex: m.spec.regex.clone(),
            header: m.spec.header.clone(),
            value: value.to_string(),
        })
}

fn header_present(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    if resp.headers.contains(&m.spec.header_present) {
        Ok(None)
    } else {
        Err(MatchFailure::HeaderMissing {
            header: m.spec.header_present.clone(),
        })
    }
}

fn body_regex(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    if m.regex.as_ref().is_some_and(|re| re.is_match(&resp.body)) {
        Ok(None)
    } else {
        Err(MatchFailure::BodyRegex {
            regex: m.spec.regex.clone(),
        })
    }
}

fn body_json_value(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    let actual = gjson::get(&resp.body, &m.spec.json).str().to_string();
    if actual != m.spec.value {
        return Err(MatchFailure::JsonValue {
            path: m.spec.json.clone(),
            expected: m.spec.value.clone(),
            actual,
        });
    }
    Ok(Some(actual))
}

fn body_json_present(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    let selected = gjson::get(&resp.body, &m.spec.json);
    if !selected.exists() {
        return Err(MatchFailure::JsonMissing {
            path: m.spec.json.clone(),
        });
    }
    Ok(Some(selected.str().to_string()))
}

fn body_json_count(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    let actual = gjson::get(&resp.body, &m.spec.json).i64();
    if actual != m.spec.count {
        return Err(MatchFailure::JsonCount {
            path: m.spec.json.clone(),
            expected: m.spec.count,
            actual,
        });
    }
    Ok(None)
}

fn body_json_regex(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    let value = gjson::get(&resp.body, &m.spec.json).str().to_string();
    if value.is_empty() {
        return Err(MatchFailure::JsonMissing {
            path: m.spec.json.clone(),
        });
    }
    if m.regex.as_ref().is_some_and(|re| re.is_match(&value)) {
        Ok(None)
    } else {
        Err(MatchFailure::JsonRegex {
            value,
            regex: m.spec.regex.clone(),
        })
    }
}

fn body_length(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    let expected = m.spec.body_length.unwrap_or_default();
    let actual = i64::try_from(resp.body_length).unwrap_or(i64::MAX);
    if actual != expected {
        return Err(MatchFailure::BodyLength { expected, actual });
    }
    Ok(None)
}

fn authorisation(m: &Match, resp: &CapturedResponse) -> Result<Option<String>, MatchFailure> {
    if !m.spec.authorisation.eq_ignore_ascii_case("bearer") {
        return Err(MatchFailure::AuthorisationScheme {
            scheme: m.spec.authorisation.clone(),
        });
    }
    // UK and US spellings
    let value = resp
        .headers
        .get("Authorisation")
        .or_else(|| resp.headers.get("Authorization"))
        .filter(|v| !v.is_empty())
        .ok_or(MatchFailure::AuthorisationMissing)?;

    let token = value
        .get(..BEARER_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(BEARER_PREFIX))
        .map(|_| &value[BEARER_PREFIX.len()..])
        .filter(|token| !token.is_empty())
        .ok_or_else(|| MatchFailure::AuthorisationToken {
            value: value.to_string(),
        })?;
    Ok(Some(token.to_string()))
}
