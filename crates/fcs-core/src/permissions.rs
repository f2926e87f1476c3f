//! Permission / token resolution
//!
//! Each test case needs an access token carrying a particular set of
//! permissions. This module knows the default permissions of the Account &
//! Transaction API endpoints, aggregates per-rule permission sets, and groups
//! test cases into the minimal list of distinct tokens a run must acquire.

use serde::{Deserialize, Serialize};

use crate::context::ContextError;
use crate::testcase::TestCase;

/// A permission an endpoint accepts, and whether it is the one to pick when
/// the test case does not say
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPermission {
    pub permission: &'static str,
    pub default: bool,
}

const fn perm(permission: &'static str) -> EndpointPermission {
    EndpointPermission {
        permission,
        default: false,
    }
}

const fn default_perm(permission: &'static str) -> EndpointPermission {
    EndpointPermission {
        permission,
        default: true,
    }
}

const ACCOUNTS: &[EndpointPermission] = &[
    default_perm("ReadAccountsBasic"),
    perm("ReadAccountsDetail"),
];
const BALANCES: &[EndpointPermission] = &[perm("ReadBalances")];
const BENEFICIARIES: &[EndpointPermission] = &[
    default_perm("ReadBeneficiariesBasic"),
    perm("ReadBeneficiariesDetail"),
];
const DIRECT_DEBITS: &[EndpointPermission] = &[perm("ReadDirectDebits")];
const OFFERS: &[EndpointPermission] = &[perm("ReadOffers")];
const PARTY: &[EndpointPermission] = &[perm("ReadParty")];
const PARTY_PSU: &[EndpointPermission] = &[perm("ReadPartyPSU")];
const PRODUCTS: &[EndpointPermission] = &[perm("ReadProducts")];
const SCHEDULED_PAYMENTS: &[EndpointPermission] = &[
    default_perm("ReadScheduledPaymentsBasic"),
    perm("ReadScheduledPaymentsDetail"),
];
const STANDING_ORDERS: &[EndpointPermission] = &[
    default_perm("ReadStandingOrdersBasic"),
    perm("ReadStandingOrdersDetail"),
];
const STATEMENTS: &[EndpointPermission] = &[
    default_perm("ReadStatementsBasic"),
    perm("ReadStatementsDetail"),
];
const STATEMENT_FILE: &[EndpointPermission] = &[perm("ReadStatementsDetail")];
const STATEMENT_TRANSACTIONS: &[EndpointPermission] = &[
    perm("ReadStatementsBasic"),
    perm("ReadTransactionsBasic"),
    perm("ReadTransactionsDetail"),
];
const TRANSACTIONS: &[EndpointPermission] = &[
    default_perm("ReadTransactionsBasic"),
    perm("ReadTransactionsDetail"),
    perm("ReadTransactionsCredits"),
    perm("ReadTransactionsDebits"),
];

/// Endpoint templates with their accepted permissions
const ENDPOINTS: &[(&str, &[EndpointPermission])] = &[
    ("/accounts", ACCOUNTS),
    ("/accounts/{AccountId}", ACCOUNTS),
    ("/accounts/{AccountId}/balances", BALANCES),
    ("/balances", BALANCES),
    ("/accounts/{AccountId}/beneficiaries", BENEFICIARIES),
    ("/beneficiaries", BENEFICIARIES),
    ("/accounts/{AccountId}/direct-debits", DIRECT_DEBITS),
    ("/direct-debits", DIRECT_DEBITS),
    ("/accounts/{AccountId}/offers", OFFERS),
    ("/offers", OFFERS),
    ("/accounts/{AccountId}/party", PARTY),
    ("/party", PARTY_PSU),
    ("/accounts/{AccountId}/product", PRODUCTS),
    ("/products", PRODUCTS),
    ("/accounts/{AccountId}/scheduled-payments", SCHEDULED_PAYMENTS),
    ("/scheduled-payments", SCHEDULED_PAYMENTS),
    ("/accounts/{AccountId}/standing-orders", STANDING_ORDERS),
    ("/standing-orders", STANDING_ORDERS),
    ("/accounts/{AccountId}/statements", STATEMENTS),
    ("/accounts/{AccountId}/statements/{StatementId}", STATEMENTS),
    ("/accounts/{AccountId}/statements/{StatementId}/file", STATEMENT_FILE),
    (
        "/accounts/{AccountId}/statements/{StatementId}/transactions",
        STATEMENT_TRANSACTIONS,
    ),
    ("/statements", STATEMENTS),
    ("/accounts/{AccountId}/transactions", TRANSACTIONS),
    ("/transactions", TRANSACTIONS),
];

/// Whether a concrete or templated endpoint fits `template`.
/// `{...}` segments in the template match any non-empty segment.
fn endpoint_matches(template: &str, endpoint: &str) -> bool {
    let path = endpoint.split('?').next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    let mut wanted = template.split('/');
    let mut actual = path.split('/');
    loop {
        match (wanted.next(), actual.next()) {
            (None, None) => return true,
            (Some(w), Some(a)) if w.starts_with('{') && w.ends_with('}') => {
                if a.is_empty() {
                    return false;
                }
            }
            (Some(w), Some(a)) if w == a => {}
            _ => return false,
        }
    }
}

/// Candidate permissions for an endpoint, empty if the endpoint is unknown
#[must_use]
pub fn permissions_for_endpoint(endpoint: &str) -> &'static [EndpointPermission] {
    ENDPOINTS
        .iter()
        .find(|(template, _)| endpoint_matches(template, endpoint))
        .map_or(&[], |(_, perms)| *perms)
}

/// Outcome of picking a default permission for an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultPermission {
    Assigned(String),
    /// Several candidates and none flagged as the default
    Ambiguous(Vec<String>),
    None,
}

/// Pick the default permission for `endpoint`: the flagged default, else the
/// only candidate. Several unflagged candidates are reported as ambiguous.
#[must_use]
pub fn default_permission(endpoint: &str) -> DefaultPermission {
    let candidates = permissions_for_endpoint(endpoint);
    if let Some(p) = candidates.iter().find(|p| p.default) {
        return DefaultPermission::Assigned(p.permission.to_string());
    }
    match candidates {
        [] => DefaultPermission::None,
        [only] => DefaultPermission::Assigned(only.permission.to_string()),
        many => DefaultPermission::Ambiguous(many.iter().map(|p| p.permission.to_string()).collect()),
    }
}

/// Named, de-duplicated list of permissions in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub name: String,
    pub perms: Vec<String>,
}

impl PermissionSet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            perms: Vec::new(),
        }
    }

    pub fn add<I, S>(&mut self, perms: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for p in perms {
            let p = p.into();
            if !self.perms.contains(&p) {
                self.perms.push(p);
            }
        }
    }

    #[must_use]
    pub fn contains(&self, perm: &str) -> bool {
        self.perms.iter().any(|p| p == perm)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.perms.is_empty()
    }
}

/// Permissions one test case needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCasePermission {
    pub id: String,
    pub perms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub perms_excluded: Vec<String>,
}

/// Permissions of a batch of test cases, with the ids whose endpoint default
/// could not be decided
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSummary {
    pub test_cases: Vec<TestCasePermission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<String>,
}

/// Collect per test case permissions.
///
/// # Errors
///
/// Returns [`ContextError`] if a test case declares permissions as a non-list.
pub fn test_case_permissions<'a, I>(test_cases: I) -> Result<PermissionSummary, ContextError>
where
    I: IntoIterator<Item = &'a TestCase>,
{
    let mut summary = PermissionSummary::default();
    for tc in test_cases {
        let (perms, perms_excluded) = tc.permissions()?;
        if let Some(DefaultPermission::Ambiguous(_)) = tc.default_permission()? {
            summary.ambiguous.push(tc.id.clone());
        }
        summary.test_cases.push(TestCasePermission {
            id: tc.id.clone(),
            perms,
            perms_excluded,
        });
    }
    Ok(summary)
}

/// A token to acquire, and the test cases that will use it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredToken {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    pub perms: Vec<String>,
    pub ids: Vec<String>,
}

/// Group test cases by their (sorted, de-duplicated) included permissions.
///
/// One token per distinct combination, named `to1`, `to2`, ... in first-seen
/// order. Test cases needing no permissions need no token and are skipped.
#[must_use]
pub fn required_tokens(test_cases: &[TestCasePermission]) -> Vec<RequiredToken> {
    let mut tokens: Vec<RequiredToken> = Vec::new();
    for tc in test_cases {
        let mut perms = tc.perms.clone();
        perms.sort();
        perms.dedup();
        if perms.is_empty() {
            continue;
        }
        if let Some(existing) = tokens.iter_mut().find(|t| t.perms == perms) {
            existing.ids.push(tc.id.clone());
            continue;
        }
        tokens.push(RequiredToken {
            name: format!("to{}", tokens.len() + 1),
            token: String::new(),
            perms,
            ids: vec![tc.id.clone()],
        });
    }
    tokens
}

/// Fill in every token with `acquire`, which receives the token's permissions.
///
/// # Errors
///
/// Stops at and returns the first acquisition error.
pub fn populate_tokens<F, E>(tokens: &mut [RequiredToken], mut acquire: F) -> Result<(), E>
where
    F: FnMut(&[String]) -> Result<String, E>,
{
    for token in tokens.iter_mut().filter(|t| !t.perms.is_empty()) {
        token.token = acquire(&token.perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::{Expect, Input, PERMISSIONS_KEY};

    fn tc(id: &str, endpoint: &str) -> TestCase {
        let input = Input {
            method: "GET".into(),
            endpoint: endpoint.into(),
            ..Input::default()
        };
        TestCase::new(id, id, input, Expect::default())
    }

    fn tcp(id: &str, perms: &[&str]) -> TestCasePermission {
        TestCasePermission {
            id: id.into(),
            perms: perms.iter().map(ToString::to_string).collect(),
            perms_excluded: Vec::new(),
        }
    }

    #[test]
    fn templates_match_concrete_and_templated_endpoints() {
        assert!(endpoint_matches("/accounts/{AccountId}", "/accounts/500000000000000000000001"));
        assert!(endpoint_matches("/accounts/{AccountId}", "/accounts/{AccountId}"));
        assert!(endpoint_matches("/accounts/{AccountId}", "/accounts/abc/"));
        assert!(endpoint_matches("/accounts", "/accounts?page=2"));
        assert!(!endpoint_matches("/accounts/{AccountId}", "/accounts"));
        assert!(!endpoint_matches("/accounts/{AccountId}", "/accounts/abc/balances"));
    }

    #[test]
    fn default_selection() {
        assert_eq!(
            default_permission("/accounts/abc/transactions"),
            DefaultPermission::Assigned("ReadTransactionsBasic".into())
        );
        assert_eq!(
            default_permission("/offers"),
            DefaultPermission::Assigned("ReadOffers".into())
        );
        assert_eq!(default_permission("/domestic-payments"), DefaultPermission::None);
        assert!(matches!(
            default_permission("/accounts/a/statements/s/transactions"),
            DefaultPermission::Ambiguous(c) if c.len() == 3
        ));
    }

    #[test]
    fn permission_set_dedups_in_order() {
        let mut set = PermissionSet::new("included");
        set.add(["ReadBalances", "ReadAccountsBasic"]);
        set.add(vec!["ReadBalances".to_string(), "ReadOffers".to_string()]);
        assert_eq!(set.perms, vec!["ReadBalances", "ReadAccountsBasic", "ReadOffers"]);
        assert!(set.contains("ReadOffers"));
    }

    #[test]
    fn collects_permissions_and_flags_ambiguous_defaults() {
        let mut explicit = tc("t3", "/accounts");
        explicit.context.put(PERMISSIONS_KEY, vec!["ReadAccountsDetail".to_string()]);
        let cases = [
            tc("t1", "/accounts"),
            tc("t2", "/accounts/{AccountId}/statements/{StatementId}/transactions"),
            explicit,
        ];
        let summary = test_case_permissions(&cases).unwrap();
        assert_eq!(summary.ambiguous, vec!["t2"]);
        assert_eq!(summary.test_cases[0].perms, vec!["ReadAccountsBasic"]);
        assert!(summary.test_cases[1].perms.is_empty());
        assert_eq!(summary.test_cases[2].perms, vec!["ReadAccountsDetail"]);
    }

    #[test]
    fn groups_tokens_by_permission_combination() {
        let tokens = required_tokens(&[
            tcp("t1", &["ReadAccountsBasic"]),
            tcp("t2", &["ReadBalances", "ReadAccountsBasic"]),
            tcp("t3", &[]),
            tcp("t4", &["ReadAccountsBasic", "ReadBalances", "ReadBalances"]),
            tcp("t5", &["ReadAccountsBasic"]),
        ]);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].name, "to1");
        assert_eq!(tokens[0].ids, vec!["t1", "t5"]);
        assert_eq!(tokens[1].name, "to2");
        assert_eq!(tokens[1].perms, vec!["ReadAccountsBasic", "ReadBalances"]);
        assert_eq!(tokens[1].ids, vec!["t2", "t4"]);
    }

    #[test]
    fn populate_fills_tokens_and_stops_on_error() {
        let mut tokens = required_tokens(&[tcp("t1", &["ReadOffers"]), tcp("t2", &["ReadParty"])]);
        populate_tokens(&mut tokens, |perms| Ok::<_, String>(format!("tok-{}", perms.join("+"))))
            .unwrap();
        assert_eq!(tokens[0].token, "tok-ReadOffers");
        assert_eq!(tokens[1].token, "tok-ReadParty");

        let mut calls = 0;
        let err = populate_tokens(&mut tokens, |_| {
            calls += 1;
            Err::<String, _>("consent rejected")
        });
        assert_eq!(err, Err("consent rejected"));
        assert_eq!(calls, 1);
    }
}
