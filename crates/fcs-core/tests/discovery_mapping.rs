//! Manifest scripts against a discovery document, end to end through
//! generation and a two-step context hand-off.

use std::collections::BTreeMap;

use fcs_core::permissions::{required_tokens, test_case_permissions};
use fcs_core::trace::RecordingSink;
use fcs_core::{
    AssertionLibrary, Context, Discovery, HttpResponse, NullSink, NullValidator, RunEvent, Scripts,
    find_unmatched_manifest_tests, generate_test_cases, map_discovery_endpoints_to_manifest_test_ids,
};

const DISCOVERY: &str = include_str!("fixtures/ozone_discovery.json");
const MANIFEST: &str = include_str!("fixtures/accounts_manifest.json");
const ASSERTIONS: &str = include_str!("fixtures/assertions.json");

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

#[test]
fn discovery_endpoints_map_to_manifest_ids() {
    let discovery = Discovery::from_json(DISCOVERY).unwrap();
    let scripts = Scripts::from_json(MANIFEST).unwrap();

    let mapping = map_discovery_endpoints_to_manifest_test_ids(&discovery, &scripts);

    let mut expected = BTreeMap::new();
    expected.insert(
        "/accounts/{accountid}".to_string(),
        BTreeMap::from([
            ("GET".to_string(), ids(&["OB-301-ACC-120382"])),
            ("HEAD".to_string(), ids(&["OB-301-ACC-352203"])),
        ]),
    );
    expected.insert(
        "/domestic-payment-consents".to_string(),
        BTreeMap::from([("GET".to_string(), ids(&["OB-301-DOP-206111"]))]),
    );
    expected.insert(
        "/accounts/{accountid}/statements/{statementid}".to_string(),
        BTreeMap::from([("GET".to_string(), ids(&["OB-301-DOP-2061133"]))]),
    );
    assert_eq!(mapping, expected);
    assert_eq!(
        find_unmatched_manifest_tests(&scripts, &mapping),
        ids(&["unmapped-test-id"])
    );
}

#[test]
fn unmapped_manifest_items_reported_in_manifest_order() {
    let mut discovery = Discovery::from_json(DISCOVERY).unwrap();
    let items = &mut discovery.model.discovery_items;
    items[0].endpoints.retain(|e| !e.path.contains("statements"));
    items[1].endpoints[0].path = "/domestic-payment-consents/{ConsentId}/funds-confirmation".into();
    let scripts = Scripts::from_json(MANIFEST).unwrap();

    let mapping = map_discovery_endpoints_to_manifest_test_ids(&discovery, &scripts);

    assert_eq!(
        find_unmatched_manifest_tests(&scripts, &mapping),
        ids(&["unmapped-test-id", "OB-301-DOP-206111", "OB-301-DOP-2061133"])
    );
}

#[test]
fn generated_cases_hand_off_context() {
    let discovery = Discovery::from_json(DISCOVERY).unwrap();
    let scripts = Scripts::from_json(MANIFEST).unwrap();
    let library = AssertionLibrary::from_json(ASSERTIONS).unwrap();
    let sink = RecordingSink::new();

    let generated = generate_test_cases(&scripts, &discovery, &library, &sink).unwrap();
    assert_eq!(generated.len(), 2);
    assert_eq!(generated[0].test_cases.len(), 3);
    assert!(sink.events().contains(&RunEvent::ScriptSkipped {
        id: "unmapped-test-id".into(),
        reason: "no head /FOO-BAR endpoint discovered".into(),
    }));

    // consent id produced by the payments case is kept in the run context
    let mut run_ctx = Context::new();
    run_ctx.put("consentedAccountId", "500000000000000000000001");
    let mut consent = generated[1].test_cases[0].clone();
    let request = consent.prepare(&run_ctx).unwrap();
    assert_eq!(
        request.url,
        "https://modelobank2018.o3bank.co.uk:4501/open-banking/v3.1/domestic-payment-consents"
    );
    let verdict = consent
        .validate(
            HttpResponse::new(200, r#"{"Data":{"ConsentId":"sdp-1-b5bbdb18"}}"#),
            &mut run_ctx,
            &NullValidator,
        )
        .unwrap();
    assert!(verdict.is_pass());
    assert_eq!(run_ctx.get_str("ConsentId").unwrap(), Some("sdp-1-b5bbdb18"));

    let mut account = generated[0].test_cases[0].clone();
    let request = account.prepare(&run_ctx).unwrap();
    assert_eq!(
        request.url,
        "https://modelobank2018.o3bank.co.uk:4501/open-banking/v3.1/aisp/accounts/500000000000000000000001"
    );

    // HEAD cases are generated but cannot be prepared
    let mut head = generated[0].test_cases[1].clone();
    assert!(head.prepare(&run_ctx).is_err());
}

#[test]
fn tokens_required_for_generated_cases() {
    let discovery = Discovery::from_json(DISCOVERY).unwrap();
    let scripts = Scripts::from_json(MANIFEST).unwrap();
    let library = AssertionLibrary::from_json(ASSERTIONS).unwrap();
    let generated = generate_test_cases(&scripts, &discovery, &library, &NullSink).unwrap();

    let summary = test_case_permissions(generated.iter().flat_map(|s| &s.test_cases)).unwrap();
    let tokens = required_tokens(&summary.test_cases);

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].name, "to1");
    assert_eq!(tokens[0].perms, ids(&["ReadAccountsBasic"]));
    assert_eq!(tokens[0].ids, ids(&["OB-301-ACC-120382", "OB-301-ACC-352203"]));
    assert_eq!(tokens[1].perms, ids(&["ReadStatementsBasic"]));
}
