use proptest::prelude::*;

use super::{
    DmarcPolicy, SelectorProbe, SelectorStatus, default_selectors, evaluate_dkim,
    evaluate_dkim_probes, evaluate_dmarc, evaluate_spf,
    key::fixtures::{RSA_2048_SPKI, opaque_key},
};

fn txt(records: &[&str]) -> Vec<String> {
    records.iter().map(|record| record.to_string()).collect()
}

#[test]
fn google_include_with_softfail() {
    let report = evaluate_spf("example.com", &txt(&["v=spf1 include:_spf.google.com ~all"]));
    let parsed = report.parsed.as_ref().expect("parsed");

    assert!(report.found);
    assert!(report.valid);
    assert_eq!(parsed.includes, vec!["_spf.google.com"]);
    assert_eq!(parsed.all_mechanism.as_deref(), Some("~all"));
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert!(report.has_recommendation_containing("-all"));
}

#[test]
fn spf_is_picked_out_of_unrelated_txt() {
    let records = txt(&[
        "google-site-verification=abc",
        "V=SPF1 mx -all",
        "MS=ms1234",
    ]);
    let report = evaluate_spf("example.com", &records);
    assert!(report.found);
    assert_eq!(report.records, vec!["V=SPF1 mx -all".to_string()]);
}

#[test]
fn dmarc_monitoring_only() {
    let report = evaluate_dmarc("example.com", &txt(&["v=DMARC1; p=none"]));
    let parsed = report.parsed.as_ref().expect("parsed");

    assert_eq!(parsed.policy_kind(), Some(DmarcPolicy::None));
    assert_eq!(parsed.percentage, 100);
    // version 20 + policy 10 + pct 15
    assert_eq!(report.score, 45);
    assert!(report.has_recommendation_containing("rua"));
    assert!(report.valid);
}

#[test]
fn no_dkim_for_any_selector() {
    let selectors = default_selectors();
    let mut asked = Vec::new();
    let report = evaluate_dkim("example.com", &selectors, |selector| {
        asked.push(selector.to_string());
        Vec::new()
    });
    let parsed = report.parsed.as_ref().expect("parsed");

    assert_eq!(asked, selectors);
    assert!(parsed.valid_selectors.is_empty());
    assert!(report.has_issue_containing("No valid DKIM selectors found"));
    assert_eq!(report.score, 0);
    assert!(!report.found);
    assert!(!report.valid);
}

#[test]
fn dkim_probe_order_is_preserved() {
    let report = evaluate_dkim_probes(
        "example.com",
        vec![
            SelectorProbe::records("mail", vec![format!("v=DKIM1; p={RSA_2048_SPKI}")]),
            SelectorProbe::timed_out("k1"),
            SelectorProbe::records("default", Vec::new()),
        ],
    );
    let parsed = report.parsed.as_ref().expect("parsed");
    let statuses: Vec<_> = parsed
        .selectors
        .iter()
        .map(|selector| (selector.selector.as_str(), selector.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("mail", SelectorStatus::Valid),
            ("k1", SelectorStatus::TimedOut),
            ("default", SelectorStatus::Missing),
        ]
    );
}

fn host() -> impl Strategy<Value = String> {
    "[a-z]{1,12}\\.example".prop_map(String::from)
}

fn lookup_free_mechanism() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u8..=255, 0u8..=255).prop_map(|(a, b)| format!("ip4:192.0.{a}.{b}")),
        Just("ip6:2001:db8::/32".to_string()),
    ]
}

proptest! {
    #[test]
    fn hard_fail_within_lookup_limit_is_valid(
        includes in prop::collection::vec(host(), 0..=8),
        literals in prop::collection::vec(lookup_free_mechanism(), 0..6),
    ) {
        let mut tokens = vec!["v=spf1".to_string()];
        tokens.extend(includes.iter().map(|target| format!("include:{target}")));
        tokens.extend(literals);
        tokens.push("-all".to_string());
        let report = evaluate_spf("example.com", &[tokens.join(" ")]);

        prop_assert!(report.valid);
        prop_assert_eq!(report.parsed.as_ref().and_then(|p| p.all_mechanism.as_deref()), Some("-all"));
        // found 30 + hard fail 40 + lookup bonus 10
        prop_assert!(report.score >= 80, "score {}", report.score);
    }

    #[test]
    fn too_many_lookups_loses_bonus(includes in prop::collection::vec(host(), 11..20)) {
        let record = format!(
            "v=spf1 {} -all",
            includes.iter().map(|target| format!("include:{target}")).collect::<Vec<_>>().join(" ")
        );
        let report = evaluate_spf("example.com", &[record]);

        let limit_issue = format!("Too many DNS lookups ({}/10 limit)", includes.len());
        prop_assert!(report.has_issue_containing(&limit_issue), "issues {:?}", report.issues);
        prop_assert!(!report.valid);
        // found 30 + hard fail 40 + include 10, no lookup bonus
        prop_assert_eq!(report.score, 80);
    }

    #[test]
    fn reject_with_full_coverage_scores_high(user in "[a-z]{1,8}", rua_host in host()) {
        let record = format!("v=DMARC1; p=reject; pct=100; rua=mailto:{user}@{rua_host}");
        let report = evaluate_dmarc("example.com", &[record]);

        prop_assert!(report.valid);
        prop_assert!(report.score >= 85, "score {}", report.score);
    }

    #[test]
    fn short_key_material_is_never_valid(len in 1usize..50, selector in "[a-z][a-z0-9]{0,7}") {
        let probe = SelectorProbe::records(
            selector.clone(),
            vec![format!("v=DKIM1; k=rsa; p={}", opaque_key(len))],
        );
        let report = evaluate_dkim_probes("example.com", vec![probe]);
        let parsed = report.parsed.as_ref().expect("parsed");

        prop_assert!(parsed.valid_selectors.is_empty());
        prop_assert_eq!(parsed.selectors_found.clone(), vec![selector]);
        prop_assert_eq!(parsed.selectors[0].status, SelectorStatus::Invalid);
        prop_assert_eq!(report.score, 0);
    }

    #[test]
    fn evaluation_is_idempotent(records in prop::collection::vec(".{0,80}", 0..4)) {
        let spf = evaluate_spf("example.com", &records);
        prop_assert_eq!(&spf, &evaluate_spf("example.com", &records));

        let dmarc = evaluate_dmarc("example.com", &records);
        prop_assert_eq!(&dmarc, &evaluate_dmarc("example.com", &records));

        let probes = || {
            vec![
                SelectorProbe::records("s1", records.clone()),
                SelectorProbe::records("s2", vec![format!("v=DKIM1; p={RSA_2048_SPKI}")]),
                SelectorProbe::timed_out("s3"),
            ]
        };
        let dkim = evaluate_dkim_probes("example.com", probes());
        prop_assert_eq!(&dkim, &evaluate_dkim_probes("example.com", probes()));

        #[cfg(feature = "with-serde")]
        {
            let first = serde_json::to_string(&spf).expect("serialize");
            let second = serde_json::to_string(&evaluate_spf("example.com", &records)).expect("serialize");
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn arbitrary_records_never_panic(record in "\\PC{0,200}") {
        let spf_record = format!("v=spf1 {record}");
        let dmarc_record = format!("v=DMARC1; {record}");
        let _ = evaluate_spf("example.com", &[spf_record]);
        let _ = evaluate_dmarc("example.com", &[dmarc_record]);
        let _ = evaluate_dkim_probes("example.com", vec![SelectorProbe::records("s", vec![record])]);
    }
}
