use std::collections::HashSet;

use kml_validate::{ConformanceLevel, Severity, Verdict};
use pretty_assertions::assert_eq;

use crate::common::mocks::MockFetcher;
use crate::common::test_helpers::{clean_document, flawed_document, kml, parse, suite};

fn ids(level: ConformanceLevel) -> Vec<&'static str> {
    suite(level).rules().iter().map(|(_, rule)| rule.id).collect()
}

#[test]
fn test_levels_are_cumulative() {
    let one = ids(ConformanceLevel::One);
    let two = ids(ConformanceLevel::Two);
    let three = ids(ConformanceLevel::Three);

    // lower levels run first, in the same order
    assert_eq!(&two[..one.len()], one.as_slice());
    assert_eq!(&three[..two.len()], two.as_slice());
    assert!(three.len() > two.len() && two.len() > one.len());

    let unique: HashSet<_> = three.iter().collect();
    assert_eq!(unique.len(), three.len());
}

#[test]
fn test_clean_document_passes_every_level() {
    let doc = parse(&clean_document());
    for level in ConformanceLevel::ALL {
        let report = suite(level).run(&doc, &MockFetcher::new());
        assert!(report.passed(), "level {}:\n{}", level, report.report());
        assert_eq!(report.violation_count(), 0);
    }
}

#[test]
fn test_flawed_document_failures_grow_with_level() {
    let doc = parse(&flawed_document());
    let failed = |level| -> Vec<&'static str> {
        suite(level)
            .run(&doc, &MockFetcher::new())
            .failed_rules()
            .iter()
            .map(|o| o.id)
            .collect()
    };

    assert_eq!(failed(ConformanceLevel::One), vec!["point-single-tuple", "style-url"]);
    assert_eq!(
        failed(ConformanceLevel::Two),
        vec!["point-single-tuple", "style-url", "folder-not-empty"]
    );
    // level 3 only adds warnings
    assert_eq!(failed(ConformanceLevel::Three), failed(ConformanceLevel::Two));
}

#[test]
fn test_warnings_do_not_fail_a_rule() {
    let doc = parse(&flawed_document());
    let report = suite(ConformanceLevel::Three).run(&doc, &MockFetcher::new());
    let deprecated = report.outcome("deprecated-elements").unwrap();
    assert_eq!(deprecated.verdict, Verdict::Pass);
    assert_eq!(deprecated.ledger.count(Severity::Warning), 1);
    assert_eq!(
        deprecated.ledger.entries()[0].message,
        "kml:snippet is deprecated, use kml:Snippet instead"
    );
}

#[test]
fn test_report_rendering() {
    let doc = parse(&kml(
        "<Placemark><Point><coordinates>1,2 3,4</coordinates></Point></Placemark>",
    ));
    let report = suite(ConformanceLevel::One).run(&doc, &MockFetcher::new());
    let total = report.outcomes.len();

    let expected = format!(
        "conformance level 1: {} of {} rules passed\n\
         [FAIL] point-single-tuple (geometry)\n    \
         1 violation recorded\n    \
         [ERROR] kml:Point has 2 coordinate tuples, expected one \
         (xmlns(tns=http://www.opengis.net/kml/2.2)xpointer((//tns:Point)[1]))",
        total - 1,
        total
    );
    assert_eq!(report.report(), expected);
}

#[test]
fn test_runs_are_idempotent() {
    let doc = parse(&flawed_document());
    let fetcher = MockFetcher::new();
    let suite = suite(ConformanceLevel::Three);

    let first = suite.run(&doc, &fetcher);
    let second = suite.run(&doc, &fetcher);
    assert_eq!(first.report(), second.report());
}

#[test]
fn test_parallel_rules_keep_registration_order() {
    let doc = parse(&flawed_document());
    let sequential = suite(ConformanceLevel::Three).run(&doc, &MockFetcher::new());
    let parallel = suite(ConformanceLevel::Three)
        .with_parallel_rules(true)
        .run(&doc, &MockFetcher::new());

    let ids = |r: &kml_validate::SuiteReport| r.outcomes.iter().map(|o| o.id).collect::<Vec<_>>();
    assert_eq!(ids(&sequential), ids(&parallel));
    assert_eq!(sequential.report(), parallel.report());
}

#[test]
fn test_update_contents_are_not_checked() {
    let doc = parse(&kml(
        r#"<NetworkLinkControl><Update><targetHref>http://example.com/data/doc.kml</targetHref>
             <Change><Placemark targetId="p1"><Point><coordinates>1,2 3,4</coordinates></Point></Placemark></Change>
           </Update></NetworkLinkControl>"#,
    ));
    let fetcher = MockFetcher::new();
    fetcher.add_document(
        "http://example.com/data/doc.kml",
        &kml(r#"<Placemark id="p1"/>"#),
    );
    let report = suite(ConformanceLevel::One).run(&doc, &fetcher);
    assert_eq!(
        report.outcome("point-single-tuple").map(|o| &o.verdict),
        Some(&Verdict::Pass)
    );
    assert_eq!(
        report.outcome("update-target").map(|o| &o.verdict),
        Some(&Verdict::Pass)
    );
}
