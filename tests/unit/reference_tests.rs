use kml_validate::{ConformanceLevel, Verdict};
use pretty_assertions::assert_eq;

use crate::common::mocks::MockFetcher;
use crate::common::test_helpers::{kml, parse, suite};

const STYLES: &str = "http://example.com/data/styles.kml";

fn shared_styles() -> String {
    kml(r#"<Document><Style id="red"><LineStyle><color>ff0000ff</color></LineStyle></Style>
           <Placemark id="not-a-style"/></Document>"#)
}

fn messages(report: &kml_validate::SuiteReport, id: &str) -> Vec<String> {
    report
        .outcome(id)
        .unwrap()
        .ledger
        .iter()
        .map(|v| v.message.clone())
        .collect()
}

#[test]
fn test_relative_style_url_resolves_against_base() {
    let fetcher = MockFetcher::new();
    fetcher.add_document(STYLES, &shared_styles());

    let doc = parse(&kml(
        "<Placemark><styleUrl>styles.kml#red</styleUrl></Placemark>",
    ));
    let report = suite(ConformanceLevel::One).run(&doc, &fetcher);

    assert_eq!(report.outcome("style-url").unwrap().verdict, Verdict::Pass);
    assert_eq!(fetcher.requests(), vec![STYLES.to_string()]);
}

#[test]
fn test_external_target_of_wrong_kind() {
    let fetcher = MockFetcher::new();
    fetcher.add_document(STYLES, &shared_styles());

    let doc = parse(&kml(
        "<Placemark><styleUrl>styles.kml#not-a-style</styleUrl></Placemark>",
    ));
    let report = suite(ConformanceLevel::One).run(&doc, &fetcher);

    assert_eq!(
        messages(&report, "style-url"),
        vec!["element 'not-a-style' is kml:Placemark, expected kml:Style or kml:StyleMap"]
    );
}

#[test]
fn test_referenced_document_is_fetched_once_per_run() {
    let fetcher = MockFetcher::new();
    fetcher.add_document(STYLES, &shared_styles());

    let doc = parse(&kml(
        "<Document>\
           <Placemark><styleUrl>styles.kml#red</styleUrl></Placemark>\
           <Placemark><styleUrl>http://example.com/data/styles.kml#red</styleUrl></Placemark>\
         </Document>",
    ));
    suite(ConformanceLevel::One).run(&doc, &fetcher);

    assert_eq!(fetcher.request_count(STYLES), 1);
}

#[test]
fn test_disallowed_scheme_is_never_fetched() {
    let fetcher = MockFetcher::new();
    let doc = parse(&kml(
        "<Document>\
           <Placemark><styleUrl>ftp://example.com/styles.kml#red</styleUrl></Placemark>\
           <NetworkLink><Link><href>ftp://example.com/more.kml</href></Link></NetworkLink>\
         </Document>",
    ));
    let report = suite(ConformanceLevel::One).run(&doc, &fetcher);

    assert!(fetcher.requests().is_empty());
    assert_eq!(
        messages(&report, "style-url"),
        vec!["URI scheme 'ftp' of 'ftp://example.com/styles.kml#red' is not allowed"]
    );
    assert_eq!(report.outcome("link-referent").unwrap().verdict, Verdict::Fail);
}

#[test]
fn test_network_link_referent_media_type() {
    let fetcher = MockFetcher::new();
    fetcher.add_image("http://example.com/data/tiles.png");
    fetcher.add_document("http://example.com/data/more.kml", &kml("<Document/>"));

    let doc = parse(&kml(
        "<Document>\
           <NetworkLink><Link><href>more.kml</href></Link></NetworkLink>\
           <NetworkLink><Link><href>tiles.png</href></Link></NetworkLink>\
         </Document>",
    ));
    let report = suite(ConformanceLevel::One).run(&doc, &fetcher);

    assert_eq!(
        messages(&report, "link-referent"),
        vec!["referent 'tiles.png' has media type image/png, expected a KML resource"]
    );
}

#[test]
fn test_unreachable_referent_reports_status() {
    let fetcher = MockFetcher::new();
    fetcher.add_error_response("http://example.com/data/gone.png", 404);

    let doc = parse(&kml(
        "<GroundOverlay><Icon><href>gone.png</href></Icon>\
           <LatLonBox><north>1</north><south>0</south><east>1</east><west>0</west></LatLonBox>\
         </GroundOverlay>",
    ));
    let report = suite(ConformanceLevel::One).run(&doc, &fetcher);

    let found = messages(&report, "icon-referent");
    assert_eq!(found.len(), 1);
    assert!(found[0].starts_with("referent 'gone.png' is missing"));
    assert!(found[0].contains("HTTP status 404"));
}
