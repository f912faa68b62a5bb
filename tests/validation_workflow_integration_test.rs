//! End-to-end workflow: discovery, concurrent validation and aggregation

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kml_validate::{
    ConformanceLevel, FileDiscovery, FileFetcher, ProgressCallback, ValidationConfig,
    ValidationEngine, ValidationPhase, ValidationProgress, ValidationStatus,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::mocks::MockFetcher;
use common::test_helpers::{clean_document, create_temp_kml_files, kml, suite, write_file};

fn engine(level: ConformanceLevel, config: ValidationConfig) -> ValidationEngine {
    ValidationEngine::new(
        Arc::new(suite(level)),
        Arc::new(MockFetcher::new()),
        ValidationConfig { level, ..config },
    )
}

#[tokio::test]
async fn test_directory_workflow() {
    let dir = create_temp_kml_files();
    let files = FileDiscovery::new()
        .discover(&[dir.path().to_path_buf()])
        .unwrap();
    assert_eq!(files.len(), 3);

    let results = engine(ConformanceLevel::Two, ValidationConfig::default())
        .validate(files, None)
        .await
        .unwrap();

    assert_eq!(results.total_files, 3);
    assert_eq!(results.valid_files, 1);
    assert_eq!(results.invalid_files, 1);
    assert_eq!(results.error_files, 1);
    assert!(results.has_errors());

    let statuses: Vec<_> = results
        .file_results
        .iter()
        .map(|r| {
            let name = r.path.file_name().unwrap().to_string_lossy().to_string();
            (name, r.status.clone())
        })
        .collect();
    assert_eq!(statuses[0], ("clean.kml".to_string(), ValidationStatus::Valid));
    assert!(matches!(statuses[1], (ref n, ValidationStatus::Error { .. }) if n == "broken.kml"));
    assert!(
        matches!(statuses[2], (ref n, ValidationStatus::Invalid { failed_rules: 3, .. }) if n == "flawed.kml")
    );
}

#[tokio::test]
async fn test_local_references_through_file_fetcher() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "styles.kml",
        &kml(r#"<Document><Style id="shared"><IconStyle><scale>2</scale></IconStyle></Style></Document>"#),
    );
    let doc = write_file(
        dir.path(),
        "doc.kml",
        &kml(
            "<Document>\
               <Placemark><styleUrl>styles.kml#shared</styleUrl><Point><coordinates>1,2</coordinates></Point></Placemark>\
               <Placemark><styleUrl>styles.kml#absent</styleUrl><Point><coordinates>1,2</coordinates></Point></Placemark>\
             </Document>",
        ),
    );

    let engine = ValidationEngine::new(
        Arc::new(suite(ConformanceLevel::One)),
        Arc::new(FileFetcher),
        ValidationConfig::default(),
    );
    let results = engine.validate(vec![doc], None).await.unwrap();
    let result = &results.file_results[0];

    assert_eq!(
        result.status,
        ValidationStatus::Invalid {
            failed_rules: 1,
            violations: 1
        }
    );
    assert_eq!(result.error_details.len(), 1);
    assert!(result.error_details[0].starts_with("style-url: [ERROR] no element with id 'absent'"));
}

#[tokio::test]
async fn test_kmz_input_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tour.kmz");
    std::fs::write(&path, b"PK\x03\x04rest-of-archive").unwrap();

    let results = engine(ConformanceLevel::One, ValidationConfig::default())
        .validate(vec![path], None)
        .await
        .unwrap();
    match &results.file_results[0].status {
        ValidationStatus::Error { message } => assert!(message.contains("KMZ")),
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn test_bounded_concurrency_reports_progress() {
    let dir = TempDir::new().unwrap();
    let files: Vec<_> = (0..12)
        .map(|i| write_file(dir.path(), &format!("doc{:02}.kml", i), &clean_document()))
        .collect();

    let updates = Arc::new(AtomicUsize::new(0));
    let phases = Arc::new(Mutex::new(Vec::new()));
    let (counter, sink) = (Arc::clone(&updates), Arc::clone(&phases));
    let callback: ProgressCallback = Arc::new(move |progress: ValidationProgress| {
        if progress.phase == ValidationPhase::Validation {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        sink.lock().unwrap().push(progress.phase);
    });

    let config = ValidationConfig {
        max_concurrent_validations: 3,
        validation_timeout: Duration::from_secs(30),
        ..ValidationConfig::default()
    };
    let results = engine(ConformanceLevel::Three, config)
        .validate(files.clone(), Some(callback))
        .await
        .unwrap();

    assert!(results.all_valid());
    assert_eq!(results.success_rate(), 100.0);
    assert_eq!(updates.load(Ordering::SeqCst), 12);
    assert_eq!(
        phases.lock().unwrap().last().copied(),
        Some(ValidationPhase::Complete)
    );

    let paths: Vec<_> = results.file_results.iter().map(|r| r.path.clone()).collect();
    assert_eq!(paths, files);
}

#[tokio::test]
async fn test_parallel_rules_match_sequential_results() {
    let dir = create_temp_kml_files();
    let files = FileDiscovery::new()
        .discover(&[dir.path().to_path_buf()])
        .unwrap();

    let sequential = engine(ConformanceLevel::Three, ValidationConfig::default())
        .validate(files.clone(), None)
        .await
        .unwrap();
    let parallel = ValidationEngine::new(
        Arc::new(suite(ConformanceLevel::Three).with_parallel_rules(true)),
        Arc::new(MockFetcher::new()),
        ValidationConfig {
            level: ConformanceLevel::Three,
            parallel_rules: true,
            ..ValidationConfig::default()
        },
    )
    .validate(files, None)
    .await
    .unwrap();

    let details = |r: &kml_validate::ValidationResults| {
        r.file_results
            .iter()
            .map(|f| f.error_details.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(details(&sequential), details(&parallel));
    assert_eq!(sequential.total_violations, parallel.total_violations);
}
