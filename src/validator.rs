//! Multi-file validation engine
//!
//! Documents are validated concurrently with bounded parallelism:
//! - **Async orchestration**: one `tokio::spawn` task per file, gated by a semaphore
//! - **Blocking evaluation**: parsing and the rule suite run under `spawn_blocking`,
//!   so remote fetches made by rules never block a runtime worker
//! - **Per-file timeout**: a document that takes too long yields an error result
//! - **Result aggregation**: `futures::try_join_all` collects the results in input order

use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{Result, ValidationError};
use crate::fetch::ResourceFetcher;
use crate::level::ConformanceLevel;
use crate::suite::{Suite, SuiteReport, Verdict};

/// Validation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Number of documents validated at once
    pub max_concurrent_validations: usize,
    /// Timeout for one document
    pub validation_timeout: Duration,
    /// Skip the remaining documents after the first one that does not pass
    pub fail_fast: bool,
    /// Conformance level the suite was built for
    pub level: ConformanceLevel,
    /// Evaluate the rules of one document in parallel
    pub parallel_rules: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: num_cpus::get(),
            validation_timeout: Duration::from_secs(30),
            fail_fast: false,
            level: ConformanceLevel::One,
            parallel_rules: false,
        }
    }
}

/// Status of a single document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationStatus {
    /// Every rule passed
    Valid,
    /// At least one rule failed or aborted
    Invalid {
        failed_rules: usize,
        violations: usize,
    },
    /// The document could not be read or parsed
    Error { message: String },
    /// Not validated because an earlier document failed in fail-fast mode
    Skipped { reason: String },
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationStatus::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationStatus::Error { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ValidationStatus::Skipped { .. })
    }
}

/// Result of validating a single document
#[derive(Debug, Clone, Serialize)]
pub struct FileValidationResult {
    pub path: PathBuf,
    pub status: ValidationStatus,
    pub duration: Duration,
    /// Per-rule outcomes, present whenever the suite ran
    pub report: Option<SuiteReport>,
    /// One line per failing violation, or the error message
    pub error_details: Vec<String>,
}

impl FileValidationResult {
    /// Build the result for a completed suite run
    pub fn from_report(path: PathBuf, report: SuiteReport, duration: Duration) -> Self {
        if report.passed() {
            return Self {
                path,
                status: ValidationStatus::Valid,
                duration,
                report: Some(report),
                error_details: Vec::new(),
            };
        }

        let failed = report.failed_rules();
        let mut error_details = Vec::new();
        for outcome in &failed {
            if let Verdict::Aborted { reason } = &outcome.verdict {
                error_details.push(format!("{}: aborted: {}", outcome.id, reason));
            }
            for violation in outcome.ledger.iter().filter(|v| v.severity.is_failure()) {
                error_details.push(format!("{}: {}", outcome.id, violation));
            }
        }
        let status = ValidationStatus::Invalid {
            failed_rules: failed.len(),
            violations: report.violation_count(),
        };
        Self {
            path,
            status,
            duration,
            report: Some(report),
            error_details,
        }
    }

    pub fn error(path: PathBuf, error: ValidationError, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Error {
                message: error.to_string(),
            },
            duration,
            report: None,
            error_details: vec![error.to_string()],
        }
    }

    pub fn skipped(path: PathBuf, reason: String) -> Self {
        Self {
            path,
            status: ValidationStatus::Skipped {
                reason: reason.clone(),
            },
            duration: Duration::ZERO,
            report: None,
            error_details: vec![reason],
        }
    }
}

/// Progress update for validation
#[derive(Debug, Clone)]
pub struct ValidationProgress {
    /// Document that just finished
    pub current_file: Option<PathBuf>,
    pub completed: usize,
    pub total: usize,
    pub phase: ValidationPhase,
}

/// Phase of validation process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    Discovery,
    Validation,
    Aggregation,
    Complete,
}

/// Aggregated results of validating multiple documents
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResults {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub error_files: usize,
    pub skipped_files: usize,
    /// Number of failing rule outcomes across all documents
    pub failed_rules: usize,
    /// Number of recorded violations across all documents, warnings included
    pub total_violations: usize,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub file_results: Vec<FileValidationResult>,
}

impl ValidationResults {
    /// Aggregate individual file results into summary
    pub fn aggregate(file_results: Vec<FileValidationResult>) -> Self {
        let total_files = file_results.len();
        let mut valid_files = 0;
        let mut invalid_files = 0;
        let mut error_files = 0;
        let mut skipped_files = 0;
        let mut failed_rules = 0;
        let mut total_violations = 0;
        let mut total_duration = Duration::ZERO;

        for result in &file_results {
            match result.status {
                ValidationStatus::Valid => valid_files += 1,
                ValidationStatus::Invalid {
                    failed_rules: failed,
                    ..
                } => {
                    invalid_files += 1;
                    failed_rules += failed;
                }
                ValidationStatus::Error { .. } => error_files += 1,
                ValidationStatus::Skipped { .. } => skipped_files += 1,
            }
            if let Some(report) = &result.report {
                total_violations += report.violation_count();
            }
            total_duration += result.duration;
        }

        let average_duration = if total_files > 0 {
            total_duration / total_files as u32
        } else {
            Duration::ZERO
        };

        Self {
            total_files,
            valid_files,
            invalid_files,
            error_files,
            skipped_files,
            failed_rules,
            total_violations,
            total_duration,
            average_duration,
            file_results,
        }
    }

    /// Check if all files validated successfully
    pub fn all_valid(&self) -> bool {
        self.valid_files == self.total_files && self.total_files > 0
    }

    /// Check if any file failed a rule or could not be validated
    pub fn has_errors(&self) -> bool {
        self.error_files > 0 || self.invalid_files > 0
    }

    /// Get success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.valid_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Progress callback type for validation updates
pub type ProgressCallback = Arc<dyn Fn(ValidationProgress) + Send + Sync>;

/// Runs one [`Suite`] over many documents
pub struct ValidationEngine {
    suite: Arc<Suite>,
    fetcher: Arc<dyn ResourceFetcher>,
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(suite: Arc<Suite>, fetcher: Arc<dyn ResourceFetcher>, config: ValidationConfig) -> Self {
        Self {
            suite,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    /// Validate documents and aggregate the results
    pub async fn validate(
        &self,
        files: Vec<PathBuf>,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<ValidationResults> {
        let results = self
            .validate_files_with_progress(files, progress_callback.clone())
            .await?;

        if let Some(ref callback) = progress_callback {
            callback(ValidationProgress {
                current_file: None,
                completed: results.len(),
                total: results.len(),
                phase: ValidationPhase::Aggregation,
            });
        }
        let aggregated = ValidationResults::aggregate(results);
        if let Some(ref callback) = progress_callback {
            callback(ValidationProgress {
                current_file: None,
                completed: aggregated.total_files,
                total: aggregated.total_files,
                phase: ValidationPhase::Complete,
            });
        }
        info!(
            files = aggregated.total_files,
            valid = aggregated.valid_files,
            invalid = aggregated.invalid_files,
            errors = aggregated.error_files,
            "validation finished"
        );
        Ok(aggregated)
    }

    /// Validate a list of documents
    pub async fn validate_files(&self, files: Vec<PathBuf>) -> Result<Vec<FileValidationResult>> {
        self.validate_files_with_progress(files, None).await
    }

    /// Validate a list of documents with progress tracking. Results keep the
    /// order of `files`.
    pub async fn validate_files_with_progress(
        &self,
        files: Vec<PathBuf>,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<Vec<FileValidationResult>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        if self.config.max_concurrent_validations == 0 {
            return Err(ValidationError::Config(
                "max_concurrent_validations must be at least 1".to_string(),
            ));
        }

        let total_files = files.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let halted = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.max_concurrent_validations,
        ));

        let validation_tasks: Vec<_> = files
            .into_iter()
            .map(|file_path| {
                let suite = Arc::clone(&self.suite);
                let fetcher = Arc::clone(&self.fetcher);
                let semaphore = Arc::clone(&semaphore);
                let timeout = self.config.validation_timeout;
                let fail_fast = self.config.fail_fast;
                let progress_callback = progress_callback.clone();
                let completed = Arc::clone(&completed);
                let halted = Arc::clone(&halted);

                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.map_err(|_| {
                        ValidationError::Concurrency {
                            details: "validation semaphore closed".to_string(),
                        }
                    })?;

                    let validation_result = if halted.load(Ordering::SeqCst) {
                        FileValidationResult::skipped(
                            file_path.clone(),
                            "skipped after an earlier failure".to_string(),
                        )
                    } else {
                        Self::validate_single_file(file_path.clone(), suite, fetcher, timeout)
                            .await
                    };

                    if fail_fast
                        && (validation_result.status.is_invalid()
                            || validation_result.status.is_error())
                    {
                        halted.store(true, Ordering::SeqCst);
                    }

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = progress_callback {
                        callback(ValidationProgress {
                            current_file: Some(file_path),
                            completed: done,
                            total: total_files,
                            phase: ValidationPhase::Validation,
                        });
                    }

                    Ok::<FileValidationResult, ValidationError>(validation_result)
                })
            })
            .collect();

        let task_results =
            try_join_all(validation_tasks)
                .await
                .map_err(|e| ValidationError::Concurrency {
                    details: format!("Task join error: {}", e),
                })?;

        let mut file_results = Vec::with_capacity(task_results.len());
        for result in task_results {
            file_results.push(result?);
        }
        Ok(file_results)
    }

    async fn validate_single_file(
        file_path: PathBuf,
        suite: Arc<Suite>,
        fetcher: Arc<dyn ResourceFetcher>,
        timeout: Duration,
    ) -> FileValidationResult {
        let start_time = Instant::now();
        debug!(path = %file_path.display(), "validating document");

        let path = file_path.clone();
        let work = tokio::task::spawn_blocking(move || {
            let document = Document::load(&path)?;
            Ok::<SuiteReport, ValidationError>(suite.run(&document, fetcher.as_ref()))
        });

        match tokio::time::timeout(timeout, work).await {
            Ok(Ok(Ok(report))) => {
                FileValidationResult::from_report(file_path, report, start_time.elapsed())
            }
            Ok(Ok(Err(err))) => {
                warn!(path = %file_path.display(), error = %err, "document could not be validated");
                FileValidationResult::error(file_path, err, start_time.elapsed())
            }
            Ok(Err(join_err)) => FileValidationResult::error(
                file_path,
                ValidationError::Concurrency {
                    details: format!("validation task failed: {}", join_err),
                },
                start_time.elapsed(),
            ),
            Err(_) => {
                warn!(path = %file_path.display(), ?timeout, "document validation timed out");
                FileValidationResult::error(
                    file_path.clone(),
                    ValidationError::Timeout {
                        url: file_path.display().to_string(),
                        timeout_seconds: timeout.as_secs(),
                    },
                    timeout,
                )
            }
        }
    }
}
