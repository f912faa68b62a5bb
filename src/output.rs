//! Output and reporting
//!
//! Renders validation results as human-readable text, JSON or a summary.

use std::fmt::Write as _;
use std::time::Duration;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::ledger::Severity;
use crate::rules::RuleGroup;
use crate::suite::{Suite, Verdict};
use crate::validator::{FileValidationResult, ValidationResults, ValidationStatus};

/// Output formatter for validation results
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(&self, results: &ValidationResults) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(results),
            OutputFormat::Summary => Ok(self.format_summary(results)),
            OutputFormat::Human => Ok(self.format_human(results)),
        }
    }

    fn format_human(&self, results: &ValidationResults) -> String {
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Quiet {
            for file_result in results.file_results.iter().filter(|r| !r.status.is_valid()) {
                output.push_str(&self.format_file_result(file_result));
                output.push('\n');
            }
            return output;
        }

        for file_result in &results.file_results {
            if file_result.status.is_valid() && self.verbosity < VerbosityLevel::Verbose {
                continue;
            }
            output.push_str(&self.format_file_result(file_result));
            output.push('\n');
        }
        output.push_str(&self.format_summary(results));
        output
    }

    pub fn format_file_result(&self, result: &FileValidationResult) -> String {
        let path_display = result.path.display();
        let duration_str = format_duration(result.duration);

        let mut output = match &result.status {
            ValidationStatus::Valid => format!(
                "{}  {} ({})",
                self.colorize("✓ VALID", "32"),
                path_display,
                duration_str
            ),
            ValidationStatus::Invalid {
                failed_rules,
                violations,
            } => format!(
                "{}  {} ({}) - {} failed rule{}, {} violation{}",
                self.colorize("✗ INVALID", "31"),
                path_display,
                duration_str,
                failed_rules,
                plural(*failed_rules),
                violations,
                plural(*violations)
            ),
            ValidationStatus::Error { message } => format!(
                "{}  {} ({}) - {}",
                self.colorize("⚠ ERROR", "33"),
                path_display,
                duration_str,
                message
            ),
            ValidationStatus::Skipped { reason } => format!(
                "{}  {} - {}",
                self.colorize("- SKIPPED", "36"),
                path_display,
                reason
            ),
        };

        if let Some(report) = &result.report {
            for outcome in &report.outcomes {
                let show = match outcome.verdict {
                    Verdict::Pass => {
                        self.verbosity >= VerbosityLevel::Verbose && !outcome.ledger.is_empty()
                    }
                    _ => true,
                };
                if !show {
                    continue;
                }
                let label = match &outcome.verdict {
                    Verdict::Pass => self.colorize("PASS", "32"),
                    Verdict::Fail => self.colorize("FAIL", "31"),
                    Verdict::Aborted { .. } => self.colorize("ABORTED", "33"),
                };
                let _ = write!(output, "\n  [{}] {}: {}", label, outcome.id, outcome.description);
                if let Verdict::Aborted { reason } = &outcome.verdict {
                    let _ = write!(output, "\n      {}", reason);
                }
                for violation in &outcome.ledger {
                    let severity = match violation.severity {
                        Severity::Warning => self.colorize("WARNING", "33"),
                        Severity::Error => self.colorize("ERROR", "31"),
                        Severity::Fatal => self.colorize("FATAL", "1;31"),
                    };
                    let _ = write!(output, "\n      {} {}", severity, violation.message);
                    if self.verbosity >= VerbosityLevel::Verbose {
                        let _ = write!(output, "\n        at {}", violation.location);
                    }
                }
            }
        }
        output
    }

    fn format_summary(&self, results: &ValidationResults) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Total files: {}\n", results.total_files));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            results.valid_files
        ));

        if results.invalid_files > 0 {
            output.push_str(&format!(
                "  {} {} ({} failed rules)\n",
                self.colorize("Invalid:", "31"),
                results.invalid_files,
                results.failed_rules
            ));
        }
        if results.error_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Errors:", "33"),
                results.error_files
            ));
        }
        if results.skipped_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Skipped:", "36"),
                results.skipped_files
            ));
        }

        output.push_str(&format!("  Violations: {}\n", results.total_violations));
        output.push_str(&format!("  Success rate: {:.1}%\n", results.success_rate()));
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(results.total_duration)
        ));

        if self.verbosity == VerbosityLevel::Debug {
            output.push_str(&format!(
                "  Average per file: {}\n",
                format_duration(results.average_duration)
            ));
        }
        output
    }
}

/// One line per active rule: id, level, group and description
pub fn format_rule_list(suite: &Suite) -> String {
    let mut output = String::new();
    let mut current: Option<&RuleGroup> = None;
    for (group, rule) in suite.rules() {
        if current.is_none_or(|g| g.name != group.name) {
            let _ = writeln!(output, "{} (level {})", group.name, group.level);
            current = Some(group);
        }
        let _ = writeln!(output, "  {:<30} {}", rule.id, rule.description);
    }
    output
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::document::Document;
    use crate::fetch::tests_support::NoFetch;
    use crate::level::ConformanceLevel;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn results() -> ValidationResults {
        let suite = Suite::new(Arc::new(Catalog::kml22()), ConformanceLevel::One);
        let good = Document::parse(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark/></kml>"#,
            None,
        )
        .unwrap();
        let bad = Document::parse(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark><Point><coordinates>1,95</coordinates></Point></Placemark></kml>"#,
            None,
        )
        .unwrap();
        ValidationResults::aggregate(vec![
            FileValidationResult::from_report(
                PathBuf::from("good.kml"),
                suite.run(&good, &NoFetch),
                Duration::from_millis(5),
            ),
            FileValidationResult::from_report(
                PathBuf::from("bad.kml"),
                suite.run(&bad, &NoFetch),
                Duration::from_millis(7),
            ),
        ])
    }

    fn output(format: OutputFormat, verbosity: VerbosityLevel) -> Output {
        Output::new(format, verbosity).with_colors(false)
    }

    #[test]
    fn test_human_output_lists_failures() {
        let text = output(OutputFormat::Human, VerbosityLevel::Normal)
            .format_results(&results())
            .unwrap();
        assert!(text.contains("✗ INVALID  bad.kml"));
        assert!(!text.contains("good.kml"));
        assert!(text.contains("[FAIL] coordinates"));
        assert!(text.contains("ERROR tuple 1: latitude 95 is outside [-90, 90]"));
        assert!(text.contains("Validation Summary:"));
    }

    #[test]
    fn test_verbose_output_shows_locations() {
        let text = output(OutputFormat::Human, VerbosityLevel::Verbose)
            .format_results(&results())
            .unwrap();
        assert!(text.contains("✓ VALID  good.kml"));
        assert!(text.contains("at xmlns(tns=http://www.opengis.net/kml/2.2)xpointer((//tns:coordinates)[1])"));
    }

    #[test]
    fn test_summary_output() {
        let text = output(OutputFormat::Summary, VerbosityLevel::Normal)
            .format_results(&results())
            .unwrap();
        assert!(text.starts_with("Validation Summary:"));
        assert!(text.contains("Total files: 2"));
        assert!(text.contains("Success rate: 50.0%"));
        assert!(!text.contains("bad.kml"));
    }

    #[test]
    fn test_json_output() {
        let text = output(OutputFormat::Json, VerbosityLevel::Normal)
            .format_results(&results())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_files"], 2);
        assert_eq!(value["invalid_files"], 1);
        let bad = &value["file_results"][1];
        assert_eq!(bad["status"]["Invalid"]["failed_rules"], 1);
        let outcomes = bad["report"]["outcomes"].as_array().unwrap();
        let coordinates = outcomes.iter().find(|o| o["id"] == "coordinates").unwrap();
        assert_eq!(coordinates["verdict"], "fail");
        assert_eq!(coordinates["ledger"]["entries"][0]["severity"], "ERROR");
    }

    #[test]
    fn test_rule_list() {
        let suite = Suite::new(Arc::new(Catalog::kml22()), ConformanceLevel::Three);
        let text = format_rule_list(&suite);
        assert!(text.starts_with("document (level 1)\n  kml-root"));
        assert!(text.contains("options (level 3)"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30.0s");
    }
}
