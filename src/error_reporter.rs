use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::ValidationError;
use crate::validator::{ValidationPhase, ValidationProgress};

/// Renders precondition and configuration failures on stderr
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
}

impl ErrorReporter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
        }
    }

    pub fn with_timestamps(mut self, show_timestamps: bool) -> Self {
        self.show_timestamps = show_timestamps;
        self
    }

    pub fn report_validation_error(&self, error: &ValidationError) {
        if let Some(text) = self.format_validation_error(error) {
            eprintln!("{}", text);
        }
    }

    pub fn report_config_error(&self, error: &ConfigError) {
        eprintln!("{}", self.format_config_error(error));
    }

    /// Text for a validation error, or nothing when quiet mode hides it
    pub fn format_validation_error(&self, error: &ValidationError) -> Option<String> {
        match self.verbosity {
            VerbosityLevel::Quiet => {
                Self::is_critical_error(error).then(|| format!("ERROR: {}", error))
            }
            VerbosityLevel::Normal => Some(self.format_error_normal(error)),
            VerbosityLevel::Verbose => Some(self.format_error_verbose(error)),
            VerbosityLevel::Debug => Some(self.format_error_debug(error)),
        }
    }

    pub fn format_config_error(&self, error: &ConfigError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!("Configuration Error: {}\n{}", error, config_help(error))
            }
            VerbosityLevel::Debug => format!(
                "Configuration Error: {}\nDebug: {:?}\n{}",
                error,
                error,
                config_help(error)
            ),
        }
    }

    /// Single-line progress on stderr while documents are checked
    pub fn report_progress(&self, progress: &ValidationProgress) {
        if self.verbosity == VerbosityLevel::Quiet
            || progress.phase != ValidationPhase::Validation
            || progress.total == 0
        {
            return;
        }

        let percentage = (progress.completed as f64 / progress.total as f64 * 100.0) as u32;
        match (&progress.current_file, self.verbosity >= VerbosityLevel::Verbose) {
            (Some(file), true) => eprint!(
                "\rProgress: {}/{} ({}%) - {}",
                progress.completed,
                progress.total,
                percentage,
                file.display()
            ),
            _ => eprint!(
                "\rProgress: {}/{} ({}%)",
                progress.completed, progress.total, percentage
            ),
        }
        if progress.completed == progress.total {
            eprintln!();
        }
    }

    fn is_critical_error(error: &ValidationError) -> bool {
        matches!(
            error,
            ValidationError::Config(_) | ValidationError::Concurrency { .. }
        )
    }

    fn format_error_normal(&self, error: &ValidationError) -> String {
        let timestamp = if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        };
        format!("{}{}", timestamp, error)
    }

    fn format_error_verbose(&self, error: &ValidationError) -> String {
        let mut output = self.format_error_normal(error);
        if let Some(hint) = validation_hint(error) {
            output.push_str("\nSuggestion: ");
            output.push_str(&hint);
        }
        output
    }

    fn format_error_debug(&self, error: &ValidationError) -> String {
        let mut output = self.format_error_verbose(error);
        output.push_str(&format!("\nDebug Info: {:?}", error));

        output.push_str("\nError Chain:");
        let mut current_error: &dyn std::error::Error = error;
        let mut level = 0;
        while let Some(source) = current_error.source() {
            output.push_str(&format!("\n  {}: {}", level + 1, source));
            current_error = source;
            level += 1;
        }
        output
    }
}

fn validation_hint(error: &ValidationError) -> Option<String> {
    match error {
        ValidationError::Io(_) => Some("Check that the path exists and is readable".to_string()),
        ValidationError::Http(_) | ValidationError::HttpStatus { .. } => {
            Some("Check network connectivity and URL validity".to_string())
        }
        ValidationError::Timeout { .. } => {
            Some("Raise --timeout or check that the remote host responds".to_string())
        }
        ValidationError::DocumentParse { source_name, .. } => Some(format!(
            "{} must be well-formed UTF-8 XML",
            source_name
        )),
        ValidationError::UnsupportedInput { file, .. } => Some(format!(
            "Extract {} and validate the doc.kml inside it",
            file.display()
        )),
        ValidationError::Config(_) => {
            Some("Run with --help to see the accepted options".to_string())
        }
        _ => None,
    }
}

fn config_help(error: &ConfigError) -> String {
    match error {
        ConfigError::Io(_) => "Check that the configuration file exists and is readable".to_string(),
        ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
            "Check the configuration file syntax (TOML/JSON format expected)".to_string()
        }
        ConfigError::Validation(_) => {
            "Fix the value in the configuration file, KML_VALIDATE_* environment or command line"
                .to_string()
        }
        ConfigError::Environment(_) => {
            "Unset or correct the KML_VALIDATE_* environment variable".to_string()
        }
        ConfigError::UnsupportedFormat(_) => {
            "Use a configuration file ending in .toml or .json".to_string()
        }
    }
}
