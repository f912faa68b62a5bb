use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::level::{ConformanceLevel, parse_level};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

impl VerbosityLevel {
    /// Tracing filter used when `RUST_LOG` is not set
    pub fn log_filter(self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "info",
            VerbosityLevel::Debug => "debug",
        }
    }
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Per-document report with rule outcomes
    #[default]
    Human,
    /// Machine-readable JSON
    Json,
    /// Totals only
    Summary,
}

/// KML 2.2 conformance validator
#[derive(Parser, Debug, Clone)]
#[command(name = "kml-validate")]
#[command(about = "Check KML 2.2 documents against the conformance rules")]
#[command(version)]
pub struct Cli {
    /// Documents or directories to validate
    #[arg(required_unless_present = "list_rules")]
    pub paths: Vec<PathBuf>,

    /// Conformance level (1, 2 or 3)
    #[arg(short = 'l', long = "level", value_parser = parse_level)]
    pub level: Option<ConformanceLevel>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Verbose output, repeat for debug output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Number of documents validated at once
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Timeout in seconds for remote fetches
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Retry attempts for failed fetches
    #[arg(long = "retry-attempts")]
    pub retry_attempts: Option<u32>,

    /// URI scheme references may use; replaces the configured list
    #[arg(long = "allow-scheme", action = clap::ArgAction::Append)]
    pub allow_schemes: Vec<String>,

    /// File extensions to collect from directories (comma-separated)
    #[arg(short = 'e', long = "extensions")]
    pub extensions: Option<String>,

    /// Evaluate the rules of each document in parallel
    #[arg(long = "parallel-rules")]
    pub parallel_rules: bool,

    /// Stop after the first document that does not pass
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Print the rules active at the chosen level and exit
    #[arg(long = "list-rules")]
    pub list_rules: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|list| {
            list.split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else {
            match self.verbose {
                0 => VerbosityLevel::Normal,
                1 => VerbosityLevel::Verbose,
                _ => VerbosityLevel::Debug,
            }
        }
    }

    /// Checks that need no configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(missing) = self.paths.iter().find(|p| !p.exists()) {
            return Err(format!("Path does not exist: {}", missing.display()));
        }
        if self.threads == Some(0) {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }
}
