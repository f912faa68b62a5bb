use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use kml_validate::cli::{Cli, VerbosityLevel};
use kml_validate::config::{ConfigError, ConfigManager};
use kml_validate::error::ValidationError;
use kml_validate::error_reporter::ErrorReporter;
use kml_validate::fetch::{CachingFetcher, DefaultFetcher};
use kml_validate::file_discovery::FileDiscovery;
use kml_validate::output::{Output, format_rule_list};
use kml_validate::suite::Suite;
use kml_validate::validator::{ProgressCallback, ValidationEngine, ValidationProgress};

/// Fetched resources kept per run
const FETCH_CACHE_ENTRIES: u64 = 1024;

/// Every document passed
const EXIT_PASSED: u8 = 0;
/// At least one rule failed or a document could not be checked
const EXIT_FAILED: u8 = 1;
/// Bad arguments or configuration
const EXIT_PRECONDITION: u8 = 2;

enum Failure {
    Config(ConfigError),
    Validation(ValidationError),
    Other(anyhow::Error),
}

impl From<ConfigError> for Failure {
    fn from(err: ConfigError) -> Self {
        Failure::Config(err)
    }
}

impl From<ValidationError> for Failure {
    fn from(err: ValidationError) -> Self {
        Failure::Validation(err)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Failure::Other(err)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    let reporter = ErrorReporter::new(cli.verbosity());
    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(Failure::Config(err)) => {
            reporter.report_config_error(&err);
            ExitCode::from(EXIT_PRECONDITION)
        }
        Err(Failure::Validation(err)) => {
            reporter.report_validation_error(&err);
            ExitCode::from(EXIT_PRECONDITION)
        }
        Err(Failure::Other(err)) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(EXIT_PRECONDITION)
        }
    }
}

/// `RUST_LOG` wins over the verbosity flags
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.verbosity().log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<u8, Failure> {
    let config = ConfigManager::load_config(cli).await?;
    let catalog = Arc::new(ConfigManager::catalog(&config));
    let suite = Suite::new(catalog, config.validation.level)
        .with_parallel_rules(config.validation.parallel_rules);

    if cli.list_rules {
        print!("{}", format_rule_list(&suite));
        return Ok(EXIT_PASSED);
    }

    cli.validate()
        .map_err(|msg| Failure::Validation(ValidationError::Config(msg)))?;

    let files = FileDiscovery::new()
        .with_extensions(config.files.extensions.clone())
        .discover(&cli.paths)?;
    tracing::info!(files = files.len(), level = %suite.level(), "starting validation");

    let fetcher = CachingFetcher::new(
        DefaultFetcher::new(ConfigManager::fetch_config(&config))?,
        FETCH_CACHE_ENTRIES,
    );
    let engine = ValidationEngine::new(
        Arc::new(suite),
        Arc::new(fetcher),
        ConfigManager::engine_config(&config),
    );

    let verbosity = if config.output.quiet {
        VerbosityLevel::Quiet
    } else if config.output.verbose {
        cli.verbosity().max(VerbosityLevel::Verbose)
    } else {
        VerbosityLevel::Normal
    };
    let progress: Option<ProgressCallback> = if atty::is(atty::Stream::Stderr) {
        let reporter = ErrorReporter::new(verbosity);
        Some(Arc::new(move |update: ValidationProgress| {
            reporter.report_progress(&update)
        }))
    } else {
        None
    };

    let results = engine.validate(files, progress).await?;

    let output = Output::new(config.output.format.into(), verbosity);
    let rendered = output
        .format_results(&results)
        .context("failed to render validation results")?;
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }

    Ok(if results.has_errors() {
        EXIT_FAILED
    } else {
        EXIT_PASSED
    })
}
