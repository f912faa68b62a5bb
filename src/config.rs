use crate::catalog::Catalog;
use crate::cli::{Cli, OutputFormat};
use crate::fetch::FetchConfig;
use crate::level::ConformanceLevel;
use crate::validator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "KML_VALIDATE_";

const CONFIG_NAMES: [&str; 4] = [
    "kml-validate.toml",
    "kml-validate.json",
    ".kml-validate.toml",
    ".kml-validate.json",
];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub network: NetworkConfig,
    pub output: OutputConfig,
    pub files: FileConfig,
}

/// Validation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Conformance level
    pub level: ConformanceLevel,
    /// Number of documents validated at once
    pub threads: Option<usize>,
    /// Stop after the first document that does not pass
    pub fail_fast: bool,
    /// Evaluate the rules of one document in parallel
    pub parallel_rules: bool,
    /// Time allowed for one document, in seconds
    pub timeout_seconds: u64,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed fetches
    pub retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// URI schemes references may use
    pub allowed_schemes: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormatConfig,
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// File discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Extensions collected when walking directories
    pub extensions: Vec<String>,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    #[default]
    Human,
    Json,
    Summary,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
            OutputFormat::Summary => OutputFormatConfig::Summary,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
            OutputFormatConfig::Summary => OutputFormat::Summary,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            level: ConformanceLevel::One,
            threads: None,
            fail_fast: false,
            parallel_rules: false,
            timeout_seconds: 120,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            allowed_schemes: Catalog::kml22().allowed_schemes,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["kml".to_string()],
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli).await
    }

    pub async fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            config = Self::load_from_file(config_path).await?;
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = found_config;
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in the current directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let mut candidates: Vec<PathBuf> = CONFIG_NAMES.iter().map(PathBuf::from).collect();
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("kml-validate");
            candidates.extend(CONFIG_NAMES.iter().map(|name| app_config_dir.join(name)));
        }

        for path in candidates {
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Validation settings
        if let Some(level) = env.get(&format!("{}LEVEL", ENV_PREFIX)) {
            config.validation.level = ConformanceLevel::from_param(Some(&level));
        }
        if let Some(threads) = parse_env(env, "THREADS")? {
            config.validation.threads = Some(threads);
        }
        if let Some(fail_fast) = parse_env(env, "FAIL_FAST")? {
            config.validation.fail_fast = fail_fast;
        }
        if let Some(parallel) = parse_env(env, "PARALLEL_RULES")? {
            config.validation.parallel_rules = parallel;
        }
        if let Some(timeout) = parse_env(env, "VALIDATION_TIMEOUT")? {
            config.validation.timeout_seconds = timeout;
        }

        // Network settings
        if let Some(timeout) = parse_env(env, "TIMEOUT")? {
            config.network.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = parse_env(env, "RETRY_ATTEMPTS")? {
            config.network.retry_attempts = retry_attempts;
        }
        if let Some(retry_delay) = parse_env(env, "RETRY_DELAY_MS")? {
            config.network.retry_delay_ms = retry_delay;
        }
        if let Some(schemes) = env.get(&format!("{}ALLOWED_SCHEMES", ENV_PREFIX)) {
            config.network.allowed_schemes = split_list(&schemes);
        }

        // Output settings
        if let Some(verbose) = parse_env(env, "VERBOSE")? {
            config.output.verbose = verbose;
        }
        if let Some(quiet) = parse_env(env, "QUIET")? {
            config.output.quiet = quiet;
        }
        if let Some(format) = env.get(&format!("{}FORMAT", ENV_PREFIX)) {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                "summary" => OutputFormatConfig::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid {}FORMAT value: {}",
                        ENV_PREFIX, format
                    )));
                }
            };
        }

        // File settings
        if let Some(extensions) = env.get(&format!("{}EXTENSIONS", ENV_PREFIX)) {
            config.files.extensions = split_list(&extensions);
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(level) = cli.level {
            config.validation.level = level;
        }
        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }
        config.validation.fail_fast |= cli.fail_fast;
        config.validation.parallel_rules |= cli.parallel_rules;

        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = cli.retry_attempts {
            config.network.retry_attempts = retry_attempts;
        }
        if !cli.allow_schemes.is_empty() {
            config.network.allowed_schemes = cli.allow_schemes.clone();
        }

        if let Some(format) = cli.format {
            config.output.format = format.into();
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        } else if cli.verbose > 0 {
            config.output.verbose = true;
            config.output.quiet = false;
        }

        if let Some(extensions) = cli.get_extensions() {
            config.files.extensions = extensions;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.validation.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Validation timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        if config.network.allowed_schemes.is_empty() {
            return Err(ConfigError::Validation(
                "At least one URI scheme must be allowed".to_string(),
            ));
        }
        for scheme in &config.network.allowed_schemes {
            let well_formed = scheme
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !well_formed {
                return Err(ConfigError::Validation(format!(
                    "Invalid URI scheme: {}",
                    scheme
                )));
            }
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.files.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }
        for ext in &config.files.extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {}",
                    ext
                )));
            }
        }

        Ok(())
    }

    /// Get the effective thread count
    pub fn get_thread_count(config: &Config) -> usize {
        config.validation.threads.unwrap_or_else(num_cpus::get)
    }

    /// Settings for remote fetches
    pub fn fetch_config(config: &Config) -> FetchConfig {
        FetchConfig {
            timeout_seconds: config.network.timeout_seconds,
            retry_attempts: config.network.retry_attempts,
            retry_delay_ms: config.network.retry_delay_ms,
            ..FetchConfig::default()
        }
    }

    /// Settings for the multi-file engine
    pub fn engine_config(config: &Config) -> validator::ValidationConfig {
        validator::ValidationConfig {
            max_concurrent_validations: Self::get_thread_count(config),
            validation_timeout: Duration::from_secs(config.validation.timeout_seconds),
            fail_fast: config.validation.fail_fast,
            level: config.validation.level,
            parallel_rules: config.validation.parallel_rules,
        }
    }

    /// The KML 2.2 catalog with the configured scheme allow-list
    pub fn catalog(config: &Config) -> Catalog {
        Catalog::kml22().with_allowed_schemes(config.network.allowed_schemes.clone())
    }
}

fn parse_env<T: std::str::FromStr>(env: &impl EnvProvider, name: &str) -> Result<Option<T>> {
    let key = format!("{}{}", ENV_PREFIX, name);
    match env.get(&key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
