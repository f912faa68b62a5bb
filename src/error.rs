use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Main application error type for failures that halt checking of a document
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("Document parsing error: {source_name} - {details}")]
    DocumentParse {
        source_name: String,
        details: String,
    },

    #[error("Unsupported input: {file} - {reason}")]
    UnsupportedInput { file: PathBuf, reason: String },

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

/// Failures while dereferencing a URI into bytes
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("resource not found: {uri}")]
    NotFound { uri: String },

    #[error("resource is empty: {uri}")]
    Empty { uri: String },

    #[error("I/O error reading {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP status {status} for {uri}")]
    HttpStatus { uri: String, status: u16 },

    #[error("request to {uri} timed out after {timeout_seconds} seconds")]
    Timeout { uri: String, timeout_seconds: u64 },

    #[error("HTTP request to {uri} failed: {details}")]
    Http { uri: String, details: String },

    #[error("unsupported scheme '{scheme}' in {uri}")]
    UnsupportedScheme { uri: String, scheme: String },
}

/// Failures of the node-set selector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("malformed path expression '{expr}' at offset {offset}: {reason}")]
    Syntax {
        expr: String,
        offset: usize,
        reason: String,
    },

    #[error("unbound namespace prefix '{prefix}' in path expression '{expr}'")]
    UnboundPrefix { expr: String, prefix: String },

    #[error("path expression '{expr}' is not applicable: {reason}")]
    NotApplicable { expr: String, reason: String },
}

/// A rule could not be evaluated at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorError {
    #[error("node-set selection failed: {0}")]
    Selection(#[from] SelectorError),
}

/// Internal failure while applying a predicate to a single node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("nested selection failed: {0}")]
    Selection(#[from] SelectorError),

    #[error("invalid number '{value}' in {element}")]
    InvalidNumber { element: String, value: String },

    #[error("unexpected document structure: {0}")]
    Structure(String),
}

/// Ring data that cannot be turned into a usable planar boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("invalid coordinate tuple '{tuple}'")]
    InvalidTuple { tuple: String },

    #[error("ring has {count} coordinate tuples, at least 4 are required")]
    TooFewPoints { count: usize },

    #[error("ring is not closed (first and last tuples differ)")]
    NotClosed,

    #[error("ring encloses zero area")]
    ZeroArea,

    #[error("ring is self-intersecting")]
    SelfIntersecting,
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;
