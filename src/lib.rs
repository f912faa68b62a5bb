//! # kml-validate Library
//!
//! Checks KML 2.2 documents against a catalog of conformance rules grouped
//! into three levels. Each rule selects nodes with a path expression, tests
//! a structural or semantic constraint and records violations with an
//! XPointer-style location. References to other resources, local fragments
//! as well as remote documents, are dereferenced and checked for existence
//! and media type.
//!
//! ```no_run
//! use std::sync::Arc;
//! use kml_validate::{Catalog, ConformanceLevel, Document, FileFetcher, Suite};
//!
//! let doc = Document::load("doc.kml".as_ref())?;
//! let suite = Suite::new(Arc::new(Catalog::kml22()), ConformanceLevel::Two);
//! let report = suite.run(&doc, &FileFetcher);
//! println!("{}", report.report());
//! # Ok::<(), kml_validate::ValidationError>(())
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod error_reporter;
pub mod evaluator;
pub mod fetch;
pub mod file_discovery;
pub mod ledger;
pub mod level;
pub mod output;
pub mod pointer;
pub mod resolver;
pub mod rules;
pub mod selector;
pub mod suite;
pub mod topology;
pub mod validator;

pub use catalog::{Catalog, MediaFamily, Namespaces};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager, EnvProvider};
pub use document::{Document, ElementKind, KmlTag, Node, NodeId};
pub use error::{
    EvaluatorError, FetchError, Result, RuleError, SelectorError, TopologyError, ValidationError,
};
pub use error_reporter::ErrorReporter;
pub use evaluator::RuleContext;
pub use fetch::{
    CachingFetcher, DefaultFetcher, FetchConfig, FetchedResource, FileFetcher, HttpFetcher,
    ResourceFetcher,
};
pub use file_discovery::FileDiscovery;
pub use ledger::{Ledger, Severity, Violation};
pub use level::{ConformanceLevel, LevelGate};
pub use output::Output;
pub use pointer::LocationPointer;
pub use resolver::{Expectation, Reference, ReferenceResolver, Resolution};
pub use rules::{Rule, RuleGroup};
pub use selector::{PathInterpreter, Selector};
pub use suite::{RuleOutcome, Suite, SuiteReport, Verdict};
pub use validator::{
    FileValidationResult, ProgressCallback, ValidationConfig, ValidationEngine, ValidationPhase,
    ValidationProgress, ValidationResults, ValidationStatus,
};
