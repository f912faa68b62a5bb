//! Cross-reference resolution
//!
//! Textual references (`styleUrl`, `schemaUrl`, `targetHref`, link hrefs)
//! are checked in a fixed order and every failed check is kept on the
//! returned [`Reference`]:
//!
//! 1. the text must be a well-formed URI reference; nothing else is checked
//!    when it is not
//! 2. an absolute reference must use an allowed scheme, and a fragment must
//!    be present when the caller requires one; both are checked before
//!    resolution stops on either
//! 3. the target document must load
//! 4. the fragment must name an element of the expected kind
//!
//! The resolver reports problems as values and never fails a run.

use std::sync::{Arc, OnceLock};

use moka::sync::Cache;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::catalog::Catalog;
use crate::document::{Document, KmlTag, Node, NodeId};
use crate::fetch::{FetchedResource, ResourceFetcher};
use crate::ledger::Ledger;

static REFERENCE_REGEX: OnceLock<Regex> = OnceLock::new();
static SCHEME_REGEX: OnceLock<Regex> = OnceLock::new();

/// Characters allowed in a URI reference, with well-formed percent escapes
fn reference_regex() -> &'static Regex {
    REFERENCE_REGEX.get_or_init(|| {
        Regex::new(r#"^(?:[^%\s<>"{}|\\^`\x00-\x1f\x7f]|%[0-9A-Fa-f]{2})*$"#)
            .expect("Failed to compile URI reference regex")
    })
}

fn scheme_regex() -> &'static Regex {
    SCHEME_REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").expect("Failed to compile scheme regex")
    })
}

/// Whether a reference must carry a fragment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentPolicy {
    Required,
    Optional,
}

/// What a caller expects a reference to point at
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'e> {
    pub fragment: FragmentPolicy,
    /// Acceptable target kinds; empty accepts any element
    pub family: &'e [KmlTag],
}

impl<'e> Expectation<'e> {
    pub fn element_of(family: &'e [KmlTag]) -> Self {
        Self {
            fragment: FragmentPolicy::Required,
            family,
        }
    }

    pub fn document() -> Self {
        Self {
            fragment: FragmentPolicy::Optional,
            family: &[],
        }
    }
}

/// One failed reference check
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceFailure {
    #[error("'{raw}' is not a valid URI reference: {reason}")]
    Malformed { raw: String, reason: String },

    #[error("URI scheme '{scheme}' of '{raw}' is not allowed")]
    UnsupportedScheme { raw: String, scheme: String },

    #[error("'{raw}' has no fragment identifier")]
    MissingFragment { raw: String },

    #[error("cannot load '{uri}': {reason}")]
    Unreachable { uri: String, reason: String },

    #[error("no element with id '{id}' in {location}")]
    TargetNotFound { id: String, location: String },

    #[error("element '{id}' is {found}, expected {expected}")]
    WrongTargetType {
        id: String,
        found: String,
        expected: String,
    },
}

/// Where a reference ended up
#[derive(Debug, Clone)]
pub enum Resolution {
    Unresolved,
    ResolvedLocal(NodeId),
    ResolvedExternal(Arc<Document>, NodeId),
    /// A fragment-less reference to a whole external document
    ResolvedDocument(Arc<Document>),
}

/// Outcome of resolving one textual reference
#[derive(Debug, Clone)]
pub struct Reference {
    pub raw: String,
    pub is_absolute: bool,
    pub fragment: Option<String>,
    pub resolution: Resolution,
    pub failures: Vec<ReferenceFailure>,
}

impl Reference {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            is_absolute: false,
            fragment: None,
            resolution: Resolution::Unresolved,
            failures: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// The target element, with the document that owns it
    pub fn target<'d>(&'d self, local: &'d Document) -> Option<Node<'d>> {
        match &self.resolution {
            Resolution::ResolvedLocal(id) => Some(local.node(*id)),
            Resolution::ResolvedExternal(doc, id) => Some(doc.node(*id)),
            Resolution::ResolvedDocument(doc) => Some(doc.root()),
            Resolution::Unresolved => None,
        }
    }

    /// Record every failure as an ERROR at `node`
    pub fn record_failures(&self, ledger: &mut Ledger, node: Node<'_>) {
        for failure in &self.failures {
            ledger.error(node, failure.to_string());
        }
    }
}

/// Resolves references against a document through a [`ResourceFetcher`]
pub struct ReferenceResolver<'a> {
    fetcher: &'a dyn ResourceFetcher,
    catalog: &'a Catalog,
    documents: Cache<String, Arc<Document>>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(fetcher: &'a dyn ResourceFetcher, catalog: &'a Catalog) -> Self {
        Self {
            fetcher,
            catalog,
            documents: Cache::new(64),
        }
    }

    /// Resolve `raw` as found in `doc`
    pub fn resolve(&self, doc: &Document, raw: &str, expect: &Expectation<'_>) -> Reference {
        let raw = raw.trim();
        let mut reference = Reference::new(raw);

        if let Err(failure) = check_well_formed(raw) {
            reference.failures.push(failure);
            return reference;
        }

        let (body, fragment) = split_fragment(raw);
        reference.fragment = fragment.map(str::to_string);
        let scheme = scheme_of(raw);
        reference.is_absolute = scheme.is_some();

        if let Some(scheme) = scheme.filter(|s| !self.catalog.is_scheme_allowed(s)) {
            reference.failures.push(ReferenceFailure::UnsupportedScheme {
                raw: raw.to_string(),
                scheme: scheme.to_string(),
            });
        }
        if expect.fragment == FragmentPolicy::Required && fragment.is_none() {
            reference.failures.push(ReferenceFailure::MissingFragment {
                raw: raw.to_string(),
            });
        }
        if !reference.failures.is_empty() {
            return reference;
        }

        let external = if body.is_empty() {
            None
        } else {
            match self
                .absolute_uri(doc, body)
                .and_then(|uri| self.load_document(&uri))
            {
                Ok(loaded) => Some(loaded),
                Err(failure) => {
                    reference.failures.push(failure);
                    return reference;
                }
            }
        };

        let Some(id) = fragment else {
            if let Some(loaded) = external {
                reference.resolution = Resolution::ResolvedDocument(loaded);
            }
            return reference;
        };

        let target_doc: &Document = external.as_deref().unwrap_or(doc);
        let Some(target) = target_doc.find_by_id(id) else {
            reference.failures.push(ReferenceFailure::TargetNotFound {
                id: id.to_string(),
                location: if external.is_some() {
                    format!("'{}'", body)
                } else {
                    "this document".to_string()
                },
            });
            return reference;
        };

        if !expect.family.is_empty() && !expect.family.iter().any(|tag| target.is(*tag)) {
            reference.failures.push(ReferenceFailure::WrongTargetType {
                id: id.to_string(),
                found: target.name().to_string(),
                expected: describe_family(expect.family),
            });
        }

        let target_id = target.id();
        reference.resolution = match external {
            Some(loaded) => Resolution::ResolvedExternal(loaded, target_id),
            None => Resolution::ResolvedLocal(target_id),
        };
        reference
    }

    /// Fetch the resource a link points at, without interpreting it
    pub fn dereference(&self, doc: &Document, raw: &str) -> Result<FetchedResource, ReferenceFailure> {
        let raw = raw.trim();
        check_well_formed(raw)?;
        if let Some(scheme) = scheme_of(raw).filter(|s| !self.catalog.is_scheme_allowed(s)) {
            return Err(ReferenceFailure::UnsupportedScheme {
                raw: raw.to_string(),
                scheme: scheme.to_string(),
            });
        }
        let (body, _) = split_fragment(raw);
        let uri = self.absolute_uri(doc, body)?;
        self.fetcher
            .fetch(&uri)
            .map_err(|err| ReferenceFailure::Unreachable {
                uri: uri.to_string(),
                reason: err.to_string(),
            })
    }

    /// Make `body` absolute against the document's base URI
    pub fn absolute_uri(&self, doc: &Document, body: &str) -> Result<Url, ReferenceFailure> {
        let parsed = match doc.base_uri() {
            Some(base) => base.join(body),
            None => Url::parse(body),
        };
        parsed.map_err(|err| match err {
            url::ParseError::RelativeUrlWithoutBase => ReferenceFailure::Unreachable {
                uri: body.to_string(),
                reason: "relative reference in a document without a base URI".to_string(),
            },
            other => ReferenceFailure::Malformed {
                raw: body.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Fetch and parse a KML document, reusing earlier loads
    pub fn load_document(&self, uri: &Url) -> Result<Arc<Document>, ReferenceFailure> {
        let key = uri.to_string();
        if let Some(hit) = self.documents.get(&key) {
            return Ok(hit);
        }

        let unreachable = |reason: String| ReferenceFailure::Unreachable {
            uri: key.clone(),
            reason,
        };
        let resource = self
            .fetcher
            .fetch(uri)
            .map_err(|err| unreachable(err.to_string()))?;
        if resource.bytes.starts_with(b"PK\x03\x04") {
            return Err(unreachable("KMZ archives are not extracted".to_string()));
        }
        let loaded = Document::parse_bytes(&resource.bytes, Some(resource.uri))
            .map_err(|err| unreachable(err.to_string()))?;
        debug!(uri = %uri, elements = loaded.len(), "loaded referenced document");

        let loaded = Arc::new(loaded);
        self.documents.insert(key, loaded.clone());
        Ok(loaded)
    }
}

fn check_well_formed(raw: &str) -> Result<(), ReferenceFailure> {
    let malformed = |reason: &str| ReferenceFailure::Malformed {
        raw: raw.to_string(),
        reason: reason.to_string(),
    };
    if raw.is_empty() {
        return Err(malformed("empty reference"));
    }
    if !reference_regex().is_match(raw) {
        return Err(malformed("illegal character or percent escape"));
    }
    if raw.matches('#').count() > 1 {
        return Err(malformed("more than one '#'"));
    }
    if let Some(scheme) = scheme_of(raw) {
        let (body, _) = split_fragment(raw);
        if body.len() == scheme.len() + 1 {
            return Err(malformed("scheme without a body"));
        }
    }
    Ok(())
}

/// Split off a non-empty fragment
fn split_fragment(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('#') {
        Some((body, fragment)) if !fragment.is_empty() => (body, Some(fragment)),
        Some((body, _)) => (body, None),
        None => (raw, None),
    }
}

fn scheme_of(raw: &str) -> Option<&str> {
    scheme_regex()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn describe_family(family: &[KmlTag]) -> String {
    family
        .iter()
        .map(|tag| format!("kml:{}", tag))
        .collect::<Vec<_>>()
        .join(" or ")
}
