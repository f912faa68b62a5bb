//! Immutable lookup tables shared by the selector, resolver and rules
//!
//! A [`Catalog`] is built once per process and passed by reference into
//! every component that needs it.

use std::collections::BTreeMap;

use crate::document::KmlTag;

/// Namespace URIs used by KML 2.2 documents
pub mod ns {
    pub const KML22: &str = "http://www.opengis.net/kml/2.2";
    pub const ATOM: &str = "http://www.w3.org/2005/Atom";
    pub const XAL: &str = "urn:oasis:names:tc:ciq:xsdschema:xAL:2.0";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";
    pub const XLINK: &str = "http://www.w3.org/1999/xlink";
    pub const GML: &str = "http://www.opengis.net/gml/3.2";
}

/// KML media types accepted for network link referents
pub const KML_MEDIA_TYPES: &[&str] = &[
    "application/vnd.google-earth.kml+xml",
    "application/vnd.google-earth.kmz",
    "application/xml",
    "text/xml",
];

/// Prefix to namespace URI bindings used by path expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    bindings: BTreeMap<String, String>,
}

impl Namespaces {
    pub fn empty() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    pub fn kml22() -> Self {
        Self::empty()
            .with("kml", ns::KML22)
            .with("atom", ns::ATOM)
            .with("xal", ns::XAL)
            .with("xsd", ns::XSD)
            .with("xlink", ns::XLINK)
            .with("gml", ns::GML)
    }

    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.bindings.insert(prefix.into(), uri.into());
        self
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }
}

/// Media type family a link referent must belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    Kml,
    Model,
    Image,
}

impl MediaFamily {
    /// Whether a response content type belongs to this family. A missing
    /// content type is accepted since local files carry none.
    pub fn accepts(self, content_type: Option<&str>) -> bool {
        let Some(content_type) = content_type else {
            return true;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match self {
            MediaFamily::Kml => KML_MEDIA_TYPES.contains(&essence.as_str()),
            MediaFamily::Model => {
                essence.starts_with("model/")
                    || essence == "application/octet-stream"
                    || essence == "text/xml"
                    || essence == "application/xml"
            }
            MediaFamily::Image => essence.starts_with("image/"),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            MediaFamily::Kml => "a KML resource",
            MediaFamily::Model => "a 3D model",
            MediaFamily::Image => "an image",
        }
    }
}

/// A deprecated element and what replaces it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deprecation {
    pub element: KmlTag,
    pub replacement: &'static str,
}

/// Lookup tables for the KML 2.2 rule catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    pub namespaces: Namespaces,
    pub style_selectors: Vec<KmlTag>,
    pub allowed_schemes: Vec<String>,
    pub simple_types: Vec<String>,
    pub http_query_params: Vec<String>,
    pub deprecated: Vec<Deprecation>,
    pub geometry_kinds: Vec<KmlTag>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::kml22()
    }
}

impl Catalog {
    pub fn kml22() -> Self {
        Self {
            namespaces: Namespaces::kml22(),
            style_selectors: vec![KmlTag::Style, KmlTag::StyleMap],
            allowed_schemes: ["http", "https", "file"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            simple_types: [
                "string",
                "int",
                "unsignedInt",
                "short",
                "unsignedShort",
                "float",
                "double",
                "boolean",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            http_query_params: ["clientVersion", "kmlVersion", "clientName", "language"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            deprecated: vec![
                Deprecation {
                    element: KmlTag::Metadata,
                    replacement: "kml:ExtendedData",
                },
                Deprecation {
                    element: KmlTag::Url,
                    replacement: "kml:Link",
                },
                Deprecation {
                    element: KmlTag::SnippetLowercase,
                    replacement: "kml:Snippet",
                },
            ],
            geometry_kinds: vec![
                KmlTag::Point,
                KmlTag::LineString,
                KmlTag::LinearRing,
                KmlTag::Polygon,
                KmlTag::MultiGeometry,
                KmlTag::Model,
            ],
        }
    }

    /// Replace the reference scheme allow-list
    pub fn with_allowed_schemes(mut self, schemes: Vec<String>) -> Self {
        self.allowed_schemes = schemes
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();
        self
    }

    pub fn is_scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    pub fn is_simple_type(&self, name: &str) -> bool {
        self.simple_types.iter().any(|t| t == name)
    }

    pub fn is_geometry(&self, tag: KmlTag) -> bool {
        self.geometry_kinds.contains(&tag)
    }

    /// Media family expected for a kml:Link or kml:Icon under the given parent
    pub fn link_family(&self, parent: KmlTag) -> Option<MediaFamily> {
        match parent {
            KmlTag::NetworkLink => Some(MediaFamily::Kml),
            KmlTag::Model => Some(MediaFamily::Model),
            KmlTag::GroundOverlay
            | KmlTag::ScreenOverlay
            | KmlTag::PhotoOverlay
            | KmlTag::IconStyle => Some(MediaFamily::Image),
            _ => None,
        }
    }
}
