//! Arena-backed document tree
//!
//! A [`Document`] owns every element in a flat vector laid out in document
//! order, so a [`NodeId`] doubles as the element's document position. Nodes
//! refer to their parent and children only through ids. The tree is built
//! once by [`Document::parse`] and never mutated afterwards.
//!
//! Element names are mapped onto a closed [`ElementKind`] so rules can match
//! on known KML and Atom elements without string comparisons. Anything
//! outside those vocabularies is an [`ElementKind::Extension`].

use std::fmt;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use tracing::debug;
use url::Url;

use crate::catalog::ns;
use crate::error::{Result, ValidationError};
use crate::pointer::LocationPointer;

macro_rules! element_tags {
    ($(#[$meta:meta])* $tag:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $tag {
            $($variant),+
        }

        impl $tag {
            /// Map a local name onto a known element, if any
            pub fn from_local_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Local name as it appears in documents
            pub fn local_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $tag {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.local_name())
            }
        }
    };
}

element_tags! {
    /// Elements of the KML 2.2 vocabulary
    KmlTag {
        Kml => "kml",
        Document => "Document",
        Folder => "Folder",
        Placemark => "Placemark",
        NetworkLink => "NetworkLink",
        PhotoOverlay => "PhotoOverlay",
        ScreenOverlay => "ScreenOverlay",
        GroundOverlay => "GroundOverlay",
        NetworkLinkControl => "NetworkLinkControl",
        Update => "Update",
        Create => "Create",
        Delete => "Delete",
        Change => "Change",
        Point => "Point",
        LineString => "LineString",
        LinearRing => "LinearRing",
        Polygon => "Polygon",
        MultiGeometry => "MultiGeometry",
        Model => "Model",
        OuterBoundaryIs => "outerBoundaryIs",
        InnerBoundaryIs => "innerBoundaryIs",
        Coordinates => "coordinates",
        Extrude => "extrude",
        Tessellate => "tessellate",
        AltitudeMode => "altitudeMode",
        Location => "Location",
        Orientation => "Orientation",
        Scale => "Scale",
        ResourceMap => "ResourceMap",
        Alias => "Alias",
        TargetHref => "targetHref",
        SourceHref => "sourceHref",
        Link => "Link",
        Icon => "Icon",
        Url => "Url",
        Href => "href",
        RefreshMode => "refreshMode",
        RefreshInterval => "refreshInterval",
        ViewRefreshMode => "viewRefreshMode",
        ViewRefreshTime => "viewRefreshTime",
        ViewBoundScale => "viewBoundScale",
        ViewFormat => "viewFormat",
        HttpQuery => "httpQuery",
        Style => "Style",
        StyleMap => "StyleMap",
        Pair => "Pair",
        Key => "key",
        StyleUrl => "styleUrl",
        IconStyle => "IconStyle",
        LabelStyle => "LabelStyle",
        LineStyle => "LineStyle",
        PolyStyle => "PolyStyle",
        BalloonStyle => "BalloonStyle",
        ListStyle => "ListStyle",
        ItemIcon => "ItemIcon",
        ListItemType => "listItemType",
        BgColor => "bgColor",
        TextColor => "textColor",
        Text => "text",
        DisplayMode => "displayMode",
        Color => "color",
        ColorMode => "colorMode",
        ScaleFactor => "scale",
        Heading => "heading",
        HotSpot => "hotSpot",
        Fill => "fill",
        Outline => "outline",
        Width => "width",
        MaxSnippetLines => "maxSnippetLines",
        State => "state",
        Region => "Region",
        LatLonAltBox => "LatLonAltBox",
        LatLonBox => "LatLonBox",
        Lod => "Lod",
        MinLodPixels => "minLodPixels",
        MaxLodPixels => "maxLodPixels",
        MinFadeExtent => "minFadeExtent",
        MaxFadeExtent => "maxFadeExtent",
        North => "north",
        South => "south",
        East => "east",
        West => "west",
        Rotation => "rotation",
        MinAltitude => "minAltitude",
        MaxAltitude => "maxAltitude",
        LookAt => "LookAt",
        Camera => "Camera",
        Longitude => "longitude",
        Latitude => "latitude",
        Altitude => "altitude",
        Range => "range",
        Tilt => "tilt",
        Roll => "roll",
        TimeSpan => "TimeSpan",
        TimeStamp => "TimeStamp",
        Begin => "begin",
        End => "end",
        When => "when",
        ExtendedData => "ExtendedData",
        Data => "Data",
        DisplayName => "displayName",
        Value => "value",
        SchemaData => "SchemaData",
        SimpleData => "SimpleData",
        Schema => "Schema",
        SimpleField => "SimpleField",
        Metadata => "Metadata",
        ViewVolume => "ViewVolume",
        LeftFov => "leftFov",
        RightFov => "rightFov",
        BottomFov => "bottomFov",
        TopFov => "topFov",
        Near => "near",
        ImagePyramid => "ImagePyramid",
        TileSize => "tileSize",
        MaxWidth => "maxWidth",
        MaxHeight => "maxHeight",
        GridOrigin => "gridOrigin",
        Shape => "shape",
        DrawOrder => "drawOrder",
        OverlayXY => "overlayXY",
        ScreenXY => "screenXY",
        RotationXY => "rotationXY",
        Size => "size",
        PhoneNumber => "phoneNumber",
        Address => "address",
        Name => "name",
        Visibility => "visibility",
        Open => "open",
        Description => "description",
        Snippet => "Snippet",
        SnippetLowercase => "snippet",
        MinRefreshPeriod => "minRefreshPeriod",
        MaxSessionLength => "maxSessionLength",
        Cookie => "cookie",
        Message => "message",
        LinkName => "linkName",
        LinkDescription => "linkDescription",
        LinkSnippet => "linkSnippet",
        Expires => "expires",
        RefreshVisibility => "refreshVisibility",
        FlyToView => "flyToView",
        X => "x",
        Y => "y",
        Z => "z",
    }
}

element_tags! {
    /// Elements of the Atom vocabulary that KML embeds
    AtomTag {
        Author => "author",
        Link => "link",
        Name => "name",
        Uri => "uri",
        Email => "email",
    }
}

/// Closed classification of every element in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Kml(KmlTag),
    Atom(AtomTag),
    /// Unknown names, foreign namespaces and vendor extensions
    Extension,
}

impl ElementKind {
    fn classify(namespace: Option<&str>, local: &str) -> Self {
        match namespace {
            Some(ns::KML22) => KmlTag::from_local_name(local)
                .map(ElementKind::Kml)
                .unwrap_or(ElementKind::Extension),
            Some(ns::ATOM) => AtomTag::from_local_name(local)
                .map(ElementKind::Atom)
                .unwrap_or(ElementKind::Extension),
            _ => ElementKind::Extension,
        }
    }
}

/// Namespace-qualified element or attribute name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub namespace: Option<String>,
    pub local: String,
    pub prefix: Option<String>,
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace.as_deref() {
            Some(ns::KML22) => write!(f, "kml:{}", self.local),
            Some(ns::ATOM) => write!(f, "atom:{}", self.local),
            _ => match &self.prefix {
                Some(prefix) => write!(f, "{}:{}", prefix, self.local),
                None => f.write_str(&self.local),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QualifiedName,
    pub value: String,
}

/// Handle to an element owned by a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Element {
    name: QualifiedName,
    kind: ElementKind,
    attributes: Vec<Attribute>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    text: String,
    /// One past the index of the last descendant
    subtree_end: usize,
}

/// A parsed, namespace-aware document
#[derive(Debug, Clone)]
pub struct Document {
    base_uri: Option<Url>,
    elements: Vec<Element>,
}

impl Document {
    /// Read and parse a document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if is_zip_archive(&bytes) {
            return Err(ValidationError::UnsupportedInput {
                file: path.to_path_buf(),
                reason: "KMZ archives are not extracted".to_string(),
            });
        }
        let base = std::fs::canonicalize(path)
            .ok()
            .and_then(|p| Url::from_file_path(p).ok());
        let doc = Self::parse_bytes(&bytes, base)
            .map_err(|err| rename_source(err, &path.display().to_string()))?;
        debug!(path = %path.display(), elements = doc.len(), "loaded document");
        Ok(doc)
    }

    /// Parse raw bytes, which must be UTF-8 encoded
    pub fn parse_bytes(bytes: &[u8], base_uri: Option<Url>) -> Result<Self> {
        let source_name = source_name(base_uri.as_ref());
        let text = std::str::from_utf8(bytes).map_err(|e| ValidationError::DocumentParse {
            source_name: source_name.clone(),
            details: format!("document is not valid UTF-8: {}", e),
        })?;
        Self::parse(text, base_uri)
    }

    /// Parse a document from text
    pub fn parse(text: &str, base_uri: Option<Url>) -> Result<Self> {
        let source_name = source_name(base_uri.as_ref());
        let elements = TreeBuilder::default()
            .build(text)
            .map_err(|details| ValidationError::DocumentParse {
                source_name,
                details,
            })?;

        Ok(Self { base_uri, elements })
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    /// The document element
    pub fn root(&self) -> Node<'_> {
        Node {
            doc: self,
            id: NodeId(0),
        }
    }

    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node { doc: self, id }
    }

    /// Number of elements in the document
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements in document order
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> {
        (0..self.elements.len()).map(move |i| self.node(NodeId(i)))
    }

    /// First element in document order carrying `id="<id>"`
    pub fn find_by_id(&self, id: &str) -> Option<Node<'_>> {
        self.nodes().find(|n| n.attribute("id") == Some(id))
    }

    fn element(&self, id: NodeId) -> &Element {
        &self.elements[id.0]
    }
}

/// Borrowed view of one element
#[derive(Clone, Copy)]
pub struct Node<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}#{})", self.name(), self.id.0)
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl<'a> Node<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn name(&self) -> &'a QualifiedName {
        &self.doc.element(self.id).name
    }

    pub fn kind(&self) -> ElementKind {
        self.doc.element(self.id).kind
    }

    pub fn kml_tag(&self) -> Option<KmlTag> {
        match self.kind() {
            ElementKind::Kml(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is(&self, tag: KmlTag) -> bool {
        self.kind() == ElementKind::Kml(tag)
    }

    pub fn is_kml(&self) -> bool {
        self.name().namespace.as_deref() == Some(ns::KML22)
    }

    /// Value of an attribute in no namespace
    pub fn attribute(&self, local: &str) -> Option<&'a str> {
        self.doc
            .element(self.id)
            .attributes
            .iter()
            .find(|a| a.name.namespace.is_none() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn attributes(&self) -> &'a [Attribute] {
        &self.doc.element(self.id).attributes
    }

    /// Direct text content with surrounding whitespace removed
    pub fn text(&self) -> &'a str {
        self.doc.element(self.id).text.trim()
    }

    /// Concatenated text of this element and all descendants
    pub fn deep_text(&self) -> String {
        let mut out = String::from(self.doc.element(self.id).text.as_str());
        for node in self.descendants() {
            out.push_str(&self.doc.element(node.id).text);
        }
        out
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.doc.element(self.id).parent.map(|id| self.doc.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        doc.element(self.id)
            .children
            .iter()
            .map(move |&id| doc.node(id))
    }

    /// Child elements in the KML namespace
    pub fn kml_children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        self.children().filter(|c| c.is_kml())
    }

    /// First child of the given kind
    pub fn child(&self, tag: KmlTag) -> Option<Node<'a>> {
        self.children().find(|c| c.is(tag))
    }

    pub fn children_of(&self, tag: KmlTag) -> impl Iterator<Item = Node<'a>> + 'a {
        self.children().filter(move |c| c.is(tag))
    }

    pub fn has_child(&self, tag: KmlTag) -> bool {
        self.child(tag).is_some()
    }

    /// Trimmed text of the first child of the given kind
    pub fn child_text(&self, tag: KmlTag) -> Option<&'a str> {
        self.child(tag).map(|c| c.text())
    }

    pub fn atom_child(&self, tag: AtomTag) -> Option<Node<'a>> {
        self.children()
            .find(|c| c.kind() == ElementKind::Atom(tag))
    }

    /// Ancestors, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        std::iter::successors(self.parent(), move |n| {
            doc.element(n.id).parent.map(|id| doc.node(id))
        })
    }

    pub fn has_ancestor(&self, tag: KmlTag) -> bool {
        self.ancestors().any(|a| a.is(tag))
    }

    /// Descendants in document order
    pub fn descendants(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        let end = doc.element(self.id).subtree_end;
        (self.id.0 + 1..end).map(move |i| doc.node(NodeId(i)))
    }

    pub fn descendants_of(&self, tag: KmlTag) -> impl Iterator<Item = Node<'a>> + 'a {
        self.descendants().filter(move |d| d.is(tag))
    }

    pub fn first_descendant(&self, tag: KmlTag) -> Option<Node<'a>> {
        self.descendants().find(|d| d.is(tag))
    }

    /// Location pointer used when reporting violations at this node
    pub fn pointer(&self) -> LocationPointer {
        LocationPointer::for_node(self.doc, self.id)
    }
}

/// Builds the element arena from a namespace-aware event stream
#[derive(Default)]
struct TreeBuilder {
    elements: Vec<Element>,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn build(mut self, text: &str) -> std::result::Result<Vec<Element>, String> {
        let mut reader = NsReader::from_str(text);

        loop {
            let event = reader
                .read_event()
                .map_err(|e| format!("{} at byte {}", e, reader.buffer_position()))?;
            match event {
                Event::Start(start) => {
                    let id = self.open_element(&reader, &start)?;
                    self.open.push(id);
                }
                Event::Empty(start) => {
                    let id = self.open_element(&reader, &start)?;
                    self.close_element(id);
                }
                Event::End(_) => {
                    if let Some(id) = self.open.pop() {
                        self.close_element(id);
                    }
                }
                Event::Text(t) => {
                    if let Some(&current) = self.open.last() {
                        let value = t
                            .unescape()
                            .map_err(|e| format!("{} at byte {}", e, reader.buffer_position()))?;
                        self.elements[current.0].text.push_str(&value);
                    }
                }
                Event::CData(c) => {
                    if let Some(&current) = self.open.last() {
                        let raw = c.into_inner();
                        self.elements[current.0]
                            .text
                            .push_str(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !self.open.is_empty() {
            return Err("unexpected end of input: unclosed elements".to_string());
        }
        if self.elements.is_empty() {
            return Err("document has no root element".to_string());
        }
        Ok(self.elements)
    }

    fn open_element(
        &mut self,
        reader: &NsReader<&[u8]>,
        start: &BytesStart<'_>,
    ) -> std::result::Result<NodeId, String> {
        let parent = self.open.last().copied();
        if parent.is_none() && !self.elements.is_empty() {
            return Err("document has more than one root element".to_string());
        }

        let (resolved, local) = reader.resolve_element(start.name());
        let namespace = namespace_of(resolved)?;
        let local = String::from_utf8_lossy(local.as_ref()).into_owned();
        let prefix = start
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let (resolved, attr_local) = reader.resolve_attribute(attr.key);
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            attributes.push(Attribute {
                name: QualifiedName {
                    namespace: namespace_of(resolved)?,
                    local: String::from_utf8_lossy(attr_local.as_ref()).into_owned(),
                    prefix: attr
                        .key
                        .prefix()
                        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
                },
                value: value.into_owned(),
            });
        }

        let id = NodeId(self.elements.len());
        let kind = ElementKind::classify(namespace.as_deref(), &local);
        self.elements.push(Element {
            name: QualifiedName {
                namespace,
                local,
                prefix,
            },
            kind,
            attributes,
            children: Vec::new(),
            parent,
            text: String::new(),
            subtree_end: id.0 + 1,
        });
        if let Some(parent) = parent {
            self.elements[parent.0].children.push(id);
        }
        Ok(id)
    }

    fn close_element(&mut self, id: NodeId) {
        self.elements[id.0].subtree_end = self.elements.len();
    }
}

fn namespace_of(resolved: ResolveResult<'_>) -> std::result::Result<Option<String>, String> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.as_ref()).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(format!(
            "unbound namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        )),
    }
}

fn is_zip_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

fn source_name(base_uri: Option<&Url>) -> String {
    base_uri
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<memory>".to_string())
}

fn rename_source(err: ValidationError, name: &str) -> ValidationError {
    match err {
        ValidationError::DocumentParse { details, .. } => ValidationError::DocumentParse {
            source_name: name.to_string(),
            details,
        },
        other => other,
    }
}
