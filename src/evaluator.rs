//! The per-rule evaluation loop and the predicates shared between rules

use tracing::warn;

use crate::catalog::Catalog;
use crate::document::{Document, KmlTag, Node, NodeId};
use crate::error::{EvaluatorError, RuleError, SelectorError};
use crate::ledger::Ledger;
use crate::resolver::ReferenceResolver;
use crate::selector::Selector;

/// Altitude mode assumed when a geometry does not name one
pub const DEFAULT_ALTITUDE_MODE: &str = "clampToGround";

/// Sentinel for an unbounded maxLodPixels
pub const UNBOUNDED_LOD: f64 = -1.0;

/// Everything a rule may consult while it runs
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub document: &'a Document,
    pub catalog: &'a Catalog,
    pub selector: &'a dyn Selector,
    pub resolver: &'a ReferenceResolver<'a>,
}

impl<'a> RuleContext<'a> {
    pub fn root(&self) -> Node<'a> {
        self.document.root()
    }

    /// Nodes matching `expr` relative to `context`, in document order
    /// whatever order the selector produced them in
    pub fn select(&self, context: NodeId, expr: &str) -> Result<Vec<Node<'a>>, SelectorError> {
        let mut ids = self.selector.select(self.document, context, expr)?;
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.into_iter().map(|id| self.document.node(id)).collect())
    }

    pub fn test(&self, node: Node<'_>, expr: &str) -> Result<bool, SelectorError> {
        self.selector.test(self.document, node.id(), expr)
    }

    /// Select nodes from the document element and apply `predicate` to each.
    ///
    /// Every selected node is visited. A predicate error is recorded as a
    /// FATAL violation at that node and evaluation moves on to the next one.
    /// Only a failure of the selection itself is returned. The number of
    /// visited nodes is returned on success.
    pub fn evaluate<F>(
        &self,
        expr: &str,
        ledger: &mut Ledger,
        predicate: F,
    ) -> Result<usize, EvaluatorError>
    where
        F: FnMut(Node<'a>, &mut Ledger) -> Result<(), RuleError>,
    {
        self.evaluate_from(self.root().id(), expr, ledger, predicate)
    }

    pub fn evaluate_from<F>(
        &self,
        context: NodeId,
        expr: &str,
        ledger: &mut Ledger,
        mut predicate: F,
    ) -> Result<usize, EvaluatorError>
    where
        F: FnMut(Node<'a>, &mut Ledger) -> Result<(), RuleError>,
    {
        let nodes = self.select(context, expr)?;
        for &node in &nodes {
            if let Err(err) = predicate(node, ledger) {
                warn!(node = %node.name(), error = %err, "predicate failed");
                ledger.fatal(node, err.to_string());
            }
        }
        Ok(nodes.len())
    }
}

/// True when `node` has no KML child elements and neither it nor any of its
/// ancestors is an `excluded` element
pub fn is_empty_unless_within(node: Node<'_>, excluded: KmlTag) -> bool {
    node.kml_children().next().is_none() && !node.is(excluded) && !node.has_ancestor(excluded)
}

/// `min < max`, where a `max` equal to `sentinel` stands for +infinity
pub fn ordered_with_sentinel(min: f64, max: f64, sentinel: f64) -> bool {
    max == sentinel || min < max
}

/// Text of the `tag` child, or `default` when the child is absent
pub fn effective_text<'a>(node: Node<'a>, tag: KmlTag, default: &'a str) -> &'a str {
    node.child_text(tag).unwrap_or(default)
}

/// Effective altitude mode of a geometry, overlay or view
pub fn altitude_mode<'a>(node: Node<'a>) -> &'a str {
    effective_text(node, KmlTag::AltitudeMode, DEFAULT_ALTITUDE_MODE)
}

/// Parse the text of `node` as an xsd:double
pub fn number(node: Node<'_>) -> Result<f64, RuleError> {
    let text = node.text();
    parse_decimal(text).ok_or_else(|| RuleError::InvalidNumber {
        element: node.name().to_string(),
        value: text.to_string(),
    })
}

/// Numeric value of the `tag` child, if present
pub fn child_number(node: Node<'_>, tag: KmlTag) -> Result<Option<f64>, RuleError> {
    node.child(tag).map(number).transpose()
}

/// Lexical xsd:double, also accepting the special values
pub fn parse_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ if text.is_empty()
            || !text
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) =>
        {
            None
        }
        _ => text.parse().ok(),
    }
}

/// xsd:boolean truth value
pub fn is_true(text: &str) -> bool {
    matches!(text.trim(), "1" | "true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests_support::NoFetch;
    use crate::ledger::Severity;
    use crate::selector::PathInterpreter;

    const DOC: &str = r#"<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Folder id="empty"/>
    <Folder id="full"><name>x</name></Folder>
    <Region><Lod><minLodPixels>abc</minLodPixels></Lod></Region>
    <Region><Lod><minLodPixels>128</minLodPixels></Lod></Region>
    <NetworkLinkControl><Update><Change><Folder targetId="f"/></Change></Update></NetworkLinkControl>
  </Document>
</kml>"#;

    /// Returns matches back to front with the first one repeated
    struct Shuffled(PathInterpreter);

    impl Selector for Shuffled {
        fn select(
            &self,
            doc: &Document,
            context: NodeId,
            expr: &str,
        ) -> Result<Vec<NodeId>, SelectorError> {
            let mut ids = self.0.select(doc, context, expr)?;
            ids.reverse();
            if let Some(&last) = ids.last() {
                ids.push(last);
            }
            Ok(ids)
        }

        fn test(&self, doc: &Document, context: NodeId, expr: &str) -> Result<bool, SelectorError> {
            self.0.test(doc, context, expr)
        }
    }

    fn with_context<R>(f: impl FnOnce(RuleContext<'_>) -> R) -> R {
        let catalog = Catalog::kml22();
        let selector = PathInterpreter::new(catalog.namespaces.clone());
        with_selector(&catalog, &selector, f)
    }

    fn with_selector<R>(
        catalog: &Catalog,
        selector: &dyn Selector,
        f: impl FnOnce(RuleContext<'_>) -> R,
    ) -> R {
        let doc = Document::parse(DOC, None).unwrap();
        let fetcher = NoFetch;
        let resolver = ReferenceResolver::new(&fetcher, catalog);
        f(RuleContext {
            document: &doc,
            catalog,
            selector,
            resolver: &resolver,
        })
    }

    #[test]
    fn test_predicate_errors_become_fatal_and_evaluation_continues() {
        with_context(|ctx| {
            let mut ledger = Ledger::new();
            let visited = ctx
                .evaluate("//kml:minLodPixels", &mut ledger, |node, _| {
                    number(node).map(|_| ())
                })
                .unwrap();
            assert_eq!(visited, 2);
            assert_eq!(ledger.len(), 1);
            assert_eq!(ledger.entries()[0].severity, Severity::Fatal);
            assert!(ledger.entries()[0].message.contains("abc"));
        });
    }

    #[test]
    fn test_selection_failure_aborts_rule() {
        with_context(|ctx| {
            let mut ledger = Ledger::new();
            let err = ctx
                .evaluate("//bogus:Thing", &mut ledger, |_, _| Ok(()))
                .unwrap_err();
            assert!(matches!(
                err,
                EvaluatorError::Selection(SelectorError::UnboundPrefix { .. })
            ));
            assert!(ledger.is_empty());
        });
    }

    #[test]
    fn test_empty_unless_within_update() {
        with_context(|ctx| {
            let folders = ctx.select(ctx.root().id(), "//kml:Folder").unwrap();
            let flagged: Vec<_> = folders
                .iter()
                .map(|f| is_empty_unless_within(*f, KmlTag::Update))
                .collect();
            assert_eq!(flagged, vec![true, false, false]);
        });
    }

    #[test]
    fn test_violations_follow_document_order_for_any_selector() {
        let catalog = Catalog::kml22();
        let selector = Shuffled(PathInterpreter::new(catalog.namespaces.clone()));
        with_selector(&catalog, &selector, |ctx| {
            let mut ledger = Ledger::new();
            let visited = ctx
                .evaluate("//kml:Folder", &mut ledger, |node, ledger| {
                    ledger.error(node, "folder");
                    Ok(())
                })
                .unwrap();
            assert_eq!(visited, 3);
            let pointers: Vec<_> = ledger
                .iter()
                .map(|v| v.location.path().to_string())
                .collect();
            assert_eq!(
                pointers,
                vec!["(//tns:Folder)[1]", "(//tns:Folder)[2]", "(//tns:Folder)[3]"]
            );
        });
    }

    #[test]
    fn test_excluded_element_itself_is_not_flagged() {
        let doc = Document::parse(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><NetworkLinkControl><Update/></NetworkLinkControl></kml>"#,
            None,
        )
        .unwrap();
        let update = doc
            .root()
            .descendants()
            .find(|n| n.is(KmlTag::Update))
            .unwrap();
        assert!(!is_empty_unless_within(update, KmlTag::Update));
        assert!(is_empty_unless_within(update, KmlTag::Folder));
    }

    #[test]
    fn test_ordered_with_sentinel() {
        assert!(ordered_with_sentinel(128.0, UNBOUNDED_LOD, UNBOUNDED_LOD));
        assert!(ordered_with_sentinel(128.0, 1024.0, UNBOUNDED_LOD));
        assert!(!ordered_with_sentinel(128.0, 64.0, UNBOUNDED_LOD));
        assert!(!ordered_with_sentinel(128.0, 128.0, UNBOUNDED_LOD));
    }

    #[test]
    fn test_decimal_parsing() {
        assert_eq!(parse_decimal(" 12.5 "), Some(12.5));
        assert_eq!(parse_decimal("-1e3"), Some(-1000.0));
        assert_eq!(parse_decimal("INF"), Some(f64::INFINITY));
        assert_eq!(parse_decimal("twelve"), None);
        assert_eq!(parse_decimal(""), None);
        assert!(is_true("1"));
        assert!(is_true("true"));
        assert!(!is_true("0"));
    }
}
