//! The KML 2.2 rule catalog
//!
//! Rules are grouped by topic and each group is tagged with the conformance
//! level it belongs to. A rule selects the nodes it constrains, applies a
//! per-node predicate through [`RuleContext::evaluate`] and writes what it
//! finds to the ledger it is handed.
//!
//! [`RuleContext::evaluate`]: crate::evaluator::RuleContext::evaluate

use crate::document::KmlTag;
use crate::error::EvaluatorError;
use crate::evaluator::{RuleContext, is_empty_unless_within};
use crate::ledger::Ledger;
use crate::level::ConformanceLevel;

pub mod data;
pub mod document;
pub mod feature;
pub mod geometry;
pub mod link;
pub mod options;
pub mod recommendations;
pub mod style;
pub mod style_recommendations;
pub mod time;
pub mod view;

/// Signature shared by every rule check
pub type CheckFn = fn(&RuleContext<'_>, &mut Ledger) -> Result<(), EvaluatorError>;

/// A single named constraint
#[derive(Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub description: &'static str,
    pub check: CheckFn,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

/// Rules that are enabled together at one conformance level
#[derive(Debug, Clone, Copy)]
pub struct RuleGroup {
    pub name: &'static str,
    pub level: ConformanceLevel,
    pub rules: &'static [Rule],
}

static REGISTRY: &[RuleGroup] = &[
    RuleGroup {
        name: "document",
        level: ConformanceLevel::One,
        rules: document::RULES,
    },
    RuleGroup {
        name: "geometry",
        level: ConformanceLevel::One,
        rules: geometry::RULES,
    },
    RuleGroup {
        name: "style",
        level: ConformanceLevel::One,
        rules: style::RULES,
    },
    RuleGroup {
        name: "feature",
        level: ConformanceLevel::One,
        rules: feature::RULES,
    },
    RuleGroup {
        name: "link",
        level: ConformanceLevel::One,
        rules: link::RULES,
    },
    RuleGroup {
        name: "data",
        level: ConformanceLevel::One,
        rules: data::RULES,
    },
    RuleGroup {
        name: "view",
        level: ConformanceLevel::One,
        rules: view::RULES,
    },
    RuleGroup {
        name: "time",
        level: ConformanceLevel::One,
        rules: time::RULES,
    },
    RuleGroup {
        name: "recommendations",
        level: ConformanceLevel::Two,
        rules: recommendations::RULES,
    },
    RuleGroup {
        name: "style-recommendations",
        level: ConformanceLevel::Two,
        rules: style_recommendations::RULES,
    },
    RuleGroup {
        name: "options",
        level: ConformanceLevel::Three,
        rules: options::RULES,
    },
];

/// Every rule group in registration order
pub fn registry() -> &'static [RuleGroup] {
    REGISTRY
}

/// Report every element of kind `tag` outside kml:Update that has no KML
/// child elements
pub(crate) fn require_not_empty(
    ctx: &RuleContext<'_>,
    tag: KmlTag,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    ctx.evaluate(&format!("//kml:{}", tag), ledger, |node, ledger| {
        if is_empty_unless_within(node, KmlTag::Update) {
            ledger.error(node, format!("kml:{} is empty", tag));
        }
        Ok(())
    })?;
    Ok(())
}

/// Look a rule up by id
pub fn find(id: &str) -> Option<(&'static RuleGroup, &'static Rule)> {
    REGISTRY
        .iter()
        .flat_map(|group| group.rules.iter().map(move |rule| (group, rule)))
        .find(|(_, rule)| rule.id == id)
}

#[cfg(test)]
pub(crate) mod testing {
    use url::Url;

    use super::CheckFn;
    use crate::catalog::Catalog;
    use crate::document::Document;
    use crate::evaluator::RuleContext;
    use crate::fetch::ResourceFetcher;
    use crate::fetch::tests_support::NoFetch;
    use crate::ledger::Ledger;
    use crate::resolver::ReferenceResolver;
    use crate::selector::PathInterpreter;

    /// Wrap a fragment of KML in a kml root with the default namespace
    pub fn kml(body: &str) -> String {
        format!(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:atom="http://www.w3.org/2005/Atom">{}</kml>"#,
            body
        )
    }

    /// Run one check over `text` with no reachable external resources
    pub fn run(check: CheckFn, text: &str) -> Ledger {
        run_with(check, text, &NoFetch, None)
    }

    pub fn run_with(
        check: CheckFn,
        text: &str,
        fetcher: &dyn ResourceFetcher,
        base: Option<&str>,
    ) -> Ledger {
        let doc = Document::parse(text, base.and_then(|b| Url::parse(b).ok()))
            .expect("test document must parse");
        let catalog = Catalog::kml22();
        let selector = PathInterpreter::new(catalog.namespaces.clone());
        let resolver = ReferenceResolver::new(fetcher, &catalog);
        let ctx = RuleContext {
            document: &doc,
            catalog: &catalog,
            selector: &selector,
            resolver: &resolver,
        };
        let mut ledger = Ledger::new();
        check(&ctx, &mut ledger).expect("rule must not abort");
        ledger
    }

    /// Messages of the recorded violations, for compact assertions
    pub fn messages(ledger: &Ledger) -> Vec<String> {
        ledger.iter().map(|v| v.message.clone()).collect()
    }
}
