//! Level 3 options: uses of deprecated KML 2.2 vocabulary. Findings here are
//! warnings and never fail a rule.

use crate::error::EvaluatorError;
use crate::evaluator::RuleContext;
use crate::ledger::Ledger;

use super::Rule;

pub const RULES: &[Rule] = &[
    Rule {
        id: "deprecated-elements",
        description: "Deprecated elements are reported together with their replacement",
        check: deprecated_elements,
    },
    Rule {
        id: "schema-parent",
        description: "The deprecated parent attribute of kml:Schema is reported",
        check: schema_parent,
    },
];

fn deprecated_elements(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    for deprecation in &ctx.catalog.deprecated {
        ctx.evaluate(
            &format!("//kml:{}", deprecation.element),
            ledger,
            |node, ledger| {
                ledger.warning(
                    node,
                    format!(
                        "kml:{} is deprecated, use {} instead",
                        deprecation.element, deprecation.replacement
                    ),
                );
                Ok(())
            },
        )?;
    }
    Ok(())
}

fn schema_parent(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Schema[@parent]", ledger, |schema, ledger| {
        ledger.warning(
            schema,
            "kml:Schema/@parent is deprecated, declare kml:SimpleField children instead",
        );
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Severity;
    use crate::rules::testing::{kml, messages, run};

    #[test]
    fn test_deprecated_elements_are_warnings() {
        let text = kml(
            "<Document><Metadata/><Placemark><snippet>old</snippet>\
             <Model><Link/></Model></Placemark><NetworkLink><Url><href>a.kml</href></Url></NetworkLink></Document>",
        );
        let ledger = run(deprecated_elements, &text);
        assert_eq!(
            messages(&ledger),
            vec![
                "kml:Metadata is deprecated, use kml:ExtendedData instead",
                "kml:Url is deprecated, use kml:Link instead",
                "kml:snippet is deprecated, use kml:Snippet instead",
            ]
        );
        assert!(ledger.iter().all(|v| v.severity == Severity::Warning));
        assert!(!ledger.has_errors());
    }

    #[test]
    fn test_schema_parent() {
        let text = kml(r#"<Document><Schema id="a" parent="Placemark"/><Schema id="b"/></Document>"#);
        let ledger = run(schema_parent, &text);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.count(Severity::Warning), 1);
    }
}
