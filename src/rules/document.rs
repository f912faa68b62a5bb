use crate::catalog::ns;
use crate::document::KmlTag;
use crate::error::EvaluatorError;
use crate::evaluator::RuleContext;
use crate::ledger::Ledger;

use super::Rule;

pub const RULES: &[Rule] = &[Rule {
    id: "kml-root",
    description: "The document element is kml:kml in the KML 2.2 namespace",
    check: kml_root,
}];

fn kml_root(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    let root = ctx.root();
    if !root.is(KmlTag::Kml) {
        let name = root.name();
        ledger.fatal(
            root,
            format!(
                "document element is {{{}}}{}, expected {{{}}}kml",
                name.namespace.as_deref().unwrap_or(""),
                name.local,
                ns::KML22
            ),
        );
    }
    Ok(())
}
