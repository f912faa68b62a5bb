use crate::document::KmlTag;
use crate::error::EvaluatorError;
use crate::evaluator::RuleContext;
use crate::ledger::Ledger;

use super::{Rule, require_not_empty};

pub const RULES: &[Rule] = &[
    Rule {
        id: "poly-style-content",
        description: "A kml:PolyStyle sets at least one property",
        check: poly_style_content,
    },
    Rule {
        id: "balloon-style-not-empty",
        description: "A kml:BalloonStyle has content",
        check: balloon_style_not_empty,
    },
    Rule {
        id: "icon-style-not-empty",
        description: "A kml:IconStyle has content",
        check: icon_style_not_empty,
    },
    Rule {
        id: "label-style-not-empty",
        description: "A kml:LabelStyle has content",
        check: label_style_not_empty,
    },
    Rule {
        id: "style-not-empty",
        description: "A kml:Style has content",
        check: style_not_empty,
    },
    Rule {
        id: "list-style-content",
        description: "A kml:ListStyle sets at least one property",
        check: list_style_content,
    },
    Rule {
        id: "stylemap-normal-highlight",
        description: "A kml:StyleMap maps both the normal and the highlight key",
        check: stylemap_normal_highlight,
    },
];

fn poly_style_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:PolyStyle[not(ancestor::kml:Update)]",
        ledger,
        |style, ledger| {
            if !ctx.test(style, "kml:color or kml:colorMode or kml:fill or kml:outline")? {
                ledger.error(
                    style,
                    "kml:PolyStyle sets none of color, colorMode, fill or outline",
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn balloon_style_not_empty(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    require_not_empty(ctx, KmlTag::BalloonStyle, ledger)
}

fn icon_style_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    require_not_empty(ctx, KmlTag::IconStyle, ledger)
}

fn label_style_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    require_not_empty(ctx, KmlTag::LabelStyle, ledger)
}

fn style_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    require_not_empty(ctx, KmlTag::Style, ledger)
}

fn list_style_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:ListStyle[not(ancestor::kml:Update)]",
        ledger,
        |style, ledger| {
            if !ctx.test(style, "kml:listItemType or kml:bgColor or kml:ItemIcon")? {
                ledger.error(
                    style,
                    "kml:ListStyle sets none of listItemType, bgColor or ItemIcon",
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn stylemap_normal_highlight(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:StyleMap[not(ancestor::kml:Update)]",
        ledger,
        |map, ledger| {
            if !ctx.test(
                map,
                "kml:Pair[kml:key='normal'] and kml:Pair[kml:key='highlight']",
            )? {
                ledger.error(map, "kml:StyleMap must map both 'normal' and 'highlight'");
            }
            Ok(())
        },
    )?;
    Ok(())
}
