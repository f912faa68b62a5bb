use crate::document::KmlTag;
use crate::error::EvaluatorError;
use crate::evaluator::RuleContext;
use crate::ledger::Ledger;
use crate::resolver::Expectation;

use super::Rule;

pub const RULES: &[Rule] = &[
    Rule {
        id: "style-url",
        description: "A kml:styleUrl refers to a kml:Style or kml:StyleMap by fragment",
        check: style_url,
    },
    Rule {
        id: "shared-style-id",
        description: "Shared styles declared in a kml:Document carry an id",
        check: shared_style_id,
    },
    Rule {
        id: "stylemap-pair",
        description: "A kml:Pair has a key and a style or style reference",
        check: stylemap_pair,
    },
    Rule {
        id: "item-icon-href",
        description: "A kml:ItemIcon has an href",
        check: item_icon_href,
    },
];

fn style_url(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    let expect = Expectation::element_of(&ctx.catalog.style_selectors);
    ctx.evaluate(
        "//kml:styleUrl[not(ancestor::kml:Update)]",
        ledger,
        |node, ledger| {
            let reference = ctx.resolver.resolve(ctx.document, node.text(), &expect);
            reference.record_failures(ledger, node);
            Ok(())
        },
    )?;
    Ok(())
}

fn shared_style_id(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:Document/kml:Style | //kml:Document/kml:StyleMap",
        ledger,
        |style, ledger| {
            if style.attribute("id").is_none_or(|id| id.trim().is_empty()) {
                ledger.error(style, format!("shared {} has no id", style.name()));
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn stylemap_pair(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Pair[not(ancestor::kml:Update)]", ledger, |pair, ledger| {
        if !ctx.test(pair, "kml:key and (kml:styleUrl or kml:Style or kml:StyleMap)")? {
            ledger.error(
                pair,
                "kml:Pair requires kml:key and one of kml:styleUrl, kml:Style or kml:StyleMap",
            );
        }
        Ok(())
    })?;
    Ok(())
}

fn item_icon_href(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:ItemIcon[not(ancestor::kml:Update)]",
        ledger,
        |icon, ledger| {
            if icon.child_text(KmlTag::Href).is_none_or(str::is_empty) {
                ledger.error(icon, "kml:ItemIcon has no kml:href");
            }
            Ok(())
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{kml, messages, run};

    #[test]
    fn test_style_url_targets() {
        let text = kml(
            r##"<Document>
                 <Style id="ok"/>
                 <Placemark id="pm"><styleUrl>#ok</styleUrl></Placemark>
                 <Placemark><styleUrl>#pm</styleUrl></Placemark>
                 <Placemark><styleUrl>#missing</styleUrl></Placemark>
                 <Placemark><styleUrl>ftp://example.com/s.kml</styleUrl></Placemark>
               </Document>"##,
        );
        let found = messages(&run(style_url, &text));
        assert_eq!(found.len(), 4, "{:?}", found);
        assert!(found[0].contains("expected kml:Style or kml:StyleMap"));
        assert!(found[1].contains("no element with id 'missing'"));
        assert!(found[2].contains("scheme 'ftp'"));
        assert!(found[3].contains("no fragment"));
    }

    #[test]
    fn test_shared_style_id() {
        let text = kml(
            r#"<Document><Style/><StyleMap id="m"/><Placemark><Style/></Placemark></Document>"#,
        );
        assert_eq!(messages(&run(shared_style_id, &text)), vec!["shared kml:Style has no id"]);
    }

    #[test]
    fn test_stylemap_pair() {
        let text = kml(
            r##"<Document><StyleMap id="m">
                 <Pair><key>normal</key><styleUrl>#a</styleUrl></Pair>
                 <Pair><key>highlight</key></Pair>
                 <Pair><Style/></Pair>
               </StyleMap></Document>"##,
        );
        assert_eq!(run(stylemap_pair, &text).len(), 2);
    }

    #[test]
    fn test_item_icon_href() {
        let text = kml(
            "<Style id=\"s\"><ListStyle><ItemIcon><href>a.png</href></ItemIcon><ItemIcon><state>open</state></ItemIcon></ListStyle></Style>",
        );
        assert_eq!(run(item_icon_href, &text).len(), 1);
    }
}
