//! Link constraints: refresh settings, href presence and the resources that
//! links and updates point at.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::MediaFamily;
use crate::document::{KmlTag, Node};
use crate::error::{EvaluatorError, RuleError};
use crate::evaluator::{RuleContext, child_number};
use crate::ledger::Ledger;
use crate::resolver::{Expectation, Resolution};

use super::Rule;

pub const RULES: &[Rule] = &[
    Rule {
        id: "link-refresh-values",
        description: "Refresh intervals and the view bound scale are positive",
        check: link_refresh_values,
    },
    Rule {
        id: "link-href",
        description: "A kml:Link or kml:Icon has a non-empty href",
        check: link_href,
    },
    Rule {
        id: "link-referent",
        description: "The resource a kml:Link points at exists and has the expected media type",
        check: link_referent,
    },
    Rule {
        id: "icon-referent",
        description: "The image a kml:Icon points at exists",
        check: icon_referent,
    },
    Rule {
        id: "network-link-control-refresh",
        description: "kml:minRefreshPeriod is not negative",
        check: network_link_control_refresh,
    },
    Rule {
        id: "update-target",
        description: "A kml:Update names a loadable target and existing target ids",
        check: update_target,
    },
];

static PARAM_REGEX: OnceLock<Regex> = OnceLock::new();

/// `$[name]` substitution parameters in link hrefs
fn param_regex() -> &'static Regex {
    PARAM_REGEX.get_or_init(|| {
        Regex::new(r"\$\[[^\]]*\]").expect("Failed to compile link parameter regex")
    })
}

/// Replace every substitution parameter with `0`. For image pyramids this
/// addresses the lowest resolution tile.
pub fn substitute_params(href: &str) -> Cow<'_, str> {
    param_regex().replace_all(href, "0")
}

fn link_refresh_values(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:Link[not(ancestor::kml:Update)] | //kml:Icon[not(ancestor::kml:Update)]",
        ledger,
        |link, ledger| {
            for tag in [
                KmlTag::RefreshInterval,
                KmlTag::ViewRefreshTime,
                KmlTag::ViewBoundScale,
            ] {
                if let Some(value) = child_number(link, tag)?.filter(|v| *v <= 0.0) {
                    ledger.error(link, format!("kml:{} must be positive, found {}", tag, value));
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn href_of<'a>(link: Node<'a>) -> Option<&'a str> {
    link.child_text(KmlTag::Href).filter(|h| !h.is_empty())
}

fn link_href(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:Link[not(ancestor::kml:Update)] | //kml:Icon[not(ancestor::kml:Update)]",
        ledger,
        |link, ledger| {
            if href_of(link).is_none() {
                ledger.error(link, format!("{} has no kml:href", link.name()));
            }
            Ok(())
        },
    )?;
    Ok(())
}

/// Dereference the href of `link` and check the media family of the result.
/// Violations are reported at the link's parent.
fn check_referent(
    ctx: &RuleContext<'_>,
    link: Node<'_>,
    family: Option<MediaFamily>,
    ledger: &mut Ledger,
) -> Result<(), RuleError> {
    let parent = link
        .parent()
        .ok_or_else(|| RuleError::Structure(format!("{} has no parent", link.name())))?;
    // A missing href is reported by link-href
    let Some(href) = href_of(link) else {
        return Ok(());
    };
    let href = substitute_params(href);

    match ctx.resolver.dereference(ctx.document, &href) {
        Ok(resource) => {
            if let Some(family) = family.filter(|f| !f.accepts(resource.content_type.as_deref())) {
                ledger.error(
                    parent,
                    format!(
                        "referent '{}' has media type {}, expected {}",
                        href,
                        resource.content_type.as_deref().unwrap_or("(none)"),
                        family.describe()
                    ),
                );
            }
        }
        Err(failure) => {
            ledger.error(parent, format!("referent '{}' is missing: {}", href, failure));
        }
    }
    Ok(())
}

fn parent_family(ctx: &RuleContext<'_>, link: Node<'_>) -> Option<MediaFamily> {
    link.parent()
        .and_then(|p| p.kml_tag())
        .and_then(|tag| ctx.catalog.link_family(tag))
}

fn link_referent(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Link[not(ancestor::kml:Update)]", ledger, |link, ledger| {
        check_referent(ctx, link, parent_family(ctx, link), ledger)
    })?;
    Ok(())
}

fn icon_referent(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Icon[not(ancestor::kml:Update)]", ledger, |icon, ledger| {
        let family = parent_family(ctx, icon).unwrap_or(MediaFamily::Image);
        check_referent(ctx, icon, Some(family), ledger)
    })?;
    Ok(())
}

fn network_link_control_refresh(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:NetworkLinkControl", ledger, |control, ledger| {
        if let Some(period) = child_number(control, KmlTag::MinRefreshPeriod)?.filter(|p| *p < 0.0)
        {
            ledger.error(
                control,
                format!("kml:minRefreshPeriod is negative ({})", period),
            );
        }
        Ok(())
    })?;
    Ok(())
}

fn update_target(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Update", ledger, |update, ledger| {
        let Some(target_href) = update.child(KmlTag::TargetHref) else {
            ledger.error(update, "kml:Update has no kml:targetHref");
            return Ok(());
        };
        let reference = ctx
            .resolver
            .resolve(ctx.document, target_href.text(), &Expectation::document());
        reference.record_failures(ledger, update);

        let target = match &reference.resolution {
            Resolution::ResolvedDocument(doc) | Resolution::ResolvedExternal(doc, _) => {
                Some(doc.as_ref())
            }
            Resolution::ResolvedLocal(_) => Some(ctx.document),
            Resolution::Unresolved => None,
        };
        let Some(target) = target else {
            return Ok(());
        };

        for node in update.descendants() {
            let Some(target_id) = node.attribute("targetId") else {
                continue;
            };
            if target.find_by_id(target_id).is_none() {
                ledger.error(
                    node,
                    format!(
                        "targetId '{}' does not exist in '{}'",
                        target_id,
                        target_href.text()
                    ),
                );
            }
        }
        Ok(())
    })?;
    Ok(())
}
