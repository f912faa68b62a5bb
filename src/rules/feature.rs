//! Feature-level constraints: contact data, Atom metadata, overlays and
//! regions.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::document::{AtomTag, KmlTag};
use crate::error::EvaluatorError;
use crate::evaluator::{RuleContext, UNBOUNDED_LOD, child_number, ordered_with_sentinel};
use crate::ledger::Ledger;

use super::Rule;

pub const RULES: &[Rule] = &[
    Rule {
        id: "phone-number",
        description: "A kml:phoneNumber is a tel: URI",
        check: phone_number,
    },
    Rule {
        id: "atom-author",
        description: "An atom:author has an absolute uri and a well-formed email",
        check: atom_author,
    },
    Rule {
        id: "atom-link-rel",
        description: "An atom:link has rel=\"related\"",
        check: atom_link_rel,
    },
    Rule {
        id: "ground-overlay-altitude",
        description: "A kml:GroundOverlay positioned absolutely has an altitude",
        check: ground_overlay_altitude,
    },
    Rule {
        id: "photo-overlay-content",
        description: "A kml:PhotoOverlay has an icon, view volume, point and camera",
        check: photo_overlay_content,
    },
    Rule {
        id: "view-volume",
        description: "A kml:ViewVolume has every field of view and a non-negative near distance",
        check: view_volume,
    },
    Rule {
        id: "region-content",
        description: "A kml:Region has a kml:LatLonAltBox and a kml:Lod",
        check: region_content,
    },
    Rule {
        id: "lod-pixels",
        description: "A kml:Lod has minLodPixels less than maxLodPixels",
        check: lod_pixels,
    },
];

static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn phone_regex() -> &'static Regex {
    PHONE_REGEX.get_or_init(|| {
        Regex::new(
            r"^tel:(\+)?(\d*([-.()])?)+(\d{3}?[-.()])?(\d{3}[-.()])?(\d{4,10})?([;].*)?$",
        )
        .expect("Failed to compile phone number regex")
    })
}

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^(.+)@(.+)\.(.+)$").expect("Failed to compile email regex")
    })
}

fn phone_number(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:phoneNumber", ledger, |node, ledger| {
        if !phone_regex().is_match(node.text()) {
            ledger.error(node, format!("'{}' is not a tel: URI", node.text()));
        }
        Ok(())
    })?;
    Ok(())
}

fn atom_author(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//atom:author", ledger, |author, ledger| {
        if let Some(uri) = author.atom_child(AtomTag::Uri) {
            if let Err(err) = Url::parse(uri.text()) {
                ledger.error(
                    uri,
                    format!("atom:uri '{}' is not an absolute IRI: {}", uri.text(), err),
                );
            }
        }
        if let Some(email) = author.atom_child(AtomTag::Email) {
            if !email_regex().is_match(email.text()) {
                ledger.error(
                    email,
                    format!("atom:email '{}' is not an email address", email.text()),
                );
            }
        }
        Ok(())
    })?;
    Ok(())
}

fn atom_link_rel(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//atom:link", ledger, |link, ledger| {
        match link.attribute("rel") {
            Some("related") => {}
            Some(other) => ledger.error(
                link,
                format!("atom:link has rel=\"{}\", expected \"related\"", other),
            ),
            None => ledger.error(link, "atom:link has no rel attribute"),
        }
        Ok(())
    })?;
    Ok(())
}

fn ground_overlay_altitude(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:GroundOverlay[not(ancestor::kml:Update)]",
        ledger,
        |overlay, ledger| {
            if overlay.child_text(KmlTag::AltitudeMode) == Some("absolute")
                && !overlay.has_child(KmlTag::Altitude)
            {
                ledger.error(
                    overlay,
                    "kml:GroundOverlay with absolute altitudeMode has no kml:altitude",
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn photo_overlay_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:PhotoOverlay[not(ancestor::kml:Update)]",
        ledger,
        |overlay, ledger| {
            let missing: Vec<String> = [
                KmlTag::Icon,
                KmlTag::ViewVolume,
                KmlTag::Point,
                KmlTag::Camera,
            ]
            .into_iter()
            .filter(|tag| overlay.first_descendant(*tag).is_none())
            .map(|tag| format!("kml:{}", tag))
            .collect();
            if !missing.is_empty() {
                ledger.error(
                    overlay,
                    format!("kml:PhotoOverlay is missing {}", missing.join(", ")),
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn view_volume(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:ViewVolume[not(ancestor::kml:Update)]",
        ledger,
        |volume, ledger| {
            let missing: Vec<String> = [
                KmlTag::LeftFov,
                KmlTag::RightFov,
                KmlTag::BottomFov,
                KmlTag::TopFov,
                KmlTag::Near,
            ]
            .into_iter()
            .filter(|tag| !volume.has_child(*tag))
            .map(|tag| format!("kml:{}", tag))
            .collect();
            if !missing.is_empty() {
                ledger.error(
                    volume,
                    format!("kml:ViewVolume is missing {}", missing.join(", ")),
                );
            }
            if let Some(near) = child_number(volume, KmlTag::Near)?.filter(|n| *n < 0.0) {
                ledger.error(volume, format!("kml:near is negative ({})", near));
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn region_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:Region[not(ancestor::kml:Update)]",
        ledger,
        |region, ledger| {
            if !ctx.test(region, "kml:LatLonAltBox and kml:Lod")? {
                ledger.error(region, "kml:Region requires kml:LatLonAltBox and kml:Lod");
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn lod_pixels(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Lod[not(ancestor::kml:Update)]", ledger, |lod, ledger| {
        let Some(min) = child_number(lod, KmlTag::MinLodPixels)? else {
            ledger.error(lod, "kml:Lod has no kml:minLodPixels");
            return Ok(());
        };
        let max = child_number(lod, KmlTag::MaxLodPixels)?.unwrap_or(UNBOUNDED_LOD);
        if !ordered_with_sentinel(min, max, UNBOUNDED_LOD) {
            ledger.error(
                lod,
                format!(
                    "kml:minLodPixels ({}) must be less than kml:maxLodPixels ({})",
                    min, max
                ),
            );
        }
        Ok(())
    })?;
    Ok(())
}
