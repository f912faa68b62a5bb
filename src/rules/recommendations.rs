//! Level 2 recommendations for general document content

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::document::KmlTag;
use crate::error::{EvaluatorError, RuleError};
use crate::evaluator::{DEFAULT_ALTITUDE_MODE, RuleContext, altitude_mode, effective_text};
use crate::ledger::Ledger;
use crate::topology::split_tuples;

use super::{Rule, require_not_empty};

pub const RULES: &[Rule] = &[
    Rule {
        id: "altitude-if-not-clamped",
        description: "Positions above the ground carry an altitude",
        check: altitude_if_not_clamped,
    },
    Rule {
        id: "scale-not-empty",
        description: "A kml:Scale sets at least one of x, y or z",
        check: scale_not_empty,
    },
    Rule {
        id: "document-not-empty",
        description: "The kml:kml element has content",
        check: document_not_empty,
    },
    Rule {
        id: "folder-not-empty",
        description: "A kml:Folder has content",
        check: folder_not_empty,
    },
    Rule {
        id: "extended-data-not-empty",
        description: "A kml:ExtendedData has content",
        check: extended_data_not_empty,
    },
    Rule {
        id: "view-format-not-empty",
        description: "A kml:viewFormat is not empty",
        check: view_format_not_empty,
    },
    Rule {
        id: "http-query-params",
        description: "A kml:httpQuery uses at least one supported parameter",
        check: http_query_params,
    },
    Rule {
        id: "polygon-ring-attributes",
        description: "A kml:LinearRing inside a kml:Polygon has no altitude settings of its own",
        check: polygon_ring_attributes,
    },
    Rule {
        id: "data-name-value",
        description: "A kml:Data has a name and a value",
        check: data_name_value,
    },
    Rule {
        id: "resource-map-content",
        description: "A kml:ResourceMap has aliases with unique source references",
        check: resource_map_content,
    },
    Rule {
        id: "link-refresh-modes",
        description: "Refresh times are only given with the matching refresh mode",
        check: link_refresh_modes,
    },
    Rule {
        id: "photo-overlay-pyramid",
        description: "An image pyramid and the [level] href parameter occur together",
        check: photo_overlay_pyramid,
    },
    Rule {
        id: "ground-overlay-latlonbox",
        description: "A kml:GroundOverlay has a complete kml:LatLonBox",
        check: ground_overlay_latlonbox,
    },
    Rule {
        id: "camera-content",
        description: "A kml:Camera has a full position and is not clamped to the ground",
        check: camera_content,
    },
    Rule {
        id: "location-content",
        description: "A kml:Location has a position and an altitude when raised",
        check: location_content,
    },
    Rule {
        id: "overlay-icon",
        description: "An overlay has a kml:Icon",
        check: overlay_icon,
    },
    Rule {
        id: "screen-overlay-xy",
        description: "A kml:ScreenOverlay has a kml:screenXY",
        check: screen_overlay_xy,
    },
    Rule {
        id: "image-pyramid",
        description: "A kml:ImagePyramid has its dimensions and a power-of-two tile size",
        check: image_pyramid,
    },
    Rule {
        id: "multi-geometry-count",
        description: "A kml:MultiGeometry has more than one child geometry",
        check: multi_geometry_count,
    },
    Rule {
        id: "placemark-geometry",
        description: "A kml:Placemark has a geometry",
        check: placemark_geometry,
    },
];

static QUERY_PARAM_REGEX: OnceLock<Regex> = OnceLock::new();

fn query_param_regex() -> &'static Regex {
    QUERY_PARAM_REGEX.get_or_init(|| {
        Regex::new(r"\[([a-zA-Z]+)\]").expect("Failed to compile query parameter regex")
    })
}

fn altitude_if_not_clamped(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:coordinates[not(ancestor::kml:Update)] | //kml:Location[not(ancestor::kml:Update)]",
        ledger,
        |node, ledger| {
            let Some(owner) = node.parent() else {
                return Ok(());
            };
            if altitude_mode(owner) == DEFAULT_ALTITUDE_MODE {
                return Ok(());
            }
            if node.is(KmlTag::Location) {
                if node.first_descendant(KmlTag::Altitude).is_none() {
                    ledger.error(node, "kml:Location above the ground has no kml:altitude");
                }
                return Ok(());
            }
            for (index, tuple) in split_tuples(node.text()).enumerate() {
                if tuple.split(',').count() != 3 {
                    ledger.error(
                        node,
                        format!(
                            "tuple {} ('{}') has no altitude but the geometry is not clamped to the ground",
                            index + 1,
                            tuple
                        ),
                    );
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn scale_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Scale[not(ancestor::kml:Update)]", ledger, |scale, ledger| {
        if !ctx.test(scale, "kml:x or kml:y or kml:z")? {
            ledger.error(scale, "kml:Scale has none of kml:x, kml:y or kml:z");
        }
        Ok(())
    })?;
    Ok(())
}

fn document_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    let root = ctx.root();
    if root.kml_children().next().is_none() {
        ledger.error(root, "document has no KML content");
    }
    Ok(())
}

fn folder_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    require_not_empty(ctx, KmlTag::Folder, ledger)
}

fn extended_data_not_empty(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:ExtendedData", ledger, |data, ledger| {
        // Extension elements from other namespaces count as content
        if data.children().next().is_none() {
            ledger.error(data, "kml:ExtendedData is empty");
        }
        Ok(())
    })?;
    Ok(())
}

fn view_format_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:viewFormat", ledger, |format, ledger| {
        if format.text().is_empty() {
            ledger.error(format, "kml:viewFormat is empty");
        }
        Ok(())
    })?;
    Ok(())
}

fn http_query_params(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:httpQuery", ledger, |query, ledger| {
        let text = query.text();
        if text.is_empty() {
            ledger.error(query, "kml:httpQuery is empty");
            return Ok(());
        }
        let supported = query_param_regex()
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .any(|name| {
                ctx.catalog
                    .http_query_params
                    .iter()
                    .any(|p| p == name.as_str())
            });
        if !supported {
            ledger.error(
                query,
                format!(
                    "kml:httpQuery '{}' uses none of [{}]",
                    text,
                    ctx.catalog.http_query_params.join("], [")
                ),
            );
        }
        Ok(())
    })?;
    Ok(())
}

fn polygon_ring_attributes(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:LinearRing[ancestor::kml:Polygon]",
        ledger,
        |ring, ledger| {
            if !ctx.test(ring, "not(kml:extrude or kml:tessellate or kml:altitudeMode)")? {
                ledger.error(
                    ring,
                    "kml:LinearRing in a kml:Polygon sets extrude, tessellate or altitudeMode",
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn data_name_value(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Data", ledger, |data, ledger| {
        if data.attribute("name").is_none_or(str::is_empty)
            || data.first_descendant(KmlTag::Value).is_none()
        {
            ledger.error(data, "kml:Data requires a name and a kml:value");
        }
        Ok(())
    })?;
    Ok(())
}

fn resource_map_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:ResourceMap", ledger, |map, ledger| {
        let mut sources = HashSet::new();
        let mut aliases = map.descendants_of(KmlTag::Alias).peekable();
        if aliases.peek().is_none() {
            ledger.error(map, "kml:ResourceMap has no kml:Alias");
            return Ok(());
        }
        for alias in aliases {
            let Some(source) = alias.child_text(KmlTag::SourceHref) else {
                continue;
            };
            if !sources.insert(source) {
                ledger.error(
                    alias,
                    format!("sourceHref '{}' is mapped more than once", source),
                );
            }
        }
        Ok(())
    })?;
    Ok(())
}

fn link_refresh_modes(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Link | //kml:Icon", ledger, |link, ledger| {
        let refresh_mode = effective_text(link, KmlTag::RefreshMode, "onChange");
        if link.has_child(KmlTag::RefreshInterval) && refresh_mode != "onInterval" {
            ledger.error(
                link,
                format!(
                    "kml:refreshInterval is set but kml:refreshMode is {}",
                    refresh_mode
                ),
            );
        }
        let view_refresh_mode = effective_text(link, KmlTag::ViewRefreshMode, "never");
        if link.has_child(KmlTag::ViewRefreshTime) && view_refresh_mode != "onStop" {
            ledger.error(
                link,
                format!(
                    "kml:viewRefreshTime is set but kml:viewRefreshMode is {}",
                    view_refresh_mode
                ),
            );
        }
        Ok(())
    })?;
    Ok(())
}

fn photo_overlay_pyramid(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:PhotoOverlay[kml:Icon or kml:ImagePyramid]",
        ledger,
        |overlay, ledger| {
            let has_level = overlay
                .child(KmlTag::Icon)
                .and_then(|icon| icon.child_text(KmlTag::Href))
                .is_some_and(|href| href.contains("[level]"));
            let has_pyramid = overlay.first_descendant(KmlTag::ImagePyramid).is_some();
            match (has_pyramid, has_level) {
                (true, false) => ledger.error(
                    overlay,
                    "kml:PhotoOverlay has a kml:ImagePyramid but its href has no [level] parameter",
                ),
                (false, true) => ledger.error(
                    overlay,
                    "kml:PhotoOverlay href has a [level] parameter but no kml:ImagePyramid",
                ),
                _ => {}
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn ground_overlay_latlonbox(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:GroundOverlay[not(ancestor::kml:Update)]",
        ledger,
        |overlay, ledger| {
            if !ctx.test(
                overlay,
                "kml:LatLonBox[kml:north and kml:south and kml:east and kml:west]",
            )? {
                ledger.error(overlay, "kml:GroundOverlay has no complete kml:LatLonBox");
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn camera_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Camera[not(ancestor::kml:Update)]", ledger, |camera, ledger| {
        if !ctx.test(camera, "kml:latitude and kml:longitude and kml:altitude")? {
            ledger.error(
                camera,
                "kml:Camera requires kml:latitude, kml:longitude and kml:altitude",
            );
        }
        if altitude_mode(camera) == DEFAULT_ALTITUDE_MODE {
            ledger.error(camera, "kml:Camera is clamped to the ground");
        }
        Ok(())
    })?;
    Ok(())
}

fn location_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Location", ledger, |location, ledger| {
        if !ctx.test(location, "kml:latitude and kml:longitude")? {
            ledger.error(location, "kml:Location requires kml:latitude and kml:longitude");
        }
        let model = location
            .parent()
            .ok_or_else(|| RuleError::Structure("kml:Location has no parent".to_string()))?;
        if altitude_mode(model) != DEFAULT_ALTITUDE_MODE
            && location.first_descendant(KmlTag::Altitude).is_none()
        {
            ledger.error(
                location,
                format!(
                    "kml:Location has no kml:altitude but its model uses {}",
                    altitude_mode(model)
                ),
            );
        }
        Ok(())
    })?;
    Ok(())
}

fn overlay_icon(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:ScreenOverlay[not(ancestor::kml:Update)] | //kml:GroundOverlay[not(ancestor::kml:Update)] | //kml:PhotoOverlay[not(ancestor::kml:Update)]",
        ledger,
        |overlay, ledger| {
            if overlay.first_descendant(KmlTag::Icon).is_none() {
                ledger.error(overlay, format!("{} has no kml:Icon", overlay.name()));
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn screen_overlay_xy(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:ScreenOverlay[not(ancestor::kml:Update)]",
        ledger,
        |overlay, ledger| {
            if overlay.first_descendant(KmlTag::ScreenXY).is_none() {
                ledger.error(overlay, "kml:ScreenOverlay has no kml:screenXY");
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn image_pyramid(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:ImagePyramid[not(ancestor::kml:Update)]",
        ledger,
        |pyramid, ledger| {
            if !ctx.test(pyramid, "kml:maxWidth and kml:maxHeight")? {
                ledger.error(pyramid, "kml:ImagePyramid requires kml:maxWidth and kml:maxHeight");
            }
            if let Some(tile_size) = pyramid.first_descendant(KmlTag::TileSize) {
                let size: i64 = tile_size.text().parse().map_err(|_| RuleError::InvalidNumber {
                    element: tile_size.name().to_string(),
                    value: tile_size.text().to_string(),
                })?;
                if size <= 0 || size & (size - 1) != 0 {
                    ledger.error(
                        pyramid,
                        format!("kml:tileSize {} is not a power of 2", size),
                    );
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn multi_geometry_count(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:MultiGeometry[not(ancestor::kml:Update)]",
        ledger,
        |multi, ledger| {
            if !ctx.test(multi, "count(kml:*) > 1")? {
                ledger.error(multi, "kml:MultiGeometry has fewer than two geometries");
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn placemark_geometry(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:Placemark[not(ancestor::kml:Update)]",
        ledger,
        |placemark, ledger| {
            let has_geometry = placemark
                .kml_children()
                .filter_map(|child| child.kml_tag())
                .any(|tag| ctx.catalog.is_geometry(tag));
            if !has_geometry {
                ledger.error(placemark, "kml:Placemark has no geometry");
            }
            Ok(())
        },
    )?;
    Ok(())
}
