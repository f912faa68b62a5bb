//! Geometry constraints: coordinate tuples, ring closure, polygon topology,
//! altitude handling and bounding boxes.

use std::collections::HashSet;

use crate::document::{KmlTag, Node};
use crate::error::{EvaluatorError, RuleError};
use crate::evaluator::{
    DEFAULT_ALTITUDE_MODE, RuleContext, altitude_mode, child_number, is_true, parse_decimal,
};
use crate::ledger::Ledger;
use crate::topology::{Ring, split_tuples, uncontained_rings};

use super::{Rule, require_not_empty};

pub const RULES: &[Rule] = &[
    Rule {
        id: "coordinates",
        description: "Coordinate tuples have 2 or 3 decimal components within the valid ranges",
        check: coordinates,
    },
    Rule {
        id: "point-single-tuple",
        description: "A kml:Point has exactly one coordinate tuple",
        check: point_single_tuple,
    },
    Rule {
        id: "linestring-min-tuples",
        description: "A kml:LineString has at least two coordinate tuples",
        check: linestring_min_tuples,
    },
    Rule {
        id: "linearring-closed",
        description: "A kml:LinearRing has at least four tuples and is closed",
        check: linearring_closed,
    },
    Rule {
        id: "polygon-boundaries",
        description: "A kml:Polygon has an outer boundary that contains every inner boundary",
        check: polygon_boundaries,
    },
    Rule {
        id: "extrude-altitude-mode",
        description: "An extruded geometry is not clamped to the ground",
        check: extrude_altitude_mode,
    },
    Rule {
        id: "tessellate-altitude-mode",
        description: "A tessellated geometry is clamped to the ground",
        check: tessellate_altitude_mode,
    },
    Rule {
        id: "latlonaltbox",
        description: "A kml:LatLonAltBox describes a non-empty, well-ordered volume",
        check: lat_lon_alt_box,
    },
    Rule {
        id: "latlonbox",
        description: "A kml:LatLonBox has all four sides within the valid ranges",
        check: lat_lon_box,
    },
    Rule {
        id: "model-content",
        description: "A kml:Model has a kml:Link and a kml:Location",
        check: model_content,
    },
    Rule {
        id: "resource-map-aliases",
        description: "Texture aliases refer to the model file and to existing images",
        check: resource_map_aliases,
    },
    Rule {
        id: "orientation-not-empty",
        description: "A kml:Orientation has at least one child element",
        check: orientation_not_empty,
    },
];

fn longitude_in_range(value: f64) -> bool {
    (-180.0..=180.0).contains(&value)
}

fn latitude_in_range(value: f64) -> bool {
    (-90.0..=90.0).contains(&value)
}

/// Tuples of the kml:coordinates child of a geometry
fn tuples_of(geometry: Node<'_>) -> Option<Vec<&str>> {
    geometry
        .child(KmlTag::Coordinates)
        .map(|c| split_tuples(c.text()).collect())
}

fn coordinates(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:coordinates[not(ancestor::kml:Update)]",
        ledger,
        |node, ledger| {
            for (index, tuple) in split_tuples(node.text()).enumerate() {
                let position = index + 1;
                let parts: Vec<&str> = tuple.split(',').collect();
                if !(2..=3).contains(&parts.len()) {
                    ledger.error(
                        node,
                        format!(
                            "tuple {} ('{}') has {} components, expected 2 or 3",
                            position,
                            tuple,
                            parts.len()
                        ),
                    );
                    continue;
                }
                let values: Option<Vec<f64>> = parts.iter().map(|p| parse_decimal(p)).collect();
                let Some(values) = values else {
                    ledger.error(
                        node,
                        format!("tuple {} ('{}') has a non-numeric component", position, tuple),
                    );
                    continue;
                };
                if !longitude_in_range(values[0]) {
                    ledger.error(
                        node,
                        format!(
                            "tuple {}: longitude {} is outside [-180, 180]",
                            position, values[0]
                        ),
                    );
                }
                if !latitude_in_range(values[1]) {
                    ledger.error(
                        node,
                        format!("tuple {}: latitude {} is outside [-90, 90]", position, values[1]),
                    );
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn point_single_tuple(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Point[not(ancestor::kml:Update)]", ledger, |point, ledger| {
        if let Some(tuples) = tuples_of(point).filter(|t| t.len() > 1) {
            ledger.error(
                point,
                format!("kml:Point has {} coordinate tuples, expected one", tuples.len()),
            );
        }
        Ok(())
    })?;
    Ok(())
}

fn linestring_min_tuples(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:LineString[not(ancestor::kml:Update)]",
        ledger,
        |line, ledger| {
            if let Some(tuples) = tuples_of(line).filter(|t| t.len() < 2) {
                ledger.error(
                    line,
                    format!(
                        "kml:LineString has {} coordinate tuple(s), at least 2 are required",
                        tuples.len()
                    ),
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn linearring_closed(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:LinearRing[not(ancestor::kml:Update)]",
        ledger,
        |ring, ledger| {
            let Some(tuples) = tuples_of(ring) else {
                return Ok(());
            };
            if tuples.len() < 4 {
                ledger.error(
                    ring,
                    format!(
                        "kml:LinearRing has {} coordinate tuple(s), at least 4 are required",
                        tuples.len()
                    ),
                );
            }
            if let (Some(first), Some(last)) = (tuples.first(), tuples.last()) {
                if first != last {
                    ledger.error(
                        ring,
                        format!(
                            "kml:LinearRing is not closed: first tuple '{}' differs from last tuple '{}'",
                            first, last
                        ),
                    );
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

/// Planar ring of a kml:LinearRing, or None when its coordinates are unusable
fn ring_of(linear_ring: Node<'_>) -> Option<Ring> {
    linear_ring
        .child(KmlTag::Coordinates)
        .and_then(|c| Ring::from_text(c.text()).ok())
}

fn polygon_boundaries(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:Polygon[not(ancestor::kml:Update)]",
        ledger,
        |polygon, ledger| {
            let Some(outer_boundary) = polygon.child(KmlTag::OuterBoundaryIs) else {
                ledger.error(polygon, "kml:Polygon has no kml:outerBoundaryIs");
                return Ok(());
            };
            let Some(outer_node) = outer_boundary.child(KmlTag::LinearRing) else {
                ledger.error(outer_boundary, "kml:outerBoundaryIs has no kml:LinearRing");
                return Ok(());
            };
            // Malformed tuples are reported by the coordinates rule
            let Some(outer) = ring_of(outer_node) else {
                return Ok(());
            };

            let inner: Vec<(Node<'_>, Ring)> = polygon
                .children_of(KmlTag::InnerBoundaryIs)
                .filter_map(|b| b.child(KmlTag::LinearRing))
                .filter_map(|node| ring_of(node).map(|ring| (node, ring)))
                .collect();
            let rings: Vec<Ring> = inner.iter().map(|(_, ring)| ring.clone()).collect();

            match uncontained_rings(&outer, &rings) {
                Ok(indices) => {
                    for index in indices {
                        ledger.error(
                            inner[index].0,
                            "inner boundary is not contained in the outer boundary",
                        );
                    }
                }
                Err(err) => {
                    ledger.error(outer_node, format!("outer boundary is invalid: {}", err));
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn extrude_altitude_mode(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    let mut checked = HashSet::new();
    ctx.evaluate(
        "//kml:extrude[not(ancestor::kml:Update)]",
        ledger,
        |extrude, ledger| {
            if !is_true(extrude.text()) {
                return Ok(());
            }
            let geometry = extrude
                .parent()
                .ok_or_else(|| RuleError::Structure("kml:extrude has no parent".to_string()))?;
            if !checked.insert(geometry.id()) {
                return Ok(());
            }
            if !geometry.has_child(KmlTag::AltitudeMode) {
                ledger.error(
                    geometry,
                    format!(
                        "{} is extruded but has no kml:altitudeMode (defaults to {})",
                        geometry.name(),
                        DEFAULT_ALTITUDE_MODE
                    ),
                );
            } else if altitude_mode(geometry) == DEFAULT_ALTITUDE_MODE {
                ledger.error(
                    geometry,
                    format!(
                        "{} is extruded but its kml:altitudeMode is {}",
                        geometry.name(),
                        DEFAULT_ALTITUDE_MODE
                    ),
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn tessellate_altitude_mode(
    ctx: &RuleContext<'_>,
    ledger: &mut Ledger,
) -> Result<(), EvaluatorError> {
    let mut checked = HashSet::new();
    ctx.evaluate(
        "//kml:tessellate[not(ancestor::kml:Update)]",
        ledger,
        |tessellate, ledger| {
            if !is_true(tessellate.text()) {
                return Ok(());
            }
            let geometry = tessellate
                .parent()
                .ok_or_else(|| RuleError::Structure("kml:tessellate has no parent".to_string()))?;
            if !checked.insert(geometry.id()) {
                return Ok(());
            }
            let mode = altitude_mode(geometry);
            if mode != DEFAULT_ALTITUDE_MODE {
                ledger.error(
                    geometry,
                    format!(
                        "{} is tessellated but its kml:altitudeMode is {}",
                        geometry.name(),
                        mode
                    ),
                );
            }
            Ok(())
        },
    )?;
    Ok(())
}

/// Range checks shared by both bounding box kinds
fn check_box_ranges(
    node: Node<'_>,
    ledger: &mut Ledger,
    north: Option<f64>,
    south: Option<f64>,
    east: Option<f64>,
    west: Option<f64>,
) {
    for (label, value) in [("north", north), ("south", south)] {
        if let Some(v) = value.filter(|v| !latitude_in_range(*v)) {
            ledger.error(node, format!("kml:{} {} is outside [-90, 90]", label, v));
        }
    }
    for (label, value) in [("east", east), ("west", west)] {
        if let Some(v) = value.filter(|v| !longitude_in_range(*v)) {
            ledger.error(node, format!("kml:{} {} is outside [-180, 180]", label, v));
        }
    }
}

fn lat_lon_alt_box(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:LatLonAltBox[not(ancestor::kml:Update)]",
        ledger,
        |bbox, ledger| {
            let north = child_number(bbox, KmlTag::North)?;
            let south = child_number(bbox, KmlTag::South)?;
            let east = child_number(bbox, KmlTag::East)?;
            let west = child_number(bbox, KmlTag::West)?;
            check_box_ranges(bbox, ledger, north, south, east, west);

            let (east, west) = (east.unwrap_or(180.0), west.unwrap_or(-180.0));
            if east <= west {
                ledger.error(
                    bbox,
                    format!("kml:east ({}) must be greater than kml:west ({})", east, west),
                );
            }
            let (north, south) = (north.unwrap_or(90.0), south.unwrap_or(-90.0));
            if north <= south {
                ledger.error(
                    bbox,
                    format!(
                        "kml:north ({}) must be greater than kml:south ({})",
                        north, south
                    ),
                );
            }

            let min = child_number(bbox, KmlTag::MinAltitude)?;
            let max = child_number(bbox, KmlTag::MaxAltitude)?;
            if let (Some(min), Some(max)) = (min, max) {
                match bbox.child_text(KmlTag::AltitudeMode) {
                    None => ledger.error(
                        bbox,
                        "kml:minAltitude and kml:maxAltitude are set but kml:altitudeMode is absent",
                    ),
                    Some(DEFAULT_ALTITUDE_MODE) => ledger.error(
                        bbox,
                        "kml:minAltitude and kml:maxAltitude are set but kml:altitudeMode is clampToGround",
                    ),
                    Some(_) => {}
                }
                if min > max {
                    ledger.error(
                        bbox,
                        format!(
                            "kml:minAltitude ({}) is greater than kml:maxAltitude ({})",
                            min, max
                        ),
                    );
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn lat_lon_box(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:LatLonBox[not(ancestor::kml:Update)]",
        ledger,
        |bbox, ledger| {
            let sides = [KmlTag::North, KmlTag::South, KmlTag::East, KmlTag::West];
            let missing: Vec<String> = sides
                .iter()
                .filter(|tag| !bbox.has_child(**tag))
                .map(|tag| format!("kml:{}", tag))
                .collect();
            if !missing.is_empty() {
                ledger.error(
                    bbox,
                    format!("kml:LatLonBox is missing {}", missing.join(", ")),
                );
                return Ok(());
            }
            check_box_ranges(
                bbox,
                ledger,
                child_number(bbox, KmlTag::North)?,
                child_number(bbox, KmlTag::South)?,
                child_number(bbox, KmlTag::East)?,
                child_number(bbox, KmlTag::West)?,
            );
            Ok(())
        },
    )?;
    Ok(())
}

fn model_content(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate("//kml:Model[not(ancestor::kml:Update)]", ledger, |model, ledger| {
        if !ctx.test(model, "kml:Link and kml:Location")? {
            ledger.error(model, "kml:Model requires both kml:Link and kml:Location");
        }
        Ok(())
    })?;
    Ok(())
}

fn resource_map_aliases(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    ctx.evaluate(
        "//kml:ResourceMap[not(ancestor::kml:Update)]",
        ledger,
        |map, ledger| {
            let model = map
                .parent()
                .ok_or_else(|| RuleError::Structure("kml:ResourceMap has no parent".to_string()))?;
            let href = model
                .child(KmlTag::Link)
                .and_then(|link| link.child_text(KmlTag::Href))
                .filter(|href| !href.is_empty());

            let model_text = match href {
                Some(href) => match ctx.resolver.dereference(ctx.document, href) {
                    Ok(resource) => Some(String::from_utf8_lossy(&resource.bytes).into_owned()),
                    Err(failure) => {
                        ledger.error(model, format!("model file cannot be read: {}", failure));
                        None
                    }
                },
                None => None,
            };

            for alias in map.children_of(KmlTag::Alias) {
                if let Some(text) = &model_text {
                    if let Some(source) = alias.child_text(KmlTag::SourceHref) {
                        let file_name = source.rsplit('/').next().unwrap_or(source);
                        if !text.contains(file_name) {
                            ledger.error(
                                alias,
                                format!("sourceHref '{}' does not occur in the model file", source),
                            );
                        }
                    }
                }
                if let Some(target) = alias.child_text(KmlTag::TargetHref) {
                    if let Err(failure) = ctx.resolver.dereference(ctx.document, target) {
                        ledger.error(alias, format!("texture referent is missing: {}", failure));
                    }
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

fn orientation_not_empty(ctx: &RuleContext<'_>, ledger: &mut Ledger) -> Result<(), EvaluatorError> {
    require_not_empty(ctx, KmlTag::Orientation, ledger)
}
