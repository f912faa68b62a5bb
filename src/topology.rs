//! Planar ring topology
//!
//! Coordinate text is turned into rings of `(lon, lat[, alt])` positions.
//! Containment is decided in the lon/lat plane only. Altitudes are parsed
//! and validated but never participate.

use crate::error::TopologyError;

/// Area below which a ring is treated as collapsed
const AREA_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
    pub alt: Option<f64>,
}

impl Position {
    fn same_place(&self, other: &Position) -> bool {
        self.lon == other.lon && self.lat == other.lat
    }
}

/// Split coordinate text into tuples on XML whitespace
pub fn split_tuples(text: &str) -> impl Iterator<Item = &str> {
    text.split([' ', '\t', '\n', '\r']).filter(|t| !t.is_empty())
}

/// Parse one `lon,lat[,alt]` tuple
pub fn parse_tuple(tuple: &str) -> Result<Position, TopologyError> {
    let invalid = || TopologyError::InvalidTuple {
        tuple: tuple.to_string(),
    };
    let parts: Vec<&str> = tuple.split(',').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }
    let mut values = parts
        .iter()
        .map(|p| crate::evaluator::parse_decimal(p).filter(|v| v.is_finite()));
    let lon = values.next().flatten().ok_or_else(invalid)?;
    let lat = values.next().flatten().ok_or_else(invalid)?;
    let alt = match values.next() {
        Some(v) => Some(v.ok_or_else(invalid)?),
        None => None,
    };
    Ok(Position { lon, lat, alt })
}

/// Where a point lies relative to a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    Inside,
    Boundary,
    Outside,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    points: Vec<Position>,
}

impl Ring {
    pub fn new(points: Vec<Position>) -> Self {
        Self { points }
    }

    /// Build a ring from the text of a kml:coordinates element
    pub fn from_text(text: &str) -> Result<Self, TopologyError> {
        let points = split_tuples(text)
            .map(parse_tuple)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Position] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => first.same_place(last),
            _ => false,
        }
    }

    fn edges(&self) -> impl Iterator<Item = (Position, Position)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }

    /// Shoelace area in the lon/lat plane
    pub fn signed_area(&self) -> f64 {
        self.edges()
            .map(|(a, b)| a.lon * b.lat - b.lon * a.lat)
            .sum::<f64>()
            / 2.0
    }

    /// Check that the ring can serve as a polygon boundary
    pub fn validate_boundary(&self) -> Result<(), TopologyError> {
        if self.points.len() < 4 {
            return Err(TopologyError::TooFewPoints {
                count: self.points.len(),
            });
        }
        if !self.is_closed() {
            return Err(TopologyError::NotClosed);
        }
        if self.signed_area().abs() < AREA_EPSILON {
            return Err(TopologyError::ZeroArea);
        }
        if self.is_self_intersecting() {
            return Err(TopologyError::SelfIntersecting);
        }
        Ok(())
    }

    fn is_self_intersecting(&self) -> bool {
        let mut points = self.points.clone();
        points.dedup_by(|a, b| a.same_place(b));
        let edges: Vec<_> = points.windows(2).map(|w| (w[0], w[1])).collect();
        let n = edges.len();
        for i in 0..n {
            for j in i + 2..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                if segments_touch(edges[i], edges[j]) {
                    return true;
                }
            }
        }
        false
    }

    /// Locate a point with a crossing-number test, checking edges first
    pub fn locate(&self, p: Position) -> PointLocation {
        if self.edges().any(|(a, b)| on_segment(a, b, p)) {
            return PointLocation::Boundary;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let lon_at = a.lon + (p.lat - a.lat) / (b.lat - a.lat) * (b.lon - a.lon);
                if p.lon < lon_at {
                    inside = !inside;
                }
            }
        }
        if inside {
            PointLocation::Inside
        } else {
            PointLocation::Outside
        }
    }
}

/// A polygon with a validated outer boundary
#[derive(Debug, Clone)]
pub struct Polygon {
    outer: Ring,
}

impl Polygon {
    pub fn new(outer: Ring) -> Result<Self, TopologyError> {
        outer.validate_boundary()?;
        Ok(Self { outer })
    }

    pub fn outer(&self) -> &Ring {
        &self.outer
    }

    /// An inner ring is contained when all of its vertices lie inside or on
    /// the outer ring, none of its edges properly cross an outer edge, and
    /// every piece of an edge between two boundary contacts stays covered.
    pub fn contains_ring(&self, inner: &Ring) -> bool {
        let covered = |p: Position| self.outer.locate(p) != PointLocation::Outside;

        if !inner.points().iter().all(|&p| covered(p)) {
            return false;
        }
        for (a, b) in inner.edges() {
            if self
                .outer
                .edges()
                .any(|outer_edge| segments_cross(outer_edge, (a, b)))
            {
                return false;
            }
            let pieces = self.contact_params(a, b);
            let escapes = pieces
                .windows(2)
                .map(|w| interpolate(a, b, (w[0] + w[1]) / 2.0))
                .any(|mid| !covered(mid));
            if escapes {
                return false;
            }
        }
        true
    }

    /// Sorted positions along `a..b`, as fractions of its length, where the
    /// segment meets an outer vertex, including both ends
    fn contact_params(&self, a: Position, b: Position) -> Vec<f64> {
        let (dx, dy) = (b.lon - a.lon, b.lat - a.lat);
        let length_sq = dx * dx + dy * dy;
        let mut params = vec![0.0, 1.0];
        if length_sq > 0.0 {
            params.extend(
                self.outer
                    .points()
                    .iter()
                    .filter(|&&v| on_segment(a, b, v))
                    .map(|v| ((v.lon - a.lon) * dx + (v.lat - a.lat) * dy) / length_sq),
            );
        }
        params.sort_by(f64::total_cmp);
        params.dedup();
        params
    }
}

fn interpolate(a: Position, b: Position, t: f64) -> Position {
    Position {
        lon: a.lon + (b.lon - a.lon) * t,
        lat: a.lat + (b.lat - a.lat) * t,
        alt: None,
    }
}

/// Indices of the inner rings not contained in `outer`.
///
/// A degenerate outer ring is an error and no inner ring is examined.
pub fn uncontained_rings(outer: &Ring, inners: &[Ring]) -> Result<Vec<usize>, TopologyError> {
    let polygon = Polygon::new(outer.clone())?;
    Ok(inners
        .iter()
        .enumerate()
        .filter(|(_, ring)| !polygon.contains_ring(ring))
        .map(|(i, _)| i)
        .collect())
}

fn orientation(a: Position, b: Position, c: Position) -> f64 {
    (b.lon - a.lon) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lon - a.lon)
}

fn on_segment(a: Position, b: Position, p: Position) -> bool {
    orientation(a, b, p) == 0.0
        && p.lon >= a.lon.min(b.lon)
        && p.lon <= a.lon.max(b.lon)
        && p.lat >= a.lat.min(b.lat)
        && p.lat <= a.lat.max(b.lat)
}

/// Interiors cross at a single point
fn segments_cross(s: (Position, Position), t: (Position, Position)) -> bool {
    let d1 = orientation(s.0, s.1, t.0);
    let d2 = orientation(s.0, s.1, t.1);
    let d3 = orientation(t.0, t.1, s.0);
    let d4 = orientation(t.0, t.1, s.1);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

/// Segments share at least one point
fn segments_touch(s: (Position, Position), t: (Position, Position)) -> bool {
    segments_cross(s, t)
        || on_segment(s.0, s.1, t.0)
        || on_segment(s.0, s.1, t.1)
        || on_segment(t.0, t.1, s.0)
        || on_segment(t.0, t.1, s.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(text: &str) -> Ring {
        Ring::from_text(text).unwrap()
    }

    const OUTER: &str = "0,0 10,0 10,10 0,10 0,0";

    #[test]
    fn test_parse_tuple() {
        assert_eq!(
            parse_tuple("1.5,-2,300").unwrap(),
            Position {
                lon: 1.5,
                lat: -2.0,
                alt: Some(300.0)
            }
        );
        assert!(parse_tuple("1").is_err());
        assert!(parse_tuple("1,2,3,4").is_err());
        assert!(parse_tuple("a,b").is_err());
        assert!(parse_tuple("1,,2").is_err());
    }

    #[test]
    fn test_split_tuples_on_xml_whitespace() {
        let tuples: Vec<_> = split_tuples(" 1,2\n\t3,4\r\n  5,6 ").collect();
        assert_eq!(tuples, vec!["1,2", "3,4", "5,6"]);
    }

    #[test]
    fn test_square_inside_square_is_contained() {
        let inner = ring("2,2 8,2 8,8 2,8 2,2");
        assert_eq!(uncontained_rings(&ring(OUTER), &[inner]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_inner_ring_touching_boundary_is_contained() {
        let inner = ring("0,0 5,0 5,5 0,5 0,0");
        assert!(uncontained_rings(&ring(OUTER), &[inner]).unwrap().is_empty());
    }

    #[test]
    fn test_vertex_outside_is_reported() {
        let inside = ring("2,2 8,2 8,8 2,8 2,2");
        let escaping = ring("2,2 12,2 8,8 2,8 2,2");
        assert_eq!(
            uncontained_rings(&ring(OUTER), &[inside, escaping]).unwrap(),
            vec![1]
        );
    }

    #[test]
    fn test_edge_leaving_concave_outer_is_reported() {
        // U-shaped outer boundary with a notch between x=4 and x=6 above y=2
        let outer = ring("0,0 10,0 10,10 6,10 6,2 4,2 4,10 0,10 0,0");
        let bridging = ring("2,8 8,8 8,9 2,9 2,8");
        assert_eq!(uncontained_rings(&outer, &[bridging]).unwrap(), vec![0]);
    }

    #[test]
    fn test_edge_passing_through_notch_tips_is_reported() {
        // channel from the top edge ending in a diamond whose side tips sit
        // on the inner ring's top edge at (2,5) and (3,5)
        let outer = ring(
            "0,0 10,0 10,10 2.6,10 2.6,5.5 3,5 2.5,4.5 2,5 2.4,5.5 2.4,10 0,10 0,0",
        );
        let inner = ring("1,1 9,1 9,5 1,5 1,1");
        let at = |lon, lat| Position { lon, lat, alt: None };
        assert_eq!(outer.locate(at(2.5, 5.0)), PointLocation::Outside);
        assert_eq!(uncontained_rings(&outer, &[inner]).unwrap(), vec![0]);
    }

    #[test]
    fn test_edge_along_outer_boundary_is_contained() {
        let inner = ring("0,2 0,8 5,8 5,2 0,2");
        assert!(uncontained_rings(&ring(OUTER), &[inner]).unwrap().is_empty());
    }

    #[test]
    fn test_bow_tie_outer_ring_is_self_intersecting() {
        let outer = ring("0,0 10,10 10,0 0,5 0,0");
        let err = uncontained_rings(&outer, &[ring("1,1 2,1 2,2 1,1")]).unwrap_err();
        assert_eq!(err, TopologyError::SelfIntersecting);
    }

    #[test]
    fn test_zero_area_outer_ring() {
        let outer = ring("0,0 5,5 10,10 0,0");
        assert_eq!(
            uncontained_rings(&outer, &[]).unwrap_err(),
            TopologyError::ZeroArea
        );
    }

    #[test]
    fn test_short_and_open_outer_rings() {
        assert_eq!(
            Polygon::new(ring("0,0 1,0 0,0")).unwrap_err(),
            TopologyError::TooFewPoints { count: 3 }
        );
        assert_eq!(
            Polygon::new(ring("0,0 1,0 1,1 0,1")).unwrap_err(),
            TopologyError::NotClosed
        );
    }

    #[test]
    fn test_degenerate_inner_ring_is_tested_by_vertices() {
        let collapsed = ring("2,2 4,4 6,6 2,2");
        assert!(uncontained_rings(&ring(OUTER), &[collapsed]).unwrap().is_empty());

        let collapsed_outside = ring("2,2 14,14 6,6 2,2");
        assert_eq!(
            uncontained_rings(&ring(OUTER), &[collapsed_outside]).unwrap(),
            vec![0]
        );
    }

    #[test]
    fn test_point_location() {
        let square = ring(OUTER);
        let at = |lon, lat| Position { lon, lat, alt: None };
        assert_eq!(square.locate(at(5.0, 5.0)), PointLocation::Inside);
        assert_eq!(square.locate(at(10.0, 5.0)), PointLocation::Boundary);
        assert_eq!(square.locate(at(0.0, 0.0)), PointLocation::Boundary);
        assert_eq!(square.locate(at(11.0, 5.0)), PointLocation::Outside);
    }
}
