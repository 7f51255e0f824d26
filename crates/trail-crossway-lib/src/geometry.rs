//! Planar geometry kernel for trail polylines
//!
//! Polylines are treated as straight segments between consecutive points in
//! (longitude, latitude) space rather than great-circle arcs. This is adequate for the
//! local scale of trail geometry and keeps every routine here pure and allocation-light.
//!
//! Endpoints that land within a small tolerance of the other segment count as touching,
//! so coordinate noise from storage round-trips does not produce false negatives.

use crate::{Coordinate2D, CrosswayError, Result};
use geo::{Coord, Rect};

/// Default tolerance (degrees) under which an endpoint is considered to touch a segment
pub const EPSILON: f64 = 1e-9;

/// Relative tolerance under which two segment directions are treated as parallel
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// Axis-aligned rectangle in WGS84 degrees
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Rectangle {
    pub bottom_left: Coordinate2D,
    pub top_right: Coordinate2D,
}

impl Rectangle {
    /// Build a rectangle from two opposite corners in any order
    pub fn from_corners(a: Coordinate2D, b: Coordinate2D) -> Self {
        Self {
            bottom_left: Coordinate2D::new(a.latitude.min(b.latitude), a.longitude.min(b.longitude)),
            top_right: Coordinate2D::new(a.latitude.max(b.latitude), a.longitude.max(b.longitude)),
        }
    }

    /// Planar `geo::Rect` (x = longitude, y = latitude)
    #[inline]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(self.bottom_left.to_coord(), self.top_right.to_coord())
    }

    #[inline]
    pub fn contains(&self, point: &Coordinate2D) -> bool {
        point.latitude >= self.bottom_left.latitude
            && point.latitude <= self.top_right.latitude
            && point.longitude >= self.bottom_left.longitude
            && point.longitude <= self.top_right.longitude
    }

    /// Check for overlap (touching edges count)
    #[inline]
    pub fn intersects(&self, other: &Rectangle) -> bool {
        !(self.top_right.longitude < other.bottom_left.longitude
            || self.bottom_left.longitude > other.top_right.longitude
            || self.top_right.latitude < other.bottom_left.latitude
            || self.bottom_left.latitude > other.top_right.latitude)
    }
}

impl From<Rect<f64>> for Rectangle {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            bottom_left: rect.min().into(),
            top_right: rect.max().into(),
        }
    }
}

/// Nearest point of a polyline to a query point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// Closest point on the polyline
    pub closest: Coordinate2D,
    /// Planar distance from the query point to `closest`
    pub distance: f64,
    /// Cumulative planar arc-length from the first polyline point to `closest`
    pub position: f64,
    /// Index of the segment holding `closest`
    pub segment_index: usize,
}

/// Minimal bounding rectangle covering all points
///
/// Fails with `InvalidInput` when `points` is empty.
pub fn outer_rectangle(points: &[Coordinate2D]) -> Result<Rectangle> {
    let first = points.first().ok_or_else(|| {
        CrosswayError::InvalidInput("Cannot compute bounding rectangle of no points".to_string())
    })?;

    let mut min_lat = first.latitude;
    let mut min_lon = first.longitude;
    let mut max_lat = first.latitude;
    let mut max_lon = first.longitude;

    for point in &points[1..] {
        min_lat = min_lat.min(point.latitude);
        min_lon = min_lon.min(point.longitude);
        max_lat = max_lat.max(point.latitude);
        max_lon = max_lon.max(point.longitude);
    }

    Ok(Rectangle {
        bottom_left: Coordinate2D::new(min_lat, min_lon),
        top_right: Coordinate2D::new(max_lat, max_lon),
    })
}

/// True iff any segment of `line_a` crosses or touches any segment of `line_b`
#[inline]
pub fn segments_intersect(line_a: &[Coordinate2D], line_b: &[Coordinate2D]) -> bool {
    segments_intersect_with_tolerance(line_a, line_b, EPSILON)
}

/// [`segments_intersect`] with an explicit endpoint tolerance
pub fn segments_intersect_with_tolerance(
    line_a: &[Coordinate2D],
    line_b: &[Coordinate2D],
    epsilon: f64,
) -> bool {
    line_a.windows(2).any(|a| {
        let (a1, a2) = (a[0].to_coord(), a[1].to_coord());
        line_b.windows(2).any(|b| {
            segment_pair_intersects(a1, a2, b[0].to_coord(), b[1].to_coord(), epsilon)
        })
    })
}

/// Intersection points between two polylines, ordered as `line_a` is traversed
#[inline]
pub fn intersection_points(line_a: &[Coordinate2D], line_b: &[Coordinate2D]) -> Vec<Coordinate2D> {
    intersection_points_with_tolerance(line_a, line_b, EPSILON)
}

/// [`intersection_points`] with an explicit endpoint tolerance
pub fn intersection_points_with_tolerance(
    line_a: &[Coordinate2D],
    line_b: &[Coordinate2D],
    epsilon: f64,
) -> Vec<Coordinate2D> {
    let mut hits: Vec<(usize, f64, Coord<f64>)> = Vec::new();

    for (i, a) in line_a.windows(2).enumerate() {
        let (a1, a2) = (a[0].to_coord(), a[1].to_coord());
        for b in line_b.windows(2) {
            if let Some((t, point)) =
                segment_intersection_point(a1, a2, b[0].to_coord(), b[1].to_coord(), epsilon)
            {
                hits.push((i, t, point));
            }
        }
    }

    hits.sort_by(|x, y| x.0.cmp(&y.0).then(x.1.total_cmp(&y.1)));

    // A crossing through a shared vertex is reported by both adjacent segments
    let mut points: Vec<Coordinate2D> = Vec::with_capacity(hits.len());
    for (_, _, point) in hits {
        let duplicate = points
            .last()
            .is_some_and(|last| distance(last.to_coord(), point) <= epsilon);
        if !duplicate {
            points.push(point.into());
        }
    }
    points
}

/// Project `point` onto the polyline, returning the minimum-distance projection
///
/// Ties between segments resolve to the earliest segment. Returns `None` for an empty
/// polyline; a single-point polyline projects onto that point.
pub fn project_onto_polyline(point: &Coordinate2D, polyline: &[Coordinate2D]) -> Option<Projection> {
    let p = point.to_coord();
    match polyline {
        [] => None,
        [only] => Some(Projection {
            closest: *only,
            distance: distance(p, only.to_coord()),
            position: 0.0,
            segment_index: 0,
        }),
        _ => {
            let mut best: Option<Projection> = None;
            let mut walked = 0.0;

            for (i, segment) in polyline.windows(2).enumerate() {
                let (s1, s2) = (segment[0].to_coord(), segment[1].to_coord());
                let (t, closest) = closest_on_segment(p, s1, s2);
                let segment_length = distance(s1, s2);
                let candidate = Projection {
                    closest: closest.into(),
                    distance: distance(p, closest),
                    position: walked + t * segment_length,
                    segment_index: i,
                };

                if best.is_none_or(|b| candidate.distance < b.distance) {
                    best = Some(candidate);
                }
                walked += segment_length;
            }

            best
        }
    }
}

/// Planar length of a polyline in degrees
pub fn polyline_length(polyline: &[Coordinate2D]) -> f64 {
    polyline
        .windows(2)
        .map(|pair| distance(pair[0].to_coord(), pair[1].to_coord()))
        .sum()
}

/// Check whether any part of a polyline lies inside or crosses the rectangle
pub fn polyline_intersects_rectangle(points: &[Coordinate2D], rectangle: &Rectangle) -> bool {
    if points.iter().any(|p| rectangle.contains(p)) {
        return true;
    }

    let rect = rectangle.to_rect();
    points
        .windows(2)
        .any(|pair| line_intersects_rect(pair[0].to_coord(), pair[1].to_coord(), rect))
}

/// Check if a line segment intersects a rectangle
fn line_intersects_rect(p1: Coord<f64>, p2: Coord<f64>, rect: Rect<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();

    // Cohen-Sutherland-style outcodes
    let outcode = |p: Coord<f64>| -> u8 {
        let mut code = 0u8;
        if p.x < min.x {
            code |= 1;
        }
        if p.x > max.x {
            code |= 2;
        }
        if p.y < min.y {
            code |= 4;
        }
        if p.y > max.y {
            code |= 8;
        }
        code
    };

    let code1 = outcode(p1);
    let code2 = outcode(p2);

    if code1 == 0 && code2 == 0 {
        return true;
    }

    // Both points in same outside region
    if code1 & code2 != 0 {
        return false;
    }

    let edges = [
        (Coord { x: min.x, y: min.y }, Coord { x: min.x, y: max.y }), // left
        (Coord { x: max.x, y: min.y }, Coord { x: max.x, y: max.y }), // right
        (Coord { x: min.x, y: min.y }, Coord { x: max.x, y: min.y }), // bottom
        (Coord { x: min.x, y: max.y }, Coord { x: max.x, y: max.y }), // top
    ];

    edges
        .into_iter()
        .any(|(e1, e2)| segment_pair_intersects(p1, p2, e1, e2, 0.0))
}

/// Check if two line segments intersect, counting endpoints within `epsilon` as touching
fn segment_pair_intersects(
    p1: Coord<f64>,
    p2: Coord<f64>,
    p3: Coord<f64>,
    p4: Coord<f64>,
    epsilon: f64,
) -> bool {
    let d1 = direction(p3, p4, p1);
    let d2 = direction(p3, p4, p2);
    let d3 = direction(p1, p2, p3);
    let d4 = direction(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Touching and collinear overlap: some endpoint lies on the other segment
    point_segment_distance(p1, p3, p4) <= epsilon
        || point_segment_distance(p2, p3, p4) <= epsilon
        || point_segment_distance(p3, p1, p2) <= epsilon
        || point_segment_distance(p4, p1, p2) <= epsilon
}

/// Single intersection point of segments (a1, a2) and (b1, b2)
///
/// Returns the parameter along `a` together with the point. Parallel and collinear pairs
/// yield `None`; parameters falling just outside the segments by less than `epsilon`
/// are clamped onto the endpoint.
fn segment_intersection_point(
    a1: Coord<f64>,
    a2: Coord<f64>,
    b1: Coord<f64>,
    b2: Coord<f64>,
    epsilon: f64,
) -> Option<(f64, Coord<f64>)> {
    let r = a2 - a1;
    let s = b2 - b1;
    let r_len = distance(a1, a2);
    let s_len = distance(b1, b2);

    let denom = cross(r, s);
    if denom.abs() <= PARALLEL_TOLERANCE * r_len * s_len || r_len == 0.0 || s_len == 0.0 {
        return None;
    }

    let qp = b1 - a1;
    let t = cross(qp, s) / denom;
    let u = cross(qp, r) / denom;

    let t_slack = epsilon / r_len;
    let u_slack = epsilon / s_len;
    if t < -t_slack || t > 1.0 + t_slack || u < -u_slack || u > 1.0 + u_slack {
        return None;
    }

    let t = t.clamp(0.0, 1.0);
    Some((t, a1 + r * t))
}

/// Closest point on segment (s1, s2) to `p`, with its clamped parameter
fn closest_on_segment(p: Coord<f64>, s1: Coord<f64>, s2: Coord<f64>) -> (f64, Coord<f64>) {
    let d = s2 - s1;
    let len_sq = d.x * d.x + d.y * d.y;
    if len_sq == 0.0 {
        return (0.0, s1);
    }
    let t = (((p.x - s1.x) * d.x + (p.y - s1.y) * d.y) / len_sq).clamp(0.0, 1.0);
    (t, s1 + d * t)
}

#[inline]
fn point_segment_distance(p: Coord<f64>, s1: Coord<f64>, s2: Coord<f64>) -> f64 {
    let (_, closest) = closest_on_segment(p, s1, s2);
    distance(p, closest)
}

/// Calculate cross product direction
#[inline]
fn direction(p1: Coord<f64>, p2: Coord<f64>, p3: Coord<f64>) -> f64 {
    (p3.x - p1.x) * (p2.y - p1.y) - (p2.x - p1.x) * (p3.y - p1.y)
}

#[inline]
fn cross(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

#[inline]
fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}
