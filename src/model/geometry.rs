//! Points, polygons and the containment test used for subregions.
//!
//! Points lying exactly on a polygon edge or vertex count as inside. Report
//! and measurement filtering both go through [`point_in_polygon`], so the
//! policy is applied the same way everywhere.

use serde::{Deserialize, Serialize};

/// Distance below which a point is considered to lie on an edge.
const EDGE_EPSILON: f64 = 1e-9;

/// A 2D point in image pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns true if both coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// A closed polygon given by its ordered vertex list.
///
/// Construction is permissive: degenerate or self-intersecting polygons can be
/// represented so that callers get a proper error from
/// [`Polygon::check_simple`] instead of a panic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: impl IntoIterator<Item = Point>) -> Self {
        Self {
            vertices: vertices.into_iter().collect(),
        }
    }

    /// Builds a polygon from `(x, y)` pairs.
    pub fn from_xy(pairs: &[(f64, f64)]) -> Self {
        Self::new(pairs.iter().copied().map(Point::from))
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Iterates the closed edge list, including the edge from the last
    /// vertex back to the first.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Signed area (shoelace). Positive for counter-clockwise winding in a
    /// y-up frame.
    pub fn signed_area(&self) -> f64 {
        self.edges()
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
            / 2.0
    }

    /// Checks that the polygon is a usable subregion: at least three finite
    /// vertices, non-zero area and no crossing between non-adjacent edges.
    ///
    /// Returns a description of the first problem found.
    pub fn check_simple(&self) -> Result<(), String> {
        let n = self.vertices.len();
        if n < 3 {
            return Err(format!("polygon needs at least 3 vertices, got {n}"));
        }
        if let Some(idx) = self.vertices.iter().position(|p| !p.is_finite()) {
            return Err(format!("vertex {idx} has non-finite coordinates"));
        }
        if self.signed_area().abs() <= EDGE_EPSILON {
            return Err("polygon has zero area".to_string());
        }

        let edges: Vec<(Point, Point)> = self.edges().collect();
        for i in 0..n {
            for j in (i + 1)..n {
                let adjacent = j == i + 1 || (i == 0 && j == n - 1);
                if adjacent {
                    continue;
                }
                if segments_intersect(edges[i], edges[j]) {
                    return Err(format!("edges {i} and {j} intersect"));
                }
            }
        }
        Ok(())
    }

    /// See [`point_in_polygon`].
    pub fn contains(&self, point: &Point) -> bool {
        point_in_polygon(point, self)
    }
}

/// Ray-casting containment test. Boundary points count as inside.
///
/// The result does not depend on where the vertex list starts or on its
/// winding direction.
pub fn point_in_polygon(point: &Point, polygon: &Polygon) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    if polygon
        .edges()
        .any(|(a, b)| point_on_segment(point, a, b))
    {
        return true;
    }

    let mut inside = false;
    for (vi, vj) in polygon.edges() {
        if (vi.y > point.y) != (vj.y > point.y)
            && point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x
        {
            inside = !inside;
        }
    }
    inside
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn point_on_segment(p: &Point, a: Point, b: Point) -> bool {
    let len = a.distance_to(&b);
    if len <= EDGE_EPSILON {
        return p.distance_to(&a) <= EDGE_EPSILON;
    }
    if (cross(a, b, *p) / len).abs() > EDGE_EPSILON {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}

fn segments_intersect((p1, p2): (Point, Point), (q1, q2): (Point, Point)) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Touching or collinear overlap.
    point_on_segment(&p1, q1, q2)
        || point_on_segment(&p2, q1, q2)
        || point_on_segment(&q1, p1, p2)
        || point_on_segment(&q2, p1, p2)
}
