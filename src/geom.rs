use crate::config;
use anyhow::{bail, Result};
use nalgebra::{Point3, Vector3};
use serde::Serialize;


/// Normalizes a vector, mapping the degenerate zero vector to the zero vector.
pub fn normalize_or_zero(v: &Vector3<f64>) -> Vector3<f64> {
    let norm_sq = v.norm_squared();
    if norm_sq == 0.0 {
        Vector3::zeros()
    } else {
        v / norm_sq.sqrt()
    }
}

/// Whether two points coincide within `tol` (Euclidean).
pub fn points_match(a: &Point3<f64>, b: &Point3<f64>, tol: f64) -> bool {
    (b - a).norm() <= tol
}

/// Removes points that fall within `tol` of an earlier point, keeping order.
pub fn dedup_points(points: &[Point3<f64>], tol: f64) -> Vec<Point3<f64>> {
    let mut merged: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if !merged.iter().any(|q| points_match(p, q, tol)) {
            merged.push(*p);
        }
    }
    merged
}

/// Whether the unit directions are equal or negations of each other, component
/// by component within the squared colinearity tolerance.
fn unit_directions_match(u: &Vector3<f64>, v: &Vector3<f64>) -> bool {
    let tol = config::COLINEARITY_TOLERANCE_SQ;
    let same = (0..3).all(|k| (u[k] - v[k]) * (u[k] - v[k]) < tol);
    let negated = (0..3).all(|k| (u[k] + v[k]) * (u[k] + v[k]) < tol);
    same || negated
}

/// Three points are colinear when the unit directions from the first to the
/// other two agree up to sign. A zero-length direction is trivially colinear.
pub fn points_colinear(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    let u = normalize_or_zero(&(b - a));
    let v = normalize_or_zero(&(c - a));
    if u == Vector3::zeros() || v == Vector3::zeros() {
        return true;
    }
    unit_directions_match(&u, &v)
}

/// Whether every point of the set lies on one line.
pub fn all_colinear(points: &[Point3<f64>]) -> bool {
    if points.len() < 3 {
        return true;
    }
    let a = &points[0];
    let Some(b) = points
        .iter()
        .find(|p| !points_match(p, a, config::POINT_MATCH_TOLERANCE))
    else {
        return true; // every point coincides
    };
    points.iter().all(|p| points_colinear(a, b, p))
}

/// Signed volume of the tetrahedron spanned by the endpoints of two segments.
fn tetrahedron_volume(a: &Segment, b: &Segment) -> f64 {
    let u = a.end - a.start;
    let v = b.start - a.start;
    let w = b.end - a.start;
    u.cross(&v).dot(&w) / 6.0
}

/// Two segments are coplanar when their endpoint tetrahedron has near-zero
/// volume. The tolerance is absolute, so the test is not scale-invariant.
pub fn segments_coplanar(a: &Segment, b: &Segment) -> bool {
    tetrahedron_volume(a, b).abs() <= config::COPLANARITY_TOLERANCE
}

/// Whether every point of the set lies in one plane: every chord between two
/// points is tested against every edge of the point cycle. Three or fewer
/// points are trivially coplanar.
pub fn all_coplanar(points: &[Point3<f64>]) -> bool {
    let n = points.len();
    if n <= 3 {
        return true;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let chord = Segment::new(points[i], points[j]);
            for k in 0..n {
                let edge = Segment::new(points[(k + n - 1) % n], points[k]);
                if !segments_coplanar(&chord, &edge) {
                    return false;
                }
            }
        }
    }
    true
}

/// Represents a plane, defined by a unit normal and an offset value.
/// Each component of the normal corresponds to a, b, c, respectively.
/// The offset value corresponds to d.
/// The plane is then defined by `ax + by + cz + d = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub offset: f64,
}

impl Plane {
    /// Plane through three points. Near-zero normal components are snapped to
    /// zero so axis-aligned inputs yield exact axis normals.
    pub fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Self {
        let mut normal = normalize_or_zero(&(b - a).cross(&(c - a)));
        for k in 0..3 {
            if normal[k].abs() < config::NORMAL_SNAP_TOLERANCE {
                normal[k] = 0.0;
            }
        }
        let normal = normalize_or_zero(&normal);
        let offset = -normal.dot(&a.coords);
        Self { normal, offset }
    }

    /// Fits a plane through the first non-colinear triple of the point set.
    pub fn fit(points: &[Point3<f64>]) -> Result<Self> {
        for i in 1..points.len() {
            for j in (i + 1)..points.len() {
                if !points_colinear(&points[0], &points[i], &points[j]) {
                    return Ok(Self::from_points(&points[0], &points[i], &points[j]));
                }
            }
        }
        bail!("cannot fit a plane: all {} points are colinear", points.len());
    }

    /// Residual of the plane equation at a point.
    pub fn eval(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.offset
    }

    pub fn contains(&self, p: &Point3<f64>, tol: f64) -> bool {
        self.eval(p).abs() <= tol
    }

    /// Crossing of the infinite line through `seg` with the plane. Callers that
    /// need the crossing restricted to the segment filter with
    /// [`Segment::contains`].
    pub fn intersect_line(&self, seg: &Segment) -> PlaneIntersection {
        let u = normalize_or_zero(&seg.direction());
        let denom = self.normal.dot(&u);
        if denom.abs() <= config::PLANE_CROSSING_TOLERANCE {
            return PlaneIntersection::NoIntersection;
        }
        let t = -self.eval(&seg.start) / denom;
        PlaneIntersection::Point(seg.start + u * t)
    }
}

/// Crossing of a line with a plane.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaneIntersection {
    Point(Point3<f64>),
    NoIntersection,
}

/// A line segment between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl Segment {
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    pub fn direction(&self) -> Vector3<f64> {
        self.end - self.start
    }

    pub fn length(&self) -> f64 {
        self.direction().norm()
    }

    /// Whether a point lies on the segment: an endpoint match, or colinear with
    /// the endpoints and inside the segment's axis-aligned range.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let tol = config::POINT_MATCH_TOLERANCE;
        if points_match(p, &self.start, tol) || points_match(p, &self.end, tol) {
            return true;
        }
        if !points_colinear(&self.start, &self.end, p) {
            return false;
        }
        (0..3).all(|k| {
            let lo = self.start[k].min(self.end[k]) - tol;
            let hi = self.start[k].max(self.end[k]) + tol;
            lo <= p[k] && p[k] <= hi
        })
    }
}

/// Crossing of two coplanar segments. `Skew` and `Colinear` flag inputs the
/// parametric solve does not apply to; callers special-case them rather than
/// receive a numeric value.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentIntersection {
    Point(Point3<f64>),
    OffSegment,
    Parallel,
    Skew,
    Colinear,
}

/// Intersects two segments in 3D. Symmetric in its arguments: swapping the
/// segments yields the same variant and, for crossings, the same point.
pub fn intersect_segments(a: &Segment, b: &Segment) -> SegmentIntersection {
    if !segments_coplanar(a, b) {
        return SegmentIntersection::Skew;
    }

    let da = a.direction();
    let db = b.direction();
    let ua = normalize_or_zero(&da);
    let ub = normalize_or_zero(&db);
    if ua == Vector3::zeros() || ub == Vector3::zeros() || unit_directions_match(&ua, &ub) {
        return if points_colinear(&a.start, &a.end, &b.start)
            && points_colinear(&a.start, &a.end, &b.end)
        {
            SegmentIntersection::Colinear
        } else {
            SegmentIntersection::Parallel
        };
    }

    // standard cross-product parametrization of the common point
    let cross = da.cross(&db);
    let c = b.start - a.start;
    let s = c.cross(&db).dot(&cross) / cross.norm_squared();
    let p = a.start + da * s;

    if a.contains(&p) && b.contains(&p) {
        SegmentIntersection::Point(p)
    } else {
        SegmentIntersection::OffSegment
    }
}

/// Area of a triangle by Heron's formula. A slightly negative radicand from
/// rounding is clamped to zero.
pub fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let la = (b - a).norm();
    let lb = (c - b).norm();
    let lc = (a - c).norm();
    let s = 0.5 * (la + lb + lc);
    let radicand = s * (s - la) * (s - lb) * (s - lc);

    #[cfg(debug_assertions)]
    {
        assert!(
            radicand >= config::HERON_CLAMP,
            "radicand: {}, sides: {} {} {}",
            radicand,
            la,
            lb,
            lc
        );
    }

    radicand.max(0.0).sqrt()
}

/// An ordered list of coplanar points forming a simple polygon. Points are
/// expected to be free of duplicates within the merge distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    pub points: Vec<Point3<f64>>,
}

impl Polygon {
    pub fn new(points: Vec<Point3<f64>>) -> Result<Self> {
        if points.len() < 3 {
            bail!("a polygon needs at least 3 points, got {}", points.len());
        }
        Ok(Self { points })
    }

    pub fn plane(&self) -> Result<Plane> {
        Plane::fit(&self.points)
    }

    /// Boundary edges, including the closing edge back to the first point.
    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| Segment::new(self.points[i], self.points[(i + 1) % n]))
    }

    pub fn perimeter(&self) -> f64 {
        self.edges().map(|e| e.length()).sum()
    }

    /// The averaged point projected back into the fitted plane by re-solving
    /// the plane equation for the largest-normal-component coordinate.
    pub fn centroid(&self) -> Result<Point3<f64>> {
        approximate_centroid(&self.points)
    }

    /// Area as the Heron sum of the fan triangulation about the centroid.
    pub fn area(&self) -> Result<f64> {
        let c = self.centroid()?;
        let n = self.points.len();
        Ok((0..n)
            .map(|i| triangle_area(&self.points[(i + n - 1) % n], &self.points[i], &c))
            .sum())
    }

    pub fn reverse(&mut self) {
        self.points.reverse();
    }
}

/// Approximate centroid of a coplanar point set: average the points, then move
/// the average back into the fitted plane along one axis. Solves the plane
/// equation for z, y or x, whichever has a workable normal component.
pub fn approximate_centroid(points: &[Point3<f64>]) -> Result<Point3<f64>> {
    let plane = Plane::fit(points)?;
    let len = points.len() as f64;
    let mut avg: Point3<f64> = points
        .iter()
        .fold(Point3::origin(), |acc, p| acc + p.coords);
    avg /= len;

    let n = plane.normal;
    let d = plane.offset;
    // + 0.0 keeps an exact zero from solving to IEEE -0.0, which would print
    // as "-0" in coordinate output
    if n.z.abs() >= 1e-6 {
        avg.z = -(n.x * avg.x + n.y * avg.y + d) / n.z + 0.0;
    } else if n.y.abs() >= 1e-6 {
        avg.y = -(n.x * avg.x + n.z * avg.z + d) / n.y + 0.0;
    } else if n.x.abs() >= 1e-6 {
        avg.x = -(n.y * avg.y + n.z * avg.z + d) / n.x + 0.0;
    } else {
        bail!("degenerate plane normal {:?}", n);
    }
    Ok(avg)
}

/// A closed shell of polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyhedron {
    pub faces: Vec<Polygon>,
}

impl Polyhedron {
    pub fn new(faces: Vec<Polygon>) -> Self {
        Self { faces }
    }

    pub fn is_watertight(&self) -> bool {
        faces_watertight(&self.faces)
    }

    pub fn shortest_edge(&self) -> f64 {
        shortest_edge(&self.faces)
    }

    pub fn volume(&self) -> Result<f64> {
        enclosed_volume(&self.faces)
    }

    pub fn centroid(&self) -> Result<Point3<f64>> {
        enclosed_centroid(&self.faces)
    }
}

/// Whether every undirected edge across the faces occurs exactly twice, with
/// endpoint equality within the edge-match tolerance.
pub fn faces_watertight(faces: &[Polygon]) -> bool {
    let tol = config::EDGE_MATCH_TOLERANCE;
    let edges: Vec<Segment> = faces.iter().flat_map(|f| f.edges()).collect();

    edges.iter().all(|e| {
        let count = edges
            .iter()
            .filter(|o| {
                (points_match(&e.start, &o.start, tol) && points_match(&e.end, &o.end, tol))
                    || (points_match(&e.start, &o.end, tol)
                        && points_match(&e.end, &o.start, tol))
            })
            .count();
        count == 2 // the edge itself plus exactly one partner
    })
}

/// Length of the shortest edge over all faces.
pub fn shortest_edge(faces: &[Polygon]) -> f64 {
    faces
        .iter()
        .flat_map(|f| f.edges())
        .map(|e| e.length())
        .fold(f64::INFINITY, f64::min)
}

/// Fan triangulation of a face about its centroid, yielding vertex triples.
fn fan_triangles(face: &Polygon) -> Result<Vec<[Point3<f64>; 3]>> {
    let c = face.centroid()?;
    let n = face.points.len();
    Ok((0..n)
        .map(|i| [face.points[(i + n - 1) % n], face.points[i], c])
        .collect())
}

/// Volume enclosed by inward-oriented faces, by the divergence theorem over
/// each face's fan triangulation.
pub fn enclosed_volume(faces: &[Polygon]) -> Result<f64> {
    let mut volume = 0.0;
    for face in faces {
        for [a, b, c] in fan_triangles(face)? {
            let n = (b - a).cross(&(c - a));
            volume += a.coords.dot(&n) / 6.0;
        }
    }
    Ok(volume)
}

/// Centroid of the volume enclosed by inward-oriented faces, via the
/// supplemental divergence-theorem surface integrals.
pub fn enclosed_centroid(faces: &[Polygon]) -> Result<Point3<f64>> {
    let volume = enclosed_volume(faces)?;
    if volume.abs() < config::COPLANARITY_TOLERANCE {
        bail!("centroid of a degenerate polyhedron with volume {}", volume);
    }

    let mut sums = Vector3::zeros();
    for face in faces {
        for [a, b, c] in fan_triangles(face)? {
            let n = (b - a).cross(&(c - a));
            for k in 0..3 {
                let ab = a[k] + b[k];
                let bc = b[k] + c[k];
                let ca = c[k] + a[k];
                sums[k] += n[k] * (ab * ab + bc * bc + ca * ca) / 48.0;
            }
        }
    }
    Ok(Point3::from(sums / volume))
}
