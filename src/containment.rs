//! Ray-cast containment tests and bounding boxes.
//!
//! The crossing-number tests here are randomized: the test ray is drawn from a
//! caller-supplied RNG so results are reproducible under a fixed seed. Draws
//! that graze a vertex or an edge make the crossing parity ambiguous, so the
//! ray is re-drawn, up to a bounded retry count.
//!
//! - [`Aabb`]: axis-aligned bounding boxes for extents and fast point tests
//! - [`point_in_polygon`]: in-plane crossing-number test
//! - [`point_in_polyhedron`]: face-crossing parity test against a closed shell

use crate::config;
use crate::geom::{self, Polygon, Segment};
use anyhow::{bail, Result};
use nalgebra::{Point3, Vector3};
use rand::Rng;
use rand_distr::{Distribution, UnitSphere};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::geom::Polyhedron;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn unit_square() -> Polygon {
        Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
        .unwrap()
    }

    fn unit_cube() -> Polyhedron {
        let quads = [
            [[0., 0., 0.], [0., 1., 0.], [1., 1., 0.], [1., 0., 0.]],
            [[0., 0., 1.], [1., 0., 1.], [1., 1., 1.], [0., 1., 1.]],
            [[0., 0., 0.], [0., 0., 1.], [0., 1., 1.], [0., 1., 0.]],
            [[1., 0., 0.], [1., 1., 0.], [1., 1., 1.], [1., 0., 1.]],
            [[0., 0., 0.], [1., 0., 0.], [1., 0., 1.], [0., 0., 1.]],
            [[0., 1., 0.], [0., 1., 1.], [1., 1., 1.], [1., 1., 0.]],
        ];
        let faces = quads
            .iter()
            .map(|q| {
                Polygon::new(q.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect()).unwrap()
            })
            .collect();
        Polyhedron::new(faces)
    }

    #[test]
    fn aabb_from_points_and_containment() {
        let points = vec![
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(-1.0, 5.0, 0.0),
            Point3::new(0.0, 0.0, 7.0),
        ];
        let aabb = Aabb::from_points(points.iter().copied()).unwrap();
        assert_eq!(aabb.min, Point3::new(-1.0, 0.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 5.0, 7.0));
        assert!(aabb.contains(&Point3::new(0.0, 3.0, 5.0), 0.0));
        assert!(aabb.contains(&Point3::new(1.0 + 1e-9, 3.0, 5.0), 1e-8));
        assert!(!aabb.contains(&Point3::new(2.0, 3.0, 5.0), 1e-8));
    }

    #[test]
    fn square_contains_its_center_but_not_outside_points() {
        let square = unit_square();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(point_in_polygon(&Point3::new(0.5, 0.5, 0.0), &square, &mut rng).unwrap());
        assert!(!point_in_polygon(&Point3::new(1.5, 0.5, 0.0), &square, &mut rng).unwrap());
        assert!(!point_in_polygon(&Point3::new(-0.2, -0.2, 0.0), &square, &mut rng).unwrap());
    }

    #[test]
    fn points_on_the_boundary_count_as_inside() {
        let square = unit_square();
        let mut rng = StdRng::seed_from_u64(7);
        // edge midpoint and a vertex
        assert!(point_in_polygon(&Point3::new(0.5, 0.0, 0.0), &square, &mut rng).unwrap());
        assert!(point_in_polygon(&Point3::new(0.0, 0.0, 0.0), &square, &mut rng).unwrap());
    }

    #[test]
    fn cube_centroid_is_inside_for_many_ray_draws() {
        let cube = unit_cube();
        let centroid = Point3::new(0.5, 0.5, 0.5);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            assert!(point_in_polyhedron(&cube.faces, &centroid, &mut rng).unwrap());
        }
    }

    #[test]
    fn points_outside_the_bounding_sphere_are_never_inside() {
        let cube = unit_cube();
        let mut rng = StdRng::seed_from_u64(24);
        let outside = [
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(-2.0, -2.0, -2.0),
            Point3::new(0.5, 0.5, 9.0),
            Point3::new(-5.0, 0.5, 0.5),
        ];
        for p in &outside {
            for _ in 0..50 {
                assert!(!point_in_polyhedron(&cube.faces, p, &mut rng).unwrap());
            }
        }
    }

    #[test]
    fn points_on_a_face_are_inside() {
        let cube = unit_cube();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(point_in_polyhedron(&cube.faces, &Point3::new(0.5, 0.5, 0.0), &mut rng).unwrap());
        assert!(point_in_polyhedron(&cube.faces, &Point3::new(0.0, 0.0, 0.0), &mut rng).unwrap());
        assert!(point_in_polyhedron(&cube.faces, &Point3::new(1.0, 0.5, 0.5), &mut rng).unwrap());
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Smallest box containing the points, seeded from the first point so
    /// models that do not straddle the origin keep tight extents.
    pub fn from_points(mut points: impl Iterator<Item = Point3<f64>>) -> Result<Self> {
        let Some(first) = points.next() else {
            bail!("cannot compute extents of an empty point set");
        };
        let mut min = first;
        let mut max = first;
        for p in points {
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, p: &Point3<f64>, tol: f64) -> bool {
        (0..3).all(|k| self.min[k] - tol <= p[k] && p[k] <= self.max[k] + tol)
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }
}

/// Uniform random unit vector.
fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    let v: [f64; 3] = UnitSphere.sample(rng);
    Vector3::new(v[0], v[1], v[2])
}

/// Unit direction perpendicular to `normal`, drawn uniformly in the plane.
fn random_in_plane_direction<R: Rng + ?Sized>(
    normal: &Vector3<f64>,
    rng: &mut R,
) -> Result<Vector3<f64>> {
    for _ in 0..config::MAX_RAY_RETRIES {
        let dir = normal.cross(&random_unit_vector(rng));
        if dir.norm() > 1e-6 {
            return Ok(geom::normalize_or_zero(&dir));
        }
    }
    bail!(
        "no usable in-plane ray direction after {} draws",
        config::MAX_RAY_RETRIES
    );
}

/// Whether the point lies on any boundary edge of the polygon.
pub fn point_on_polygon_edge(p: &Point3<f64>, polygon: &Polygon) -> bool {
    polygon.edges().any(|e| e.contains(p))
}

/// Crossing-number test for a point assumed to lie in the polygon's plane.
///
/// The ray is drawn in-plane and scaled past the polygon (distance to the
/// centroid plus the perimeter); its crossings with the boundary edges are
/// counted and odd parity means inside. Points on an edge are always inside.
/// Draws that hit a vertex are re-drawn up to the retry cap.
pub fn point_in_polygon<R: Rng + ?Sized>(
    p: &Point3<f64>,
    polygon: &Polygon,
    rng: &mut R,
) -> Result<bool> {
    if point_on_polygon_edge(p, polygon) {
        return Ok(true);
    }

    let plane = polygon.plane()?;
    let centroid = polygon.centroid()?;
    let length = (centroid - p).norm() + polygon.perimeter();

    'redraw: for _ in 0..config::MAX_RAY_RETRIES {
        let dir = random_in_plane_direction(&plane.normal, rng)?;
        let ray = Segment::new(*p, p + dir * length);

        let mut crossings = 0;
        for edge in polygon.edges() {
            match geom::intersect_segments(&ray, &edge) {
                geom::SegmentIntersection::Point(x) => {
                    let vertex_hit = polygon
                        .points
                        .iter()
                        .any(|v| geom::points_match(&x, v, config::POINT_MATCH_TOLERANCE));
                    if vertex_hit {
                        continue 'redraw;
                    }
                    crossings += 1;
                }
                // ray running along an edge makes the parity meaningless
                geom::SegmentIntersection::Colinear => continue 'redraw,
                _ => {}
            }
        }
        return Ok(crossings % 2 == 1);
    }
    bail!(
        "point-in-polygon ray degenerate after {} draws",
        config::MAX_RAY_RETRIES
    );
}

/// Largest distance from `p` to any vertex of the faces.
pub fn farthest_vertex_distance(faces: &[Polygon], p: &Point3<f64>) -> f64 {
    faces
        .iter()
        .flat_map(|f| f.points.iter())
        .map(|v| (v - p).norm())
        .fold(0.0, f64::max)
}

/// Face-crossing parity test against a closed shell of polygons.
///
/// A point on any face is inside. Otherwise a ray long enough to leave the
/// shell from anywhere (four times the farthest vertex distance) is cast in a
/// random direction; faces whose supporting plane the ray crosses inside the
/// face polygon are counted, and odd parity means inside. Rays that hit a face
/// edge are re-drawn up to the retry cap.
pub fn point_in_polyhedron<R: Rng + ?Sized>(
    faces: &[Polygon],
    p: &Point3<f64>,
    rng: &mut R,
) -> Result<bool> {
    for face in faces {
        let plane = face.plane()?;
        if plane.contains(p, config::POINT_MATCH_TOLERANCE) && point_in_polygon(p, face, rng)? {
            return Ok(true);
        }
    }

    let length = config::RAY_LENGTH_FACTOR * farthest_vertex_distance(faces, p);

    'redraw: for _ in 0..config::MAX_RAY_RETRIES {
        let dir = random_unit_vector(rng);
        let ray = Segment::new(*p, p + dir * length);

        let mut crossings = 0;
        for face in faces {
            let plane = face.plane()?;
            match plane.intersect_line(&ray) {
                geom::PlaneIntersection::Point(x) => {
                    if !ray.contains(&x) {
                        continue;
                    }
                    if point_on_polygon_edge(&x, face) {
                        continue 'redraw;
                    }
                    if point_in_polygon(&x, face, rng)? {
                        crossings += 1;
                    }
                }
                geom::PlaneIntersection::NoIntersection => {}
            }
        }
        return Ok(crossings % 2 == 1);
    }
    bail!(
        "point-in-polyhedron ray degenerate after {} draws",
        config::MAX_RAY_RETRIES
    );
}
