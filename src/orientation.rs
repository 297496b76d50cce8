use std::f64::consts::PI;

use crate::config;
use crate::containment;
use crate::geom::{self, Polygon};
use anyhow::Result;
use nalgebra::{Point3, Vector3};
use rand::Rng;


/// Sequences an unordered coplanar point set into a simple polygon.
///
/// Fits the plane, takes the approximate centroid, and sorts the points by
/// their signed angle about the centroid relative to the direction of the
/// first point. Angle magnitude comes from the normalized dot product, the
/// sign from the cross product against the plane normal.
pub fn unfold_points(points: &[Point3<f64>]) -> Result<Polygon> {
    let plane = geom::Plane::fit(points)?;
    let centroid = geom::approximate_centroid(points)?;
    let reference = geom::normalize_or_zero(&(points[0] - centroid));

    let mut angled: Vec<(f64, Point3<f64>)> = points
        .iter()
        .map(|p| {
            let v = geom::normalize_or_zero(&(p - centroid));
            let cos = reference.dot(&v).clamp(-1.0, 1.0);
            let mut angle = cos.acos();
            if reference.cross(&v).dot(&plane.normal) < 0.0 {
                angle = 2.0 * PI - angle;
            }
            (angle, *p)
        })
        .collect();
    angled.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    Polygon::new(angled.into_iter().map(|(_, p)| p).collect())
}

/// Assumed face normal from the vertex ordering. Flips sign when the order is
/// reversed, which is what the orientation probe exploits.
fn assumed_normal(face: &Polygon) -> Vector3<f64> {
    let p0 = face.points[0];
    let last = face.points[face.points.len() - 1];
    let p1 = face.points[1];
    geom::normalize_or_zero(&(p0 - last).cross(&(p0 - p1)))
}

/// Orients every face of a closed shell so its assumed normal points into the
/// enclosed volume.
///
/// Each face's centroid is offset along the assumed normal by a hundredth of
/// the shell's shortest edge and the probe is containment-tested; faces whose
/// probe falls outside get their vertex order reversed. Containment only reads
/// vertex positions, so probing is unaffected by the orientation of the other
/// faces.
pub fn orient_inward<R: Rng + ?Sized>(faces: &mut [Polygon], rng: &mut R) -> Result<()> {
    let offset = geom::shortest_edge(faces) * config::PROBE_OFFSET_FRACTION;
    let shell = faces.to_vec();

    for face in faces.iter_mut() {
        let normal = assumed_normal(face);
        let probe = face.centroid()? + normal * offset;
        if !containment::point_in_polyhedron(&shell, &probe, rng)? {
            face.reverse();
        }
    }
    Ok(())
}
