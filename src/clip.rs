use crate::config;
use crate::containment;
use crate::geom::{self, Plane, PlaneIntersection, Polygon, Segment};
use crate::mesh::{BaseCell, Cell, Face, FaceTag};
use crate::orientation;
use crate::surface::Surface;
use anyhow::Result;
use nalgebra::Point3;
use rand::Rng;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::containment::Aabb;
    use crate::mesh::base_grid;
    use crate::surface::Triangle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Rectangular box from the origin to (sx, sy, sz), twelve triangles in
    /// three named patches.
    fn box_surface(sx: f64, sy: f64, sz: f64) -> Surface {
        let quads: [([[f64; 3]; 4], &str); 6] = [
            ([[0., 0., 0.], [0., 1., 0.], [1., 1., 0.], [1., 0., 0.]], "bottom"),
            ([[0., 0., 1.], [1., 0., 1.], [1., 1., 1.], [0., 1., 1.]], "top"),
            ([[0., 0., 0.], [0., 0., 1.], [0., 1., 1.], [0., 1., 0.]], "sides"),
            ([[1., 0., 0.], [1., 1., 0.], [1., 1., 1.], [1., 0., 1.]], "sides"),
            ([[0., 0., 0.], [1., 0., 0.], [1., 0., 1.], [0., 0., 1.]], "sides"),
            ([[0., 1., 0.], [0., 1., 1.], [1., 1., 1.], [1., 1., 0.]], "sides"),
        ];
        let mut triangles = Vec::new();
        for (quad, name) in &quads {
            let p: Vec<Point3<f64>> = quad
                .iter()
                .map(|v| Point3::new(v[0] * sx, v[1] * sy, v[2] * sz))
                .collect();
            triangles.push(Triangle::new([p[0], p[1], p[2]], *name));
            triangles.push(Triangle::new([p[0], p[2], p[3]], *name));
        }
        Surface::new(triangles)
    }

    fn count_named(cell: &Cell, name: &str) -> usize {
        cell.faces
            .iter()
            .filter(|f| f.tag == FaceTag::Named(name.to_string()))
            .count()
    }

    #[test]
    fn interior_cell_keeps_its_neighbor_tags() {
        let surface = box_surface(3.0, 3.0, 3.0);
        let grid = base_grid(&surface.extents().unwrap(), 1.0).unwrap();
        let clipper = CellClipper::new(&surface).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let base = grid.iter().find(|c| c.location == (1, 1, 1)).unwrap();
        let cell = clipper.clip(base, &mut rng).unwrap().unwrap();

        assert_eq!(cell.faces.len(), 6);
        assert!((cell.volume - 1.0).abs() < 1e-9);
        assert!((cell.centroid - Point3::new(1.5, 1.5, 1.5)).norm() < 1e-9);

        let mut neighbors = Vec::new();
        for face in &cell.faces {
            assert!((face.area - 1.0).abs() < 1e-9);
            match &face.tag {
                FaceTag::Interior(loc) => neighbors.push(*loc),
                FaceTag::Named(name) => panic!("unexpected boundary face {}", name),
            }
        }
        for loc in [
            (0, 1, 1),
            (2, 1, 1),
            (1, 0, 1),
            (1, 2, 1),
            (1, 1, 0),
            (1, 1, 2),
        ] {
            assert!(neighbors.contains(&loc), "missing neighbor {:?}", loc);
        }
    }

    #[test]
    fn coincident_cell_inherits_all_boundary_names() {
        let surface = box_surface(1.0, 1.0, 1.0);
        let grid = base_grid(&surface.extents().unwrap(), 1.0).unwrap();
        assert_eq!(grid.len(), 1);
        let clipper = CellClipper::new(&surface).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let cell = clipper.clip(&grid[0], &mut rng).unwrap().unwrap();

        assert_eq!(cell.faces.len(), 6);
        assert!((cell.volume - 1.0).abs() < 1e-6);
        assert_eq!(count_named(&cell, "bottom"), 1);
        assert_eq!(count_named(&cell, "top"), 1);
        assert_eq!(count_named(&cell, "sides"), 4);
    }

    #[test]
    fn cells_off_the_surface_are_dropped() {
        let surface = box_surface(1.0, 1.0, 1.0);
        let extents = Aabb {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(3.0, 3.0, 3.0),
        };
        let grid = base_grid(&extents, 1.0).unwrap();
        let clipper = CellClipper::new(&surface).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        // nowhere near the surface: no faces survive
        let far = grid.iter().find(|c| c.location == (2, 2, 2)).unwrap();
        assert!(clipper.clip(far, &mut rng).unwrap().is_none());

        // touching the surface on one face only: a single face is not a cell
        let adjacent = grid.iter().find(|c| c.location == (1, 0, 0)).unwrap();
        assert!(clipper.clip(adjacent, &mut rng).unwrap().is_none());
    }

    #[test]
    fn half_covered_cell_is_clipped_to_the_surface() {
        let surface = box_surface(1.0, 1.0, 0.5);
        let extents = Aabb {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(1.0, 1.0, 1.0),
        };
        let grid = base_grid(&extents, 1.0).unwrap();
        assert_eq!(grid.len(), 1);
        let clipper = CellClipper::new(&surface).unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let cell = clipper.clip(&grid[0], &mut rng).unwrap().unwrap();

        // quad faces from the grid plus two synthesized top triangles
        assert_eq!(cell.faces.len(), 7);
        assert!((cell.volume - 0.5).abs() < 1e-6);
        assert!((cell.centroid - Point3::new(0.5, 0.5, 0.25)).norm() < 1e-6);
        assert_eq!(count_named(&cell, "bottom"), 1);
        assert_eq!(count_named(&cell, "top"), 2);
        assert_eq!(count_named(&cell, "sides"), 4);

        let total_area: f64 = cell.faces.iter().map(|f| f.area).sum();
        assert!((total_area - 4.0).abs() < 1e-6);
    }
}

/// Clips base cells against a closed surface.
///
/// **How it Works:**
/// Each corner of each base-cell face is classified against the surface.
/// Corners inside are kept; corners outside are replaced by the crossings of
/// their two adjacent face edges with the surface triangles. Faces that lie in
/// the plane of a surface patch inherit that patch's boundary name. When the
/// surface passes through the cell interior, extra faces are cut from the
/// crossing triangles. The surviving point sets are merged, sequenced into
/// simple polygons and assembled into a cell, which is kept only if the
/// resulting shell is closed.
pub struct CellClipper<'a> {
    surface: &'a Surface,
    triangles: Vec<Polygon>, // surface triangles as polygons
    planes: Vec<Plane>,      // fitted triangle planes, same order
}

impl<'a> CellClipper<'a> {
    pub fn new(surface: &'a Surface) -> Result<Self> {
        let triangles = surface.as_polygons()?;
        let planes = triangles
            .iter()
            .map(|t| t.plane())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            surface,
            triangles,
            planes,
        })
    }

    /// Clips one base cell. Returns `None` for cells the surface excludes:
    /// fewer than four surviving faces, or a shell that is not watertight.
    pub fn clip<R: Rng + ?Sized>(&self, base: &BaseCell, rng: &mut R) -> Result<Option<Cell>> {
        let mut corners_inside = 0;
        let mut faces: Vec<Face> = Vec::new();

        for base_face in &base.faces {
            let quad = Polygon::new(base_face.corners.to_vec())?;
            let mut tag = FaceTag::Interior(base_face.neighbor);
            let mut points: Vec<Point3<f64>> = Vec::new();

            for m in 0..4 {
                let corner = base_face.corners[m];
                if containment::point_in_polyhedron(&self.triangles, &corner, rng)? {
                    corners_inside += 1;
                    points.push(corner);
                } else {
                    let before = Segment::new(base_face.corners[(m + 3) % 4], corner);
                    let after = Segment::new(corner, base_face.corners[(m + 1) % 4]);
                    for (triangle, plane) in self.triangles.iter().zip(&self.planes) {
                        for edge in [&before, &after] {
                            if let PlaneIntersection::Point(x) = plane.intersect_line(edge) {
                                if edge.contains(&x)
                                    && containment::point_in_polygon(&x, triangle, rng)?
                                {
                                    points.push(x);
                                }
                            }
                        }
                    }
                }
            }

            let quad_plane = quad.plane()?;
            for (idx, triangle) in self.triangles.iter().enumerate() {
                if coplanar_with(&quad, triangle) && self.overlaps(&quad, triangle, rng)? {
                    tag = FaceTag::Named(self.surface.triangles[idx].boundary.clone());
                }

                for tri_edge in triangle.edges() {
                    if let PlaneIntersection::Point(x) = quad_plane.intersect_line(&tri_edge) {
                        if tri_edge.contains(&x)
                            && containment::point_in_polygon(&x, &quad, rng)?
                        {
                            points.push(x);
                        }
                    }
                    for quad_edge in quad.edges() {
                        if let geom::SegmentIntersection::Point(x) =
                            geom::intersect_segments(&tri_edge, &quad_edge)
                        {
                            points.push(x);
                        }
                    }
                }
            }

            if let Some(polygon) = sequence_face_points(&points)? {
                faces.push(Face::new(polygon, tag)?);
            }
        }

        // a surface passing through the interior contributes faces of its own
        if corners_inside > 0 && corners_inside < 24 {
            self.synthesize_surface_faces(base, &mut faces, rng)?;
        }

        if faces.len() < 4 {
            return Ok(None);
        }
        let mut shell: Vec<Polygon> = faces.iter().map(|f| f.polygon.clone()).collect();
        if !geom::faces_watertight(&shell) {
            eprintln!(
                "Warning: cell {:?} clipped to a non-watertight shell, excluding it",
                base.location
            );
            return Ok(None);
        }

        orientation::orient_inward(&mut shell, rng)?;
        for (face, polygon) in faces.iter_mut().zip(&shell) {
            face.polygon = polygon.clone();
        }
        let volume = geom::enclosed_volume(&shell)?;
        let centroid = geom::enclosed_centroid(&shell)?;

        Ok(Some(Cell {
            location: base.location,
            faces,
            centroid,
            volume,
        }))
    }

    /// Whether a triangle coplanar with a base face genuinely shares interior
    /// with it rather than only touching its boundary: a triangle vertex
    /// strictly inside the face, a face corner strictly inside the triangle,
    /// or the face centroid inside the triangle.
    fn overlaps<R: Rng + ?Sized>(
        &self,
        quad: &Polygon,
        triangle: &Polygon,
        rng: &mut R,
    ) -> Result<bool> {
        for v in &triangle.points {
            if !containment::point_on_polygon_edge(v, quad)
                && containment::point_in_polygon(v, quad, rng)?
            {
                return Ok(true);
            }
        }
        for corner in &quad.points {
            if !containment::point_on_polygon_edge(corner, triangle)
                && containment::point_in_polygon(corner, triangle, rng)?
            {
                return Ok(true);
            }
        }
        let centroid = quad.centroid()?;
        containment::point_in_polygon(&centroid, triangle, rng)
    }

    /// Cuts faces out of surface triangles that pass through the cell
    /// interior. Triangles coplanar with a base face were already handled by
    /// the name-inheritance path and are skipped.
    fn synthesize_surface_faces<R: Rng + ?Sized>(
        &self,
        base: &BaseCell,
        faces: &mut Vec<Face>,
        rng: &mut R,
    ) -> Result<()> {
        let base_quads: Vec<Polygon> = base
            .faces
            .iter()
            .map(|f| Polygon::new(f.corners.to_vec()))
            .collect::<Result<Vec<_>>>()?;

        for (idx, triangle) in self.triangles.iter().enumerate() {
            if base_quads.iter().any(|quad| coplanar_with(quad, triangle)) {
                continue;
            }

            let mut points: Vec<Point3<f64>> = Vec::new();
            for v in &triangle.points {
                if base.aabb.contains(v, config::POINT_MATCH_TOLERANCE) {
                    points.push(*v);
                }
            }

            let plane = &self.planes[idx];
            for quad in &base_quads {
                for cell_edge in quad.edges() {
                    if let PlaneIntersection::Point(x) = plane.intersect_line(&cell_edge) {
                        if cell_edge.contains(&x)
                            && containment::point_in_polygon(&x, triangle, rng)?
                        {
                            points.push(x);
                        }
                    }
                }
            }
            for quad in &base_quads {
                let quad_plane = quad.plane()?;
                for tri_edge in triangle.edges() {
                    if let PlaneIntersection::Point(x) = quad_plane.intersect_line(&tri_edge) {
                        if tri_edge.contains(&x)
                            && containment::point_in_polygon(&x, quad, rng)?
                        {
                            points.push(x);
                        }
                    }
                }
            }

            if let Some(polygon) = sequence_face_points(&points)? {
                let name = self.surface.triangles[idx].boundary.clone();
                faces.push(Face::new(polygon, FaceTag::Named(name))?);
            }
        }
        Ok(())
    }
}

/// Whether the quad and the triangle lie in one plane.
fn coplanar_with(quad: &Polygon, triangle: &Polygon) -> bool {
    let mut combined = quad.points.clone();
    combined.extend_from_slice(&triangle.points);
    geom::all_coplanar(&combined)
}

/// Merges raw intersection points into a simple polygon. Duplicates within the
/// merge distance collapse; sets that are too small or colinear yield no face.
fn sequence_face_points(points: &[Point3<f64>]) -> Result<Option<Polygon>> {
    let merged = geom::dedup_points(points, config::POINT_MERGE_DISTANCE);
    if merged.len() < 3 || geom::all_colinear(&merged) {
        return Ok(None);
    }
    orientation::unfold_points(&merged).map(Some)
}
