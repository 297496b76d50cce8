use std::fmt;
use std::path::Path;

use crate::containment::Aabb;
use crate::geom::{self, Polygon};
use anyhow::{Context, Result};
use itertools::Itertools;
use nalgebra::Point3;


/// One triangle of the bounding surface, tagged with the name of the boundary
/// patch it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub points: [Point3<f64>; 3],
    pub boundary: String,
}

impl Triangle {
    pub fn new(points: [Point3<f64>; 3], boundary: &str) -> Self {
        Self {
            points,
            boundary: boundary.to_string(),
        }
    }

    pub fn as_polygon(&self) -> Result<Polygon> {
        Polygon::new(self.points.to_vec())
    }
}

/// The closed triangulated surface bounding the solve domain.
///
/// The core never parses files itself; this adapter accepts any in-memory
/// triangle soup. The OBJ loader maps each named object or group to a boundary
/// name, which is how surface patches get bound to boundary conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub triangles: Vec<Triangle>,
}

impl Surface {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        Self { triangles }
    }

    /// Loads a surface from a Wavefront OBJ file, triangulating any larger
    /// faces. Object/group names become boundary names.
    pub fn from_obj(filename: &Path) -> Result<Surface> {
        let (models, _) = tobj::load_obj(
            filename,
            &tobj::LoadOptions {
                triangulate: true,
                ..Default::default()
            },
        )
        .with_context(|| format!("failed to load OBJ model {}", filename.display()))?;

        let mut triangles = Vec::new();
        for m in &models {
            let name = if m.name.is_empty() {
                "unnamed".to_string()
            } else {
                m.name.clone()
            };
            let mesh = &m.mesh;
            let positions: Vec<Point3<f64>> = mesh
                .positions
                .chunks_exact(3)
                .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64))
                .collect();

            for tri in mesh.indices.chunks_exact(3) {
                triangles.push(Triangle {
                    points: [
                        positions[tri[0] as usize],
                        positions[tri[1] as usize],
                        positions[tri[2] as usize],
                    ],
                    boundary: name.clone(),
                });
            }
        }
        Ok(Surface::new(triangles))
    }

    /// Rescales every vertex once, e.g. to bring the model into millimetres.
    pub fn scale(&mut self, factor: f64) {
        for tri in &mut self.triangles {
            for p in &mut tri.points {
                p.coords *= factor;
            }
        }
    }

    pub fn extents(&self) -> Result<Aabb> {
        Aabb::from_points(self.triangles.iter().flat_map(|t| t.points.iter().copied()))
    }

    /// Whether every undirected edge is shared by exactly two triangles.
    pub fn is_manifold(&self) -> Result<bool> {
        Ok(geom::faces_watertight(&self.as_polygons()?))
    }

    /// Distinct boundary names in first-seen order.
    pub fn boundary_names(&self) -> Vec<String> {
        self.triangles
            .iter()
            .map(|t| t.boundary.clone())
            .unique()
            .collect()
    }

    pub fn as_polygons(&self) -> Result<Vec<Polygon>> {
        self.triangles.iter().map(|t| t.as_polygon()).collect()
    }

    /// Pre-mesh inspection: manifold verdict, extents and boundary inventory.
    pub fn check(&self) -> Result<SurfaceReport> {
        Ok(SurfaceReport {
            num_triangles: self.triangles.len(),
            extents: self.extents()?,
            manifold: self.is_manifold()?,
            boundary_names: self.boundary_names(),
        })
    }
}

/// Result of [`Surface::check`].
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceReport {
    pub num_triangles: usize,
    pub extents: Aabb,
    pub manifold: bool,
    pub boundary_names: Vec<String>,
}

impl fmt::Display for SurfaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.extents.size();
        writeln!(
            f,
            "Surface: {} triangles, {}",
            self.num_triangles,
            if self.manifold {
                "manifold"
            } else {
                "NOT manifold"
            }
        )?;
        writeln!(
            f,
            "Extents: {:.3} x {:.3} x {:.3} (min {:?}, max {:?})",
            size.x, size.y, size.z, self.extents.min, self.extents.max
        )?;
        write!(f, "Boundaries: {}", self.boundary_names.join(", "))
    }
}
