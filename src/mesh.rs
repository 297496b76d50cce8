//! Hexahedral-dominant volume meshing.
//!
//! A closed surface is boxed with an axis-aligned grid of base cells; each
//! base cell is clipped against the surface and the survivors form the mesh.
//! Key features:
//! - Equal-size base cells per axis, sized to a maximum edge length
//! - Per-face boundary tags inherited from named surface patches
//! - Parallel clipping over contiguous cell ranges with progress reporting
//! - Cells measured (area, centroid, volume) after inward orientation

use std::collections::HashMap;
use std::time::Instant;

use crate::clip::CellClipper;
use crate::containment::Aabb;
use crate::geom::Polygon;
use crate::partition;
use crate::surface::Surface;
use anyhow::{bail, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use itertools::Itertools;
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;


/// Grid coordinates of a base cell. Signed so that boundary cells can name
/// neighbors beyond the grid.
pub type GridLocation = (i64, i64, i64);

/// What a cell face borders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FaceTag {
    /// Face toward the cell at the tagged grid location.
    Interior(GridLocation),
    /// Face on the surface, carrying the name of its boundary patch.
    Named(String),
}

/// One polygonal face of a mesh cell.
#[derive(Debug, Clone, Serialize)]
pub struct Face {
    pub polygon: Polygon,
    pub tag: FaceTag,
    pub area: f64,
    pub centroid: Point3<f64>,
}

impl Face {
    pub fn new(polygon: Polygon, tag: FaceTag) -> Result<Self> {
        let area = polygon.area()?;
        let centroid = polygon.centroid()?;
        Ok(Self {
            polygon,
            tag,
            area,
            centroid,
        })
    }
}

/// A watertight polyhedral cell cut from one base cell.
#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    pub location: GridLocation,
    pub faces: Vec<Face>,
    pub centroid: Point3<f64>,
    pub volume: f64,
}

/// The finished volume mesh, cells in grid order.
#[derive(Debug, Clone, Serialize)]
pub struct Mesh {
    pub cells: Vec<Cell>,
}

impl Mesh {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn total_volume(&self) -> f64 {
        self.cells.iter().map(|c| c.volume).sum()
    }

    /// Lookup from grid location to cell index.
    pub fn location_index(&self) -> HashMap<GridLocation, usize> {
        self.cells
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.location, idx))
            .collect()
    }

    /// Boundary names present on the mesh, in first-seen order.
    pub fn named_boundaries(&self) -> Vec<String> {
        self.cells
            .iter()
            .flat_map(|c| &c.faces)
            .filter_map(|f| match &f.tag {
                FaceTag::Named(name) => Some(name.clone()),
                FaceTag::Interior(_) => None,
            })
            .unique()
            .collect()
    }
}

/// One quad of an axis-aligned base cell, pre-tagged with the grid location of
/// the neighbor it faces.
#[derive(Debug, Clone)]
pub struct BaseFace {
    pub corners: [Point3<f64>; 4],
    pub neighbor: GridLocation,
}

/// An axis-aligned box cell of the base grid.
#[derive(Debug, Clone)]
pub struct BaseCell {
    pub location: GridLocation,
    pub faces: [BaseFace; 6],
    pub aabb: Aabb,
}

impl BaseCell {
    fn new(location: GridLocation, x0: f64, x1: f64, y0: f64, y1: f64, z0: f64, z1: f64) -> Self {
        let (i, j, k) = location;
        let p = Point3::new;
        // z-min, y-min, x-max, y-max, x-min, z-max; corner cycles chosen so
        // adjacent corners share a cell edge
        let faces = [
            BaseFace {
                corners: [p(x0, y0, z0), p(x0, y1, z0), p(x1, y1, z0), p(x1, y0, z0)],
                neighbor: (i, j, k - 1),
            },
            BaseFace {
                corners: [p(x0, y0, z0), p(x0, y0, z1), p(x1, y0, z1), p(x1, y0, z0)],
                neighbor: (i, j - 1, k),
            },
            BaseFace {
                corners: [p(x1, y0, z0), p(x1, y0, z1), p(x1, y1, z1), p(x1, y1, z0)],
                neighbor: (i + 1, j, k),
            },
            BaseFace {
                corners: [p(x1, y1, z0), p(x1, y1, z1), p(x0, y1, z1), p(x0, y1, z0)],
                neighbor: (i, j + 1, k),
            },
            BaseFace {
                corners: [p(x0, y1, z0), p(x0, y1, z1), p(x0, y0, z1), p(x0, y0, z0)],
                neighbor: (i - 1, j, k),
            },
            BaseFace {
                corners: [p(x0, y0, z1), p(x0, y1, z1), p(x1, y1, z1), p(x1, y0, z1)],
                neighbor: (i, j, k + 1),
            },
        ];
        let aabb = Aabb {
            min: p(x0, y0, z0),
            max: p(x1, y1, z1),
        };
        Self {
            location,
            faces,
            aabb,
        }
    }
}

/// Lays the axis-aligned base grid over the extents: each axis is divided into
/// ceil(extent / max_cell_size) equal cells. Cells are emitted x-major, then
/// y, then z.
pub fn base_grid(extents: &Aabb, max_cell_size: f64) -> Result<Vec<BaseCell>> {
    if max_cell_size <= 0.0 {
        bail!("max cell size must be positive, got {}", max_cell_size);
    }
    let size = extents.size();
    for axis in 0..3 {
        if size[axis] <= 0.0 {
            bail!("degenerate model extents: zero size along axis {}", axis);
        }
    }

    let counts: Vec<i64> = (0..3)
        .map(|axis| (size[axis] / max_cell_size).ceil() as i64)
        .collect();
    let steps: Vec<f64> = (0..3)
        .map(|axis| size[axis] / counts[axis] as f64)
        .collect();

    let mut cells = Vec::with_capacity((counts[0] * counts[1] * counts[2]) as usize);
    for i in 0..counts[0] {
        for j in 0..counts[1] {
            for k in 0..counts[2] {
                let x0 = extents.min.x + steps[0] * i as f64;
                let y0 = extents.min.y + steps[1] * j as f64;
                let z0 = extents.min.z + steps[2] * k as f64;
                cells.push(BaseCell::new(
                    (i, j, k),
                    x0,
                    x0 + steps[0],
                    y0,
                    y0 + steps[1],
                    z0,
                    z0 + steps[2],
                ));
            }
        }
    }
    Ok(cells)
}

/// Volume mesh generator.
#[derive(Debug, Clone)]
pub struct Mesher {
    pub max_cell_size: f64, // upper bound on base cell edge length
    pub workers: usize,     // worker count for the clipping pass
    pub seed: u64,          // base seed for the containment ray generators
}

impl Mesher {
    pub fn new(max_cell_size: f64) -> Self {
        Self {
            max_cell_size,
            workers: partition::default_workers(),
            seed: 0,
        }
    }

    /// Generates the volume mesh for a closed surface.
    ///
    /// The base grid is laid sequentially, then the cells are clipped in
    /// parallel over contiguous index ranges and concatenated back in grid
    /// order. Cells the surface excludes are skipped.
    pub fn generate(&self, surface: &Surface) -> Result<Mesh> {
        let start = Instant::now();
        println!("Generating mesh...");

        let grid = base_grid(&surface.extents()?, self.max_cell_size)?;
        let clipper = CellClipper::new(surface)?;

        let m = MultiProgress::new();
        let pb = m.add(ProgressBar::new(grid.len() as u64));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
            )
            .unwrap()
            .progress_chars("█▇▆▅▄▃▂▁"),
        );
        pb.set_message("clipping".to_string());

        let cells = partition::par_map_partitions(grid.len(), self.workers, |range| {
            // each partition draws its own deterministic ray sequence
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(range.start as u64));
            let mut kept = Vec::new();
            for idx in range {
                if let Some(cell) = clipper.clip(&grid[idx], &mut rng)? {
                    kept.push(cell);
                }
                pb.inc(1);
            }
            Ok(kept)
        })?;
        pb.finish();

        let end = Instant::now();
        let duration = end.duration_since(start);
        println!(
            "Mesh generated in {:.2?}: kept {} of {} base cells",
            duration,
            cells.len(),
            grid.len()
        );

        Ok(Mesh::new(cells))
    }
}
