//! Steady-state heat conduction over the volume mesh.
//!
//! Each cell carries a single temperature and the solver drives its net heat
//! flux to zero:
//! - Interior faces exchange Fourier conduction with the adjacent cell over
//!   the centroid-to-centroid distance
//! - Named faces follow the boundary condition bound to their name
//! - A damped Newton step updates each cell, with the flux gradient taken by
//!   central difference
//! - Updates are Jacobi style: every cell reads the field from the end of the
//!   previous iteration, so the result is independent of update order and
//!   worker count

use crate::mesh::{FaceTag, Mesh};
use crate::partition;
use anyhow::{bail, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Polygon;
    use crate::mesh::{Cell, Face, GridLocation};
    use nalgebra::Point3;

    fn quad(points: [[f64; 3]; 4]) -> Polygon {
        Polygon::new(
            points
                .iter()
                .map(|p| Point3::new(p[0], p[1], p[2]))
                .collect(),
        )
        .unwrap()
    }

    fn named(name: &str) -> FaceTag {
        FaceTag::Named(name.to_string())
    }

    /// Axis-aligned box cell with tags in grid face order: z-min, y-min,
    /// x-max, y-max, x-min, z-max.
    fn box_cell(location: GridLocation, min: [f64; 3], size: [f64; 3], tags: [FaceTag; 6]) -> Cell {
        let [x0, y0, z0] = min;
        let [x1, y1, z1] = [min[0] + size[0], min[1] + size[1], min[2] + size[2]];
        let quads = [
            [[x0, y0, z0], [x1, y0, z0], [x1, y1, z0], [x0, y1, z0]],
            [[x0, y0, z0], [x0, y0, z1], [x1, y0, z1], [x1, y0, z0]],
            [[x1, y0, z0], [x1, y0, z1], [x1, y1, z1], [x1, y1, z0]],
            [[x0, y1, z0], [x1, y1, z0], [x1, y1, z1], [x0, y1, z1]],
            [[x0, y0, z0], [x0, y1, z0], [x0, y1, z1], [x0, y0, z1]],
            [[x0, y0, z1], [x0, y1, z1], [x1, y1, z1], [x1, y0, z1]],
        ];
        let faces = quads
            .into_iter()
            .zip(tags)
            .map(|(corners, tag)| Face::new(quad(corners), tag).unwrap())
            .collect();
        Cell {
            location,
            faces,
            centroid: Point3::new(
                x0 + size[0] / 2.0,
                y0 + size[1] / 2.0,
                z0 + size[2] / 2.0,
            ),
            volume: size[0] * size[1] * size[2],
        }
    }

    fn plate_catalog() -> HashMap<String, BoundaryCondition> {
        HashMap::from([
            (
                "hot".to_string(),
                BoundaryCondition::FixedTemperature { temperature: 373.0 },
            ),
            (
                "cold".to_string(),
                BoundaryCondition::FixedTemperature { temperature: 273.0 },
            ),
            ("sides".to_string(), BoundaryCondition::HeatFlux { flux: 0.0 }),
        ])
    }

    fn plate_tags() -> [FaceTag; 6] {
        [
            named("hot"),
            named("sides"),
            named("sides"),
            named("sides"),
            named("sides"),
            named("cold"),
        ]
    }

    #[test]
    fn single_cell_reaches_the_two_plate_equilibrium() {
        let mesh = Mesh::new(vec![box_cell((0, 0, 0), [0.0; 3], [10.0; 3], plate_tags())]);
        let mut solver = Solver::new(&mesh, plate_catalog());
        solver.initialize(300.0).unwrap();
        solver.solve().unwrap();

        assert_eq!(solver.state(), SolverState::Converged);
        assert!(solver.iterations() < solver.max_iterations);
        assert!(solver.residual() < solver.min_residual);

        // both plates are 5 mm from the centroid, so the cell settles midway
        let state = &solver.solution().states[0];
        assert!((state.temperature - 323.0).abs() < 1e-6);

        assert_eq!(state.boundary_faces.len(), 6);
        for bf in &state.boundary_faces {
            match bf.face {
                0 => assert_eq!(bf.temperature, 373.0),
                5 => assert_eq!(bf.temperature, 273.0),
                // zero-flux sides sit at the cell temperature
                _ => assert!((bf.temperature - state.temperature).abs() < 1e-6),
            }
        }
    }

    #[test]
    fn two_cells_recover_the_linear_profile() {
        let lower = box_cell(
            (0, 0, 0),
            [0.0, 0.0, 0.0],
            [10.0, 10.0, 5.0],
            [
                named("hot"),
                named("sides"),
                named("sides"),
                named("sides"),
                named("sides"),
                FaceTag::Interior((0, 0, 1)),
            ],
        );
        let upper = box_cell(
            (0, 0, 1),
            [0.0, 0.0, 5.0],
            [10.0, 10.0, 5.0],
            [
                FaceTag::Interior((0, 0, 0)),
                named("sides"),
                named("sides"),
                named("sides"),
                named("sides"),
                named("cold"),
            ],
        );
        let mesh = Mesh::new(vec![lower, upper]);
        let mut solver = Solver::new(&mesh, plate_catalog());
        solver.initialize(300.0).unwrap();
        solver.solve().unwrap();

        assert_eq!(solver.state(), SolverState::Converged);

        // linear profile between the plates, sampled at the cell centroids:
        // T(z) = 373 - 10 z gives 348 at z = 2.5 and 298 at z = 7.5
        let states = &solver.solution().states;
        assert!((states[0].temperature - 348.0).abs() < 1e-6);
        assert!((states[1].temperature - 298.0).abs() < 1e-6);
    }

    #[test]
    fn convection_face_balances_conduction_at_convergence() {
        let tags = [
            named("hot"),
            named("sides"),
            named("sides"),
            named("sides"),
            named("sides"),
            named("ambient"),
        ];
        let mesh = Mesh::new(vec![box_cell((0, 0, 0), [0.0; 3], [10.0; 3], tags)]);
        let catalog = HashMap::from([
            (
                "hot".to_string(),
                BoundaryCondition::FixedTemperature { temperature: 373.0 },
            ),
            ("sides".to_string(), BoundaryCondition::HeatFlux { flux: 0.0 }),
            (
                "ambient".to_string(),
                BoundaryCondition::Convection {
                    h: 0.05,
                    t_ambient: 293.0,
                },
            ),
        ]);

        let mut solver = Solver::new(&mesh, catalog);
        solver.conductivity = 0.5;
        solver.initialize(300.0).unwrap();
        solver.solve().unwrap();

        assert_eq!(solver.state(), SolverState::Converged);

        // series resistances plate -> centroid -> face -> ambient give a heat
        // rate of 200 W, placing the cell at 353 K and the film face at 333 K
        let state = &solver.solution().states[0];
        assert!((state.temperature - 353.0).abs() < 1e-5);
        let film = state
            .boundary_faces
            .iter()
            .find(|bf| bf.face == 5)
            .unwrap();
        assert!((film.temperature - 333.0).abs() < 1e-5);
    }

    #[test]
    fn heat_flux_face_reports_a_consistent_surface_temperature() {
        let tags = [
            named("hot"),
            named("sides"),
            named("sides"),
            named("sides"),
            named("sides"),
            named("load"),
        ];
        let mesh = Mesh::new(vec![box_cell((0, 0, 0), [0.0; 3], [10.0; 3], tags)]);
        let catalog = HashMap::from([
            (
                "hot".to_string(),
                BoundaryCondition::FixedTemperature { temperature: 373.0 },
            ),
            ("sides".to_string(), BoundaryCondition::HeatFlux { flux: 0.0 }),
            ("load".to_string(), BoundaryCondition::HeatFlux { flux: 0.1 }),
        ]);

        let mut solver = Solver::new(&mesh, catalog);
        solver.conductivity = 0.5;
        solver.initialize(300.0).unwrap();
        solver.solve().unwrap();

        assert_eq!(solver.state(), SolverState::Converged);

        // 10 W in through the loaded face leaves through the plate, lifting
        // the cell 1 K above it; the face reads q d / k hotter than the cell
        let state = &solver.solution().states[0];
        assert!((state.temperature - 374.0).abs() < 1e-5);
        let load = state
            .boundary_faces
            .iter()
            .find(|bf| bf.face == 5)
            .unwrap();
        assert!((load.temperature - 375.0).abs() < 1e-5);
    }

    #[test]
    fn temperature_stats_cover_the_field() {
        let state = |temperature| CellState {
            temperature,
            boundary_faces: Vec::new(),
        };
        let solution = Solution {
            states: vec![state(300.0), state(350.0), state(340.0)],
        };

        let stats = solution.temperature_stats();
        assert_eq!(stats.min, 300.0);
        assert_eq!(stats.max, 350.0);
        assert!((stats.mean - 330.0).abs() < 1e-12);

        assert_eq!(Solution::default().temperature_stats(), TemperatureStats::default());
    }

    #[test]
    fn solve_requires_an_initialized_state() {
        let mesh = Mesh::new(vec![box_cell((0, 0, 0), [0.0; 3], [10.0; 3], plate_tags())]);
        let mut solver = Solver::new(&mesh, plate_catalog());

        assert_eq!(solver.state(), SolverState::Uninitialized);
        assert!(solver.solve().is_err());

        solver.initialize(300.0).unwrap();
        assert_eq!(solver.state(), SolverState::Initialized);
        solver.solve().unwrap();

        // terminal states do not accept another run without re-initializing
        assert!(solver.solve().is_err());
        solver.initialize(300.0).unwrap();
        assert_eq!(solver.state(), SolverState::Initialized);
    }

    #[test]
    fn iteration_cap_marks_the_run_unconverged() {
        let mesh = Mesh::new(vec![box_cell((0, 0, 0), [0.0; 3], [10.0; 3], plate_tags())]);
        let mut solver = Solver::new(&mesh, plate_catalog());
        solver.max_iterations = 3;
        solver.initialize(300.0).unwrap();
        solver.solve().unwrap();

        assert_eq!(solver.state(), SolverState::MaxIterationsReached);
        assert_eq!(solver.iterations(), 3);
        assert!(solver.residual() > solver.min_residual);
    }

    #[test]
    fn unknown_boundary_names_are_rejected() {
        let mesh = Mesh::new(vec![box_cell((0, 0, 0), [0.0; 3], [10.0; 3], plate_tags())]);
        let catalog = HashMap::from([(
            "hot".to_string(),
            BoundaryCondition::FixedTemperature { temperature: 373.0 },
        )]);
        let mut solver = Solver::new(&mesh, catalog);

        let result = solver.initialize(300.0);
        assert!(result.is_err());
        assert_eq!(solver.state(), SolverState::Uninitialized);
    }
}

/// Temperature perturbation for the central-difference flux gradient.
const TEMPERATURE_DELTA: f64 = 1e-5;

/// Thermal model attached to a named boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// Surface held at a prescribed temperature in K.
    FixedTemperature { temperature: f64 },
    /// Prescribed heat flux density in W/mm^2, positive into the body.
    HeatFlux { flux: f64 },
    /// Convective film with coefficient `h` in W/(mm^2 K) against an
    /// ambient temperature in K.
    Convection { h: f64, t_ambient: f64 },
}

/// Surface temperature estimate carried for one named face of a cell.
#[derive(Debug, Clone, Serialize)]
pub struct BoundaryFace {
    pub face: usize,      // face index within the owning cell
    pub temperature: f64, // current surface temperature estimate in K
}

/// Thermal state of one cell.
#[derive(Debug, Clone, Serialize)]
pub struct CellState {
    pub temperature: f64,
    pub boundary_faces: Vec<BoundaryFace>,
}

/// Temperature field over the mesh, indexed like `Mesh::cells`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Solution {
    pub states: Vec<CellState>,
}

impl Solution {
    pub fn temperature_stats(&self) -> TemperatureStats {
        let mut stats = TemperatureStats::default();
        if self.states.is_empty() {
            return stats;
        }
        stats.min = f64::INFINITY;
        stats.max = f64::NEG_INFINITY;
        for state in &self.states {
            stats.min = stats.min.min(state.temperature);
            stats.max = stats.max.max(state.temperature);
            stats.mean += state.temperature;
        }
        stats.mean /= self.states.len() as f64;
        stats
    }
}

/// Field statistics for the post-solve report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperatureStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl fmt::Display for TemperatureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Temperatures:")?;
        writeln!(f, "  Min:  {:.3}", self.min)?;
        writeln!(f, "  Mean: {:.3}", self.mean)?;
        write!(f, "  Max:  {:.3}", self.max)
    }
}

/// Lifecycle of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverState {
    Uninitialized,
    Initialized,
    Iterating,
    Converged,
    MaxIterationsReached,
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            SolverState::Uninitialized => "uninitialized",
            SolverState::Initialized => "initialized",
            SolverState::Iterating => "iterating",
            SolverState::Converged => "converged",
            SolverState::MaxIterationsReached => "max iterations reached",
        };
        write!(f, "{label}")
    }
}

/// Per-cell result of one Jacobi pass.
struct CellUpdate {
    state: CellState,
    flux_magnitude: f64,
}

/// Steady-state finite-volume conduction solver.
///
/// **How it Works:**
/// 1. `initialize` checks every named face against the boundary catalog,
///    seeds the temperature field, and stores a surface temperature per named
///    face. Prescribed-temperature faces keep their setpoint; flux and
///    convection faces start at the initial temperature and are re-estimated
///    as the field evolves.
/// 2. Each iteration sweeps all cells against a snapshot of the previous
///    field. A cell's net flux is sampled at its current temperature and at
///    a small perturbation either side to form a central-difference gradient,
///    then a relaxed Newton step moves the cell toward zero net flux.
/// 3. The sweep is partitioned over contiguous cell ranges and the updated
///    ranges are merged back in order. The residual is the mean absolute net
///    flux over all cells; iteration stops when it falls below
///    `min_residual` or the iteration cap is reached.
pub struct Solver<'a> {
    mesh: &'a Mesh,
    boundaries: HashMap<String, BoundaryCondition>,
    pub conductivity: f64,      // W/(mm K)
    pub relaxation_factor: f64, // Newton step damping, in (0, 1]
    pub max_iterations: usize,
    pub min_residual: f64, // convergence threshold on mean |net flux|, W
    pub workers: usize,    // upper bound on solve partitions
    state: SolverState,
    solution: Solution,
    residual: f64,
    iterations: usize,
    // per cell, per face: adjacent cell index for interior faces
    neighbors: Vec<Vec<Option<usize>>>,
}

impl<'a> Solver<'a> {
    /// Creates a solver for a mesh and its boundary catalog, with aluminium
    /// conductivity and default iteration controls.
    pub fn new(mesh: &'a Mesh, boundaries: HashMap<String, BoundaryCondition>) -> Self {
        Self {
            mesh,
            boundaries,
            conductivity: 237.0 / 1e3,
            relaxation_factor: 0.5,
            max_iterations: 100,
            min_residual: 1e-8,
            workers: partition::default_workers(),
            state: SolverState::Uninitialized,
            solution: Solution::default(),
            residual: 0.0,
            iterations: 0,
            neighbors: Vec::new(),
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    /// Mean absolute net cell flux from the latest iteration.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Seeds the temperature field and binds named faces to the catalog.
    ///
    /// Fails if the mesh names a boundary the catalog does not define.
    /// Calling this again discards any previous solution and re-arms the
    /// solver.
    pub fn initialize(&mut self, initial_temperature: f64) -> Result<()> {
        for name in self.mesh.named_boundaries() {
            if !self.boundaries.contains_key(&name) {
                bail!("mesh boundary {} has no boundary condition", name);
            }
        }

        let index = self.mesh.location_index();
        self.neighbors = self
            .mesh
            .cells
            .iter()
            .map(|cell| {
                cell.faces
                    .iter()
                    .map(|face| match &face.tag {
                        FaceTag::Interior(location) => index.get(location).copied(),
                        FaceTag::Named(_) => None,
                    })
                    .collect()
            })
            .collect();

        self.solution.states = self
            .mesh
            .cells
            .iter()
            .map(|cell| {
                let mut boundary_faces = Vec::new();
                for (face_index, face) in cell.faces.iter().enumerate() {
                    if let FaceTag::Named(name) = &face.tag {
                        let temperature = match self.boundaries[name] {
                            BoundaryCondition::FixedTemperature { temperature } => temperature,
                            _ => initial_temperature,
                        };
                        boundary_faces.push(BoundaryFace {
                            face: face_index,
                            temperature,
                        });
                    }
                }
                CellState {
                    temperature: initial_temperature,
                    boundary_faces,
                }
            })
            .collect();

        self.residual = 0.0;
        self.iterations = 0;
        self.state = SolverState::Initialized;
        Ok(())
    }

    /// Iterates the field to convergence or the iteration cap.
    pub fn solve(&mut self) -> Result<()> {
        if self.state != SolverState::Initialized {
            bail!("solver is {}, initialize it before solving", self.state);
        }

        let start = Instant::now();
        println!("Solving temperature field...");

        let m = MultiProgress::new();
        let pb = m.add(ProgressBar::new(self.max_iterations as u64));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
            )
            .unwrap()
            .progress_chars("█▇▆▅▄▃▂▁"),
        );

        self.state = SolverState::Iterating;
        for iteration in 1..=self.max_iterations {
            self.residual = self.iterate()?;
            self.iterations = iteration;
            pb.set_message(format!("residual {:.3e}", self.residual));
            pb.inc(1);
            if self.residual < self.min_residual {
                self.state = SolverState::Converged;
                break;
            }
        }
        if self.state != SolverState::Converged {
            self.state = SolverState::MaxIterationsReached;
        }
        pb.finish();

        let end = Instant::now();
        let duration = end.duration_since(start);
        println!(
            "Solve finished in {:.2?}: {} after {} iterations, residual {:.3e}",
            duration, self.state, self.iterations, self.residual
        );

        Ok(())
    }

    /// One Jacobi pass over all cells. Returns the mean absolute net flux.
    fn iterate(&mut self) -> Result<f64> {
        let previous = self.solution.clone();
        let cells = self.mesh.cells.len();
        let workers = self.workers.min((cells / 100).max(1));

        let updates = partition::par_map_partitions(cells, workers, |range| {
            range
                .map(|index| self.update_cell(index, &previous))
                .collect()
        })?;

        let residual = updates.iter().map(|u| u.flux_magnitude).sum::<f64>() / cells as f64;
        self.solution.states = updates.into_iter().map(|u| u.state).collect();
        Ok(residual)
    }

    /// Newton update for one cell against the previous field, with a fresh
    /// surface temperature estimate for its flux and convection faces.
    fn update_cell(&self, index: usize, previous: &Solution) -> Result<CellUpdate> {
        let temperature = previous.states[index].temperature;

        let f0 = self.net_flux(index, temperature, previous)?;
        let f1 = self.net_flux(index, temperature - TEMPERATURE_DELTA, previous)?;
        let f2 = self.net_flux(index, temperature + TEMPERATURE_DELTA, previous)?;
        let gradient = (f2 - f1) / (2.0 * TEMPERATURE_DELTA);

        // a cell whose flux does not respond to its own temperature yet
        // (isolated or fully flux-loaded) is left where it is
        let new_temperature = if gradient == 0.0 {
            temperature
        } else {
            temperature - self.relaxation_factor * f0 / gradient
        };

        let cell = &self.mesh.cells[index];
        let mut boundary_faces = previous.states[index].boundary_faces.clone();
        for bf in &mut boundary_faces {
            let face = &cell.faces[bf.face];
            let name = match &face.tag {
                FaceTag::Named(name) => name,
                FaceTag::Interior(_) => continue,
            };
            let condition = match self.boundaries.get(name) {
                Some(condition) => condition,
                None => bail!("no boundary condition named {}", name),
            };
            let distance = (cell.centroid - face.centroid).norm();
            match *condition {
                BoundaryCondition::FixedTemperature { .. } => {}
                BoundaryCondition::HeatFlux { flux } => {
                    // back-solve the surface temperature that carries the
                    // prescribed flux to the cell centroid
                    let face_flux = face.area * flux;
                    bf.temperature =
                        face_flux * distance / (self.conductivity * face.area) + new_temperature;
                }
                BoundaryCondition::Convection { h, t_ambient } => {
                    // one substitution of the film flux into the conduction
                    // balance per pass; the pair settles jointly
                    let face_flux = face.area * h * (t_ambient - bf.temperature);
                    bf.temperature =
                        face_flux * distance / (self.conductivity * face.area) + new_temperature;
                }
            }
        }

        Ok(CellUpdate {
            state: CellState {
                temperature: new_temperature,
                boundary_faces,
            },
            flux_magnitude: f0.abs(),
        })
    }

    /// Net heat flux into a cell held at `cell_temperature`, with every other
    /// quantity read from `solution`. Positive values heat the cell.
    fn net_flux(&self, index: usize, cell_temperature: f64, solution: &Solution) -> Result<f64> {
        let cell = &self.mesh.cells[index];
        let state = &solution.states[index];
        let mut flux = 0.0;

        for (face_index, face) in cell.faces.iter().enumerate() {
            match &face.tag {
                FaceTag::Named(name) => {
                    let stored = match state.boundary_faces.iter().find(|bf| bf.face == face_index)
                    {
                        Some(bf) => bf.temperature,
                        None => bail!(
                            "cell {:?} face {} has no stored surface temperature",
                            cell.location,
                            face_index
                        ),
                    };
                    let condition = match self.boundaries.get(name) {
                        Some(condition) => condition,
                        None => bail!("no boundary condition named {}", name),
                    };
                    match *condition {
                        BoundaryCondition::FixedTemperature { .. } => {
                            let distance = (cell.centroid - face.centroid).norm();
                            flux += face.area * self.conductivity * (stored - cell_temperature)
                                / distance;
                        }
                        BoundaryCondition::HeatFlux { flux: q } => {
                            flux += face.area * q;
                        }
                        BoundaryCondition::Convection { h, t_ambient } => {
                            flux += face.area * h * (t_ambient - stored);
                        }
                    }
                }
                FaceTag::Interior(_) => {
                    // faces whose neighbor was dropped from the mesh are
                    // treated as adiabatic
                    if let Some(adjacent) = self.neighbors[index][face_index] {
                        let adjacent_temperature = solution.states[adjacent].temperature;
                        let distance =
                            (cell.centroid - self.mesh.cells[adjacent].centroid).norm();
                        flux += face.area * self.conductivity
                            * (adjacent_temperature - cell_temperature)
                            / distance;
                    }
                }
            }
        }

        Ok(flux)
    }
}
