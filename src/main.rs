use std::path::Path;

use anyhow::{bail, Result};
use kiln::mesh::Mesher;
use kiln::output;
use kiln::settings::{self};
use kiln::solver::Solver;
use kiln::surface::Surface;

fn main() -> Result<()> {
    let settings = settings::load_config()?;

    let mut surface = Surface::from_obj(Path::new(&settings.geometry))?;
    surface.scale(settings.scale);
    let report = surface.check()?;
    println!("{}", report);
    if !report.manifold {
        bail!("input surface is not closed");
    }

    let mut mesher = Mesher::new(settings.max_cell_size);
    if let Some(workers) = settings.workers {
        mesher.workers = workers;
    }
    if let Some(seed) = settings.seed {
        mesher.seed = seed;
    }
    let mesh = mesher.generate(&surface)?;

    let mut solver = Solver::new(&mesh, settings.boundaries.clone());
    solver.conductivity = settings.conductivity;
    solver.relaxation_factor = settings.relaxation_factor;
    solver.max_iterations = settings.max_iterations;
    solver.min_residual = settings.min_residual;
    if let Some(workers) = settings.workers {
        solver.workers = workers;
    }
    solver.initialize(settings.initial_temperature)?;
    solver.solve()?;
    println!("{}", solver.solution().temperature_stats());

    output::writeup(&mesh, &solver, &settings)?;

    Ok(())
}
