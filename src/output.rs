use std::{fs::File, io::BufWriter};

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::io::Write;

use crate::mesh::{FaceTag, Mesh};
use crate::settings::Settings;
use crate::solver::{Solution, Solver};


/// Snapshot of a finished run for the summary file.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub geometry: String,
    pub cells: usize,
    pub total_volume: f64,
    pub state: String,
    pub iterations: usize,
    pub residual: f64,
}

impl RunSummary {
    pub fn new(mesh: &Mesh, solver: &Solver, geometry: &str) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            geometry: geometry.to_string(),
            cells: mesh.cells.len(),
            total_volume: mesh.total_volume(),
            state: solver.state().to_string(),
            iterations: solver.iterations(),
            residual: solver.residual(),
        }
    }
}

/// One line per cell: grid location, centroid, temperature.
fn temperature_rows(mesh: &Mesh, solution: &Solution) -> Vec<String> {
    mesh.cells
        .iter()
        .zip(&solution.states)
        .map(|(cell, state)| {
            let (i, j, k) = cell.location;
            format!(
                "{} {} {} {} {} {} {}",
                i, j, k, cell.centroid.x, cell.centroid.y, cell.centroid.z, state.temperature
            )
        })
        .collect()
}

/// One line per named face: grid location, face index, boundary name, face
/// centroid, surface temperature estimate.
fn surface_rows(mesh: &Mesh, solution: &Solution) -> Vec<String> {
    let mut rows = Vec::new();
    for (cell, state) in mesh.cells.iter().zip(&solution.states) {
        for bf in &state.boundary_faces {
            let face = &cell.faces[bf.face];
            let name = match &face.tag {
                FaceTag::Named(name) => name.as_str(),
                FaceTag::Interior(_) => continue,
            };
            let (i, j, k) = cell.location;
            rows.push(format!(
                "{} {} {} {} {} {} {} {} {}",
                i,
                j,
                k,
                bf.face,
                name,
                face.centroid.x,
                face.centroid.y,
                face.centroid.z,
                bf.temperature
            ));
        }
    }
    rows
}

/// Write the temperature field, the surface temperatures, the mesh, and a run
/// summary to the working directory.
pub fn writeup(mesh: &Mesh, solver: &Solver, settings: &Settings) -> Result<()> {
    let file = File::create("temperatures")?;
    let mut writer = BufWriter::new(file);
    for row in temperature_rows(mesh, solver.solution()) {
        writeln!(writer, "{}", row)?;
    }

    let file = File::create("surface_temperatures")?;
    let mut writer = BufWriter::new(file);
    for row in surface_rows(mesh, solver.solution()) {
        writeln!(writer, "{}", row)?;
    }

    let file = File::create("mesh.json")?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, mesh)?;

    let summary = RunSummary::new(mesh, solver, &settings.geometry);
    let file = File::create("summary.toml")?;
    let mut writer = BufWriter::new(file);
    write!(writer, "{}", toml::to_string(&summary)?)?;

    Ok(())
}
