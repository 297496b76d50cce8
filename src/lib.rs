//! Grid-conforming volume meshing for closed triangulated solids and
//! steady-state heat conduction over the resulting mesh.

pub mod clip;
pub mod config;
pub mod containment;
pub mod geom;
pub mod mesh;
pub mod orientation;
pub mod output;
pub mod partition;
pub mod settings;
pub mod solver;
pub mod surface;
