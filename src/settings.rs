use anyhow::Result;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::solver::BoundaryCondition;

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub geometry: String,
    pub max_cell_size: f64,
    pub initial_temperature: f64,
    pub conductivity: f64,
    pub relaxation_factor: f64,
    pub max_iterations: usize,
    pub min_residual: f64,
    pub boundaries: HashMap<String, BoundaryCondition>,
    pub seed: Option<u64>,
    pub workers: Option<usize>,
    #[serde(default = "default_scale_factor")]
    pub scale: f64,
}

fn default_scale_factor() -> f64 {
    1.0
}

pub fn load_default_config() -> Result<Settings> {
    let kiln_dir = retrieve_project_root();
    let default_config_file = kiln_dir.join("config/default.toml");

    let settings: Config = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Error loading configuration: {}", err);
            std::process::exit(1);
        });

    let config: Settings = settings.try_deserialize().unwrap_or_else(|err| {
        eprintln!("Error deserializing configuration: {}", err);
        std::process::exit(1);
    });

    validate_config(&config);

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    // Try to find the project directory in different ways
    let kiln_dir = retrieve_project_root();

    let default_config_file = kiln_dir.join("config/default.toml");
    let local_config = kiln_dir.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if local_config.exists() {
        println!("Using local configuration: {:?}", local_config);
        local_config
    } else {
        println!("Using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings: Config = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("kiln"))
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Error loading configuration: {}", err);
            std::process::exit(1);
        });

    let mut config: Settings = settings.try_deserialize().unwrap_or_else(|err| {
        eprintln!("Error deserializing configuration: {}", err);
        std::process::exit(1);
    });

    // Parse command-line arguments and override values
    let args = CliArgs::parse();

    if let Some(geo) = args.geo {
        config.geometry = geo;
    }
    if let Some(cell) = args.cell {
        config.max_cell_size = cell;
    }
    if let Some(t0) = args.t0 {
        config.initial_temperature = t0;
    }
    if let Some(conductivity) = args.conductivity {
        config.conductivity = conductivity;
    }
    if let Some(relax) = args.relax {
        config.relaxation_factor = relax;
    }
    if let Some(iterations) = args.iterations {
        config.max_iterations = iterations;
    }
    if let Some(residual) = args.residual {
        config.min_residual = residual;
    }
    if let Some(scale) = args.scale {
        config.scale = scale;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }

    validate_config(&config);

    println!("{:#?}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the KILN_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the exectuable directory or any of its parents, use it.
/// If none of these methods work, the function will panic.
fn retrieve_project_root() -> std::path::PathBuf {
    let kiln_dir = if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        // When running through cargo (e.g. cargo run, cargo test)
        std::path::PathBuf::from(manifest_dir)
    } else if let Ok(path) = env::var("KILN_ROOT_DIR") {
        // Allow explicit configuration via environment variable
        std::path::PathBuf::from(path)
    } else {
        // Fallback: try to find the nearest directory containing a "config" subdirectory
        // Start from the executable directory and walk upward
        let exe_path = env::current_exe().expect("Failed to get current executable path");
        let mut current_dir = exe_path
            .parent()
            .expect("Failed to get executable directory")
            .to_path_buf();
        let mut found = false;

        while !found && current_dir.parent().is_some() {
            if current_dir.join("config").is_dir() {
                found = true;
            } else {
                current_dir = current_dir.parent().unwrap().to_path_buf();
            }
        }

        if found {
            current_dir
        } else {
            panic!("Could not find project root directory");
        }
    };
    kiln_dir
}

fn validate_config(config: &Settings) {
    assert!(
        config.max_cell_size > 0.0,
        "Maximum cell size must be greater than 0"
    );
    assert!(
        config.conductivity > 0.0,
        "Thermal conductivity must be greater than 0"
    );
    assert!(
        config.relaxation_factor > 0.0 && config.relaxation_factor <= 1.0,
        "Relaxation factor must lie in (0, 1]"
    );
    assert!(
        config.max_iterations > 0,
        "Maximum iteration count must be greater than 0"
    );
    assert!(
        config.min_residual > 0.0,
        "Minimum residual must be greater than 0"
    );
    assert!(config.scale > 0.0, "Scale factor must be greater than 0");
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "KILN - grid-conforming volume meshing and steady-state heat conduction"
)]
pub struct CliArgs {
    /// File path to the input geometry. The surface must be closed and is read
    /// from the Wavefront .obj format, with boundary names taken from the
    /// object group names.
    #[arg(short, long)]
    geo: Option<String>,

    /// Upper bound on the base grid cell size, in geometry units.
    #[arg(short, long)]
    cell: Option<f64>,

    /// Initial temperature of the body in K.
    #[arg(long)]
    t0: Option<f64>,

    /// Thermal conductivity of the body in W/(mm K).
    #[arg(short = 'k', long)]
    conductivity: Option<f64>,

    /// Damping factor applied to each Newton temperature update.
    #[arg(long)]
    relax: Option<f64>,

    /// Maximum number of solver iterations.
    #[arg(long)]
    iterations: Option<usize>,

    /// Convergence threshold on the mean absolute net cell flux.
    #[arg(long)]
    residual: Option<f64>,

    /// Scale factor applied to the geometry on load.
    #[arg(long)]
    scale: Option<f64>,

    /// Random seed for the containment ray draws.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Worker count for the meshing and solving passes.
    #[arg(short, long)]
    workers: Option<usize>,
}
