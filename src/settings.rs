use anyhow::{anyhow, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use log::info;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::config as constants;


/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub geom_name: String,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    pub eps_adap: f64,
    pub max_recurs_ali: u32,
    pub max_recursion: u32,
    #[serde(default)]
    pub min_recursion: u32,
    #[serde(default = "default_eps_dist")]
    pub eps_dist: f64,
    #[serde(default = "default_eps_area")]
    pub eps_area: f64,
    #[serde(default = "default_block_bytes")]
    pub block_bytes: usize,
    #[serde(default)]
    pub prj_reverse: bool,
    /// Solve only this row of the matrix.
    #[serde(default)]
    pub row: Option<usize>,
    /// Solve only this element of the row.
    #[serde(default)]
    pub col: Option<usize>,
    #[serde(default)]
    pub enclosure: bool,
}

fn default_directory() -> PathBuf {
    PathBuf::from("output")
}

fn default_eps_dist() -> f64 {
    constants::EPS_DIST
}

fn default_eps_area() -> f64 {
    constants::EPS_AREA
}

fn default_block_bytes() -> usize {
    constants::BLOCK_BYTES
}

fn read_config(config_file: &Path, with_env: bool) -> Result<Settings> {
    let mut builder = Config::builder().add_source(File::from(config_file).required(true));
    if with_env {
        builder = builder.add_source(Environment::with_prefix("view3d"));
    }
    let settings = builder
        .build()
        .with_context(|| format!("loading configuration {}", config_file.display()))?;
    settings
        .try_deserialize()
        .context("deserializing configuration")
}

/// Loads `config/default.toml` without environment or command line overrides.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let config = read_config(&root.join("config/default.toml"), false)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if local_config.exists() {
        info!("using local configuration: {}", local_config.display());
        local_config
    } else {
        info!("using default configuration: {}", default_config_file.display());
        default_config_file
    };

    let mut config = read_config(&config_file, true)?;

    // Parse command-line arguments and override values
    let args = CliArgs::parse();

    if let Some(geo) = args.geo {
        config.geom_name = geo;
    }
    if let Some(dir) = args.dir {
        config.directory = dir;
    }
    if let Some(eps) = args.eps {
        config.eps_adap = eps;
    }
    if let Some(ali) = args.ali {
        config.max_recurs_ali = ali;
    }
    if let Some(rec) = args.rec {
        config.max_recursion = rec;
    }
    if let Some(min_rec) = args.min_rec {
        config.min_recursion = min_rec;
    }
    if args.reverse {
        config.prj_reverse = true;
    }
    if args.row.is_some() {
        config.row = args.row;
        config.col = args.col;
    }
    if args.no_enclosure {
        config.enclosure = false;
    }

    validate_config(&config)?;

    info!("{:#?}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the VIEW3D_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("VIEW3D_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("could not find project root directory"))
}

pub fn validate_config(config: &Settings) -> Result<()> {
    if !(config.eps_adap > 0.0) {
        return Err(anyhow!("eps_adap must be greater than 0"));
    }
    if config.max_recurs_ali == 0 || config.max_recursion == 0 {
        return Err(anyhow!("recursion limits must be at least 1"));
    }
    if config.min_recursion > config.max_recursion {
        return Err(anyhow!("min_recursion must not exceed max_recursion"));
    }
    if config.eps_dist < 0.0 || config.eps_area < 0.0 {
        return Err(anyhow!("clipping tolerances must not be negative"));
    }
    if config.col.is_some() && config.row.is_none() {
        return Err(anyhow!("a column can only be given with a row"));
    }
    if let (Some(row), Some(col)) = (config.row, config.col) {
        if col == row {
            return Err(anyhow!("row and column must differ"));
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "View3D - view factors between planar surfaces in 3-D")]
pub struct CliArgs {
    /// File path to the input geometry. Every face of the Wavefront .obj file
    /// is a surface; object names such as `mask@3` select the surface kind.
    #[arg(short, long)]
    geo: Option<String>,

    /// Directory to write results to.
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Convergence of adaptive integration, relative to the smaller area.
    #[arg(short, long)]
    eps: Option<f64>,

    /// Maximum recursion depth of adaptive line integration.
    #[arg(long)]
    ali: Option<u32>,

    /// Maximum recursion depth of obstructed view factor subdivision.
    #[arg(long)]
    rec: Option<u32>,

    /// Minimum recursion depth of obstructed view factor subdivision.
    #[arg(long)]
    min_rec: Option<u32>,

    /// Project obstructions in the opposite direction to the one chosen.
    #[arg(long)]
    reverse: bool,

    /// Compute a single row of the matrix.
    #[arg(long)]
    row: Option<usize>,

    /// Compute a single element of the row given by `--row`.
    #[arg(long, requires = "row")]
    col: Option<usize>,

    /// Skip the enclosure volume and row sum report.
    #[arg(long)]
    no_enclosure: bool,
}
