//! Command implementations for the Kiln CLI.

pub mod monitor;
pub mod submit;
pub mod train;
pub mod types;

use anyhow::Result;
use kiln_orchestrator::LauncherConfig;
use std::path::Path;

/// Load the launcher config from `path`, or discover `./kiln.toml`.
pub fn load_config(path: Option<&Path>) -> Result<LauncherConfig> {
    let config = match path {
        Some(path) => LauncherConfig::load_from_file(path)?,
        None => LauncherConfig::discover_and_load()?,
    };
    Ok(config)
}
