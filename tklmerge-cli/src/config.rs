//! Merge configuration: an optional TOML file, then command-line overrides.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tklmerge::MergeConfig;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub master: Option<String>,
    pub output: Option<PathBuf>,
    pub families: Vec<String>,
    pub seed: Option<u64>,
    pub strict: bool,
    pub models: Vec<PathBuf>,
}

/// Reads `path` as a TOML [`MergeConfig`]. Relative paths inside the file are resolved against
/// the file's directory.
pub fn load(path: &Path) -> Result<MergeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let mut config: MergeConfig =
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for model in &mut config.model_paths {
        if model.is_relative() {
            *model = base.join(&*model);
        }
    }
    if !config.output_dir.as_os_str().is_empty() && config.output_dir.is_relative() {
        config.output_dir = base.join(&config.output_dir);
    }
    Ok(config)
}

pub fn resolve(file: Option<&Path>, overrides: Overrides) -> Result<MergeConfig> {
    let mut config = match file {
        Some(path) => load(path)?,
        None => MergeConfig::default(),
    };

    if let Some(master) = overrides.master {
        config.options.master_table = master;
    }
    if let Some(output) = overrides.output {
        config.output_dir = output;
    }
    if !overrides.families.is_empty() {
        config.options.families = overrides.families;
    }
    if let Some(seed) = overrides.seed {
        config.options.location_clustering.seed = seed;
        config.options.rotation_clustering.seed = seed;
    }
    if overrides.strict {
        config.options.strict_capacity = true;
    }
    if !overrides.models.is_empty() {
        config.model_paths = overrides.models;
    }

    anyhow::ensure!(!config.model_paths.is_empty(), "No models given");
    anyhow::ensure!(
        !config.options.master_table.is_empty(),
        "No master table given (use --master or `master_table` in the config)"
    );
    if config.output_dir.as_os_str().is_empty() {
        config.output_dir = PathBuf::from("merged");
    }
    Ok(config)
}
