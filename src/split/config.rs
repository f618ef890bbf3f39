use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use zonesplit::splitter::{ColumnMapping, DateFilter};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalConfig {
    pub output_dir: PathBuf,
    /// Boundary table (TOML or CSV); built-in Canadian table when absent
    pub boundaries: Option<PathBuf>,
    #[serde(default)]
    pub columns: ColumnMapping,
    pub default_zone: Option<u32>,
    pub date_filter: Option<DateFilter>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub input: PathBuf,
    /// Output subdirectory (`/`-separated); defaults to `{parent}/{stem}`
    pub name: Option<String>,
    /// Overrides the global default zone for this dataset
    pub default_zone: Option<u32>,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let mut config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        // Relative paths are relative to the config file
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.global.output_dir);
        if let Some(b) = self.global.boundaries.as_mut() {
            fix(b);
        }
        for dataset in &mut self.datasets {
            fix(&mut dataset.input);
        }
    }
}

/// Output subdirectory name for an input file: `{parent}/{stem}`, or just
/// the stem when the input has no parent directory. `.csv` and `.gz`
/// extensions are stripped from the stem.
pub fn dataset_name(input: &Path) -> String {
    let file = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset");
    let stem = file.strip_suffix(".gz").unwrap_or(file);
    let stem = stem.strip_suffix(".csv").unwrap_or(stem);

    match input
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
    {
        Some(parent) => format!("{}/{}", parent, stem),
        None => stem.to_string(),
    }
}

impl DatasetConfig {
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| dataset_name(&self.input))
    }
}
