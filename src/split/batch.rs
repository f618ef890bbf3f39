use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use zonesplit::splitter::{ColumnMapping, CsvRecordSource, DirectoryOutput, SplitOptions};
use zonesplit::{BoundaryRegistry, SplitReport, Splitter};

/// One input file and where its groups go
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub input: PathBuf,
    pub options: SplitOptions,
}

impl Dataset {
    /// `<output_dir>/<name>`, with `/` in the name as a path separator
    pub fn output_root(&self, output_dir: &Path) -> PathBuf {
        self.name
            .split('/')
            .fold(output_dir.to_path_buf(), |root, segment| root.join(segment))
    }
}

/// Reject names that would share, nest inside each other or escape an
/// output directory. Two datasets writing into one directory would truncate
/// each other's groups.
pub fn check_dataset_names(datasets: &[Dataset]) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::new();
    for dataset in datasets {
        if dataset
            .name
            .split('/')
            .any(|s| s.is_empty() || s == "." || s == "..")
        {
            bail!("Invalid dataset name '{}'", dataset.name);
        }
        let key = dataset.name.to_lowercase();
        if let Some(other) = seen
            .iter()
            .find(|s| key.starts_with(&format!("{}/", s)) || s.starts_with(&format!("{}/", key)))
        {
            bail!(
                "Dataset name '{}' nests with '{}'; output directories must not overlap",
                dataset.name,
                other
            );
        }
        if !seen.insert(key) {
            bail!(
                "Dataset name '{}' is used more than once (input {}); set a distinct name",
                dataset.name,
                dataset.input.display()
            );
        }
    }
    Ok(())
}

/// Split every dataset in order. Stops at the first fatal error.
pub fn run_batch(
    datasets: &[Dataset],
    registry: &BoundaryRegistry,
    columns: &ColumnMapping,
    output_dir: &Path,
    show_progress: bool,
) -> Result<SplitReport> {
    info!("Starting batch split for {} dataset(s)", datasets.len());
    check_dataset_names(datasets)?;
    std::fs::create_dir_all(output_dir).context("Failed to create output directory")?;

    let mut totals = SplitReport::default();
    for dataset in datasets {
        match run_dataset(dataset, registry, columns, output_dir, show_progress) {
            Ok(report) => totals.merge(&report),
            Err(e) => {
                error!("Dataset {} failed: {:#}", dataset.name, e);
                return Err(e);
            }
        }
    }
    Ok(totals)
}

pub fn run_dataset(
    dataset: &Dataset,
    registry: &BoundaryRegistry,
    columns: &ColumnMapping,
    output_dir: &Path,
    show_progress: bool,
) -> Result<SplitReport> {
    info!(
        "Splitting {} -> {}",
        dataset.input.display(),
        dataset.name
    );

    let source = CsvRecordSource::open(&dataset.input, columns)
        .with_context(|| format!("Failed to open {}", dataset.input.display()))?;
    let root = dataset.output_root(output_dir);

    let mut splitter =
        Splitter::new(registry, DirectoryOutput::new(&root)).with_options(dataset.options.clone());

    let pb = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template(
            "{spinner:.green} [{elapsed_precise}] {pos} records ({per_sec})",
        )?);
        pb.enable_steady_tick(Duration::from_millis(120));
        splitter = splitter.with_progress(pb.clone());
        Some(pb)
    } else {
        None
    };

    let result = splitter.process(source);
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let report = result.with_context(|| format!("Failed to split {}", dataset.input.display()))?;

    info!("Dataset {} written to {}", dataset.name, root.display());
    report.log_summary();
    Ok(report)
}
