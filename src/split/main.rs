//! Plot table splitter.
//!
//! Reads plot/site tables, resolves every record's jurisdiction from its UTM
//! zone and coordinates, and writes `{zone}/{code}.csv` groups per dataset.

mod batch;
mod config;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use zonesplit::boundary::{canadian_boundaries, load_boundaries};
use zonesplit::splitter::{ColumnMapping, DateFilter, SplitOptions};
use zonesplit::BoundaryRegistry;

use crate::batch::{check_dataset_names, run_batch, Dataset};
use crate::config::{dataset_name, Config};

#[derive(Parser, Debug)]
#[command(name = "zonesplit")]
#[command(about = "Split plot tables by UTM zone and jurisdiction")]
struct Args {
    /// Input CSV file(s), optionally gzip-compressed
    #[arg(short, long)]
    input: Vec<PathBuf>,

    /// TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (overrides the config file)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Boundary table (TOML or CSV); defaults to the built-in Canadian table
    #[arg(long)]
    boundaries: Option<PathBuf>,

    /// Zone assumed for records with an empty zone cell
    #[arg(long)]
    default_zone: Option<u32>,

    /// Keep only records observed on or after this date (YYYY-MM-DD)
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Disable progress output
    #[arg(long)]
    no_progress: bool,

    /// Debug logging (per-record decisions)
    #[arg(short, long)]
    verbose: bool,
}

/// Everything a run needs, after merging config file and flags
struct Plan {
    output_dir: PathBuf,
    boundaries: Option<PathBuf>,
    columns: ColumnMapping,
    datasets: Vec<Dataset>,
}

fn build_plan(args: &Args) -> Result<Plan> {
    let config = args
        .config
        .as_ref()
        .map(Config::load_from_file)
        .transpose()?;

    let global = config.as_ref().map(|c| &c.global);

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| global.map(|g| g.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("output"));
    let boundaries = args
        .boundaries
        .clone()
        .or_else(|| global.and_then(|g| g.boundaries.clone()));
    let columns = global.map(|g| g.columns.clone()).unwrap_or_default();

    let default_zone = args.default_zone.or(global.and_then(|g| g.default_zone));
    let date_filter = match args.since {
        Some(since) => Some(DateFilter::new(since)),
        None => global.and_then(|g| g.date_filter.clone()),
    };
    let options = SplitOptions {
        default_zone,
        date_filter,
    };

    let mut datasets: Vec<Dataset> = config
        .iter()
        .flat_map(|c| c.datasets.iter())
        .map(|d| Dataset {
            name: d.name(),
            input: d.input.clone(),
            options: SplitOptions {
                default_zone: d.default_zone.or(options.default_zone),
                ..options.clone()
            },
        })
        .collect();
    datasets.extend(args.input.iter().map(|input| Dataset {
        name: dataset_name(input),
        input: input.clone(),
        options: options.clone(),
    }));

    if datasets.is_empty() {
        anyhow::bail!("No input given; pass --input or a --config with [[datasets]]");
    }
    check_dataset_names(&datasets)?;

    Ok(Plan {
        output_dir,
        boundaries,
        columns,
        datasets,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Zone/jurisdiction splitter");

    let plan = build_plan(&args)?;

    let definitions = match &plan.boundaries {
        Some(path) => load_boundaries(path)?,
        None => {
            info!("Using built-in Canadian boundary table");
            canadian_boundaries()
        }
    };
    let registry =
        BoundaryRegistry::from_definitions(definitions).context("Invalid boundary configuration")?;

    let report = run_batch(
        &plan.datasets,
        &registry,
        &plan.columns,
        &plan.output_dir,
        !args.no_progress,
    )?;

    if plan.datasets.len() > 1 {
        info!("Batch totals:");
        report.log_summary();
    }

    if let Some(path) = &args.report {
        let file = File::create(path).context("Failed to create report file")?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .context("Failed to write report")?;
        info!("Report written to {}", path.display());
    }

    info!("Output written to {}", plan.output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_flags() {
        let args = Args::parse_from([
            "zonesplit",
            "--input",
            "data/gp/sites.csv",
            "--default-zone",
            "11",
            "--since",
            "2016-01-01",
        ]);
        let plan = build_plan(&args).unwrap();
        assert_eq!(plan.output_dir, PathBuf::from("output"));
        assert_eq!(plan.datasets.len(), 1);
        assert_eq!(plan.datasets[0].name, "gp/sites");
        assert_eq!(plan.datasets[0].options.default_zone, Some(11));
        assert!(plan.datasets[0].options.date_filter.is_some());
        assert_eq!(plan.columns, ColumnMapping::default());
    }

    #[test]
    fn test_plan_requires_input() {
        let args = Args::parse_from(["zonesplit"]);
        assert!(build_plan(&args).is_err());
    }

    #[test]
    fn test_plan_rejects_shared_output_directory() {
        let args = Args::parse_from([
            "zonesplit",
            "--input",
            "gp/sites.csv",
            "--input",
            "other/gp/sites.csv.gz",
        ]);
        let err = build_plan(&args).err().unwrap();
        assert!(err.to_string().contains("gp/sites"));
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "[global]\noutput_dir = \"cfg_out\"\ndefault_zone = 12\n\n\
             [[datasets]]\ninput = \"a/one.csv\"\n\n\
             [[datasets]]\ninput = \"b/two.csv\"\ndefault_zone = 13\n",
        )
        .unwrap();
        let config_arg = path.to_str().unwrap();
        let args = Args::parse_from(["zonesplit", "--config", config_arg, "--output-dir", "elsewhere"]);
        let plan = build_plan(&args).unwrap();
        assert_eq!(plan.output_dir, PathBuf::from("elsewhere"));
        assert_eq!(plan.datasets.len(), 2);
        assert_eq!(plan.datasets[0].options.default_zone, Some(12));
        assert_eq!(plan.datasets[1].options.default_zone, Some(13));
        assert_eq!(plan.datasets[1].name, "b/two");
    }
}
