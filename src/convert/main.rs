//! Land-cover GeoJSON tools.
//!
//! `normalize` rewrites a FeatureCollection so every polygonal feature is a
//! `MultiPolygon`; `plot` joins one photo plot's polygons with their biomass
//! summary.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use zonesplit::interchange::biomass::{parse_plot_id, write_plot, BiomassIndex};
use zonesplit::interchange::convert_file;

#[derive(Parser, Debug)]
#[command(name = "convert")]
#[command(about = "Land-cover GeoJSON normalisation and plot extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Disable progress output
    #[arg(long, global = true)]
    no_progress: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Promote Polygon features to MultiPolygon
    Normalize {
        /// Input GeoJSON FeatureCollection
        #[arg(short, long)]
        input: PathBuf,

        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract one plot's polygons with their biomass
    Plot {
        /// Land-cover GeoJSON with NFI_PLOT and POLY_ID properties
        #[arg(long)]
        geojson: PathBuf,

        /// Polygon summary CSV with poly_id and biomass_total_dead
        #[arg(long)]
        summary: PathBuf,

        /// Plot number (e.g. 1176871 or 1176871.0)
        #[arg(long, value_parser = plot_arg)]
        plot: u64,

        /// Output GeoJSON (default: biomass_data_NFI_<plot>.geojson)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Index file, reused when it exists
        #[arg(long, default_value = "indexes/biomass_index.json")]
        index: PathBuf,

        /// Grid cell size in metres
        #[arg(long, default_value = "10")]
        resolution: f64,

        /// Write the plot report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn plot_arg(raw: &str) -> std::result::Result<u64, String> {
    parse_plot_id(raw).ok_or_else(|| format!("'{}' is not a plot number", raw))
}

fn progress_bar(enabled: bool) -> Result<Option<ProgressBar>> {
    if !enabled {
        return Ok(None);
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
            )?
            .progress_chars("#>-"),
    );
    Ok(Some(pb))
}

fn normalize_command(input: &Path, output: &Path, pb: Option<&ProgressBar>) -> Result<()> {
    let result = convert_file(input, output, pb);
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let report = result?;

    if report.without_geometry > 0 {
        warn!("{} features carried no geometry", report.without_geometry);
    }
    match report.bounds {
        Some([min_x, min_y, max_x, max_y]) => {
            info!("Bounds: [{}, {}] - [{}, {}]", min_x, min_y, max_x, max_y)
        }
        None => info!("No geometry bounds (empty collection)"),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn plot_command(
    geojson: &Path,
    summary: &Path,
    plot: u64,
    output: Option<PathBuf>,
    index_path: &Path,
    resolution: f64,
    report_path: Option<&Path>,
    pb: Option<&ProgressBar>,
) -> Result<()> {
    if !(resolution.is_finite() && resolution > 0.0) {
        bail!("Resolution must be a positive number of metres");
    }

    let index = BiomassIndex::load_or_build(index_path, geojson, summary, pb);
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let index = index?;

    let output =
        output.unwrap_or_else(|| PathBuf::from(format!("biomass_data_NFI_{}.geojson", plot)));
    let report = write_plot(geojson, &index, plot, &output, resolution)?;

    if let Some(grid) = &report.grid {
        info!(
            "Grid {:.1}km x {:.1}km, {} x {} cells at {}m",
            grid.size / 1000.0,
            grid.size / 1000.0,
            grid.cells,
            grid.cells,
            resolution
        );
    }

    if let Some(path) = report_path {
        let file = File::create(path).context("Failed to create report file")?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .context("Failed to write report")?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let pb = progress_bar(!cli.no_progress)?;

    match cli.command {
        Commands::Normalize { input, output } => normalize_command(&input, &output, pb.as_ref()),
        Commands::Plot {
            geojson,
            summary,
            plot,
            output,
            index,
            resolution,
            report,
        } => plot_command(
            &geojson,
            &summary,
            plot,
            output,
            &index,
            resolution,
            report.as_deref(),
            pb.as_ref(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plot_subcommand() {
        let cli = Cli::parse_from([
            "convert",
            "plot",
            "--geojson",
            "all_pp_lc.geojson",
            "--summary",
            "all_pp_poly_summ.csv",
            "--plot",
            "1176871.0",
        ]);
        match cli.command {
            Commands::Plot {
                plot,
                resolution,
                index,
                ..
            } => {
                assert_eq!(plot, 1176871);
                assert_eq!(resolution, 10.0);
                assert_eq!(index, PathBuf::from("indexes/biomass_index.json"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_fractional_plot() {
        let parsed = Cli::try_parse_from([
            "convert",
            "plot",
            "--geojson",
            "a.geojson",
            "--summary",
            "b.csv",
            "--plot",
            "12.5",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_normalize_subcommand_with_global_flags() {
        let cli = Cli::parse_from(["convert", "normalize", "-i", "in.geojson", "-o", "out.geojson", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Normalize { .. }));
    }
}
