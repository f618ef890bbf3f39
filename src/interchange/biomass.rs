//! Photo-plot biomass join.
//!
//! Land-cover polygons carry `NFI_PLOT` and `POLY_ID` properties; the
//! polygon summary table carries `poly_id` and `biomass_total_dead`. The
//! [`BiomassIndex`] links the two so a single plot's polygons can be pulled
//! out with their biomass, a normalised value and the 2 km aligned grid
//! that covers them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::Rect;
use geojson::{Feature, FeatureCollection};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::{geometry_bounds, read_collection, union, write_collection};

pub const PLOT_PROPERTY: &str = "NFI_PLOT";
pub const POLY_ID_PROPERTY: &str = "POLY_ID";

/// Upper end of the normalised biomass scale
pub const NORMALIZED_MAX: f64 = 60000.0;

/// Grid sides are whole multiples of this many metres
pub const GRID_STEP: f64 = 2000.0;

/// Polygon ids are matched trimmed and lower-case
pub fn normalize_poly_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Parse a plot number written either as an integer or an integral float
/// (`1176871` or `1176871.0`).
pub fn parse_plot_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(integral))
}

fn integral(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64)
        .then(|| value as u64)
}

fn plot_number(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral)),
        JsonValue::String(s) => parse_plot_id(s),
        _ => None,
    }
}

fn poly_id(value: &JsonValue) -> Option<String> {
    let id = match value {
        JsonValue::String(s) => normalize_poly_id(s),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn feature_poly_id(feature: &Feature) -> Option<String> {
    feature.property(POLY_ID_PROPERTY).and_then(poly_id)
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    poly_id: String,
    biomass_total_dead: Option<f64>,
}

/// Plot and biomass lookups, persisted as JSON between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiomassIndex {
    /// Plot number to its polygon ids, in file order
    pub plots: BTreeMap<u64, Vec<String>>,
    /// Polygon id to `biomass_total_dead`
    pub biomass: BTreeMap<String, f64>,
}

impl BiomassIndex {
    /// Index every feature carrying both a plot number and a polygon id.
    /// Returns the number of features indexed.
    pub fn index_features(
        &mut self,
        collection: &FeatureCollection,
        progress: Option<&ProgressBar>,
    ) -> u64 {
        let mut indexed = 0;
        for feature in &collection.features {
            if let Some(pb) = progress {
                pb.inc(1);
            }
            let plot = feature.property(PLOT_PROPERTY).and_then(plot_number);
            match (plot, feature_poly_id(feature)) {
                (Some(plot), Some(id)) => {
                    self.plots.entry(plot).or_default().push(id);
                    indexed += 1;
                }
                _ => debug!("Feature without {} or {} skipped", PLOT_PROPERTY, POLY_ID_PROPERTY),
            }
        }
        indexed
    }

    /// Read `poly_id,biomass_total_dead` from a polygon summary table.
    /// Rows with an empty biomass value are left out. Returns the number
    /// of rows indexed.
    pub fn index_biomass<R: Read>(&mut self, reader: R) -> Result<u64> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut indexed = 0;
        for (i, result) in csv_reader.deserialize::<SummaryRow>().enumerate() {
            let row = result.with_context(|| format!("Invalid biomass row {}", i + 2))?;
            let Some(value) = row.biomass_total_dead else {
                debug!("No biomass for polygon {}", row.poly_id);
                continue;
            };
            self.biomass.insert(normalize_poly_id(&row.poly_id), value);
            indexed += 1;
        }
        Ok(indexed)
    }

    /// Build both lookups from the land-cover GeoJSON and the summary CSV
    pub fn build(
        geojson: &Path,
        summary_csv: &Path,
        progress: Option<&ProgressBar>,
    ) -> Result<Self> {
        let collection = read_collection(geojson)?;
        if let Some(pb) = progress {
            pb.set_length(collection.features.len() as u64);
        }

        let mut index = Self::default();
        let features = index.index_features(&collection, progress);
        info!(
            "Indexed {} features across {} plots",
            features,
            index.plots.len()
        );

        let file = fs::File::open(summary_csv).context("Failed to open biomass summary")?;
        let rows = index.index_biomass(BufReader::new(file))?;
        info!("Indexed {} biomass records", rows);

        Ok(index)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).context("Failed to open biomass index")?;
        serde_json::from_reader(BufReader::new(file)).context("Failed to parse biomass index")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path).context("Failed to create biomass index")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).context("Failed to write biomass index")?;
        writer.flush()?;
        Ok(())
    }

    /// Reuse the index at `path` when present, otherwise build and save it
    pub fn load_or_build(
        path: &Path,
        geojson: &Path,
        summary_csv: &Path,
        progress: Option<&ProgressBar>,
    ) -> Result<Self> {
        if path.exists() {
            info!("Using existing index {}", path.display());
            return Self::load(path);
        }
        info!("Creating index {}", path.display());
        let index = Self::build(geojson, summary_csv, progress)?;
        index.save(path)?;
        Ok(index)
    }

    pub fn poly_ids(&self, plot: u64) -> Option<&[String]> {
        self.plots.get(&plot).map(Vec::as_slice)
    }
}

/// Square extent, a whole number of [`GRID_STEP`]s on a side (at least one),
/// centred on the plot's polygons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotGrid {
    pub size: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
    /// Cells per side at the requested resolution
    pub cells: u64,
}

impl PlotGrid {
    pub fn around(bounds: Rect<f64>, resolution: f64) -> Self {
        let width = bounds.width();
        let height = bounds.height();
        let steps = |extent: f64| (extent / GRID_STEP).ceil() * GRID_STEP;
        let size = steps(width).max(steps(height)).max(GRID_STEP);

        let dx = (size - width) / 2.0;
        let dy = (size - height) / 2.0;
        Self {
            size,
            left: bounds.min().x - dx,
            bottom: bounds.min().y - dy,
            right: bounds.max().x + dx,
            top: bounds.max().y + dy,
            cells: (size / resolution) as u64,
        }
    }
}

/// Summary of one plot extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotReport {
    pub plot: u64,
    pub features: u64,
    pub min_biomass: f64,
    pub max_biomass: f64,
    /// `[min_x, min_y, max_x, max_y]` over the plot's polygons
    pub bounds: Option<[f64; 4]>,
    pub grid: Option<PlotGrid>,
}

/// Linear map of `value` from `[min, max]` onto `0..=NORMALIZED_MAX`,
/// truncated. A flat range maps everything to 0.
pub fn normalize_biomass(value: f64, min: f64, max: f64) -> u16 {
    if max <= min {
        return 0;
    }
    ((value - min) / (max - min) * NORMALIZED_MAX) as u16
}

/// Features of `plot`, in file order
pub fn extract_plot(
    collection: &FeatureCollection,
    index: &BiomassIndex,
    plot: u64,
) -> Result<Vec<Feature>> {
    let Some(ids) = index.poly_ids(plot) else {
        bail!("Plot {} not found in the index", plot);
    };
    let targets: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    debug!("Looking for {} polygons of plot {}", targets.len(), plot);

    let features: Vec<Feature> = collection
        .features
        .iter()
        .filter(|f| feature_poly_id(f).is_some_and(|id| targets.contains(id.as_str())))
        .cloned()
        .collect();

    if features.is_empty() {
        bail!("No features found for plot {}", plot);
    }
    if features.len() < targets.len() {
        warn!(
            "Plot {}: found {} of {} indexed polygons",
            plot,
            features.len(),
            targets.len()
        );
    }
    Ok(features)
}

/// Attach `biomass` and `biomass_norm` to each feature, keeping only
/// `POLY_ID` from the input properties. Every polygon must have a biomass
/// value.
pub fn attach_biomass(
    plot: u64,
    features: &[Feature],
    index: &BiomassIndex,
    resolution: f64,
) -> Result<(FeatureCollection, PlotReport)> {
    let mut values = Vec::with_capacity(features.len());
    let mut missing = Vec::new();
    for feature in features {
        let id = feature_poly_id(feature).unwrap_or_default();
        match index.biomass.get(&id) {
            Some(value) => values.push(*value),
            None => missing.push(id),
        }
    }
    if !missing.is_empty() {
        bail!("Missing biomass data for POLY_IDs: {}", missing.join(", "));
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    info!("Plot {} biomass range {} to {}", plot, min, max);

    let mut bounds: Option<Rect<f64>> = None;
    let mut out = Vec::with_capacity(features.len());
    for (feature, value) in features.iter().zip(&values) {
        if let Some(rect) = feature.geometry.as_ref().and_then(geometry_bounds) {
            bounds = Some(match bounds {
                Some(acc) => union(acc, rect),
                None => rect,
            });
        }

        let mut joined = Feature {
            geometry: feature.geometry.clone(),
            ..Default::default()
        };
        if let Some(id) = feature.property(POLY_ID_PROPERTY) {
            joined.set_property(POLY_ID_PROPERTY, id.clone());
        }
        joined.set_property("biomass", *value);
        joined.set_property("biomass_norm", normalize_biomass(*value, min, max));
        out.push(joined);
    }

    let report = PlotReport {
        plot,
        features: out.len() as u64,
        min_biomass: min,
        max_biomass: max,
        bounds: bounds.map(|r| [r.min().x, r.min().y, r.max().x, r.max().y]),
        grid: bounds.map(|r| PlotGrid::around(r, resolution)),
    };
    let collection = FeatureCollection {
        bbox: None,
        features: out,
        foreign_members: None,
    };
    Ok((collection, report))
}

/// Extract one plot's polygons with their biomass and write them to
/// `output` as GeoJSON.
pub fn write_plot(
    geojson: &Path,
    index: &BiomassIndex,
    plot: u64,
    output: &Path,
    resolution: f64,
) -> Result<PlotReport> {
    let collection = read_collection(geojson)?;
    let features = extract_plot(&collection, index, plot)?;
    info!("Extracted {} features for plot {}", features.len(), plot);

    let (joined, report) = attach_biomass(plot, &features, index, resolution)?;
    write_collection(&joined, output)?;
    info!("Plot {} written to {}", plot, output.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{GeoJson, Geometry, Value};

    fn square(x: f64, y: f64, size: f64) -> Value {
        Value::Polygon(vec![vec![
            vec![x, y],
            vec![x + size, y],
            vec![x + size, y + size],
            vec![x, y + size],
            vec![x, y],
        ]])
    }

    fn polygon(plot: JsonValue, id: &str, geometry: Value) -> Feature {
        let mut f = Feature {
            geometry: Some(Geometry::new(geometry)),
            ..Default::default()
        };
        f.set_property(PLOT_PROPERTY, plot);
        f.set_property(POLY_ID_PROPERTY, id);
        f.set_property("LC_CLASS", "forest");
        f
    }

    fn land_cover() -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: vec![
                polygon(JsonValue::from(1176871.0_f64), "1176871_33", square(1000.0, 2000.0, 100.0)),
                polygon(JsonValue::from(1176871_u64), " 1176871_34 ", square(1100.0, 2000.0, 400.0)),
                polygon(JsonValue::from("2000001"), "2000001_1", square(0.0, 0.0, 10.0)),
                polygon(JsonValue::Null, "orphan", square(0.0, 0.0, 1.0)),
            ],
            foreign_members: None,
        }
    }

    const SUMMARY: &str = "\
poly_id,nfi_plot,biomass_total_dead
1176871_33,1176871,10.0
1176871_34 ,1176871,30.0
2000001_1,2000001,
";

    fn index() -> BiomassIndex {
        let mut index = BiomassIndex::default();
        assert_eq!(index.index_features(&land_cover(), None), 3);
        assert_eq!(index.index_biomass(SUMMARY.as_bytes()).unwrap(), 2);
        index
    }

    #[test]
    fn test_parse_plot_id() {
        assert_eq!(parse_plot_id("1176871"), Some(1176871));
        assert_eq!(parse_plot_id(" 1176871.0 "), Some(1176871));
        assert_eq!(parse_plot_id("1176871.5"), None);
        assert_eq!(parse_plot_id("-1"), None);
        assert_eq!(parse_plot_id("plot"), None);
    }

    #[test]
    fn test_index_maps_plots_and_biomass() {
        let index = index();
        assert_eq!(
            index.poly_ids(1176871),
            Some(&["1176871_33".to_string(), "1176871_34".to_string()][..])
        );
        assert_eq!(index.poly_ids(2000001).map(<[String]>::len), Some(1));
        assert_eq!(index.biomass.get("1176871_34"), Some(&30.0));
        // Empty biomass cells are not indexed
        assert!(!index.biomass.contains_key("2000001_1"));
    }

    #[test]
    fn test_normalize_biomass() {
        assert_eq!(normalize_biomass(10.0, 10.0, 30.0), 0);
        assert_eq!(normalize_biomass(20.0, 10.0, 30.0), 30000);
        assert_eq!(normalize_biomass(30.0, 10.0, 30.0), 60000);
        assert_eq!(normalize_biomass(5.0, 5.0, 5.0), 0);
    }

    #[test]
    fn test_grid_rounds_up_and_centres() {
        let bounds = Rect::new(
            geo::coord! { x: 1000.0, y: 2000.0 },
            geo::coord! { x: 3500.0, y: 2800.0 },
        );
        let grid = PlotGrid::around(bounds, 10.0);
        assert_eq!(grid.size, 4000.0);
        assert_eq!((grid.left, grid.right), (250.0, 4250.0));
        assert_eq!((grid.bottom, grid.top), (400.0, 4400.0));
        assert_eq!(grid.cells, 400);

        let small = Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 10.0, y: 10.0 });
        assert_eq!(PlotGrid::around(small, 10.0).size, 2000.0);
    }

    #[test]
    fn test_extract_and_attach() {
        let index = index();
        let features = extract_plot(&land_cover(), &index, 1176871).unwrap();
        assert_eq!(features.len(), 2);

        let (joined, report) = attach_biomass(1176871, &features, &index, 10.0).unwrap();
        assert_eq!(report.features, 2);
        assert_eq!((report.min_biomass, report.max_biomass), (10.0, 30.0));
        assert_eq!(report.bounds, Some([1000.0, 2000.0, 1500.0, 2400.0]));
        assert_eq!(report.grid.unwrap().size, 2000.0);

        let first = &joined.features[0];
        assert_eq!(
            first.property(POLY_ID_PROPERTY).and_then(JsonValue::as_str),
            Some("1176871_33")
        );
        assert_eq!(first.property("biomass_norm").and_then(JsonValue::as_u64), Some(0));
        assert!(first.property("LC_CLASS").is_none());
        assert_eq!(
            joined.features[1].property("biomass_norm").and_then(JsonValue::as_u64),
            Some(60000)
        );
    }

    #[test]
    fn test_unknown_plot() {
        let err = extract_plot(&land_cover(), &index(), 42).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_missing_biomass_is_an_error() {
        let index = index();
        let features = extract_plot(&land_cover(), &index, 2000001).unwrap();
        let err = attach_biomass(2000001, &features, &index, 10.0).unwrap_err();
        assert!(err.to_string().contains("2000001_1"));
    }

    #[test]
    fn test_index_reused_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let geojson = dir.path().join("lc.geojson");
        let summary = dir.path().join("summ.csv");
        let index_path = dir.path().join("indexes").join("biomass.json");
        fs::write(&geojson, serde_json::to_string(&land_cover()).unwrap()).unwrap();
        fs::write(&summary, SUMMARY).unwrap();

        let built = BiomassIndex::load_or_build(&index_path, &geojson, &summary, None).unwrap();
        assert!(index_path.exists());
        assert_eq!(built, index());

        // Inputs are no longer needed once the index exists
        fs::remove_file(&geojson).unwrap();
        let reused = BiomassIndex::load_or_build(&index_path, &geojson, &summary, None).unwrap();
        assert_eq!(reused, built);
    }

    #[test]
    fn test_write_plot() {
        let dir = tempfile::tempdir().unwrap();
        let geojson = dir.path().join("lc.geojson");
        let output = dir.path().join("plot.geojson");
        fs::write(&geojson, serde_json::to_string(&land_cover()).unwrap()).unwrap();

        let report = write_plot(&geojson, &index(), 1176871, &output, 10.0).unwrap();
        assert_eq!(report.plot, 1176871);

        let written: GeoJson = fs::read_to_string(&output).unwrap().parse().unwrap();
        let GeoJson::FeatureCollection(fc) = written else {
            panic!("expected a FeatureCollection");
        };
        assert_eq!(fc.features.len(), 2);
        assert_eq!(
            fc.features[1].property("biomass").and_then(JsonValue::as_f64),
            Some(30.0)
        );
    }
}
