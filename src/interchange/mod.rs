//! GeoJSON interchange normalisation.
//!
//! Land-cover layers mix `Polygon` and `MultiPolygon` features; consumers of
//! the interchange file expect a single geometry type, so polygons are
//! promoted to one-member multipolygons. [`biomass`] joins the same layers
//! with per-polygon biomass summaries.

pub mod biomass;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{coord, BoundingRect, Rect};
use geojson::{FeatureCollection, GeoJson, Geometry, Value};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info};

/// Summary of one conversion
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvertReport {
    pub features: u64,
    pub promoted: u64,
    pub without_geometry: u64,
    /// `[min_x, min_y, max_x, max_y]` over every geometry
    pub bounds: Option<[f64; 4]>,
}

/// Promote a `Polygon` to a single-member `MultiPolygon`. Returns whether the
/// geometry changed.
pub fn promote_polygon(geometry: &mut Geometry) -> bool {
    if let Value::Polygon(rings) = &mut geometry.value {
        let rings = std::mem::take(rings);
        geometry.value = Value::MultiPolygon(vec![rings]);
        return true;
    }
    false
}

pub(crate) fn geometry_bounds(geometry: &Geometry) -> Option<Rect<f64>> {
    match geo_types::Geometry::<f64>::try_from(&geometry.value) {
        Ok(g) => g.bounding_rect(),
        Err(e) => {
            debug!("Skipping bounds for unconvertible geometry: {}", e);
            None
        }
    }
}

pub(crate) fn union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

/// Normalise every feature in place
pub fn normalize_collection(
    collection: &mut FeatureCollection,
    progress: Option<&ProgressBar>,
) -> ConvertReport {
    let mut report = ConvertReport::default();
    let mut bounds: Option<Rect<f64>> = None;

    for feature in &mut collection.features {
        report.features += 1;
        if let Some(pb) = progress {
            pb.inc(1);
        }

        let Some(geometry) = feature.geometry.as_mut() else {
            report.without_geometry += 1;
            continue;
        };

        if promote_polygon(geometry) {
            report.promoted += 1;
        }

        if let Some(rect) = geometry_bounds(geometry) {
            bounds = Some(match bounds {
                Some(acc) => union(acc, rect),
                None => rect,
            });
        }
    }

    report.bounds = bounds.map(|r| [r.min().x, r.min().y, r.max().x, r.max().y]);
    report
}

/// Read a GeoJSON file that must hold a FeatureCollection
pub fn read_collection(input: &Path) -> Result<FeatureCollection> {
    info!("Reading {}", input.display());
    let content = fs::read_to_string(input).context("Failed to read GeoJSON input")?;
    let geojson: GeoJson = content.parse().context("Failed to parse GeoJSON input")?;

    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(_) => bail!("Expected a FeatureCollection, found a single Feature"),
        GeoJson::Geometry(_) => bail!("Expected a FeatureCollection, found a bare Geometry"),
    }
}

/// Write a FeatureCollection as compact JSON
pub fn write_collection(collection: &FeatureCollection, output: &Path) -> Result<()> {
    let file = fs::File::create(output).context("Failed to create GeoJSON output")?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, collection).context("Failed to write GeoJSON output")?;
    writer.flush()?;
    Ok(())
}

/// Read a FeatureCollection, normalise it and write it to `output`
pub fn convert_file(
    input: &Path,
    output: &Path,
    progress: Option<&ProgressBar>,
) -> Result<ConvertReport> {
    let mut collection = read_collection(input)?;
    info!("Total features to convert: {}", collection.features.len());
    if let Some(pb) = progress {
        pb.set_length(collection.features.len() as u64);
    }

    let report = normalize_collection(&mut collection, progress);

    write_collection(&collection, output)?;

    info!(
        "Converted {} features ({} promoted to MultiPolygon) into {}",
        report.features,
        report.promoted,
        output.display()
    );
    Ok(report)
}
