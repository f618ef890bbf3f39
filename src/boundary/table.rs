//! Boundary tables: built-in, TOML and CSV.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::{BoundaryDefinition, ZoneBounds};
use crate::models::Province;

/// UTM extents of the western provinces, approximate at zone granularity.
pub fn canadian_boundaries() -> Vec<BoundaryDefinition> {
    let def = |p: Province| BoundaryDefinition::new(p.code()).with_name(p.name());

    vec![
        def(Province::AB)
            .with_zone(11, ZoneBounds::new(250000.0, 750000.0, 5400000.0, 6300000.0))
            .with_zone(12, ZoneBounds::new(250000.0, 750000.0, 5400000.0, 6300000.0)),
        def(Province::BC)
            .with_zone(8, ZoneBounds::new(350000.0, 750000.0, 5400000.0, 6600000.0))
            .with_zone(9, ZoneBounds::new(250000.0, 750000.0, 5400000.0, 6600000.0))
            .with_zone(10, ZoneBounds::new(250000.0, 750000.0, 5400000.0, 6600000.0))
            .with_zone(11, ZoneBounds::new(250000.0, 500000.0, 5400000.0, 6600000.0)),
        def(Province::SK)
            .with_zone(12, ZoneBounds::new(600000.0, 750000.0, 5400000.0, 6300000.0))
            .with_zone(13, ZoneBounds::new(250000.0, 750000.0, 5400000.0, 6300000.0)),
        def(Province::MB)
            .with_zone(14, ZoneBounds::new(400000.0, 750000.0, 5400000.0, 6300000.0))
            .with_zone(15, ZoneBounds::new(250000.0, 500000.0, 5400000.0, 6300000.0)),
    ]
}

#[derive(Debug, Deserialize)]
struct BoundaryFile {
    #[serde(default)]
    boundary: Vec<BoundaryEntry>,
}

#[derive(Debug, Deserialize)]
struct BoundaryEntry {
    code: String,
    name: Option<String>,
    #[serde(default)]
    zone: Vec<ZoneEntry>,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    zone: u32,
    easting: [f64; 2],
    northing: [f64; 2],
}

/// One row of a flat boundary table
#[derive(Debug, Deserialize)]
struct BoundaryRow {
    code: String,
    zone: u32,
    min_easting: f64,
    max_easting: f64,
    min_northing: f64,
    max_northing: f64,
    #[serde(default)]
    name: Option<String>,
}

/// Parse a TOML boundary document:
///
/// ```toml
/// [[boundary]]
/// code = "AB"
/// name = "Alberta"
///
/// [[boundary.zone]]
/// zone = 11
/// easting = [250000, 750000]
/// northing = [5400000, 6300000]
/// ```
pub fn parse_toml(content: &str) -> Result<Vec<BoundaryDefinition>> {
    let file: BoundaryFile = toml::from_str(content).context("Failed to parse boundary TOML")?;

    let mut definitions = Vec::with_capacity(file.boundary.len());
    for entry in file.boundary {
        let mut def = BoundaryDefinition::new(entry.code);
        def.name = entry.name;
        for z in entry.zone {
            let bounds = ZoneBounds {
                easting: z.easting,
                northing: z.northing,
            };
            def.add_zone(z.zone, bounds)?;
        }
        definitions.push(def);
    }
    Ok(definitions)
}

/// Parse a flat CSV table with columns
/// `code,zone,min_easting,max_easting,min_northing,max_northing[,name]`.
/// Rows sharing a code are merged into one definition, in first-seen order.
pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<BoundaryDefinition>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut order: Vec<String> = Vec::new();
    let mut by_code: BTreeMap<String, BoundaryDefinition> = BTreeMap::new();

    for (i, result) in csv_reader.deserialize::<BoundaryRow>().enumerate() {
        let row = result.with_context(|| format!("Invalid boundary row {}", i + 2))?;
        let def = by_code.entry(row.code.clone()).or_insert_with(|| {
            order.push(row.code.clone());
            BoundaryDefinition::new(row.code.clone())
        });
        if def.name.is_none() {
            def.name = row.name.filter(|n| !n.is_empty());
        }
        def.add_zone(
            row.zone,
            ZoneBounds::new(
                row.min_easting,
                row.max_easting,
                row.min_northing,
                row.max_northing,
            ),
        )?;
    }

    Ok(order
        .into_iter()
        .filter_map(|code| by_code.remove(&code))
        .collect())
}

/// Load a boundary table, choosing the format from the file extension
pub fn load_boundaries<P: AsRef<Path>>(path: P) -> Result<Vec<BoundaryDefinition>> {
    let path = path.as_ref();
    info!("Loading boundaries from {}", path.display());

    let is_csv = path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"));

    let definitions = if is_csv {
        let file = fs::File::open(path).context("Failed to open boundary file")?;
        parse_csv(file)?
    } else {
        let content = fs::read_to_string(path).context("Failed to read boundary file")?;
        parse_toml(&content)?
    };

    info!("Loaded {} boundary definitions", definitions.len());
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryRegistry;
    use crate::error::ConfigError;

    #[test]
    fn test_builtin_table_is_valid() {
        let registry = BoundaryRegistry::from_definitions(canadian_boundaries()).unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.known_zones().into_iter().collect::<Vec<_>>(),
            (8..=15).collect::<Vec<_>>()
        );
        assert_eq!(registry.get("BC").unwrap().display_name(), "British Columbia");
    }

    #[test]
    fn test_builtin_overlaps() {
        let registry = BoundaryRegistry::from_definitions(canadian_boundaries()).unwrap();
        // Zone 11 western strip is claimed by both AB and BC
        let codes = registry.resolve(11, 300000.0, 5500000.0);
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["AB", "BC"]);
        // North of AB's extent only BC remains
        let codes = registry.resolve(11, 300000.0, 6500000.0);
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["BC"]);
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
[[boundary]]
code = "AB"
name = "Alberta"

[[boundary.zone]]
zone = 11
easting = [400000, 700000]
northing = [5700000.0, 6100000.0]

[[boundary]]
code = "SK"

[[boundary.zone]]
zone = 12
easting = [600000, 750000]
northing = [5400000, 6300000]
"#;
        let defs = parse_toml(content).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].code, "AB");
        assert_eq!(defs[0].name.as_deref(), Some("Alberta"));
        assert_eq!(
            defs[0].bounds(11),
            Some(&ZoneBounds::new(400000.0, 700000.0, 5700000.0, 6100000.0))
        );
        assert_eq!(defs[1].name, None);
    }

    #[test]
    fn test_parse_toml_duplicate_zone() {
        let content = r#"
[[boundary]]
code = "AB"

[[boundary.zone]]
zone = 11
easting = [0, 1]
northing = [0, 1]

[[boundary.zone]]
zone = 11
easting = [2, 3]
northing = [2, 3]
"#;
        let err = parse_toml(content).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::DuplicateZone { zone: 11, .. })
        ));
    }

    #[test]
    fn test_parse_csv_merges_codes() {
        let data = "\
code,zone,min_easting,max_easting,min_northing,max_northing,name
SK,12,600000,750000,5400000,6300000,Saskatchewan
AB,11,400000,700000,5700000,6100000,
SK,13,250000,750000,5400000,6300000,
";
        let defs = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].code, "SK");
        assert_eq!(defs[0].zones.len(), 2);
        assert_eq!(defs[0].name.as_deref(), Some("Saskatchewan"));
        assert_eq!(defs[1].code, "AB");
        assert_eq!(defs[1].name, None);
    }

    #[test]
    fn test_parse_csv_bad_number() {
        let data = "\
code,zone,min_easting,max_easting,min_northing,max_northing
AB,11,abc,700000,5700000,6100000
";
        assert!(parse_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn test_inverted_csv_row_fails_registration() {
        let data = "\
code,zone,min_easting,max_easting,min_northing,max_northing
AB,11,700000,400000,5700000,6100000
";
        let defs = parse_csv(data.as_bytes()).unwrap();
        assert!(matches!(
            BoundaryRegistry::from_definitions(defs),
            Err(ConfigError::InvertedBounds { .. })
        ));
    }
}
