//! Jurisdiction extents, one rectangle per zone.

use std::collections::BTreeMap;

use geo::{coord, Intersects, Rect};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Easting/northing ranges approximating a jurisdiction inside one zone.
/// Both ranges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    /// `[min, max]`
    pub easting: [f64; 2],
    /// `[min, max]`
    pub northing: [f64; 2],
}

impl ZoneBounds {
    pub fn new(min_easting: f64, max_easting: f64, min_northing: f64, max_northing: f64) -> Self {
        Self {
            easting: [min_easting, max_easting],
            northing: [min_northing, max_northing],
        }
    }

    /// Check min <= max and finiteness on both axes
    pub fn validate(&self, code: &str, zone: u32) -> Result<(), ConfigError> {
        for (axis, [min, max]) in [("easting", self.easting), ("northing", self.northing)] {
            if !min.is_finite() || !max.is_finite() {
                return Err(ConfigError::NonFiniteBounds {
                    code: code.to_string(),
                    zone,
                    axis,
                });
            }
            if min > max {
                return Err(ConfigError::InvertedBounds {
                    code: code.to_string(),
                    zone,
                    axis,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Rectangle in (easting, northing) space. Only meaningful once validated.
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.easting[0], y: self.northing[0] },
            coord! { x: self.easting[1], y: self.northing[1] },
        )
    }

    /// Inclusive containment test on both axes
    pub fn contains(&self, easting: f64, northing: f64) -> bool {
        self.rect().intersects(&coord! { x: easting, y: northing })
    }

    pub fn center(&self) -> (f64, f64) {
        let c = self.rect().center();
        (c.x, c.y)
    }
}

/// One jurisdiction and its extent in every zone it intersects.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryDefinition {
    pub code: String,
    pub name: Option<String>,
    pub zones: BTreeMap<u32, ZoneBounds>,
}

impl BoundaryDefinition {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            zones: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder form of [`add_zone`](Self::add_zone) for static tables.
    /// A repeated zone replaces the earlier bounds.
    pub fn with_zone(mut self, zone: u32, bounds: ZoneBounds) -> Self {
        self.zones.insert(zone, bounds);
        self
    }

    /// Add bounds for a zone, rejecting a zone listed twice
    pub fn add_zone(&mut self, zone: u32, bounds: ZoneBounds) -> Result<(), ConfigError> {
        if self.zones.contains_key(&zone) {
            return Err(ConfigError::DuplicateZone {
                code: self.code.clone(),
                zone,
            });
        }
        self.zones.insert(zone, bounds);
        Ok(())
    }

    pub fn bounds(&self, zone: u32) -> Option<&ZoneBounds> {
        self.zones.get(&zone)
    }

    /// Display name, falling back to the code
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or_else(|| crate::models::display_name(&self.code))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code.is_empty() {
            return Err(ConfigError::EmptyCode);
        }
        // Codes become output file names
        if !self
            .code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidCode(self.code.clone()));
        }
        if self.zones.is_empty() {
            return Err(ConfigError::NoZones(self.code.clone()));
        }
        for (zone, bounds) in &self.zones {
            bounds.validate(&self.code, *zone)?;
        }
        Ok(())
    }
}
