//! Per-zone spatial index for jurisdiction lookups.

use std::collections::{BTreeMap, BTreeSet};

use geo::{coord, Intersects, Rect};
use hashbrown::HashMap;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{debug, info};

use super::{BoundaryDefinition, ZoneBounds};
use crate::error::ConfigError;

/// Wrapper for R-tree indexing of one jurisdiction's extent in one zone
#[derive(Debug, Clone)]
struct IndexedBounds {
    code: String,
    rect: Rect<f64>,
}

impl RTreeObject for IndexedBounds {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.rect.min().x, self.rect.min().y],
            [self.rect.max().x, self.rect.max().y],
        )
    }
}

impl IndexedBounds {
    fn new(code: &str, bounds: &ZoneBounds) -> Self {
        Self {
            code: code.to_string(),
            rect: bounds.rect(),
        }
    }
}

/// Read-only lookup from (zone, easting, northing) to jurisdiction codes.
///
/// Extents are axis-aligned rectangles. Callers should rely only on the
/// [`resolve`](Self::resolve) contract, not on the rectangle approximation.
#[derive(Default)]
pub struct BoundaryRegistry {
    definitions: BTreeMap<String, BoundaryDefinition>,
    zones: HashMap<u32, RTree<IndexedBounds>>,
}

impl BoundaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a full boundary table
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = BoundaryDefinition>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }

        info!(
            "Boundary registry built with {} jurisdictions across {} zones",
            registry.len(),
            registry.zones.len()
        );
        for zone in registry.known_zones() {
            let codes: Vec<&str> = registry
                .zones
                .get(&zone)
                .map(|tree| tree.iter().map(|ib| ib.code.as_str()).collect())
                .unwrap_or_default();
            info!("  zone {}: {}", zone, codes.join(", "));
        }

        Ok(registry)
    }

    /// Add one jurisdiction. Rejects invalid codes and bounds, and codes
    /// already registered in any letter case.
    pub fn register(&mut self, boundary: BoundaryDefinition) -> Result<(), ConfigError> {
        boundary.validate()?;
        if self
            .definitions
            .keys()
            .any(|code| code.eq_ignore_ascii_case(&boundary.code))
        {
            return Err(ConfigError::DuplicateCode(boundary.code));
        }

        for (zone, bounds) in &boundary.zones {
            self.zones
                .entry(*zone)
                .or_insert_with(RTree::new)
                .insert(IndexedBounds::new(&boundary.code, bounds));
        }

        debug!(
            "Registered {} ({}) in zones {:?}",
            boundary.code,
            boundary.display_name(),
            boundary.zones.keys().collect::<Vec<_>>()
        );
        self.definitions.insert(boundary.code.clone(), boundary);
        Ok(())
    }

    /// Every jurisdiction whose extent in `zone` contains the point,
    /// inclusive on both axes. Empty when nothing matches.
    pub fn resolve(&self, zone: u32, easting: f64, northing: f64) -> BTreeSet<&str> {
        let Some(tree) = self.zones.get(&zone) else {
            return BTreeSet::new();
        };
        let point = coord! { x: easting, y: northing };
        let query_envelope = AABB::from_point([easting, northing]);

        // R-tree narrows by envelope, then the exact inclusive test
        tree.locate_in_envelope_intersecting(&query_envelope)
            .filter(|ib| ib.rect.intersects(&point))
            .map(|ib| ib.code.as_str())
            .collect()
    }

    /// All zones with at least one registered boundary
    pub fn known_zones(&self) -> BTreeSet<u32> {
        self.zones.keys().copied().collect()
    }

    pub fn is_known_zone(&self, zone: u32) -> bool {
        self.zones.contains_key(&zone)
    }

    pub fn get(&self, code: &str) -> Option<&BoundaryDefinition> {
        self.definitions.get(code)
    }

    /// Registered definitions in code order
    pub fn definitions(&self) -> impl Iterator<Item = &BoundaryDefinition> {
        self.definitions.values()
    }

    /// Number of registered jurisdictions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ab_sk_registry() -> BoundaryRegistry {
        BoundaryRegistry::from_definitions(vec![
            BoundaryDefinition::new("AB")
                .with_zone(11, ZoneBounds::new(400000.0, 700000.0, 5700000.0, 6100000.0))
                .with_zone(12, ZoneBounds::new(250000.0, 650000.0, 5400000.0, 6300000.0)),
            BoundaryDefinition::new("SK")
                .with_zone(12, ZoneBounds::new(600000.0, 750000.0, 5400000.0, 6300000.0))
                .with_zone(13, ZoneBounds::new(250000.0, 750000.0, 5400000.0, 6300000.0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_single() {
        let registry = ab_sk_registry();
        let codes = registry.resolve(11, 550000.0, 5900000.0);
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["AB"]);
    }

    #[test]
    fn test_resolve_overlap() {
        let registry = ab_sk_registry();
        let codes = registry.resolve(12, 625000.0, 5900000.0);
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["AB", "SK"]);
    }

    #[test]
    fn test_resolve_outside() {
        let registry = ab_sk_registry();
        assert!(registry.resolve(11, 100000.0, 5900000.0).is_empty());
        assert!(registry.resolve(99, 550000.0, 5900000.0).is_empty());
    }

    #[test]
    fn test_resolve_on_edge() {
        let registry = ab_sk_registry();
        assert!(registry.resolve(11, 700000.0, 6100000.0).contains("AB"));
        assert!(registry.resolve(11, 400000.0, 5700000.0).contains("AB"));
    }

    #[test]
    fn test_center_always_resolves() {
        let registry = ab_sk_registry();
        for def in registry.definitions() {
            for (zone, bounds) in &def.zones {
                let (e, n) = bounds.center();
                assert!(
                    registry.resolve(*zone, e, n).contains(def.code.as_str()),
                    "{} zone {} centre not resolved",
                    def.code,
                    zone
                );
            }
        }
    }

    #[test]
    fn test_known_zones() {
        let registry = ab_sk_registry();
        assert_eq!(
            registry.known_zones().into_iter().collect::<Vec<_>>(),
            vec![11, 12, 13]
        );
        assert!(registry.is_known_zone(13));
        assert!(!registry.is_known_zone(14));
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let mut registry = ab_sk_registry();
        let err = registry
            .register(
                BoundaryDefinition::new("AB").with_zone(10, ZoneBounds::new(0.0, 1.0, 0.0, 1.0)),
            )
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateCode("AB".into()));
        // Rejected definition leaves no trace
        assert!(!registry.is_known_zone(10));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_code_differing_in_case_rejected() {
        let mut registry = ab_sk_registry();
        let err = registry
            .register(
                BoundaryDefinition::new("ab").with_zone(10, ZoneBounds::new(0.0, 1.0, 0.0, 1.0)),
            )
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateCode("ab".into()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_path_like_code_not_registered() {
        let mut registry = BoundaryRegistry::new();
        let err = registry
            .register(
                BoundaryDefinition::new("../../escaped")
                    .with_zone(11, ZoneBounds::new(0.0, 10.0, 0.0, 10.0)),
            )
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidCode("../../escaped".into()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_inverted_bounds_not_indexed() {
        let mut registry = BoundaryRegistry::new();
        let err = registry
            .register(
                BoundaryDefinition::new("MB")
                    .with_zone(14, ZoneBounds::new(400000.0, 750000.0, 5400000.0, 6300000.0))
                    .with_zone(15, ZoneBounds::new(500000.0, 250000.0, 5400000.0, 6300000.0)),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvertedBounds { zone: 15, .. }));
        assert!(registry.is_empty());
        assert!(registry.known_zones().is_empty());
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BoundaryRegistry>();
    }

    #[test]
    fn test_empty_registry() {
        let registry = BoundaryRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve(11, 0.0, 0.0).is_empty());
    }
}
