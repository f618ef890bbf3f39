//! zonesplit - splits plot tables by coordinate zone and jurisdiction
//!
//! This library provides the boundary registry, the record splitter and the
//! GeoJSON normalisation used by the `zonesplit` and `convert` binaries.

pub mod boundary;
pub mod error;
pub mod interchange;
pub mod models;
pub mod splitter;

pub use boundary::{BoundaryDefinition, BoundaryRegistry, ZoneBounds};
pub use error::{Error, Result};
pub use models::{Province, Record};
pub use splitter::{GroupKey, SplitOptions, SplitReport, Splitter};
