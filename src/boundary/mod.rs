//! Jurisdiction boundary registry.
//!
//! Holds each jurisdiction's rectangular extent per zone and answers
//! "which jurisdictions contain this coordinate in this zone?" using one
//! R-tree per zone.

mod definition;
mod registry;
mod table;

pub use definition::{BoundaryDefinition, ZoneBounds};
pub use registry::BoundaryRegistry;
pub use table::{canadian_boundaries, load_boundaries, parse_csv, parse_toml};
