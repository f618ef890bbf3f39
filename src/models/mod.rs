//! Core data models for the splitter.

pub mod jurisdiction;
pub mod record;

pub use jurisdiction::{display_name, Province};
pub use record::Record;
