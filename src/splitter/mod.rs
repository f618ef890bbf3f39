//! Zone/jurisdiction splitter.
//!
//! Streams records from a [`RecordSource`], resolves each one against a
//! [`BoundaryRegistry`](crate::boundary::BoundaryRegistry) and appends it to
//! lazily created output groups (`{zone}/{code}.csv`,
//! `unclassified/{zone}.csv`).

mod engine;
mod filter;
mod group;
mod report;
mod source;

pub use engine::{SplitOptions, Splitter};
pub use filter::{parse_date, BoundDateFilter, DateFilter};
pub use group::{DirectoryOutput, GroupKey, MemoryOutput, MemoryWriter, OutputFactory};
pub use report::SplitReport;
pub use source::{ColumnMapping, CsvRecordSource, RecordSource};
