//! Input record read from a plot table.

use csv::StringRecord;

/// One input row with its typed routing fields extracted.
///
/// `fields` keeps the complete input row so output groups can reproduce
/// it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 1-based line in the source (header is line 1)
    pub line: u64,
    pub easting: f64,
    pub northing: f64,
    /// Declared zone, `None` when the cell is empty or the column is absent
    pub zone: Option<u32>,
    /// Carried through for reporting only, never used for routing
    pub jurisdiction_hint: Option<String>,
    pub fields: StringRecord,
}

impl Record {
    pub fn new(line: u64, easting: f64, northing: f64, zone: Option<u32>) -> Self {
        Self {
            line,
            easting,
            northing,
            zone,
            jurisdiction_hint: None,
            fields: StringRecord::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.jurisdiction_hint = Some(hint.into());
        self
    }

    pub fn with_fields(mut self, fields: StringRecord) -> Self {
        self.fields = fields;
        self
    }
}
