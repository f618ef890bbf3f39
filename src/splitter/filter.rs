//! Observation-date cutoff.

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use super::source::column_index;
use crate::error::PreconditionError;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y-%b-%d", "%Y/%m/%d"];

fn default_columns() -> Vec<String> {
    vec!["sample_date".to_string(), "meas_date".to_string()]
}

/// Keep only records observed on or after `since`.
///
/// Every non-empty date column must parse and fall on or after the cutoff;
/// a record with no date at all is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateFilter {
    pub since: NaiveDate,
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
}

impl DateFilter {
    pub fn new(since: NaiveDate) -> Self {
        Self {
            since,
            columns: default_columns(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Resolve column positions. At least one date column must exist.
    pub fn bind(&self, headers: &StringRecord) -> Result<BoundDateFilter, PreconditionError> {
        let indices: Vec<usize> = self
            .columns
            .iter()
            .filter_map(|c| column_index(headers, c))
            .collect();
        if indices.is_empty() {
            return Err(PreconditionError::NoDateColumns(self.columns.clone()));
        }
        Ok(BoundDateFilter {
            since: self.since,
            indices,
        })
    }
}

/// A [`DateFilter`] resolved against a header row
#[derive(Debug, Clone)]
pub struct BoundDateFilter {
    since: NaiveDate,
    indices: Vec<usize>,
}

impl BoundDateFilter {
    pub fn accepts(&self, fields: &StringRecord) -> bool {
        let mut seen = false;
        for value in self
            .indices
            .iter()
            .filter_map(|&i| fields.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            seen = true;
            match parse_date(value) {
                Some(date) if date >= self.since => {}
                _ => return false,
            }
        }
        seen
    }
}

/// Parse the date formats found in plot exports, e.g. `2005-11-10 0:00`
/// and `2004-SEP-11`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
        })
}
