//! CSV record source with typed field extraction.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, PreconditionError, RecordError, Result};
use crate::models::Record;

/// A sequential stream of records, read once front to back.
///
/// Recoverable problems with a single row are yielded as
/// `Err(Error::Record(..))`; any other error ends the stream.
pub trait RecordSource: Iterator<Item = Result<Record>> {
    /// Header row reproduced at the top of every output group
    fn headers(&self) -> &StringRecord;
}

/// Input column names. Matching is case-insensitive and ignores
/// surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub easting: String,
    pub northing: String,
    pub zone: String,
    /// Candidate jurisdiction hint columns, first match wins
    pub hint: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            easting: "utm_e".to_string(),
            northing: "utm_n".to_string(),
            zone: "utm_zone".to_string(),
            hint: vec!["juris_id".to_string(), "province".to_string()],
        }
    }
}

/// Column positions resolved against a header row
#[derive(Debug, Clone, Copy)]
struct Layout {
    width: usize,
    easting: usize,
    northing: usize,
    zone: Option<usize>,
    hint: Option<usize>,
}

pub(crate) fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

impl Layout {
    fn resolve(headers: &StringRecord, mapping: &ColumnMapping) -> Result<Self> {
        let easting = column_index(headers, &mapping.easting);
        let northing = column_index(headers, &mapping.northing);

        let (easting, northing) = match (easting, northing) {
            (Some(e), Some(n)) => (e, n),
            (e, n) => {
                let mut missing = Vec::new();
                if e.is_none() {
                    missing.push(mapping.easting.clone());
                }
                if n.is_none() {
                    missing.push(mapping.northing.clone());
                }
                return Err(PreconditionError::MissingColumns(missing).into());
            }
        };

        let zone = column_index(headers, &mapping.zone);
        let hint = mapping
            .hint
            .iter()
            .find_map(|name| column_index(headers, name));

        Ok(Self {
            width: headers.len(),
            easting,
            northing,
            zone,
            hint,
        })
    }
}

/// Reads records from CSV, optionally gzip-compressed.
pub struct CsvRecordSource<R: Read> {
    reader: csv::Reader<R>,
    headers: StringRecord,
    layout: Layout,
    row: StringRecord,
    done: bool,
}

impl CsvRecordSource<Box<dyn Read>> {
    /// Open a CSV file. Files ending in `.gz` are decompressed on the fly.
    pub fn open<P: AsRef<Path>>(path: P, mapping: &ColumnMapping) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening record source {}", path.display());

        let file = File::open(path).map_err(|source| PreconditionError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        Self::from_reader(reader, mapping)
    }
}

impl<R: Read> CsvRecordSource<R> {
    pub fn from_reader(reader: R, mapping: &ColumnMapping) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let layout = Layout::resolve(&headers, mapping)?;
        debug!(
            "Column layout: easting={} northing={} zone={:?} hint={:?}",
            layout.easting, layout.northing, layout.zone, layout.hint
        );

        Ok(Self {
            reader,
            headers,
            layout,
            row: StringRecord::new(),
            done: false,
        })
    }

    /// Whether the input has a zone column at all
    pub fn has_zone_column(&self) -> bool {
        self.layout.zone.is_some()
    }

    fn parse_row(&self, fields: StringRecord) -> Result<Record> {
        let line = fields.position().map_or(0, |p| p.line());
        let layout = &self.layout;

        if fields.len() != layout.width {
            return Err(malformed(
                line,
                format!("expected {} fields, found {}", layout.width, fields.len()),
            ));
        }

        let easting = parse_coordinate(fields.get(layout.easting), "easting", line)?;
        let northing = parse_coordinate(fields.get(layout.northing), "northing", line)?;

        let zone = match layout.zone {
            Some(i) => parse_zone(fields.get(i).unwrap_or(""), line)?,
            None => None,
        };

        let hint = layout
            .hint
            .and_then(|i| fields.get(i))
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        let record = Record::new(line, easting, northing, zone).with_fields(fields);
        Ok(match hint {
            Some(hint) => record.with_hint(hint),
            None => record,
        })
    }
}

impl<R: Read> Iterator for CsvRecordSource<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.read_record(&mut self.row) {
            Ok(true) => Some(self.parse_row(self.row.clone())),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) if e.is_io_error() => {
                self.done = true;
                Some(Err(Error::Csv(e)))
            }
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                Some(Err(malformed(line, e.to_string())))
            }
        }
    }
}

impl<R: Read> RecordSource for CsvRecordSource<R> {
    fn headers(&self) -> &StringRecord {
        &self.headers
    }
}

fn malformed(line: u64, reason: String) -> Error {
    RecordError::Malformed { line, reason }.into()
}

fn parse_coordinate(value: Option<&str>, axis: &str, line: u64) -> Result<f64> {
    let raw = value.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Err(malformed(line, format!("missing {}", axis)));
    }
    let parsed: f64 = raw
        .parse()
        .map_err(|_| malformed(line, format!("non-numeric {} '{}'", axis, raw)))?;
    if !parsed.is_finite() {
        return Err(malformed(line, format!("non-finite {} '{}'", axis, raw)));
    }
    Ok(parsed)
}

/// Empty cell means no declared zone. Integral floats ("11.0") are accepted
/// since spreadsheet exports often write zones that way.
fn parse_zone(value: &str, line: u64) -> Result<Option<u32>> {
    let raw = value.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(zone) = raw.parse::<u32>() {
        return Ok(Some(zone));
    }
    match raw.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f >= 0.0 && f <= u32::MAX as f64 => Ok(Some(f as u32)),
        _ => Err(RecordError::UnresolvedZone {
            line,
            reason: format!("unparseable zone '{}'", raw),
        }
        .into()),
    }
}
