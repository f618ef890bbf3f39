//! Routes records to per-(zone, jurisdiction) output groups.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use csv::StringRecord;
use indicatif::ProgressBar;
use tracing::{debug, info};

use super::filter::{BoundDateFilter, DateFilter};
use super::{GroupKey, OutputFactory, RecordSource, SplitReport};
use crate::boundary::BoundaryRegistry;
use crate::error::{Error, PreconditionError, RecordError, Result};
use crate::models::Record;

/// Per-run routing options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitOptions {
    /// Zone assumed for records whose zone cell is empty
    pub default_zone: Option<u32>,
    pub date_filter: Option<DateFilter>,
}

/// Open writers for one run, closed exactly once by [`OutputGroups::close`].
struct OutputGroups<W: std::io::Write> {
    headers: StringRecord,
    writers: BTreeMap<GroupKey, csv::Writer<W>>,
}

impl<W: std::io::Write> OutputGroups<W> {
    fn new(headers: StringRecord) -> Self {
        Self {
            headers,
            writers: BTreeMap::new(),
        }
    }

    fn append<F>(&mut self, factory: &mut F, key: &GroupKey, fields: &StringRecord) -> Result<()>
    where
        F: OutputFactory<Writer = W>,
    {
        let writer = match self.writers.entry(key.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let mut writer = csv::Writer::from_writer(factory.create(key)?);
                writer.write_record(&self.headers)?;
                info!("Created output group {}", key);
                e.insert(writer)
            }
        };
        writer.write_record(fields)?;
        Ok(())
    }

    /// Flush and release every writer, reporting the first failure
    fn close(self) -> Result<()> {
        let mut first_err = None;
        for (key, mut writer) in self.writers {
            if let Err(e) = writer.flush() {
                debug!("Failed to flush group {}: {}", key, e);
                first_err.get_or_insert(Error::Io(e));
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Splits a record stream into output groups keyed by zone and jurisdiction.
///
/// Overlap policy: a record inside the extents of several jurisdictions is
/// written to every matching group and counted once in
/// [`SplitReport::duplicated`]. A record matching none goes to
/// `unclassified/{zone}`.
pub struct Splitter<'a, F: OutputFactory> {
    registry: &'a BoundaryRegistry,
    factory: F,
    options: SplitOptions,
    progress: Option<ProgressBar>,
}

impl<'a, F: OutputFactory> Splitter<'a, F> {
    pub fn new(registry: &'a BoundaryRegistry, factory: F) -> Self {
        Self {
            registry,
            factory,
            options: SplitOptions::default(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: SplitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn into_factory(self) -> F {
        self.factory
    }

    /// Consume `source` once, front to back, and write every record to its
    /// group(s). Per-record problems are counted in the report; only
    /// precondition and I/O failures are returned as errors.
    pub fn process<S: RecordSource>(&mut self, source: S) -> Result<SplitReport> {
        if self.registry.is_empty() {
            return Err(PreconditionError::NoBoundaries.into());
        }
        if let Some(zone) = self.options.default_zone {
            if !self.registry.is_known_zone(zone) {
                info!("Default zone {} has no registered boundaries", zone);
            }
        }

        let filter = match &self.options.date_filter {
            Some(f) => {
                let bound = f.bind(source.headers())?;
                info!("Keeping records observed on or after {}", f.since);
                Some(bound)
            }
            None => None,
        };

        let mut groups = OutputGroups::new(source.headers().clone());
        let mut report = SplitReport::default();

        let outcome = self.route_all(source, filter.as_ref(), &mut groups, &mut report);
        let closed = groups.close();
        outcome?;
        closed?;

        info!(
            "Split {} records into {} groups",
            report.processed,
            report.groups.len()
        );
        Ok(report)
    }

    fn route_all<S: RecordSource>(
        &mut self,
        source: S,
        filter: Option<&BoundDateFilter>,
        groups: &mut OutputGroups<F::Writer>,
        report: &mut SplitReport,
    ) -> Result<()> {
        for item in source {
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
            report.processed += 1;

            let record = match item {
                Ok(record) => record,
                Err(Error::Record(e)) => {
                    skip(report, &e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(filter) = filter {
                if !filter.accepts(&record.fields) {
                    report.filtered += 1;
                    continue;
                }
            }

            match self.resolve_zone(&record) {
                Ok(zone) => self.route(zone, &record, groups, report)?,
                Err(e) => skip(report, &e),
            }
        }
        Ok(())
    }

    fn resolve_zone(&self, record: &Record) -> std::result::Result<u32, RecordError> {
        match record.zone.or(self.options.default_zone) {
            Some(zone) if self.registry.is_known_zone(zone) => Ok(zone),
            Some(zone) => Err(RecordError::UnresolvedZone {
                line: record.line,
                reason: format!("zone {} has no registered boundaries", zone),
            }),
            None => Err(RecordError::UnresolvedZone {
                line: record.line,
                reason: "no zone declared".to_string(),
            }),
        }
    }

    fn route(
        &mut self,
        zone: u32,
        record: &Record,
        groups: &mut OutputGroups<F::Writer>,
        report: &mut SplitReport,
    ) -> Result<()> {
        let codes = self.registry.resolve(zone, record.easting, record.northing);

        if let Some(hint) = &record.jurisdiction_hint {
            if !codes.iter().any(|c| c.eq_ignore_ascii_case(hint)) {
                report.hint_mismatches += 1;
                debug!(
                    "line {}: hint '{}' not among resolved {:?}",
                    record.line, hint, codes
                );
            }
        }

        if codes.is_empty() {
            let key = GroupKey::unclassified(zone);
            groups.append(&mut self.factory, &key, &record.fields)?;
            report.record_write(&key);
            report.unclassified += 1;
            return Ok(());
        }

        if codes.len() > 1 {
            report.duplicated += 1;
            report.extra_writes += codes.len() as u64 - 1;
            debug!(
                "line {}: ({}, {}) in zone {} overlaps {:?}",
                record.line, record.easting, record.northing, zone, codes
            );
        }

        for code in codes {
            let key = GroupKey::jurisdiction(zone, code);
            groups.append(&mut self.factory, &key, &record.fields)?;
            report.record_write(&key);
        }
        Ok(())
    }
}

fn skip(report: &mut SplitReport, err: &RecordError) {
    match err {
        RecordError::UnresolvedZone { .. } => report.unresolved_zone += 1,
        RecordError::Malformed { .. } => report.malformed += 1,
    }
    debug!("Skipping record: {}", err);
}
