//! Error types for the splitter.
//!
//! Fatal conditions (`ConfigError`, `PreconditionError`, I/O) abort a run;
//! `RecordError`s describe a single bad input row and are counted in the
//! report instead of being returned to the caller.

use thiserror::Error;

/// Malformed boundary configuration. Raised while loading, before any record
/// is read.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("jurisdiction '{0}' is already registered (codes are case-insensitive)")]
    DuplicateCode(String),

    #[error("jurisdiction '{code}' zone {zone}: inverted {axis} range ({min} > {max})")]
    InvertedBounds {
        code: String,
        zone: u32,
        axis: &'static str,
        min: f64,
        max: f64,
    },

    #[error("jurisdiction '{code}' zone {zone}: {axis} range is not finite")]
    NonFiniteBounds {
        code: String,
        zone: u32,
        axis: &'static str,
    },

    #[error("jurisdiction '{0}' defines no zones")]
    NoZones(String),

    #[error("jurisdiction '{code}' lists zone {zone} more than once")]
    DuplicateZone { code: String, zone: u32 },

    #[error("jurisdiction code must not be empty")]
    EmptyCode,

    #[error("jurisdiction code '{0}' may only contain ASCII letters, digits, '_' and '-'")]
    InvalidCode(String),
}

/// A condition that must hold before any record is processed.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("cannot open record source {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("required column(s) missing from input: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("boundary registry is empty")]
    NoBoundaries,

    #[error("date filter enabled but none of the date columns are present: {}", .0.join(", "))]
    NoDateColumns(Vec<String>),
}

/// A problem with one input row. Never fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("line {line}: unresolved zone: {reason}")]
    UnresolvedZone { line: u64, reason: String },

    #[error("line {line}: malformed record: {reason}")]
    Malformed { line: u64, reason: String },
}

impl RecordError {
    pub fn line(&self) -> u64 {
        match self {
            RecordError::UnresolvedZone { line, .. } | RecordError::Malformed { line, .. } => *line,
        }
    }
}

/// Main error type for the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid boundary configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the run may continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Record(_))
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvertedBounds {
            code: "AB".to_string(),
            zone: 11,
            axis: "easting",
            min: 700000.0,
            max: 400000.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("AB"));
        assert!(msg.contains("zone 11"));
        assert!(msg.contains("easting"));
    }

    #[test]
    fn test_missing_columns_display() {
        let err = PreconditionError::MissingColumns(vec!["utm_e".into(), "utm_n".into()]);
        assert_eq!(
            err.to_string(),
            "required column(s) missing from input: utm_e, utm_n"
        );
    }

    #[test]
    fn test_recoverable() {
        let err: Error = RecordError::Malformed {
            line: 3,
            reason: "bad".into(),
        }
        .into();
        assert!(err.is_recoverable());
        assert!(!Error::from(PreconditionError::NoBoundaries).is_recoverable());
    }
}
