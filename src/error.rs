//! Errors raised while parsing exports, resolving rates and building bills.

use crate::types::{ChargeCategory, Exchange, FileRole, Segment};
use std::fmt;

/// One rejected data row from an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based data row number, header excluded.
    pub row: usize,
    /// Why the row was rejected.
    pub reason: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

/// Error during export parsing, rate resolution or bill assembly.
#[derive(thiserror::Error, Debug)]
pub enum BillError {
    /// I/O error while reading a source file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed CSV framing.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// The uploaded export contained no data.
    #[error("{role} file is empty")]
    EmptyInput {
        /// Which export was empty.
        role: FileRole,
    },
    /// A required column could not be resolved from the header row.
    #[error("Invalid {role} CSV format. Missing columns: {missing}. Detected columns: {detected}")]
    Schema {
        /// Which export failed.
        role: FileRole,
        /// Canonical names of the unresolved fields.
        missing: String,
        /// Header names actually present in the file.
        detected: String,
    },
    /// One or more data rows failed validation.
    #[error("Invalid rows in {role} file: {}", join_rows(.rows))]
    InvalidRows {
        /// Which export failed.
        role: FileRole,
        /// Every offending row with its reason.
        rows: Vec<RowError>,
    },
    /// Error parsing a numeric cell.
    #[error("Invalid number '{value}' in column '{column}'")]
    Number {
        /// Offending cell contents.
        value: String,
        /// Canonical column name.
        column: &'static str,
    },
    /// Error parsing a date cell.
    #[error("Invalid date '{value}'")]
    Date {
        /// Offending cell contents.
        value: String,
    },
    /// A record's venue code could not be mapped to an exchange and segment.
    #[error("Unrecognized venue '{venue}' at row {row}")]
    Classification {
        /// Raw venue cell contents.
        venue: String,
        /// 1-based data row number.
        row: usize,
    },
    /// No active rate-card entry matched a required charge category.
    #[error("No rate entry for {exchange} {segment} '{category}'")]
    RateNotFound {
        /// Exchange of the group being charged.
        exchange: Exchange,
        /// Segment of the group being charged.
        segment: Segment,
        /// Category that had no entry.
        category: ChargeCategory,
    },
    /// More than one rate-card entry was active for the same key.
    #[error("{count} rate entries active for {exchange} {segment} '{category}'")]
    AmbiguousRate {
        /// Exchange of the conflicting entries.
        exchange: Exchange,
        /// Segment of the conflicting entries.
        segment: Segment,
        /// Category of the conflicting entries.
        category: ChargeCategory,
        /// How many entries matched.
        count: usize,
    },
    /// The rate card failed to load or validate.
    #[error("Rate card error: {0}")]
    RateCard(String),
    /// A bill edit could not be applied.
    #[error("Edit rejected: {0}")]
    Edit(String),
    /// A batch run could not be set up.
    #[error("Batch error: {0}")]
    Batch(String),
}

fn join_rows(rows: &[RowError]) -> String {
    rows.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
