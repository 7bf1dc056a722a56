//! Error types for molprint.
//!
//! Only fatal conditions are errors. A row that fails to encode is ordinary
//! bookkeeping and travels as [`InvalidReason`](crate::pool::InvalidReason)
//! inside the result stream instead.

use crate::io::dataset::DatasetError;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty, unreadable or inconsistent input, or a bad configuration value.
    Input,
    /// No column of the sample row parses as a descriptor.
    Format,
    /// The worker pool, feeder thread or output dataset could not be set up or written.
    Resource,
}

/// Main error type for molprint.
#[derive(Error, Debug)]
pub enum FeaturizeError {
    #[error("\"{}\" is empty!", .path.display())]
    EmptyInput { path: PathBuf },

    #[error("\"{}\" contains no data rows", .path.display())]
    NoDataRows { path: PathBuf },

    #[error("failed to read \"{}\": {source}", .path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record near line {line} of \"{}\": {message}", .path.display())]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error(
        "\"{}\" is not a valid descriptor file or a bad delimiter (={delimiter:?}) was supplied for this file.\nExample row: {row}",
        .path.display()
    )]
    NoValidColumn {
        path: PathBuf,
        delimiter: char,
        row: String,
    },

    #[error(
        "\"{}\" changed between passes: counted {counted} rows, processed {processed}",
        .path.display()
    )]
    RowCountChanged {
        path: PathBuf,
        counted: u64,
        processed: u64,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build a worker pool of {workers} threads: {source}")]
    WorkerPool {
        workers: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    #[error("failed to spawn {what}: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("backpressure gate closed before all rows were admitted")]
    GateClosed,

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl FeaturizeError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput { .. }
            | Self::NoDataRows { .. }
            | Self::InputRead { .. }
            | Self::MalformedRecord { .. }
            | Self::RowCountChanged { .. }
            | Self::Config(_) => ErrorKind::Input,
            Self::NoValidColumn { .. } => ErrorKind::Format,
            Self::WorkerPool { .. }
            | Self::Spawn { .. }
            | Self::GateClosed
            | Self::Dataset(_) => ErrorKind::Resource,
        }
    }
}

/// Result type alias for molprint operations.
pub type Result<T> = std::result::Result<T, FeaturizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_valid_column_reports_delimiter_and_row() {
        let err = FeaturizeError::NoValidColumn {
            path: PathBuf::from("lib.smi"),
            delimiter: '\t',
            row: "1\tfoo".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lib.smi"));
        assert!(msg.contains("'\\t'"));
        assert!(msg.contains("Example row: 1\tfoo"));
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn empty_input_is_an_input_error() {
        let err = FeaturizeError::EmptyInput {
            path: PathBuf::from("empty.csv"),
        };
        assert!(err.to_string().contains("empty.csv"));
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
