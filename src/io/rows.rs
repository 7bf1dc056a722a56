//! Two-pass streaming row source over a (possibly compressed) delimited file.
//!
//! The protocol is explicit in the types:
//!
//! 1. [`RowSource::open`] checks the file and the delimiter.
//! 2. [`RowSource::counting_pass`] skips the header, detects the descriptor
//!    column on the first data row (unless one was forced) and counts every
//!    data row.
//! 3. [`CountedSource::processing_pass`] reopens the file, skips the header
//!    again and streams [`Row`]s in file order, starting with the row the
//!    detector sampled.
//!
//! Reading the file twice costs one extra linear scan. In exchange the output
//! dataset can be preallocated at its final chunked size up front instead of
//! growing while rows stream in.
//!
//! Compressed input is decoded again on each pass. Blank lines are skipped by
//! both passes, so they never count as data rows.

use crate::column::detect_column;
use crate::config::FeaturizeConfig;
use crate::encoder::Encoder;
use crate::error::{FeaturizeError, Result};
use crate::io::compression::{DynReader, codec_for_path, open_reader};
use csv::StringRecord;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One data row. `index` counts data rows from 0, header excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub index: u64,
    pub record: StringRecord,
}

impl Row {
    /// Build a row from plain fields.
    pub fn new<I, T>(index: u64, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            index,
            record: fields.into_iter().collect(),
        }
    }

    /// Field at `column`, if the row has that many fields.
    #[must_use]
    pub fn field(&self, column: usize) -> Option<&str> {
        self.record.get(column)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.record.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

/// A delimited descriptor file, not yet scanned.
#[derive(Debug, Clone)]
pub struct RowSource {
    path: PathBuf,
    delimiter: char,
    delimiter_byte: u8,
    has_header: bool,
    forced_column: Option<usize>,
}

impl RowSource {
    /// Prepare `path` for reading with the delimiter, header and column
    /// settings of `config`.
    ///
    /// # Errors
    /// - [`FeaturizeError::InputRead`] if the file cannot be inspected.
    /// - [`FeaturizeError::EmptyInput`] if the file has zero bytes.
    /// - [`FeaturizeError::Config`] if the delimiter is not ASCII.
    pub fn open(path: impl AsRef<Path>, config: &FeaturizeConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = std::fs::metadata(&path).map_err(|source| FeaturizeError::InputRead {
            path: path.clone(),
            source,
        })?;
        if meta.len() == 0 {
            return Err(FeaturizeError::EmptyInput { path });
        }
        let delimiter_byte = config.delimiter_byte()?;
        if let Some(codec) = codec_for_path(&path) {
            debug!(path = %path.display(), codec = codec.name(), "decompressing input");
        }
        Ok(Self {
            path,
            delimiter: config.delimiter,
            delimiter_byte,
            has_header: config.has_header,
            forced_column: config.descriptor_column,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<csv::Reader<DynReader>> {
        let input = open_reader(&self.path).map_err(|source| FeaturizeError::InputRead {
            path: self.path.clone(),
            source,
        })?;
        Ok(csv::ReaderBuilder::new()
            .delimiter(self.delimiter_byte)
            .has_headers(self.has_header)
            .flexible(true)
            .from_reader(input))
    }

    fn read_error(&self, err: csv::Error) -> FeaturizeError {
        let path = self.path.clone();
        let line = err.position().map_or(0, csv::Position::line);
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => FeaturizeError::InputRead { path, source },
            _ => FeaturizeError::MalformedRecord { path, line, message },
        }
    }

    /// Count data rows and settle the descriptor column.
    ///
    /// # Errors
    /// - [`FeaturizeError::NoDataRows`] if there is no data row to sample and
    ///   no column was forced.
    /// - [`FeaturizeError::NoValidColumn`] if no field of the first data row
    ///   is a valid descriptor.
    /// - Read errors while scanning.
    pub fn counting_pass(self, encoder: &dyn Encoder) -> Result<CountedSource> {
        let mut reader = self.reader()?;
        let mut record = StringRecord::new();

        let has_first = reader
            .read_record(&mut record)
            .map_err(|e| self.read_error(e))?;

        let descriptor_column = match (self.forced_column, has_first) {
            (Some(column), _) => column,
            (None, false) => return Err(FeaturizeError::NoDataRows { path: self.path }),
            (None, true) => detect_column(&record, self.delimiter, encoder).map_err(|e| {
                FeaturizeError::NoValidColumn {
                    path: self.path.clone(),
                    delimiter: e.delimiter,
                    row: e.row,
                }
            })?,
        };

        let mut total_rows = u64::from(has_first);
        while reader
            .read_record(&mut record)
            .map_err(|e| self.read_error(e))?
        {
            total_rows += 1;
        }

        info!(
            path = %self.path.display(),
            total_rows,
            descriptor_column,
            forced = self.forced_column.is_some(),
            "counting pass complete"
        );
        Ok(CountedSource {
            source: self,
            total_rows,
            descriptor_column,
        })
    }
}

/// A source whose rows have been counted; ready for the processing pass.
#[derive(Debug, Clone)]
pub struct CountedSource {
    source: RowSource,
    total_rows: u64,
    descriptor_column: usize,
}

impl CountedSource {
    /// Data rows found by the counting pass.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    #[must_use]
    pub fn descriptor_column(&self) -> usize {
        self.descriptor_column
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.source.path()
    }

    /// Reopen the file and stream its data rows in order.
    ///
    /// # Errors
    /// Returns [`FeaturizeError::InputRead`] if the file cannot be reopened.
    pub fn processing_pass(self) -> Result<Rows> {
        let reader = self.source.reader()?;
        Ok(Rows {
            source: self.source,
            reader,
            next_index: 0,
            done: false,
        })
    }
}

/// Lazy sequence of data rows in file order. Stops after the first read error.
pub struct Rows {
    source: RowSource,
    reader: csv::Reader<DynReader>,
    next_index: u64,
    done: bool,
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        if self.done {
            return None;
        }
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => {
                let row = Row {
                    index: self.next_index,
                    record,
                };
                self.next_index += 1;
                Some(Ok(row))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(self.source.read_error(e)))
            }
        }
    }
}
