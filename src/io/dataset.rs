//! Chunked on-disk fingerprint dataset (`.fpd`).
//!
//! # Layout
//!
//! ```text
//! [0..8)      magic  b"MOLPFPD1"
//! [8..12)     u32 LE length of the encoded header
//! [12..512)   postcard-encoded DatasetHeader, zero padded
//! [512..)     rows * cols i8 values, row-major
//! ```
//!
//! Rows are grouped in chunks of `chunk_rows` rows; chunk `k` holds rows
//! `[k * chunk_rows, (k + 1) * chunk_rows)`. The writer preallocates the full
//! expected size, appends rows strictly in order one chunk at a time, and on
//! [`DatasetWriter::finish`] truncates the file to the rows actually written
//! and records a SHA-256 checksum of the data region.
//!
//! The `compressed` header flag is reserved: writers never set it and readers
//! reject files that do.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Bytes reserved at the start of the file for magic, length and header.
pub const HEADER_SIZE: u64 = 512;

/// File signature.
pub const MAGIC: &[u8; 8] = b"MOLPFPD1";

/// Element type of the stored array.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    I8,
}

/// Metadata stored in the header region.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DatasetHeader {
    /// Name of the stored array.
    pub name: String,
    pub rows: u64,
    pub cols: u64,
    pub dtype: Dtype,
    pub chunk_rows: u64,
    /// Reserved; always `false`.
    pub compressed: bool,
    /// Lowercase hex SHA-256 of the data region, set when the writer finishes.
    pub checksum: Option<String>,
}

/// Errors raised while writing or reading a dataset.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to {action} dataset \"{}\": {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("\"{}\" is not a molprint dataset", .path.display())]
    BadMagic { path: PathBuf },

    #[error("corrupt header in \"{}\": {message}", .path.display())]
    Header { path: PathBuf, message: String },

    #[error("encoded header of {len} bytes does not fit the 512-byte header region")]
    HeaderTooLarge { len: usize },

    #[error("dataset \"{name}\" has {expected} columns, got a row of {got}")]
    WidthMismatch {
        name: String,
        expected: u64,
        got: usize,
    },

    #[error("rows must be written in order: expected row {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("dataset preallocated for {capacity} rows is full")]
    CapacityExceeded { capacity: u64 },

    #[error("row {row} is out of bounds for a dataset of {rows} rows")]
    OutOfBounds { row: u64, rows: u64 },

    #[error(
        "checksum mismatch in \"{}\": header says {expected}, data hashes to {actual}",
        .path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("\"{}\" is compressed, which this version cannot read", .path.display())]
    Compressed { path: PathBuf },
}

type Result<T> = std::result::Result<T, DatasetError>;

fn io_err<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> DatasetError + 'a {
    move |source| DatasetError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn write_header(file: &mut File, path: &Path, header: &DatasetHeader) -> Result<()> {
    let encoded = postcard::to_allocvec(header).map_err(|e| DatasetError::Header {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let len = encoded.len();
    if 12 + len > HEADER_SIZE as usize {
        return Err(DatasetError::HeaderTooLarge { len });
    }
    let mut region = vec![0u8; HEADER_SIZE as usize];
    region[..8].copy_from_slice(MAGIC);
    region[8..12].copy_from_slice(&(len as u32).to_le_bytes());
    region[12..12 + len].copy_from_slice(&encoded);

    file.seek(SeekFrom::Start(0)).map_err(io_err("seek", path))?;
    file.write_all(&region).map_err(io_err("write header of", path))?;
    Ok(())
}

/// What [`DatasetWriter::finish`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub path: PathBuf,
    pub header: DatasetHeader,
    /// Preallocated rows given back by the final truncation.
    pub truncated_rows: u64,
}

/// Sequential writer for a preallocated dataset. Owns the file exclusively.
pub struct DatasetWriter {
    file: File,
    path: PathBuf,
    header: DatasetHeader,
    capacity: u64,
    written: u64,
    chunk: Vec<u8>,
    chunk_start: u64,
    hasher: Sha256,
}

impl DatasetWriter {
    /// Create `path` holding array `name` of `capacity` rows by `cols`
    /// columns, stored in chunks of `chunk_rows` rows.
    ///
    /// # Errors
    /// Returns [`DatasetError::Io`] if the file cannot be created or sized.
    pub fn create(
        path: impl AsRef<Path>,
        name: &str,
        capacity: u64,
        cols: usize,
        chunk_rows: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).map_err(io_err("create directory for", &path))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(io_err("create", &path))?;

        let cols64 = cols as u64;
        file.set_len(HEADER_SIZE + capacity * cols64)
            .map_err(io_err("preallocate", &path))?;

        let header = DatasetHeader {
            name: name.to_string(),
            rows: capacity,
            cols: cols64,
            dtype: Dtype::I8,
            chunk_rows: chunk_rows.max(1) as u64,
            compressed: false,
            checksum: None,
        };
        write_header(&mut file, &path, &header)?;
        debug!(path = %path.display(), capacity, cols, "dataset preallocated");

        Ok(Self {
            file,
            path,
            chunk: Vec::with_capacity(chunk_rows.max(1) * cols),
            header,
            capacity,
            written: 0,
            chunk_start: 0,
            hasher: Sha256::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.written
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Write `values` as row `index`, which must be the next unwritten row.
    ///
    /// # Errors
    /// Fails on a width mismatch, an out-of-order index, a full dataset, or
    /// an I/O error while flushing a completed chunk.
    pub fn write_row(&mut self, index: u64, values: &[i8]) -> Result<()> {
        if values.len() as u64 != self.header.cols {
            return Err(DatasetError::WidthMismatch {
                name: self.header.name.clone(),
                expected: self.header.cols,
                got: values.len(),
            });
        }
        if index != self.written {
            return Err(DatasetError::OutOfOrder {
                expected: self.written,
                got: index,
            });
        }
        if self.written == self.capacity {
            return Err(DatasetError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let start = self.chunk.len();
        self.chunk.extend(values.iter().map(|&v| v as u8));
        self.hasher.update(&self.chunk[start..]);
        self.written += 1;

        if self.written - self.chunk_start == self.header.chunk_rows {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let offset = HEADER_SIZE + self.chunk_start * self.header.cols;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(io_err("seek", &self.path))?;
        self.file
            .write_all(&self.chunk)
            .map_err(io_err("write chunk to", &self.path))?;
        self.chunk.clear();
        self.chunk_start = self.written;
        Ok(())
    }

    /// Flush the last chunk, truncate to the rows written, store the checksum
    /// and sync the file.
    ///
    /// # Errors
    /// Returns [`DatasetError::Io`] on any write, resize or sync failure.
    pub fn finish(mut self) -> Result<DatasetSummary> {
        self.flush_chunk()?;

        let truncated_rows = self.capacity - self.written;
        if truncated_rows > 0 {
            self.file
                .set_len(HEADER_SIZE + self.written * self.header.cols)
                .map_err(io_err("truncate", &self.path))?;
        }

        self.header.rows = self.written;
        self.header.checksum = Some(to_hex(&std::mem::take(&mut self.hasher).finalize()));
        write_header(&mut self.file, &self.path, &self.header)?;
        self.file.sync_all().map_err(io_err("sync", &self.path))?;

        debug!(
            path = %self.path.display(),
            rows = self.written,
            truncated_rows,
            "dataset finalized"
        );
        Ok(DatasetSummary {
            path: self.path,
            header: self.header,
            truncated_rows,
        })
    }
}

/// Random-access reader for a finished dataset.
pub struct DatasetReader {
    file: File,
    path: PathBuf,
    header: DatasetHeader,
}

impl DatasetReader {
    /// Open `path` and parse its header.
    ///
    /// # Errors
    /// Fails if the file cannot be read, does not start with [`MAGIC`], has
    /// an undecodable header, or is flagged compressed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(io_err("open", &path))?;

        let mut region = Vec::with_capacity(HEADER_SIZE as usize);
        (&mut file)
            .take(HEADER_SIZE)
            .read_to_end(&mut region)
            .map_err(io_err("read header of", &path))?;
        if region.len() < 12 || &region[..8] != MAGIC {
            return Err(DatasetError::BadMagic { path });
        }

        let mut len = [0u8; 4];
        len.copy_from_slice(&region[8..12]);
        let len = u32::from_le_bytes(len) as usize;
        let Some(encoded) = region.get(12..12 + len) else {
            return Err(DatasetError::Header {
                path,
                message: format!("declared length {len} exceeds the header region"),
            });
        };
        let header: DatasetHeader =
            postcard::from_bytes(encoded).map_err(|e| DatasetError::Header {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if header.compressed {
            return Err(DatasetError::Compressed { path });
        }

        Ok(Self { file, path, header })
    }

    #[must_use]
    pub fn header(&self) -> &DatasetHeader {
        &self.header
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// `(rows, cols)`.
    #[must_use]
    pub fn shape(&self) -> (u64, u64) {
        (self.header.rows, self.header.cols)
    }

    /// Number of storage chunks.
    #[must_use]
    pub fn chunks(&self) -> u64 {
        self.header.rows.div_ceil(self.header.chunk_rows.max(1))
    }

    fn read_rows(&mut self, start: u64, count: u64) -> Result<Vec<Vec<i8>>> {
        let cols = self.header.cols as usize;
        let mut bytes = vec![0u8; count as usize * cols];
        self.file
            .seek(SeekFrom::Start(HEADER_SIZE + start * self.header.cols))
            .map_err(io_err("seek", &self.path))?;
        self.file
            .read_exact(&mut bytes)
            .map_err(io_err("read rows of", &self.path))?;
        Ok(bytes
            .chunks(cols.max(1))
            .take(count as usize)
            .map(|row| row.iter().map(|&b| b as i8).collect())
            .collect())
    }

    /// Read row `index`.
    ///
    /// # Errors
    /// Returns [`DatasetError::OutOfBounds`] past the last row, or an I/O error.
    pub fn read_row(&mut self, index: u64) -> Result<Vec<i8>> {
        if index >= self.header.rows {
            return Err(DatasetError::OutOfBounds {
                row: index,
                rows: self.header.rows,
            });
        }
        let mut rows = self.read_rows(index, 1)?;
        Ok(rows.pop().unwrap_or_default())
    }

    /// Read every row of chunk `chunk`.
    ///
    /// # Errors
    /// Returns [`DatasetError::OutOfBounds`] past the last chunk, or an I/O error.
    pub fn read_chunk(&mut self, chunk: u64) -> Result<Vec<Vec<i8>>> {
        let start = chunk * self.header.chunk_rows;
        if start >= self.header.rows {
            return Err(DatasetError::OutOfBounds {
                row: start,
                rows: self.header.rows,
            });
        }
        let count = self.header.chunk_rows.min(self.header.rows - start);
        self.read_rows(start, count)
    }

    /// Read the whole array.
    ///
    /// # Errors
    /// Returns an I/O error if the data region is short.
    pub fn read_all(&mut self) -> Result<Vec<Vec<i8>>> {
        self.read_rows(0, self.header.rows)
    }

    /// Check the file length and the stored checksum against the data region.
    ///
    /// # Errors
    /// Returns [`DatasetError::ChecksumMismatch`] when the data does not hash
    /// to the stored value, or an I/O error if the data region is short.
    pub fn verify(&mut self) -> Result<()> {
        let data_len = self.header.rows * self.header.cols;
        self.file
            .seek(SeekFrom::Start(HEADER_SIZE))
            .map_err(io_err("seek", &self.path))?;

        let mut hasher = Sha256::new();
        let mut remaining = data_len;
        let buf_len = (self.header.chunk_rows * self.header.cols).clamp(1, 1 << 20);
        let mut buf = vec![0u8; buf_len as usize];
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            self.file
                .read_exact(&mut buf[..n])
                .map_err(io_err("read data of", &self.path))?;
            hasher.update(&buf[..n]);
            remaining -= n as u64;
        }

        let actual = to_hex(&hasher.finalize());
        match &self.header.checksum {
            Some(expected) if *expected != actual => Err(DatasetError::ChecksumMismatch {
                path: self.path.clone(),
                expected: expected.clone(),
                actual,
            }),
            _ => Ok(()),
        }
    }
}
