//! File I/O: compressed input, the two-pass row source and the dataset format.

pub mod compression;
pub mod dataset;
pub mod rows;

pub use compression::{codec_for_path, create_writer, open_reader};
pub use dataset::{DatasetHeader, DatasetReader, DatasetWriter};
pub use rows::{CountedSource, Row, RowSource, Rows};
