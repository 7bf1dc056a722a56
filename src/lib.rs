//! # molprint
//!
//! Turns a large delimited file of molecule descriptors (SMILES strings) into
//! a fixed-width fingerprint matrix on disk, with bounded memory and without
//! letting a single bad row abort the run.
//!
//! ## Key Features
//!
//! - **Column autodetection** - the first field of the first data row that the encoder accepts
//! - **Two-pass streaming** - count first, then preallocate the dataset at its final size
//! - **Parallel, ordered encoding** - a fixed worker pool whose results come back in row order
//! - **Backpressure** - at most `(workers + 2) * 1024` rows in flight at any time
//! - **Gap-free compaction** - failed rows are skipped in the output and reported by index
//! - **Compressed input** - gzip, zstd, bzip2 and xz, chosen by file extension
//! - **Per-row timeouts** - a stuck descriptor is recorded invalid instead of stalling the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use molprint::fingerprint::TokenFingerprinter;
//! use molprint::{FeaturizeConfig, featurize};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = FeaturizeConfig::default()
//!     .with_jobs(-1)
//!     .with_output_dir("out");
//!
//! let (dataset, invalid) = featurize(
//!     "library.smi.gz",
//!     Arc::new(TokenFingerprinter::new(2048)),
//!     &config,
//! )?;
//! println!("wrote {} ({} rows failed)", dataset.display(), invalid.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Encoder
//!
//! An [`Encoder`] maps one descriptor to a vector of exactly [`Encoder::len`]
//! `i8` values, or fails. Bring your own, or use the built-in
//! [`TokenFingerprinter`](fingerprint::TokenFingerprinter).
//!
//! ### Original vs. compacted index
//!
//! Data rows are numbered from 0 in file order, header excluded (the
//! *original* index). The dataset holds only valid rows, densely (the
//! *compacted* index), in the same relative order. The returned
//! [`InvalidRowSet`] holds original indices, so
//! `dataset rows + invalid rows == data rows` always holds.
//!
//! ### Reading the output
//!
//! ```no_run
//! use molprint::io::dataset::DatasetReader;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut reader = DatasetReader::open("out/library.fpd")?;
//! reader.verify()?;
//! let (rows, cols) = reader.shape();
//! let first_chunk = reader.read_chunk(0)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`pipeline`] - [`Featurizer`] and [`featurize`], the entry points
//! - [`io`] - compressed input, the two-pass row source and the `.fpd` dataset format
//! - [`column`] - descriptor-column detection
//! - [`jobs`] - worker-count policy
//! - [`gate`] - the backpressure gate
//! - [`pool`] - the ordered worker pool
//! - [`compactor`] - gap-free writing of results
//! - [`metrics`] and [`logging`] - run statistics and `tracing` setup
//! - [`testing`] - a stub encoder and fixture writers for tests

pub mod column;
pub mod compactor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod io;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod testing;

pub use compactor::InvalidRowSet;
pub use config::{CHUNK_ROWS, FeaturizeConfig};
pub use encoder::{EncodeError, Encoder, FixedVector};
pub use error::{ErrorKind, FeaturizeError, Result};
pub use io::dataset::{DatasetError, DatasetReader};
pub use pipeline::{FeaturizeOutput, Featurizer, featurize};
pub use pool::{InvalidReason, Outcome, RowResult};
