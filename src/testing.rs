//! Test helpers for code that drives the featurization pipeline.
//!
//! - [`StubEncoder`]: a deterministic encoder whose behavior is chosen by the
//!   descriptor text, so a fixture file can mix valid, failing, panicking and
//!   slow rows without a chemistry toolkit
//! - [`write_descriptor_file`] and friends: build (optionally compressed)
//!   input files in a temporary directory
//!
//! # Quick Start
//!
//! ```
//! use molprint::testing::*;
//! use molprint::{FeaturizeConfig, featurize};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let input = write_descriptor_file(
//!     dir.path().join("lib.csv"),
//!     Some("id,desc"),
//!     &numbered_rows(&["C", "bad", "CC"], ','),
//! )?;
//!
//! let config = FeaturizeConfig::default().with_output_dir(dir.path());
//! let (dataset, invalid) = featurize(&input, Arc::new(StubEncoder::new(4)), &config)?;
//! assert_eq!(invalid.into_iter().collect::<Vec<_>>(), vec![1]);
//! assert!(dataset.ends_with("lib.fpd"));
//! # Ok(())
//! # }
//! ```
//!
//! # Descriptor rules of [`StubEncoder`]
//!
//! | descriptor                  | result                                    |
//! |-----------------------------|-------------------------------------------|
//! | empty or all ASCII digits   | `EncodeError::Parse`                      |
//! | starts with `bad`           | `EncodeError::Parse`                      |
//! | starts with `err`           | `EncodeError::Internal`                   |
//! | starts with `panic`         | panics                                    |
//! | starts with `short`         | a vector one element too short            |
//! | starts with `slow`          | sleeps for the slow delay, then valid     |
//! | starts with `hang`          | sleeps for the hang delay, then valid     |
//! | anything else               | valid                                     |
//!
//! Valid vectors depend only on the descriptor text.

use crate::encoder::{EncodeError, Encoder, FixedVector};
use crate::io::compression::create_writer;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Deterministic encoder driven by descriptor prefixes. See the module docs.
#[derive(Debug)]
pub struct StubEncoder {
    len: usize,
    slow: Duration,
    hang: Duration,
    calls: AtomicU64,
}

impl StubEncoder {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            len,
            slow: Duration::from_millis(20),
            hang: Duration::from_secs(5),
            calls: AtomicU64::new(0),
        }
    }

    /// Delay applied to `slow*` descriptors.
    #[must_use]
    pub fn with_slow_delay(mut self, delay: Duration) -> Self {
        self.slow = delay;
        self
    }

    /// Delay applied to `hang*` descriptors.
    #[must_use]
    pub fn with_hang_delay(mut self, delay: Duration) -> Self {
        self.hang = delay;
        self
    }

    /// Number of `encode` calls made so far, across all threads.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// The vector a valid `descriptor` encodes to.
    #[must_use]
    pub fn expected(&self, descriptor: &str) -> FixedVector {
        let seed = descriptor
            .bytes()
            .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        (0..self.len)
            .map(|j| (seed.wrapping_add(j as u32 * 7) % 127) as i8)
            .collect()
    }

    fn rejects(descriptor: &str) -> bool {
        descriptor.is_empty()
            || descriptor.bytes().all(|b| b.is_ascii_digit())
            || descriptor.starts_with("bad")
    }
}

impl Encoder for StubEncoder {
    fn len(&self) -> usize {
        self.len
    }

    fn encode(&self, descriptor: &str) -> Result<FixedVector, EncodeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if Self::rejects(descriptor) {
            return Err(EncodeError::Parse(descriptor.to_string()));
        }
        if descriptor.starts_with("err") {
            return Err(EncodeError::Internal(descriptor.to_string()));
        }
        if descriptor.starts_with("panic") {
            panic!("stub encoder asked to panic on {descriptor:?}");
        }
        if descriptor.starts_with("slow") {
            thread::sleep(self.slow);
        }
        if descriptor.starts_with("hang") {
            thread::sleep(self.hang);
        }
        let mut v = self.expected(descriptor);
        if descriptor.starts_with("short") {
            v.pop();
        }
        Ok(v)
    }

    /// Validity without side effects: never sleeps or panics.
    fn is_valid(&self, descriptor: &str) -> bool {
        !Self::rejects(descriptor)
    }
}

/// `"<i><delimiter><descriptor>"` for each descriptor, numbered from 0.
#[must_use]
pub fn numbered_rows(descriptors: &[&str], delimiter: char) -> Vec<String> {
    descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{i}{delimiter}{d}"))
        .collect()
}

/// Write `header` (if any) and `lines` to `path`, one per line.
///
/// The file is compressed when its extension names a codec (`.gz`, `.zst`, ...).
///
/// # Errors
/// Returns any I/O error from creating or writing the file.
pub fn write_descriptor_file(
    path: impl AsRef<Path>,
    header: Option<&str>,
    lines: &[String],
) -> io::Result<PathBuf> {
    let path = path.as_ref().to_path_buf();
    let mut out = create_writer(&path)?;
    if let Some(header) = header {
        writeln!(out, "{header}")?;
    }
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    drop(out);
    Ok(path)
}

/// Write a headed `id,smiles` file from `descriptors`.
///
/// # Errors
/// Returns any I/O error from creating or writing the file.
pub fn write_smiles_csv(path: impl AsRef<Path>, descriptors: &[&str]) -> io::Result<PathBuf> {
    write_descriptor_file(path, Some("id,smiles"), &numbered_rows(descriptors, ','))
}

/// A handful of small, syntactically valid SMILES strings.
pub const SAMPLE_SMILES: &[&str] = &[
    "C",
    "CC",
    "CCO",
    "c1ccccc1",
    "CC(=O)O",
    "C1CCCCC1",
    "CC(C)Cc1ccc(cc1)C(C)C(=O)O",
    "[Na+].[Cl-]",
    "N#N",
    "O=C=O",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_is_deterministic_and_fixed_width() {
        let e = StubEncoder::new(8);
        assert_eq!(e.encode("CCO").unwrap(), e.encode("CCO").unwrap());
        assert_ne!(e.expected("CCO"), e.expected("CCN"));
        assert_eq!(e.encode("slowCC").unwrap().len(), 8);
        assert_eq!(e.encode("shortC").unwrap().len(), 7);
        assert_eq!(e.calls(), 4);
    }

    #[test]
    fn stub_rejections() {
        let e = StubEncoder::new(2);
        assert!(!e.is_valid("42"));
        assert!(!e.is_valid(""));
        assert!(matches!(e.encode("badX"), Err(EncodeError::Parse(_))));
        assert!(matches!(e.encode("errX"), Err(EncodeError::Internal(_))));
        assert!(e.is_valid("panic"));
    }

    #[test]
    fn numbered_rows_use_the_delimiter() {
        assert_eq!(numbered_rows(&["C", "CC"], '\t'), vec!["0\tC", "1\tCC"]);
    }
}
