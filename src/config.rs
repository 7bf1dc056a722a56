//! Run configuration for the featurization pipeline.

use crate::error::{FeaturizeError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rows per storage chunk of the output dataset. The backpressure gate admits
/// `(workers + 2) * CHUNK_ROWS` rows at a time.
pub const CHUNK_ROWS: usize = 1024;

/// Extension of the persisted fingerprint dataset.
pub const DATASET_EXTENSION: &str = "fpd";

/// Name of the array stored in every dataset.
pub const DATASET_NAME: &str = "fps";

/// Configuration for a featurization run.
///
/// ```
/// use molprint::config::FeaturizeConfig;
/// use std::time::Duration;
///
/// let config = FeaturizeConfig::default()
///     .with_delimiter('\t')
///     .with_jobs(-2)
///     .with_row_timeout(Some(Duration::from_secs(5)));
/// assert!(config.has_header);
/// ```
#[derive(Clone, Debug)]
pub struct FeaturizeConfig {
    /// Field separator of the input file. Must be a single ASCII character.
    pub delimiter: char,
    /// Whether the first line is a header to skip.
    pub has_header: bool,
    /// Column holding the descriptor. `None` autodetects it from the first data row.
    pub descriptor_column: Option<usize>,
    /// Worker-count policy: `n > 0` caps at the CPU count, `-1` uses every CPU,
    /// `-k` leaves `k - 1` CPUs idle.
    pub jobs: i64,
    /// Directory the dataset is written to.
    pub output_dir: PathBuf,
    /// Longest a row may stay unresolved after submission before it is
    /// recorded invalid. `None` waits forever.
    pub row_timeout: Option<Duration>,
    /// Draw a progress bar on stderr.
    pub progress: bool,
}

impl Default for FeaturizeConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: true,
            descriptor_column: None,
            jobs: -1,
            output_dir: PathBuf::from("."),
            row_timeout: Some(Duration::from_secs(60)),
            progress: false,
        }
    }
}

impl FeaturizeConfig {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    #[must_use]
    pub fn with_descriptor_column(mut self, column: Option<usize>) -> Self {
        self.descriptor_column = column;
        self
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: i64) -> Self {
        self.jobs = jobs;
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_row_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.row_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// The delimiter as the single byte the CSV reader expects.
    ///
    /// # Errors
    /// Returns [`FeaturizeError::Config`] for a non-ASCII delimiter.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(FeaturizeError::Config(format!(
                "delimiter {:?} is not a single-byte ASCII character",
                self.delimiter
            )))
        }
    }

    /// Where the dataset for `input` is written: `<output_dir>/<basename>.fpd`,
    /// with `basename` the file name up to its first `.`.
    #[must_use]
    pub fn dataset_path(&self, input: &Path) -> PathBuf {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let basename = name.split('.').next().filter(|s| !s.is_empty()).unwrap_or("fps");
        self.output_dir.join(format!("{basename}.{DATASET_EXTENSION}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_path_strips_every_extension() {
        let config = FeaturizeConfig::default().with_output_dir("/out");
        assert_eq!(
            config.dataset_path(Path::new("/data/library.smi.gz")),
            PathBuf::from("/out/library.fpd")
        );
        assert_eq!(
            config.dataset_path(Path::new("plain")),
            PathBuf::from("/out/plain.fpd")
        );
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let config = FeaturizeConfig::default().with_delimiter('§');
        assert!(config.delimiter_byte().is_err());
        assert_eq!(FeaturizeConfig::default().delimiter_byte().unwrap(), b',');
    }
}
