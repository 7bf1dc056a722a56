//! Order-preserving compaction of row results into the persisted dataset.
//!
//! The compactor walks the ordered result stream with two counters: `i`, the
//! next compacted row to write, and `offset`, the number of invalid rows
//! skipped so far. An invalid result records original index `i + offset` and
//! bumps `offset` without advancing `i`, so valid vectors land densely with
//! no gap for a failed row. Every resolved result, valid or not, returns one
//! permit to the backpressure gate.

use crate::error::Result;
use crate::gate::Releaser;
use crate::io::dataset::{DatasetSummary, DatasetWriter};
use crate::pool::{InvalidReason, Outcome, RowResult};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Original indices of rows that produced no vector.
pub type InvalidRowSet = BTreeSet<u64>;

/// Everything the compactor produced.
#[derive(Debug, Clone)]
pub struct Compacted {
    pub summary: DatasetSummary,
    pub invalid_rows: InvalidRowSet,
    /// Invalid-row counts keyed by [`InvalidReason::label`].
    pub reasons: BTreeMap<&'static str, u64>,
    /// Most rows the gate ever held in flight during the run.
    pub peak_in_flight: usize,
}

impl Compacted {
    /// Rows written to the dataset.
    #[must_use]
    pub fn valid_rows(&self) -> u64 {
        self.summary.header.rows
    }

    /// Rows resolved in total, valid plus invalid.
    #[must_use]
    pub fn resolved_rows(&self) -> u64 {
        self.valid_rows() + self.invalid_rows.len() as u64
    }
}

/// A progress bar over `total` rows, drawn on stderr, or a hidden one.
#[must_use]
pub fn progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::with_template(
            "  [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({per_sec}, {eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  "),
    );
    pb
}

/// Single writer of the dataset for one run.
pub struct Compactor {
    writer: DatasetWriter,
    releaser: Releaser,
    progress: ProgressBar,
    i: u64,
    offset: u64,
    invalid_rows: InvalidRowSet,
    reasons: BTreeMap<&'static str, u64>,
}

impl Compactor {
    #[must_use]
    pub fn new(writer: DatasetWriter, releaser: Releaser) -> Self {
        Self {
            writer,
            releaser,
            progress: ProgressBar::hidden(),
            i: 0,
            offset: 0,
            invalid_rows: InvalidRowSet::new(),
            reasons: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Consume `results` until exhausted, then truncate and seal the dataset.
    ///
    /// `results` must be ordered by original row index and start at row 0.
    /// A trailing run of invalid results ends the skip loop at stream
    /// exhaustion; an all-invalid stream yields a zero-row dataset.
    ///
    /// # Errors
    /// Returns [`crate::FeaturizeError::Dataset`] if a row cannot be written or
    /// the dataset cannot be finalized. Dropping `self` on error closes the gate.
    pub fn run(mut self, results: impl IntoIterator<Item = RowResult>) -> Result<Compacted> {
        let mut results = results.into_iter();

        'outer: while let Some(mut result) = results.next() {
            let vector = loop {
                match result.outcome {
                    Outcome::Valid(vector) => break vector,
                    Outcome::Invalid(reason) => {
                        self.skip(result.index, &reason);
                        match results.next() {
                            Some(next) => result = next,
                            None => break 'outer,
                        }
                    }
                }
            };
            debug_assert_eq!(result.index, self.i + self.offset);
            self.writer.write_row(self.i, &vector)?;
            self.resolve();
            self.i += 1;
        }

        self.progress.finish_and_clear();
        let summary = self.writer.finish()?;
        info!(
            rows = summary.header.rows,
            invalid = self.invalid_rows.len(),
            truncated = summary.truncated_rows,
            "compaction complete"
        );
        Ok(Compacted {
            summary,
            invalid_rows: self.invalid_rows,
            reasons: self.reasons,
            peak_in_flight: self.releaser.peak(),
        })
    }

    fn skip(&mut self, index: u64, reason: &InvalidReason) {
        let original = self.i + self.offset;
        debug_assert_eq!(index, original);
        debug!(row = original, reason = reason.label(), "skipping invalid row");
        self.invalid_rows.insert(original);
        *self.reasons.entry(reason.label()).or_default() += 1;
        self.offset += 1;
        self.resolve();
    }

    fn resolve(&self) {
        let released = self.releaser.release();
        debug_assert!(released, "released a row that was never admitted");
        self.progress.inc(1);
    }
}
