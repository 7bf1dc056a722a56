//! End-to-end featurization of one descriptor file.
//!
//! ```text
//! RowSource ──(gate)──> WorkerPool ──ordered──> Compactor ──> .fpd dataset
//!     │                                              │
//!     └── counting pass: column + row count          └── InvalidRowSet
//! ```
//!
//! The counting pass, column detection and job resolution happen up front,
//! before any worker or output file exists. The feeder thread then streams
//! rows into the pool while the calling thread compacts results into the
//! dataset.

use crate::compactor::{Compacted, Compactor, InvalidRowSet, progress_bar};
use crate::config::{CHUNK_ROWS, DATASET_NAME, FeaturizeConfig};
use crate::encoder::Encoder;
use crate::error::{FeaturizeError, Result};
use crate::gate::{self, Admitter, Releaser};
use crate::io::dataset::DatasetWriter;
use crate::io::rows::{CountedSource, RowSource};
use crate::jobs::resolve_jobs_for_host;
use crate::metrics::{MetricsCollector, names};
use crate::pool::WorkerPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// What a successful run produced.
#[derive(Clone)]
pub struct FeaturizeOutput {
    pub dataset_path: PathBuf,
    /// Original (pre-compaction) indices of rows that failed to encode.
    pub invalid_rows: InvalidRowSet,
    pub descriptor_column: usize,
    /// Data rows in the input, header excluded.
    pub total_rows: u64,
    /// Rows written to the dataset.
    pub valid_rows: u64,
    pub metrics: MetricsCollector,
}

/// Runs the featurization pipeline with one encoder and one configuration.
pub struct Featurizer {
    encoder: Arc<dyn Encoder>,
    config: FeaturizeConfig,
    metrics: MetricsCollector,
}

impl Featurizer {
    pub fn new(encoder: Arc<dyn Encoder>, config: FeaturizeConfig) -> Self {
        Self {
            encoder,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    /// Record into `metrics` instead of a fresh collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn config(&self) -> &FeaturizeConfig {
        &self.config
    }

    /// Featurize `input` into `<output_dir>/<basename>.fpd`.
    ///
    /// # Errors
    /// - Input errors (empty file, unreadable or malformed records, no data
    ///   rows to sample) and [`FeaturizeError::NoValidColumn`] are raised
    ///   before any worker or output file is created.
    /// - Resource errors (worker startup, dataset I/O). Once the dataset file
    ///   exists, any error removes it again.
    pub fn run(&self, input: impl AsRef<Path>) -> Result<FeaturizeOutput> {
        let input = input.as_ref();
        self.metrics.record_start();
        info!(path = %input.display(), jobs = self.config.jobs, "featurizing");

        let counted = RowSource::open(input, &self.config)?.counting_pass(self.encoder.as_ref())?;
        let total_rows = counted.total_rows();
        let descriptor_column = counted.descriptor_column();

        let workers = resolve_jobs_for_host(self.config.jobs);
        let pool = WorkerPool::new(Arc::clone(&self.encoder), descriptor_column, workers)?;
        let (admit, release) = gate::bounded(gate::capacity_for(workers, CHUNK_ROWS));
        let gate_capacity = admit.capacity();

        let dataset_path = self.config.dataset_path(input);
        let writer = DatasetWriter::create(
            &dataset_path,
            DATASET_NAME,
            total_rows,
            self.encoder.len(),
            CHUNK_ROWS,
        )?;
        info!(
            dataset = %dataset_path.display(),
            total_rows,
            descriptor_column,
            workers,
            gate_capacity,
            "processing pass"
        );

        let compacted = match self.process(counted, &pool, admit, release, writer) {
            Ok(compacted) => compacted,
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&dataset_path) {
                    warn!(
                        dataset = %dataset_path.display(),
                        error = %rm,
                        "could not remove partial dataset"
                    );
                }
                return Err(e);
            }
        };

        self.record(&compacted, total_rows, workers, gate_capacity);
        info!(
            valid = compacted.valid_rows(),
            invalid = compacted.invalid_rows.len(),
            "featurization complete"
        );

        Ok(FeaturizeOutput {
            valid_rows: compacted.valid_rows(),
            dataset_path: compacted.summary.path,
            invalid_rows: compacted.invalid_rows,
            descriptor_column,
            total_rows,
            metrics: self.metrics.clone(),
        })
    }

    fn process(
        &self,
        counted: CountedSource,
        pool: &WorkerPool,
        admit: Admitter,
        release: Releaser,
        writer: DatasetWriter,
    ) -> Result<Compacted> {
        let total_rows = counted.total_rows();
        let path = counted.path().to_path_buf();
        let rows = counted.processing_pass()?;
        let mut results = pool.map_ordered(rows, admit, self.config.row_timeout)?;

        let compacted = Compactor::new(writer, release)
            .with_progress(progress_bar(total_rows, self.config.progress))
            .run(results.by_ref());

        // the gate is closed once the compactor is gone, so the feeder always ends
        let admitted = results.finish();
        let compacted = compacted?;
        admitted?;

        let processed = compacted.resolved_rows();
        if processed != total_rows {
            return Err(FeaturizeError::RowCountChanged {
                path,
                counted: total_rows,
                processed,
            });
        }
        Ok(compacted)
    }

    fn record(&self, compacted: &Compacted, total_rows: u64, workers: usize, gate_capacity: usize) {
        let m = &self.metrics;
        m.set_counter(names::ROWS_TOTAL, total_rows);
        m.set_counter(names::ROWS_VALID, compacted.valid_rows());
        m.set_counter(names::ROWS_INVALID, compacted.invalid_rows.len() as u64);
        for (label, count) in &compacted.reasons {
            m.set_counter(&format!("{}{label}", names::INVALID_PREFIX), *count);
        }
        m.set_counter(names::WORKERS, workers as u64);
        m.set_counter(names::GATE_CAPACITY, gate_capacity as u64);
        m.set_counter(names::PEAK_IN_FLIGHT, compacted.peak_in_flight as u64);
        m.record_end();
    }
}

/// Featurize `input` with `encoder` and return the dataset path together with
/// the original indices of the rows that failed to encode.
///
/// # Errors
/// See [`Featurizer::run`].
pub fn featurize(
    input: impl AsRef<Path>,
    encoder: Arc<dyn Encoder>,
    config: &FeaturizeConfig,
) -> Result<(PathBuf, InvalidRowSet)> {
    let output = Featurizer::new(encoder, config.clone()).run(input)?;
    Ok((output.dataset_path, output.invalid_rows))
}
