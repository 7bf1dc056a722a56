//! Fixed-size worker pool with an order-preserving result stream.
//!
//! [`WorkerPool::map_ordered`] starts a feeder thread that pulls rows, admits
//! each one through the backpressure gate and spawns its encode job on a
//! `rayon` pool. Jobs finish in any order; [`OrderedResults`] buffers them and
//! yields exactly one [`RowResult`] per row, strictly by original row index.
//!
//! A failing row never aborts the run: parse errors, wrong-width vectors,
//! missing fields and encoder panics all become [`Outcome::Invalid`].

use crate::encoder::{EncodeError, Encoder, FixedVector};
use crate::error::{FeaturizeError, Result};
use crate::gate::Admitter;
use crate::io::rows::Row;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Why a row produced no vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// The encoder rejected the descriptor.
    Encode(EncodeError),
    /// The encoder returned a vector of the wrong width.
    WrongLength { expected: usize, got: usize },
    /// The row has no field at the descriptor column.
    MissingField { column: usize, fields: usize },
    /// The encoder panicked.
    Panicked(String),
    /// The row was not resolved within the configured timeout.
    TimedOut(Duration),
    /// The job disappeared without reporting a result.
    Lost,
}

impl InvalidReason {
    /// Short stable label, used as a metric name suffix.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode_failed",
            Self::WrongLength { .. } => "wrong_length",
            Self::MissingField { .. } => "missing_field",
            Self::Panicked(_) => "panicked",
            Self::TimedOut(_) => "timed_out",
            Self::Lost => "lost",
        }
    }
}

/// Result of encoding one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Valid(FixedVector),
    Invalid(InvalidReason),
}

impl Outcome {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// An [`Outcome`] tagged with the original index of its row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    pub index: u64,
    pub outcome: Outcome,
}

/// Encode the descriptor at `column` of `row`.
pub fn encode_row(encoder: &dyn Encoder, row: &Row, column: usize) -> Outcome {
    let Some(descriptor) = row.field(column) else {
        return Outcome::Invalid(InvalidReason::MissingField {
            column,
            fields: row.len(),
        });
    };
    match encoder.encode(descriptor) {
        Ok(v) if v.len() == encoder.len() => Outcome::Valid(v),
        Ok(v) => Outcome::Invalid(InvalidReason::WrongLength {
            expected: encoder.len(),
            got: v.len(),
        }),
        Err(e) => Outcome::Invalid(InvalidReason::Encode(e)),
    }
}

/// [`encode_row`], with an encoder panic turned into [`InvalidReason::Panicked`].
fn encode_guarded(encoder: &dyn Encoder, row: &Row, column: usize) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| encode_row(encoder, row, column))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            warn!(row = row.index, %msg, "encoder panicked");
            Outcome::Invalid(InvalidReason::Panicked(msg))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

enum Event {
    Submitted { index: u64 },
    /// A worker picked the row up; its timeout runs from here.
    Started { index: u64, at: Instant },
    Done(RowResult),
    /// The feeder stopped after admitting this many rows.
    Exhausted { admitted: u64 },
}

/// A fixed-size pool of encode workers sharing one encoder.
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
    encoder: Arc<dyn Encoder>,
    column: usize,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool of `workers` threads encoding the field at `column`.
    ///
    /// # Errors
    /// Returns [`FeaturizeError::WorkerPool`] if the threads cannot be started.
    pub fn new(encoder: Arc<dyn Encoder>, column: usize, workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("featurize-{i}"))
            .build()
            .map_err(|source| FeaturizeError::WorkerPool { workers, source })?;
        debug!(workers, column, width = encoder.len(), "worker pool ready");
        Ok(Self {
            pool: Arc::new(pool),
            encoder,
            column,
            workers,
        })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Encode `rows` in parallel and return their results in row order.
    ///
    /// Rows must be numbered consecutively from 0. Each row takes one permit
    /// from `admit` before it is submitted; the consumer of the returned
    /// stream is responsible for releasing it. With `row_timeout` set, a row
    /// still unresolved that long after a worker started encoding it is
    /// yielded as [`InvalidReason::TimedOut`] and its late result is
    /// discarded. Time spent queued behind other rows does not count.
    ///
    /// # Errors
    /// Returns [`FeaturizeError::Spawn`] if the feeder thread cannot start.
    pub fn map_ordered<I>(
        &self,
        rows: I,
        admit: Admitter,
        row_timeout: Option<Duration>,
    ) -> Result<OrderedResults>
    where
        I: IntoIterator<Item = Result<Row>>,
        I::IntoIter: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let rows = rows.into_iter();
        let pool = Arc::clone(&self.pool);
        let encoder = Arc::clone(&self.encoder);
        let column = self.column;

        let feeder = thread::Builder::new()
            .name("featurize-feeder".into())
            .spawn(move || {
                let mut admitted = 0;
                let fed = feed(rows, &admit, &pool, &encoder, column, &tx, &mut admitted);
                let _ = tx.send(Event::Exhausted { admitted });
                fed.map(|()| admitted)
            })
            .map_err(|source| FeaturizeError::Spawn {
                what: "feeder thread",
                source,
            })?;

        Ok(OrderedResults {
            events: rx,
            pending: BTreeMap::new(),
            submitted: VecDeque::new(),
            started: BTreeMap::new(),
            next: 0,
            end: None,
            row_timeout,
            feeder: Some(feeder),
        })
    }
}

fn feed(
    rows: impl Iterator<Item = Result<Row>>,
    admit: &Admitter,
    pool: &ThreadPool,
    encoder: &Arc<dyn Encoder>,
    column: usize,
    events: &Sender<Event>,
    admitted: &mut u64,
) -> Result<()> {
    for row in rows {
        let row = row?;
        admit.acquire().map_err(|_| FeaturizeError::GateClosed)?;

        let index = row.index;
        events
            .send(Event::Submitted { index })
            .map_err(|_| FeaturizeError::GateClosed)?;

        let encoder = Arc::clone(encoder);
        let done = events.clone();
        pool.spawn(move || {
            let _ = done.send(Event::Started {
                index,
                at: Instant::now(),
            });
            let outcome = encode_guarded(encoder.as_ref(), &row, column);
            // the consumer may already be gone after a fatal error
            let _ = done.send(Event::Done(RowResult { index, outcome }));
        });
        *admitted += 1;
    }
    Ok(())
}

/// Results of [`WorkerPool::map_ordered`], yielded in row order.
pub struct OrderedResults {
    events: Receiver<Event>,
    pending: BTreeMap<u64, Outcome>,
    submitted: VecDeque<u64>,
    started: BTreeMap<u64, Instant>,
    next: u64,
    end: Option<u64>,
    row_timeout: Option<Duration>,
    feeder: Option<JoinHandle<Result<u64>>>,
}

impl OrderedResults {
    /// Wait for the feeder and return how many rows it admitted.
    ///
    /// Call once the stream is exhausted to surface read errors that ended it early.
    ///
    /// # Errors
    /// Returns the error that stopped the feeder, if any.
    pub fn finish(mut self) -> Result<u64> {
        match self.feeder.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            },
            None => Ok(self.next),
        }
    }

    /// Rows yielded so far.
    #[must_use]
    pub fn yielded(&self) -> u64 {
        self.next
    }

    /// Deadline of the row at the head of the order, once a worker has it.
    fn head_deadline(&self) -> Option<Instant> {
        let timeout = self.row_timeout?;
        self.started.get(&self.next).map(|&at| at + timeout)
    }

    fn emit(&mut self, outcome: Outcome) -> RowResult {
        let index = self.next;
        self.next += 1;
        while self.submitted.front().is_some_and(|&i| i < self.next) {
            self.submitted.pop_front();
        }
        self.started = self.started.split_off(&self.next);
        RowResult { index, outcome }
    }
}

impl Iterator for OrderedResults {
    type Item = RowResult;

    fn next(&mut self) -> Option<RowResult> {
        loop {
            if let Some(outcome) = self.pending.remove(&self.next) {
                return Some(self.emit(outcome));
            }
            // a job stuck past its timeout must not hold the stream open
            if self.end == Some(self.next) {
                return None;
            }

            let received = match self.head_deadline() {
                Some(deadline) => self.events.recv_deadline(deadline),
                None => self
                    .events
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Event::Submitted { index }) => self.submitted.push_back(index),
                Ok(Event::Started { index, at }) => {
                    if index >= self.next {
                        self.started.insert(index, at);
                    }
                }
                Ok(Event::Exhausted { admitted }) => self.end = Some(admitted),
                Ok(Event::Done(result)) => {
                    // results older than the head belong to rows already timed out
                    if result.index >= self.next {
                        self.pending.insert(result.index, result.outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let timeout = self.row_timeout.unwrap_or_default();
                    warn!(row = self.next, ?timeout, "row timed out; recording it invalid");
                    return Some(self.emit(Outcome::Invalid(InvalidReason::TimedOut(timeout))));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let head_outstanding =
                        self.submitted.front().is_some_and(|&i| i == self.next);
                    if self.pending.is_empty() && !head_outstanding {
                        return None;
                    }
                    warn!(row = self.next, "row vanished without a result");
                    return Some(self.emit(Outcome::Invalid(InvalidReason::Lost)));
                }
            }
        }
    }
}
