//! Backpressure gate bounding the number of rows in flight.
//!
//! The gate is a bounded channel of permits. The producer side
//! ([`Admitter`]) sends one permit per admitted row and blocks while the
//! channel is full; the consumer side ([`Releaser`]) takes one permit back per
//! durably resolved row. A row is "in flight" from admission until release, so
//! the channel capacity is a hard upper bound on rows read but not yet
//! resolved.
//!
//! Dropping the [`Releaser`] closes the gate: a producer blocked in
//! [`Admitter::acquire`] wakes up with [`GateClosed`] instead of waiting on a
//! writer that is gone.
//!
//! ```
//! use molprint::gate;
//!
//! let (admit, release) = gate::bounded(2);
//! admit.acquire().unwrap();
//! admit.acquire().unwrap();
//! assert_eq!(admit.in_flight(), 2);
//! release.release();
//! assert_eq!(admit.in_flight(), 1);
//! assert_eq!(admit.peak(), 2);
//! ```

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// The releasing side of the gate has been dropped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("backpressure gate closed")]
pub struct GateClosed;

/// Gate capacity for `workers` workers and `chunk_rows`-row storage chunks:
/// one chunk per worker plus two chunks of slack.
#[must_use]
pub fn capacity_for(workers: usize, chunk_rows: usize) -> usize {
    (workers + 2) * chunk_rows
}

/// Create a gate admitting at most `capacity` rows at a time (at least 1).
#[must_use]
pub fn bounded(capacity: usize) -> (Admitter, Releaser) {
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let peak = Arc::new(AtomicUsize::new(0));
    (
        Admitter {
            permits: tx,
            peak: Arc::clone(&peak),
            capacity,
        },
        Releaser {
            permits: rx,
            peak,
            capacity,
        },
    )
}

/// Producer side: acquires one permit per admitted row.
pub struct Admitter {
    permits: Sender<()>,
    peak: Arc<AtomicUsize>,
    capacity: usize,
}

impl Admitter {
    /// Admit one row, blocking while `capacity` rows are in flight.
    ///
    /// # Errors
    /// Returns [`GateClosed`] once the [`Releaser`] has been dropped.
    pub fn acquire(&self) -> Result<(), GateClosed> {
        self.permits.send(()).map_err(|_| GateClosed)?;
        self.peak.fetch_max(self.permits.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Rows currently admitted and not yet released.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.permits.len()
    }

    /// Highest in-flight count observed so far.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer side: releases one permit per resolved row.
pub struct Releaser {
    permits: Receiver<()>,
    peak: Arc<AtomicUsize>,
    capacity: usize,
}

impl Releaser {
    /// Return one permit to the gate.
    ///
    /// Returns `false` if no row was in flight, which means a release without
    /// a matching acquire.
    pub fn release(&self) -> bool {
        self.permits.try_recv().is_ok()
    }

    /// Rows currently admitted and not yet released.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.permits.len()
    }

    /// Highest in-flight count observed so far.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_blocks_until_a_release() {
        let (admit, release) = bounded(1);
        admit.acquire().unwrap();

        let waiter = thread::spawn(move || {
            admit.acquire().unwrap();
            admit
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        assert!(release.release());
        let admit = waiter.join().unwrap();
        assert_eq!(admit.in_flight(), 1);
        assert_eq!(release.peak(), 1);
    }

    #[test]
    fn dropping_the_releaser_wakes_a_blocked_producer() {
        let (admit, release) = bounded(1);
        admit.acquire().unwrap();
        let waiter = thread::spawn(move || admit.acquire());
        thread::sleep(Duration::from_millis(20));
        drop(release);
        assert_eq!(waiter.join().unwrap(), Err(GateClosed));
    }

    #[test]
    fn release_without_acquire_is_reported() {
        let (_admit, release) = bounded(4);
        assert!(!release.release());
    }

    #[test]
    fn capacity_is_one_chunk_per_worker_plus_two() {
        assert_eq!(capacity_for(4, 1024), 6 * 1024);
        assert_eq!(capacity_for(1, 10), 30);
    }
}
