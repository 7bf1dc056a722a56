use anyhow::Result;
use molprint::gate::{self, capacity_for};
use molprint::io::rows::Row;
use molprint::metrics::names;
use molprint::pool::WorkerPool;
use molprint::testing::{StubEncoder, write_smiles_csv};
use molprint::{CHUNK_ROWS, FeaturizeConfig, Featurizer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn a_slow_consumer_throttles_the_feeder() -> Result<()> {
    let capacity = 16;
    let pool = WorkerPool::new(Arc::new(StubEncoder::new(4)), 0, 2)?;
    let (admit, release) = gate::bounded(capacity);
    let rows: Vec<molprint::Result<Row>> = (0..200u64)
        .map(|i| Ok(Row::new(i, [format!("C{i}")])))
        .collect();
    let mut results = pool.map_ordered(rows, admit, None)?;

    // nothing consumed yet, so the feeder stalls at the bound
    thread::sleep(Duration::from_millis(100));
    assert_eq!(release.in_flight(), capacity);

    let mut resolved = 0;
    for r in results.by_ref() {
        assert!(r.outcome.is_valid());
        assert!(release.in_flight() <= capacity);
        thread::sleep(Duration::from_millis(1));
        assert!(release.release());
        resolved += 1;
    }
    assert_eq!(resolved, 200);
    assert_eq!(results.finish()?, 200);
    assert_eq!(release.peak(), capacity);
    assert_eq!(release.in_flight(), 0);
    Ok(())
}

#[test]
fn gate_size_is_recorded_for_the_run() -> Result<()> {
    let dir = tempdir()?;
    // several chunks more than the gate admits for one worker
    let n = 5 * CHUNK_ROWS;
    let d: Vec<String> = (0..n).map(|i| format!("C{i}")).collect();
    let refs: Vec<&str> = d.iter().map(String::as_str).collect();
    let input = write_smiles_csv(dir.path().join("big.csv"), &refs)?;

    let config = FeaturizeConfig::default()
        .with_output_dir(dir.path())
        .with_jobs(1);
    let out = Featurizer::new(Arc::new(StubEncoder::new(8)), config).run(&input)?;

    let capacity = capacity_for(1, CHUNK_ROWS) as u64;
    assert_eq!(out.metrics.counter(names::GATE_CAPACITY), Some(capacity));
    let peak = out.metrics.counter(names::PEAK_IN_FLIGHT).unwrap_or(u64::MAX);
    assert!(peak <= capacity, "peak {peak} > capacity {capacity}");
    assert!(peak >= 1);
    assert_eq!(out.valid_rows, n as u64);
    Ok(())
}

#[test]
fn a_stalled_writer_blocks_the_producer() {
    let (admit, release) = gate::bounded(4);
    let admitted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&admitted);

    let producer = thread::spawn(move || {
        for _ in 0..5 {
            admit.acquire().unwrap();
        }
        flag.store(true, Ordering::SeqCst);
        admit
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!admitted.load(Ordering::SeqCst), "fifth row admitted past the bound");
    assert_eq!(release.in_flight(), 4);

    assert!(release.release());
    let admit = producer.join().unwrap();
    assert!(admitted.load(Ordering::SeqCst));
    assert_eq!(admit.peak(), 4);
}

#[test]
fn closing_the_gate_unblocks_the_producer() {
    let (admit, release) = gate::bounded(1);
    admit.acquire().unwrap();
    let producer = thread::spawn(move || admit.acquire());
    thread::sleep(Duration::from_millis(20));
    drop(release);
    assert!(producer.join().unwrap().is_err());
}
