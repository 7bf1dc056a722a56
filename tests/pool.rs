use anyhow::Result;
use molprint::CHUNK_ROWS;
use molprint::encoder::Encoder;
use molprint::gate::{self, capacity_for};
use molprint::io::rows::Row;
use molprint::pool::{InvalidReason, Outcome, WorkerPool, encode_row};
use molprint::testing::StubEncoder;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn rows(descriptors: &[&str]) -> Vec<molprint::Result<Row>> {
    descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| Ok(Row::new(i as u64, [d])))
        .collect()
}

#[test]
fn results_come_back_in_submission_order() -> Result<()> {
    // early rows are slow, so later rows finish first
    let descriptors: Vec<String> = (0..200)
        .map(|i| if i % 10 == 0 { format!("slow{i}") } else { format!("C{i}") })
        .collect();
    let refs: Vec<&str> = descriptors.iter().map(String::as_str).collect();
    let encoder = Arc::new(StubEncoder::new(4).with_slow_delay(Duration::from_millis(15)));
    let pool = WorkerPool::new(encoder.clone(), 0, 4)?;
    let (admit, release) = gate::bounded(64);

    let mut results = pool.map_ordered(rows(&refs), admit, None)?;
    let mut seen = Vec::new();
    for r in results.by_ref() {
        assert!(release.release());
        match r.outcome {
            Outcome::Valid(v) => assert_eq!(v, encoder.expected(refs[r.index as usize])),
            Outcome::Invalid(reason) => panic!("row {} invalid: {reason:?}", r.index),
        }
        seen.push(r.index);
    }
    assert_eq!(results.finish()?, 200);
    assert_eq!(seen, (0..200).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn failures_are_tagged_not_raised() -> Result<()> {
    let pool = WorkerPool::new(Arc::new(StubEncoder::new(3)), 0, 2)?;
    let (admit, release) = gate::bounded(16);
    let input = ["C", "bad", "errX", "shortC", "panic", "CC"];

    let out: Vec<_> = pool
        .map_ordered(rows(&input), admit, None)?
        .inspect(|_| {
            release.release();
        })
        .map(|r| r.outcome)
        .collect();

    assert_eq!(out.len(), 6);
    assert!(out[0].is_valid());
    assert!(matches!(out[1], Outcome::Invalid(InvalidReason::Encode(_))));
    assert!(matches!(out[2], Outcome::Invalid(InvalidReason::Encode(_))));
    assert_eq!(
        out[3],
        Outcome::Invalid(InvalidReason::WrongLength { expected: 3, got: 2 })
    );
    assert!(matches!(out[4], Outcome::Invalid(InvalidReason::Panicked(_))));
    assert!(out[5].is_valid());
    Ok(())
}

#[test]
fn a_hung_row_times_out_and_the_stream_still_ends() -> Result<()> {
    let encoder = StubEncoder::new(2).with_hang_delay(Duration::from_secs(3));
    let pool = WorkerPool::new(Arc::new(encoder), 0, 2)?;
    let (admit, release) = gate::bounded(16);
    let input = ["C", "hang", "CC", "CCC"];

    let started = Instant::now();
    let mut results = pool.map_ordered(rows(&input), admit, Some(Duration::from_millis(200)))?;
    let out: Vec<_> = results
        .by_ref()
        .inspect(|_| {
            release.release();
        })
        .collect();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(results.finish()?, 4);

    let indices: Vec<u64> = out.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert!(matches!(
        out[1].outcome,
        Outcome::Invalid(InvalidReason::TimedOut(_))
    ));
    assert!(out[2].outcome.is_valid() && out[3].outcome.is_valid());
    Ok(())
}

#[test]
fn queue_wait_does_not_count_against_the_timeout() -> Result<()> {
    // 300 rows at 10 ms each on one worker queue for ~3 s, far past the timeout
    let encoder = StubEncoder::new(4).with_slow_delay(Duration::from_millis(10));
    let pool = WorkerPool::new(Arc::new(encoder), 0, 1)?;
    let (admit, release) = gate::bounded(capacity_for(1, CHUNK_ROWS));
    let descriptors: Vec<String> = (0..300).map(|i| format!("slow{i}")).collect();
    let refs: Vec<&str> = descriptors.iter().map(String::as_str).collect();

    let mut results = pool.map_ordered(rows(&refs), admit, Some(Duration::from_secs(1)))?;
    let invalid: Vec<(u64, &str)> = results
        .by_ref()
        .inspect(|_| {
            release.release();
        })
        .filter_map(|r| match r.outcome {
            Outcome::Valid(_) => None,
            Outcome::Invalid(reason) => Some((r.index, reason.label())),
        })
        .collect();

    assert_eq!(invalid, vec![]);
    assert_eq!(results.finish()?, 300);
    Ok(())
}

#[test]
fn read_errors_end_the_stream_and_surface_on_finish() -> Result<()> {
    let pool = WorkerPool::new(Arc::new(StubEncoder::new(2)), 0, 2)?;
    let (admit, release) = gate::bounded(16);
    let input: Vec<molprint::Result<Row>> = vec![
        Ok(Row::new(0, ["C"])),
        Err(molprint::FeaturizeError::Config("boom".into())),
        Ok(Row::new(1, ["CC"])),
    ];

    let mut results = pool.map_ordered(input, admit, None)?;
    let n = results
        .by_ref()
        .inspect(|_| {
            release.release();
        })
        .count();
    assert_eq!(n, 1);
    assert!(results.finish().is_err());
    Ok(())
}

#[test]
fn encode_row_checks_field_and_width() {
    let e = StubEncoder::new(4);
    let row = Row::new(0, ["id", "CCO"]);
    assert_eq!(encode_row(&e, &row, 1), Outcome::Valid(e.expected("CCO")));
    assert_eq!(
        encode_row(&e, &row, 2),
        Outcome::Invalid(InvalidReason::MissingField { column: 2, fields: 2 })
    );
    assert_eq!(e.len(), 4);
}

#[test]
fn reason_labels_are_stable() {
    assert_eq!(InvalidReason::Lost.label(), "lost");
    assert_eq!(InvalidReason::TimedOut(Duration::ZERO).label(), "timed_out");
    assert_eq!(
        InvalidReason::WrongLength { expected: 1, got: 0 }.label(),
        "wrong_length"
    );
}
