use anyhow::Result;
use molprint::testing::{StubEncoder, write_smiles_csv};
use molprint::{FeaturizeConfig, Featurizer, InvalidRowSet};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn descriptors() -> Vec<String> {
    (0..2500)
        .map(|i| match i % 11 {
            4 => format!("bad{i}"),
            7 => format!("slow{i}"),
            9 => format!("panic{i}"),
            _ => format!("CC{i}"),
        })
        .collect()
}

fn run_once(input: &Path, out_dir: &Path, jobs: i64) -> Result<(Vec<u8>, InvalidRowSet)> {
    let encoder =
        Arc::new(StubEncoder::new(32).with_slow_delay(std::time::Duration::from_millis(1)));
    let config = FeaturizeConfig::default()
        .with_output_dir(out_dir)
        .with_jobs(jobs);
    let out = Featurizer::new(encoder, config).run(input)?;
    Ok((std::fs::read(&out.dataset_path)?, out.invalid_rows))
}

#[test]
fn repeated_runs_produce_identical_output() -> Result<()> {
    let dir = tempdir()?;
    let d = descriptors();
    let refs: Vec<&str> = d.iter().map(String::as_str).collect();
    let input = write_smiles_csv(dir.path().join("det.csv"), &refs)?;

    let first = run_once(&input, &dir.path().join("a"), 4)?;
    let second = run_once(&input, &dir.path().join("b"), 4)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn output_does_not_depend_on_the_worker_count() -> Result<()> {
    let dir = tempdir()?;
    let d = descriptors();
    let refs: Vec<&str> = d.iter().map(String::as_str).collect();
    let input = write_smiles_csv(dir.path().join("det.csv"), &refs)?;

    let baseline = run_once(&input, &dir.path().join("j1"), 1)?;
    assert!(!baseline.1.is_empty());
    for jobs in [2, 3, -1, -2] {
        let other = run_once(&input, &dir.path().join(format!("j{jobs}")), jobs)?;
        assert_eq!(baseline, other, "jobs = {jobs}");
    }
    Ok(())
}
