use anyhow::Result;
use molprint::io::compression::{codec_for_path, open_reader};
use molprint::testing::{SAMPLE_SMILES, StubEncoder, write_smiles_csv};
use molprint::{FeaturizeConfig, Featurizer};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn featurize_bytes(input: &Path, out_dir: &Path) -> Result<(Vec<u8>, u64)> {
    let config = FeaturizeConfig::default().with_output_dir(out_dir);
    let out = Featurizer::new(Arc::new(StubEncoder::new(8)), config).run(input)?;
    Ok((std::fs::read(&out.dataset_path)?, out.total_rows))
}

fn assert_same_as_plain(ext: &str) -> Result<()> {
    let dir = tempdir()?;
    let plain = write_smiles_csv(dir.path().join("lib.csv"), SAMPLE_SMILES)?;
    let packed = write_smiles_csv(dir.path().join(format!("lib.csv.{ext}")), SAMPLE_SMILES)?;
    assert!(codec_for_path(&packed).is_some());
    assert_ne!(std::fs::read(&plain)?, std::fs::read(&packed)?);

    let expected = featurize_bytes(&plain, &dir.path().join("plain"))?;
    let actual = featurize_bytes(&packed, &dir.path().join(ext))?;
    assert_eq!(actual.1, SAMPLE_SMILES.len() as u64);
    assert_eq!(expected, actual);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_input_matches_plain() -> Result<()> {
    assert_same_as_plain("gz")
}

#[cfg(feature = "compression-zstd")]
#[test]
fn zstd_input_matches_plain() -> Result<()> {
    assert_same_as_plain("zst")
}

#[cfg(feature = "compression-bzip2")]
#[test]
fn bzip2_input_matches_plain() -> Result<()> {
    assert_same_as_plain("bz2")
}

#[cfg(feature = "compression-xz")]
#[test]
fn xz_input_matches_plain() -> Result<()> {
    assert_same_as_plain("xz")
}

#[test]
fn extension_detection_is_case_insensitive() {
    assert!(codec_for_path("LIB.SMI.GZ").is_some() || !cfg!(feature = "compression-gzip"));
    assert!(codec_for_path("lib.smi").is_none());
    assert!(codec_for_path("lib.gz.smi").is_none());
}

#[test]
fn plain_files_read_through_unchanged() -> Result<()> {
    let dir = tempdir()?;
    let path = write_smiles_csv(dir.path().join("p.csv"), &["C"])?;
    let mut text = String::new();
    open_reader(&path)?.read_to_string(&mut text)?;
    assert_eq!(text, "id,smiles\n0,C\n");
    Ok(())
}
