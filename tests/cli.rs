use anyhow::Result;
use molprint::testing::{write_descriptor_file, write_smiles_csv};
use std::process::Command;
use tempfile::tempdir;

fn molprint() -> Command {
    Command::new(env!("CARGO_BIN_EXE_molprint"))
}

#[test]
fn prints_the_dataset_path() -> Result<()> {
    let dir = tempdir()?;
    let input = write_smiles_csv(dir.path().join("cli.csv"), &["CCO", "INVALID", "CCN"])?;
    let metrics = dir.path().join("m.json");

    let out = molprint()
        .arg(&input)
        .args(["--jobs", "-2", "--length", "64", "--output-dir"])
        .arg(dir.path())
        .arg("--metrics")
        .arg(&metrics)
        .output()?;

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let printed = String::from_utf8(out.stdout)?;
    assert_eq!(printed.trim(), dir.path().join("cli.fpd").display().to_string());
    assert!(String::from_utf8_lossy(&out.stderr).contains("1 of 3 rows"));

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&metrics)?)?;
    assert_eq!(json["rows_valid"]["value"], 2);
    Ok(())
}

#[test]
fn exits_non_zero_on_errors() -> Result<()> {
    let dir = tempdir()?;
    let empty = dir.path().join("empty.csv");
    std::fs::write(&empty, "")?;
    let out = molprint().arg(&empty).arg("--output-dir").arg(dir.path()).output()?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("is empty"));

    let tabbed = write_descriptor_file(
        dir.path().join("tabbed.smi"),
        None,
        &["0\tCCO".into()],
    )?;
    let out = molprint()
        .arg(&tabbed)
        .args(["--no-header", "--output-dir"])
        .arg(dir.path())
        .output()?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Example row"));
    Ok(())
}
