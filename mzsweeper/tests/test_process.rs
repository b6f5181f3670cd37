use std::{error::Error, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzsweeper")?;

    cmd.arg("not_real.mzML").arg("-o").arg("-");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("NotFound"));
    Ok(())
}

#[test]
fn test_not_mzml() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzsweeper")?;

    cmd.arg("../test/data/catalog.toml").arg("-o").arg("-");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("NotMzML"));
    Ok(())
}

#[test]
fn test_malformed_charge() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzsweeper")?;

    cmd.arg("../test/data/energy_ramp.mzML").args(["-z", "0+"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Charge state must be positive"));
    Ok(())
}

#[test]
fn test_unknown_output_format() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzsweeper")?;

    cmd.arg("../test/data/energy_ramp.mzML")
        .args(["-o", "peaks.mzML"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "OutputFormatUnknownOrNotSupportedError(\"peaks.mzML\")",
    ));
    Ok(())
}

#[test]
fn test_out_of_range() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzsweeper")?;

    cmd.arg("../test/data/energy_ramp.mzML").args(["-e", "30"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("OutOfRange { target: 30.0"));
    Ok(())
}

#[test]
fn test_run_ramp() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzsweeper")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("../test/data/energy_ramp.mzML")
        .args(["-o", "-", "-e", "10,12.5", "-p", "MRFA", "-z", "1+"])
        .args(["--ions", "b2,y2"]);
    let result = cmd.assert().success();
    result
        .stderr(predicate::str::contains("MS1 Scans: 1"))
        .stderr(predicate::str::contains("MSn Scans: 10"))
        .stderr(predicate::str::contains("Energies: 2 | Interpolated: 1"))
        .stderr(predicate::str::contains("Fragments: 4 | Matched: 4"))
        .stdout(predicate::str::contains("\"interpolated\": true"));
    Ok(())
}

#[test]
fn test_run_catalog() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("mzsweeper")?;
    cmd.env("RUST_LOG", "info");
    cmd.args(["--catalog", "../test/data/catalog.toml"])
        .args(["-d", "MRFA:1+:Turbo:Iso 1", "-o", "-"]);
    let result = cmd.assert().success();
    result
        .stderr(predicate::str::contains("Annotating MRFA at charge 1"))
        .stderr(predicate::str::contains("Energies: 5 | Interpolated: 0"));
    Ok(())
}
