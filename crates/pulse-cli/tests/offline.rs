use assert_cmd::cargo::cargo_bin_cmd;
use pulse_lib::metrics::{HRVTime, HeartRateEstimate, HrvEstimate};
use pulse_lib::signal::Valley;
use serde::Deserialize;
use std::{error::Error, path::PathBuf};

#[derive(Deserialize)]
struct HrvOutput {
    estimate: HrvEstimate,
    time: HRVTime,
}

#[derive(Deserialize)]
struct HeartRateOutput {
    valleys: usize,
    heart_rate: HeartRateEstimate,
}

#[derive(Deserialize)]
struct FeatureOutput {
    names: Vec<String>,
    values: Vec<f64>,
}

#[test]
fn hrv_from_rr_file() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["hrv", "--input", &sample_path("test_data/rr_sample.txt")]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let actual: HrvOutput = serde_json::from_slice(&output)?;

    assert_eq!(actual.estimate.sdnn, 9.0);
    assert_eq!(actual.estimate.confidence, 89.0);
    assert_eq!(actual.time.n, 4);
    assert_close(actual.time.avnn, 801.25, 1e-9);
    assert_close(actual.time.sdnn, 8.539, 1e-3);
    assert_close(actual.time.rmssd, 15.546, 1e-3);
    assert_eq!(actual.time.pnn50, 0.0);
    Ok(())
}

#[test]
fn hrv_reads_stdin() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.arg("hrv").write_stdin("800\n810\n790\n805\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let actual: HrvOutput = serde_json::from_slice(&output)?;
    assert_eq!(actual.estimate.sdnn, 9.0);
    Ok(())
}

#[test]
fn valleys_are_one_period_apart() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "valleys",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--fps",
        "30",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let valleys: Vec<Valley> = serde_json::from_slice(&output)?;

    assert!(valleys.len() >= 17, "only {} valleys", valleys.len());
    for pair in valleys.windows(2) {
        let gap = pair[1].index - pair[0].index;
        assert!((27..=33).contains(&gap), "gap {gap}");
        assert_close(pair[1].time - pair[0].time, gap as f64 / 30.0, 1e-9);
    }
    Ok(())
}

#[test]
fn heart_rate_of_synthetic_pulse() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "heart-rate",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let actual: HeartRateOutput = serde_json::from_slice(&output)?;

    assert!(actual.valleys >= 17);
    assert!((58..=62).contains(&actual.heart_rate.bpm));
    assert!(actual.heart_rate.confidence > 80.0);
    Ok(())
}

#[test]
fn features_follow_requested_arity() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "features",
        "--arity",
        "8",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let actual: FeatureOutput = serde_json::from_slice(&output)?;
    assert_eq!(actual.values.len(), 8);
    assert_eq!(actual.names[0], "mean");
    assert_eq!(actual.names[7], "snr");
    assert!(actual.values.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn unsupported_arity_fails() {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["features", "--arity", "9"]).write_stdin("1\n2\n");
    cmd.assert().failure();
}

#[test]
fn non_numeric_input_fails() {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["hrv"]).write_stdin("800\nabc\n");
    cmd.assert().failure();
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(diff <= tol, "diff {diff} exceeded tol {tol} ({a} vs {b})");
}

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .expect("crates dir")
        .parent()
        .expect("workspace root")
        .to_path_buf()
}

fn sample_path(relative: &str) -> String {
    workspace_root()
        .join(relative)
        .to_string_lossy()
        .to_string()
}
