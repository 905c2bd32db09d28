use assert_cmd::cargo::cargo_bin_cmd;
use pulse_lib::metrics::HeartRateEstimate;
use pulse_lib::pipeline::Phase;
use pulse_lib::quality::{QualityAssessment, QualityClass};
use pulse_lib::record::read_records;
use serde::Deserialize;
use std::{error::Error, path::PathBuf};

#[derive(Debug, Deserialize)]
struct SnapshotLine {
    tick: u64,
    phase: Phase,
    valleys: usize,
    heart_rate: HeartRateEstimate,
    quality: QualityAssessment,
    buffer: Option<Vec<f64>>,
}

fn parse_lines(stdout: &[u8]) -> Result<Vec<SnapshotLine>, Box<dyn Error>> {
    let text = std::str::from_utf8(stdout)?;
    let mut out = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}

#[test]
fn replay_with_model_reports_quality_and_rate() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "run",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--config",
        &sample_path("test_data/pipeline.toml"),
        "--model",
        &sample_path("test_data/quality_model.json"),
        "--start-time",
        "0",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let lines = parse_lines(&output)?;

    assert_eq!(lines.len(), 1);
    let last = &lines[0];
    assert_eq!(last.tick, 600);
    assert_eq!(last.phase, Phase::Active);
    assert!(last.valleys >= 8);
    assert!((57..=63).contains(&last.heart_rate.bpm));
    assert_eq!(last.quality.class, QualityClass::Excellent);
    assert!(last.buffer.is_none());
    Ok(())
}

#[test]
fn bad_quality_model_holds_estimates_at_zero() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "run",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--model",
        &sample_path("test_data/quality_model_8.json"),
        "--start-time",
        "0",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let last = parse_lines(&output)?.pop().ok_or("no output")?;
    assert_eq!(last.quality.class, QualityClass::Bad);
    assert_eq!(last.heart_rate.bpm, 0);
    assert_eq!(last.valleys, 0);
    Ok(())
}

#[test]
fn every_prints_periodic_snapshots() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "run",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--every",
        "100",
        "--with-buffer",
        "--start-time",
        "0",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let lines = parse_lines(&output)?;

    let ticks: Vec<u64> = lines.iter().map(|l| l.tick).collect();
    assert_eq!(ticks, vec![100, 200, 300, 400, 500, 600]);
    assert_eq!(lines[0].phase, Phase::Active);
    assert_eq!(lines[0].buffer.as_ref().map(Vec::len), Some(100));
    assert_eq!(lines[5].buffer.as_ref().map(Vec::len), Some(300));
    // no model: quality never leaves Unknown
    assert!(lines.iter().all(|l| l.quality.class == QualityClass::Unknown));
    Ok(())
}

#[test]
fn worker_inference_settles_before_exit() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "run",
        "--worker",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--model",
        &sample_path("test_data/quality_model.json"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let last = parse_lines(&output)?.pop().ok_or("no output")?;
    assert_eq!(last.quality.class, QualityClass::Excellent);
    Ok(())
}

#[test]
fn records_are_appended_on_schedule() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("records.jsonl");
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "run",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--record-out",
        out.to_str().expect("utf8 path"),
        "--subject",
        "s01",
        "--record-every-s",
        "5",
        "--start-time",
        "0",
    ]);
    cmd.assert().success();

    let records = read_records(&out)?;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.subject_id == "s01"));
    assert!(records.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    assert!(records[2].heart_rate.bpm > 0);
    Ok(())
}

#[test]
fn invalid_config_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("bad.toml");
    std::fs::write(&cfg, "capacity = 50\nmin_samples = 100\n")?;
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["run", "--config", cfg.to_str().expect("utf8 path")])
        .write_stdin("1\n");
    cmd.assert().failure();
    Ok(())
}

#[test]
fn unreadable_model_degrades_to_unknown_quality() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("broken.json");
    std::fs::write(&model, "{ not json")?;
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "run",
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--model",
        model.to_str().expect("utf8 path"),
        "--start-time",
        "0",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let last = parse_lines(&output)?.pop().ok_or("no output")?;
    assert_eq!(last.quality.class, QualityClass::Unknown);
    assert!((57..=63).contains(&last.heart_rate.bpm));
    Ok(())
}

#[test]
fn config_inference_mode_is_kept_without_flag() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("worker.toml");
    std::fs::write(&cfg, "inference = \"worker\"\n")?;
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "run",
        "--log-level",
        "info",
        "--config",
        cfg.to_str().expect("utf8 path"),
        "--input",
        &sample_path("test_data/ppg_sine_60bpm.txt"),
        "--model",
        &sample_path("test_data/quality_model.json"),
    ]);
    let output = cmd.assert().success().get_output().clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("(Worker inference)"), "stderr: {stderr}");
    let last = parse_lines(&output.stdout)?.pop().ok_or("no output")?;
    assert_eq!(last.quality.class, QualityClass::Excellent);
    Ok(())
}

#[test]
fn non_positive_record_interval_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("records.jsonl");
    for interval in ["0", "-1"] {
        let mut cmd = cargo_bin_cmd!("pulse");
        cmd.args([
            "run",
            "--input",
            &sample_path("test_data/ppg_sine_60bpm.txt"),
            "--record-out",
            out.to_str().expect("utf8 path"),
            "--record-every-s",
            interval,
        ]);
        cmd.assert().failure();
    }
    assert!(!out.exists());
    Ok(())
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
