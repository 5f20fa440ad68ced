//! Drives the `polarkin simulate` binary end to end
use anyhow::Result;
use std::{fs, path::Path, process::Command};

const RADIAL_MOVE: &str = r#"
[[stepper]]
name = "arm"
axis = "r"
step_distance = 0.01

[[stepper]]
name = "bed"
axis = "a"
step_distance = 0.001

[start]
position = [5.0, 0.0, 0.0]

[[move]]
to = [10.0, 0.0, 0.0]
velocity = 10.0
"#;

fn simulate(config: &Path, extra: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_polarkin"))
        .arg("simulate")
        .arg(config)
        .args(extra)
        .env("RUST_LOG", "warn")
        .output()?;
    Ok(output)
}

#[test]
fn test_json_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("radial.toml");
    fs::write(&path, RADIAL_MOVE)?;

    let output = simulate(&path, &["--json", "--flush-interval", "0.1"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["moves"], 1);
    assert_eq!(report["end_time"], 0.5);

    let arm = &report["steppers"][0];
    assert_eq!(arm["name"], "arm");
    assert_eq!(arm["steps"], 500);
    assert_eq!(arm["net_steps"], 500);
    assert_eq!(arm["dir_changes"], 0);

    // straight out along +x never turns the bed
    let bed = &report["steppers"][1];
    assert_eq!(bed["steps"], 0);
    assert_eq!(bed["first_step_time"], serde_json::Value::Null);
    Ok(())
}

#[test]
fn test_text_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("radial.toml");
    fs::write(&path, RADIAL_MOVE)?;

    let output = simulate(&path, &[])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("1 moves"));
    assert!(stdout.contains("arm (r): 500 steps, net 500, 0 direction changes"));
    assert!(stdout.contains("bed (a): 0 steps"));
    Ok(())
}

#[test]
fn test_unknown_axis_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bad.toml");
    fs::write(&path, RADIAL_MOVE.replace("axis = \"r\"", "axis = \"q\""))?;

    let output = simulate(&path, &[])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown polar axis selector 'q'"), "{stderr}");
    Ok(())
}

#[test]
fn test_rejects_non_positive_flush_interval() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("radial.toml");
    fs::write(&path, RADIAL_MOVE)?;

    let output = simulate(&path, &["--flush-interval", "0"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--flush-interval"));
    Ok(())
}
