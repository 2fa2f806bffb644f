use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::error::Error;
use tempfile::tempdir;

fn izhnet() -> Result<Command, Box<dyn Error>> {
    Ok(Command::cargo_bin("izhnet")?)
}

fn small_config(dir: &std::path::Path, seed: u64) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let path = dir.join(format!("small_{}.toml", seed));
    let text = format!(
        "seed = {}\nticks = 40\nexcitatory = 16\ninhibitory = 4\ndensity = 0.3\n\n\
         [input]\nrate_hz = 50.0\namplitude = 20.0\n\n\
         [[rewards]]\ntick = 20\namount = 1.0\n",
        seed
    );
    std::fs::write(&path, text)?;
    Ok(path)
}

fn run_json(args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let output = izhnet()?.args(args).output()?;
    assert!(output.status.success(), "run failed: {}", String::from_utf8_lossy(&output.stderr));
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn presets_lists_every_preset() -> Result<(), Box<dyn Error>> {
    izhnet()?
        .arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("regular_spiking"))
        .stdout(predicate::str::contains("LTS"));

    let output = izhnet()?.args(["presets", "--json"]).output()?;
    assert!(output.status.success());
    let rows: Vec<Value> = serde_json::from_slice(&output.stdout)?;
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0]["short"], "RS");
    Ok(())
}

#[test]
fn init_config_then_run() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = tmp.path().join("izhnet.toml");
    let config_str = config.to_str().ok_or("non-utf8 path")?;

    izhnet()?.args(["init-config", config_str]).assert().success();
    assert!(config.exists(), "template should be written");

    let summary = run_json(&["run", config_str, "--ticks", "50"])?;
    assert_eq!(summary["steps_executed"], 50);
    assert_eq!(summary["seed"], 42);
    assert_eq!(summary["populations"].as_array().map(Vec::len), Some(2));
    assert_eq!(summary["final_mean_weights"].as_object().map(|m| m.len()), Some(4));
    assert!(summary.get("spikes").is_none());
    Ok(())
}

#[test]
fn init_config_refuses_to_overwrite() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = tmp.path().join("izhnet.toml");
    std::fs::write(&config, "ticks = 5\n")?;
    let config_str = config.to_str().ok_or("non-utf8 path")?;

    izhnet()?.args(["init-config", config_str]).assert().failure();
    assert_eq!(std::fs::read_to_string(&config)?, "ticks = 5\n");

    izhnet()?.args(["init-config", config_str, "--force"]).assert().success();
    assert!(std::fs::read_to_string(&config)?.contains("[network]"));
    Ok(())
}

#[test]
fn invalid_config_fails() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = tmp.path().join("bad.toml");
    std::fs::write(&config, "density = 2.0\n")?;

    izhnet()?
        .args(["run", config.to_str().ok_or("non-utf8 path")?])
        .assert()
        .failure()
        .stderr(predicate::str::contains("density"));

    std::fs::write(&config, "excitatory_preset = \"FS\"\n")?;
    izhnet()?
        .args(["run", config.to_str().ok_or("non-utf8 path")?])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn same_seed_same_output() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = small_config(tmp.path(), 3)?;
    let config_str = config.to_str().ok_or("non-utf8 path")?;

    let a = izhnet()?.args(["run", config_str, "--spikes"]).output()?;
    let b = izhnet()?.args(["run", config_str, "--spikes"]).output()?;
    assert!(a.status.success() && b.status.success());
    assert_eq!(a.stdout, b.stdout);

    let summary: Value = serde_json::from_slice(&a.stdout)?;
    let spikes = summary["spikes"].as_array().ok_or("spikes missing")?;
    let total: u64 = summary["populations"]
        .as_array()
        .ok_or("populations missing")?
        .iter()
        .filter_map(|p| p["spikes"].as_u64())
        .sum();
    assert_eq!(spikes.len() as u64, total);
    Ok(())
}

#[test]
fn output_flag_writes_file() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = small_config(tmp.path(), 9)?;
    let out = tmp.path().join("summary.json");

    izhnet()?
        .args([
            "run",
            config.to_str().ok_or("non-utf8 path")?,
            "--output",
            out.to_str().ok_or("non-utf8 path")?,
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let summary: Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    assert_eq!(summary["steps_executed"], 40);
    assert_eq!(summary["cancelled"], false);
    Ok(())
}

#[cfg(unix)]
#[test]
fn interrupted_run_reports_partial_summary_and_fails() -> Result<(), Box<dyn Error>> {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;
    use std::time::Duration;

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("izhnet"))
        .args(["--verbose", "run", "--ticks", "100000000"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr = child.stderr.take().ok_or("stderr not captured")?;
    let mut lines = BufReader::new(stderr).lines();
    loop {
        let line = lines.next().ok_or("exited before watching for interrupts")??;
        if line.contains("Watching for interrupts") {
            break;
        }
    }
    let drain = std::thread::spawn(move || lines.count());
    std::thread::sleep(Duration::from_millis(300));

    let status = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()?;
    assert!(status.success());

    let output = child.wait_with_output()?;
    drain.join().map_err(|_| "stderr reader panicked")?;
    assert!(!output.status.success());

    let summary: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["cancelled"], true);
    let steps = summary["steps_executed"].as_u64().ok_or("steps missing")?;
    assert!(steps < 100_000_000);
    Ok(())
}
