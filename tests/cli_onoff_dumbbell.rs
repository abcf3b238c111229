use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "onoff-sim-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn onoff_dumbbell_writes_trace_files_and_summary() {
    let dir = unique_temp_dir("traces");
    let out = dir.join("out");
    let summary = dir.join("summary.json");

    let output = Command::new(env!("CARGO_BIN_EXE_onoff_dumbbell"))
        .args([
            "--gateways",
            "2",
            "--sim-time-s",
            "4",
            "--seed",
            "3",
            "--out-dir",
            out.to_str().unwrap(),
            "--summary-json",
            summary.to_str().unwrap(),
        ])
        .env("RUST_LOG", "warn")
        .output()
        .expect("run onoff_dumbbell");
    assert!(
        output.status.success(),
        "onoff_dumbbell failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    for i in 0..2 {
        for metric in ["cwnd", "rtt", "tx", "phytx"] {
            let path = out.join(format!("{metric}-{i}"));
            assert!(path.exists(), "missing {}", path.display());
        }
        let rtt = read_lines(&out.join(format!("rtt-{i}")));
        assert_eq!(rtt.first().map(String::as_str), Some("0.0 0"));
        assert!(!read_lines(&out.join(format!("cwnd-{i}"))).is_empty());
    }
    assert!(!out.join("cwnd-2").exists());

    let rx = read_lines(&out.join("rx"));
    assert!(!rx.is_empty());
    assert!(
        rx.iter()
            .all(|l| l.starts_with("10.1.0.1 ") || l.starts_with("10.1.1.1 "))
    );

    let raw = fs::read_to_string(&summary).expect("read summary.json");
    let v: Value = serde_json::from_str(&raw).expect("parse summary.json");
    assert_eq!(v.get("final_time_s").and_then(Value::as_f64), Some(9.0));
    let flows = v
        .get("flows")
        .and_then(Value::as_array)
        .expect("flows array");
    assert_eq!(flows.len(), 2);
    let tx_packets: u64 = flows
        .iter()
        .map(|f| f["source"]["packets_sent"].as_u64().expect("packets_sent"))
        .sum();
    assert!(tx_packets > 0);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("flow  0"), "stdout={stdout}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn onoff_dumbbell_reads_json_config() {
    let dir = unique_temp_dir("config");
    let out = dir.join("out");
    let config = write_file(
        &dir,
        "scenario.json",
        r#"
{
    "gateways": 1,
    "sim_time_s": 3.0,
    "stop_s": 3.5,
    "source": {
        "packet_size": 1000,
        "data_rate": "1Mbps",
        "on_time": { "kind": "constant", "secs": 0.5 },
        "off_time": { "kind": "constant", "secs": 0.5 }
    },
    "traces": { "phytx": false }
}
        "#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_onoff_dumbbell"))
        .args([
            "--config",
            config.to_str().unwrap(),
            "--out-dir",
            out.to_str().unwrap(),
        ])
        .env("RUST_LOG", "warn")
        .output()
        .expect("run onoff_dumbbell");
    assert!(
        output.status.success(),
        "onoff_dumbbell failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(out.join("tx-0").exists());
    assert!(!out.join("phytx-0").exists());
    let tx = read_lines(&out.join("tx-0"));
    assert!(tx.iter().all(|l| l.ends_with(" 1000")));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn onoff_dumbbell_rejects_degenerate_distributions() {
    let dir = unique_temp_dir("bad-dist");
    let output = Command::new(env!("CARGO_BIN_EXE_onoff_dumbbell"))
        .args([
            "--off-time",
            "exp:0",
            "--out-dir",
            dir.join("out").to_str().unwrap(),
        ])
        .output()
        .expect("run onoff_dumbbell");
    assert!(!output.status.success());
    assert!(!dir.join("out").join("rx").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn onoff_dumbbell_fails_on_unreadable_config() {
    let dir = unique_temp_dir("bad-config");
    let config = write_file(&dir, "scenario.json", "{ not json");
    let output = Command::new(env!("CARGO_BIN_EXE_onoff_dumbbell"))
        .args([
            "--config",
            config.to_str().unwrap(),
            "--out-dir",
            dir.join("out").to_str().unwrap(),
        ])
        .output()
        .expect("run onoff_dumbbell");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse config"), "stderr={stderr}");

    let _ = fs::remove_dir_all(&dir);
}
