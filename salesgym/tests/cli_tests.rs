// tests/cli_tests.rs
//
// End-to-end tests of the salesgym binary.

use std::path::PathBuf;
use std::process::{Command, Output};

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_salesgym"));
    cmd.env_remove("SALESGYM_PRESET")
        .env_remove("SALESGYM_MAX_TURNS")
        .env_remove("SALESGYM_STEP_NOISE_STD")
        .env_remove("SALESGYM_INIT_NOISE_STD")
        .env_remove("SALESGYM_TELEMETRY_MODE")
        .env("RUST_LOG", "warn");
    cmd
}

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/scenario.yaml")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn validate_accepts_fixture() {
    let out = bin().arg("validate").arg(fixture()).output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    assert!(text.starts_with("ok: scenario (sha256:"));
    assert!(text.contains("close*"));
}

#[test]
fn validate_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    let text = std::fs::read_to_string(fixture())
        .unwrap()
        .replace("commitment: 0.5 }", "commitment: 1.5 }");
    std::fs::write(&path, text).unwrap();

    let out = bin().arg("validate").arg(&path).output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("thresholds.commitment"));
}

#[test]
fn show_prints_preset_as_json() {
    let out = bin()
        .args(["show", "--preset", "prompt", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(value["name"], "prompt");
    assert!(value["stages"].as_array().is_some_and(|s| s.len() == 4));
}

#[test]
fn show_respects_env_preset_and_overrides() {
    let out = bin()
        .args(["show", "--json"])
        .env("SALESGYM_PRESET", "prompt")
        .env("SALESGYM_MAX_TURNS", "7")
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(value["name"], "prompt");
    assert_eq!(value["max_turns"], 7);
}

#[test]
fn eval_writes_summary_and_telemetry() {
    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("out/summary.json");
    let telemetry_path = dir.path().join("telemetry.jsonl");
    let out = bin()
        .arg("eval")
        .arg("--config")
        .arg(fixture())
        .args(["--episodes", "12", "--threads", "3", "--seed", "5"])
        .arg("--json")
        .arg(&summary_path)
        .env("SALESGYM_TELEMETRY_MODE", "jsonl")
        .env("SALESGYM_TELEMETRY_PATH", &telemetry_path)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(summary["episodes"], 12);
    assert_eq!(summary["policy_version"], "readiness-v1");

    let lines: Vec<serde_json::Value> = std::fs::read_to_string(&telemetry_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 13);
    assert!(lines.iter().all(|l| l["schema_version"] == 1));
    assert_eq!(lines[12]["kind"], "eval_summary");
}

#[test]
fn scripted_policy_needs_known_actions() {
    let out = bin()
        .args(["eval", "--policy", "scripted", "--script", "pitch,dance"])
        .arg("--config")
        .arg(fixture())
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("dance"));
}

#[test]
fn play_prints_transcript() {
    let out = bin()
        .arg("play")
        .arg("--config")
        .arg(fixture())
        .args(["--policy", "scripted", "--script", "pitch,pitch,reassure,secure"])
        .args(["--persona", "cautious", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let t: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(t["outcome"], "success");
    assert_eq!(t["turn"], 5);
}

#[test]
fn collect_writes_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("traj");
    let out = bin()
        .args(["collect", "--preset", "appointment", "--episodes", "6", "--envs", "4"])
        .arg("--out")
        .arg(&out_dir)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out_dir.join("metadata.json")).unwrap())
            .unwrap();
    assert_eq!(meta["num_episodes"], 6);
    let lines = std::fs::read_to_string(out_dir.join("trajectories.jsonl"))
        .unwrap()
        .lines()
        .count();
    assert_eq!(meta["num_transitions"], lines as u64);
}
