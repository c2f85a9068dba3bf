//! End-to-end runs of the `dispatch` binary.

use assert_cmd::Command;

const SCENARIO: &str = r#"{
    "couriers": [
        {"id": "1", "name": "Volkov", "x": 0, "y": 0, "cargo_types": "parcel;food"}
    ],
    "orders": [
        {"id": "a", "price": 20, "pickup_x": 0, "pickup_y": 0,
         "dropoff_x": 10, "dropoff_y": 0, "cargo_type": "parcel"},
        {"id": "b", "price": 50, "pickup_x": 10, "pickup_y": 0,
         "dropoff_x": 10, "dropoff_y": 5, "cargo_type": "food"},
        {"id": "heavy", "price": 50, "weight": 1000, "pickup_x": 0, "pickup_y": 0,
         "dropoff_x": 1, "dropoff_y": 0, "cargo_type": "piano"}
    ]
}"#;

fn dispatch() -> Command {
    Command::cargo_bin("dispatch").expect("binary built")
}

#[test]
fn run_writes_export_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scenario = dir.path().join("scenario.json");
    let out = dir.path().join("out.json");
    std::fs::write(&scenario, SCENARIO).expect("write scenario");

    dispatch()
        .args(["run", "--scenario"])
        .arg(&scenario)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let export: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).expect("read out")).expect("json");
    let orders = export["orders"].as_array().expect("orders");
    assert_eq!(orders.len(), 3);
    let placed = orders
        .iter()
        .filter(|o| o["delivery"]["state"] == "assigned")
        .count();
    assert_eq!(placed, 2);
    assert!(export["generated_at"].is_string());
}

#[test]
fn run_prints_export_without_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scenario = dir.path().join("scenario.json");
    std::fs::write(&scenario, SCENARIO).expect("write scenario");

    let output = dispatch()
        .args(["run", "--scenario"])
        .arg(&scenario)
        .output()
        .expect("run");
    assert!(output.status.success());
    let export: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert!(!export["records"].as_array().expect("records").is_empty());
}

#[test]
fn interactive_session_reads_stdin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scenario = dir.path().join("scenario.json");
    let out = dir.path().join("out.json");
    std::fs::write(&scenario, SCENARIO).expect("write scenario");

    let output = dispatch()
        .args(["run", "--interactive", "--scenario"])
        .arg(&scenario)
        .arg("--out")
        .arg(&out)
        .write_stdin("remove courier:1\nlist\nquit\n")
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf-8");
    assert!(stdout.contains("removed courier:1"));
    assert!(stdout.contains("order:a\torder a\tunplaced\tunassigned"));
}

#[test]
fn missing_scenario_fails() {
    dispatch()
        .args(["run", "--scenario", "/nonexistent/scenario.json"])
        .assert()
        .failure();
}
