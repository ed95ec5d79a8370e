//! CLI tests for commands that never consult the oracle.

use std::process::Command;

use taskloop::exit_codes;

#[test]
fn tools_prints_the_builtin_catalog() {
    let output = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .arg("tools")
        .output()
        .expect("taskloop tools");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let catalog: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let names: Vec<&str> = catalog
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "delete_file",
            "edit_file",
            "list_directory",
            "read_file",
            "run_command",
            "search_files",
            "write_file",
        ]
    );
}

#[test]
fn init_writes_a_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let init = || {
        Command::new(env!("CARGO_BIN_EXE_taskloop"))
            .args(["init", "--workdir"])
            .arg(temp.path())
            .status()
            .expect("taskloop init")
    };

    assert_eq!(init().code(), Some(exit_codes::OK));
    assert!(temp.path().join("taskloop.toml").is_file());
    assert_eq!(init().code(), Some(exit_codes::INVALID));
}

#[test]
fn run_without_objective_or_plan_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .args(["run", "--workdir"])
        .arg(temp.path())
        .status()
        .expect("taskloop run");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
