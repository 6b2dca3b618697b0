#![cfg(unix)]

use std::process::Command;

use serde_json::{Value, json};

#[test]
fn json_run_keeps_stdout_for_the_result() {
    let directory = tempfile::tempdir().expect("tempdir");
    let pipeline_path = directory.path().join("rigger.yaml");
    std::fs::write(
        &pipeline_path,
        "- rigger.steps.run_shell_script:\n    id: greet\n    script: echo hello\n",
    )
    .expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_rigger"))
        .args(["run", "--json"])
        .arg(&pipeline_path)
        .env("RIGGER_SECRETS_BACKEND", "env")
        .env("RUST_LOG", "info")
        .output()
        .expect("rigger runs");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let result: Value = serde_json::from_slice(&output.stdout).expect("stdout is a single JSON document");
    assert_eq!(result["greet"], json!({"stdout": "hello", "stderr": ""}));
    assert_eq!(result["stdout"], json!("hello"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("hello"));
}
