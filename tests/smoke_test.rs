//! Smoke test - runs the nbflow binary against a small notebook end-to-end
//!
//! Run with: cargo test --test smoke_test

use std::path::Path;
use std::process::Command;

const NOTEBOOK: &str = r#"{
  "cells": [
    {"cell_type": "code", "metadata": {"tags": ["imports"]}, "source": "import math\n"},
    {"cell_type": "code", "metadata": {"tags": ["pipeline-parameters"]}, "source": "n = 4\n"},
    {"cell_type": "code", "metadata": {"tags": ["block:square"]}, "source": "x = n * n\n"},
    {"cell_type": "code", "metadata": {"tags": ["block:root", "prev:square"]}, "source": "y = math.sqrt(x)\n"}
  ],
  "metadata": {
    "kubeflow_notebook": {
      "experiment_name": "smoke",
      "pipeline_name": "smoke-test",
      "docker_image": "python:3.7"
    }
  },
  "nbformat": 4,
  "nbformat_minor": 2
}"#;

fn nbflow() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nbflow"))
}

fn write_notebook(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("smoke.ipynb");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn smoke_test_validate_json() {
    let dir = tempfile::tempdir().unwrap();
    let nb = write_notebook(dir.path(), NOTEBOOK);

    let output = nbflow().arg("validate").arg("--nb").arg(&nb).arg("--json").output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["steps"][0]["name"], "square");
    assert_eq!(json["steps"][1]["ins"], serde_json::json!(["x"]));
    assert_eq!(json["steps"][1]["predecessors"], serde_json::json!(["square"]));
}

#[test]
fn smoke_test_compile_writes_script() {
    let dir = tempfile::tempdir().unwrap();
    let nb = write_notebook(dir.path(), NOTEBOOK);
    let out = dir.path().join("out");

    let output = nbflow()
        .arg("compile")
        .arg("--nb")
        .arg(&nb)
        .arg("--pipeline-name")
        .arg("smoke-override")
        .arg("--output")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "stdout: {}", String::from_utf8_lossy(&output.stdout));

    let script = std::fs::read_to_string(out.join("kfp_smoke-override.kfp.py")).unwrap();
    assert!(script.contains("name='smoke-override',"));
    assert!(script.contains("root_task = root_op(x=square_task.outputs['x']) \\"));
}

#[test]
fn smoke_test_failure_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let broken = NOTEBOOK.replace("math.sqrt(x)", "math.sqrt(z)");
    let nb = write_notebook(dir.path(), &broken);

    let output = nbflow().arg("validate").arg("--nb").arg(&nb).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("'z'"));
}

/// Compiles the generated script with the pipeline SDK
#[test]
#[ignore] // Requires python3 with kfp 1.x installed
fn smoke_test_generated_script_compiles() {
    let dir = tempfile::tempdir().unwrap();
    let nb = write_notebook(dir.path(), NOTEBOOK);

    let status = nbflow().arg("compile").arg("--nb").arg(&nb).status().unwrap();
    assert!(status.success());

    let status = Command::new("python3")
        .arg("kfp_smoke-test.kfp.py")
        .current_dir(dir.path())
        .status()
        .unwrap();
    assert!(status.success());
    assert!(dir.path().join("smoke-test.pipeline.tar.gz").exists());
}
