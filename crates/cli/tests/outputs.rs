use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut dir = std::env::temp_dir();
    dir.push("cacheprobe-tests");
    dir.push(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn cacheprobe() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cacheprobe"))
}

#[test]
fn test_cli_help() {
    let output = cacheprobe()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("CacheProbe Simulator"));
}

#[test]
fn test_cli_run_reference_passes_silently() {
    let output = cacheprobe()
        .arg("run")
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_run_corruption_prints_diagnostic_and_fails() {
    let output = cacheprobe()
        .args(["run", "--lines", "10", "--sets", "10", "--corrupt", "2:3=99"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "99 = 3 * 4\r\n");
}

#[test]
fn test_cli_run_no_uart_stdout() {
    let output = cacheprobe()
        .args(["run", "--corrupt", "2:3=99", "--no-uart-stdout"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_run_rejects_fault_outside_grid() {
    let output = cacheprobe()
        .args(["run", "--lines", "4", "--sets", "4", "--corrupt", "4:0=1"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_run_rejects_empty_grid() {
    let output = cacheprobe()
        .args(["run", "--lines", "0"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_test_mode_outputs() {
    let dir = temp_dir("outputs");
    write_file(
        &dir,
        "board.yaml",
        r#"
name: "small"
uart_tx: 0x100000
host_signal: 0x1000
scratch:
  base: 0x10000
  size: "32 KiB"
"#,
    );
    let script = write_file(
        &dir,
        "script.yaml",
        r#"
schema_version: "1.0"
inputs:
  board: "board.yaml"
grid:
  lines: 10
  sets: 10
faults:
  - { set: 2, line: 3, value: 99 }
assertions:
  - uart_contains: "99 = 3 * 4"
  - expected_verdict: fail
  - expected_mismatches: 1
"#,
    );
    let output_dir = dir.join("artifacts");

    let output = cacheprobe()
        .args([
            "test",
            "--script",
            script.to_str().unwrap(),
            "--no-uart-stdout",
            "--output-dir",
            output_dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());

    let result_path = output_dir.join("result.json");
    assert!(result_path.exists());

    let result_content = std::fs::read_to_string(&result_path).unwrap();
    let result: serde_json::Value = serde_json::from_str(&result_content).unwrap();

    assert_eq!(result["status"], "pass");
    assert_eq!(result["verdict"], "fail");
    assert_eq!(result["host_signal"], 255);
    assert_eq!(result["signal_writes"], 1);
    assert_eq!(result["mismatches"], 1);
    assert_eq!(result["uart"], "99 = 3 * 4\r\n");
    assert_eq!(result["stores"], 100);
    assert_eq!(result["loads"], 100);
    assert_eq!(result["board"]["name"], "small");
    assert_eq!(result["assertions"].as_array().unwrap().len(), 3);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_implicit_pass() {
    let dir = temp_dir("implicit");
    let script = write_file(&dir, "script.yaml", "schema_version: \"1.0\"\n");

    let output = cacheprobe()
        .args(["test", "--script", script.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_assertion_fail() {
    let dir = temp_dir("assert-fail");
    let script = write_file(
        &dir,
        "script.yaml",
        r#"
schema_version: "1.0"
faults:
  - { set: 0, line: 0, value: 2 }
assertions:
  - expected_verdict: pass
"#,
    );

    let output = cacheprobe()
        .args(["test", "--script", script.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1)); // EXIT_FAIL
    // UART echo is on by default.
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "2 = 1 * 1\r\n");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_bad_schema() {
    let dir = temp_dir("bad-schema");
    let script = write_file(&dir, "script.yaml", "schema_version: \"2.0\"\n");

    let output = cacheprobe()
        .args(["test", "--script", script.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2)); // EXIT_CONFIG_ERROR
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_grid_past_scratch() {
    let dir = temp_dir("oversize");
    let script = write_file(
        &dir,
        "script.yaml",
        r#"
schema_version: "1.0"
grid:
  lines: 10
  sets: 64
"#,
    );

    let output = cacheprobe()
        .args(["test", "--script", script.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2)); // EXIT_CONFIG_ERROR
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_missing_board() {
    let dir = temp_dir("missing-board");
    let script = write_file(
        &dir,
        "script.yaml",
        r#"
schema_version: "1.0"
inputs:
  board: "nope.yaml"
"#,
    );

    let output = cacheprobe()
        .args(["test", "--script", script.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_run_rejects_overlapping_registers() {
    let dir = temp_dir("overlap");
    let board = write_file(
        &dir,
        "board.yaml",
        r#"
name: "shared"
uart_tx: 0x100000
host_signal: 0x100000
scratch:
  base: 0x10000
  size: "64 KiB"
"#,
    );

    let output = cacheprobe()
        .args(["run", "--board", board.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_run_rejects_geometry_overflow() {
    let dir = temp_dir("geometry");
    let board = write_file(
        &dir,
        "board.yaml",
        r#"
name: "huge"
uart_tx: 0x100000
host_signal: 0x1000
scratch:
  base: 0x10000
  size: "64 KiB"
geometry:
  line_stride: 4611686018427387904
  set_count: 8
"#,
    );

    let output = cacheprobe()
        .args(["run", "--board", board.to_str().unwrap(), "--sets", "2"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&dir);
}
