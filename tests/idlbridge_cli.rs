use std::process::{Command, Stdio};

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn idlbridge_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_idlbridge").expect("idlbridge test binary not built")
}

#[test]
fn idlbridge_help_mentions_name() {
    let output = Command::new(idlbridge_bin())
        .arg("--help")
        .output()
        .expect("run idlbridge --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("idlbridge"));
    assert!(combined.contains("--json-ipc"));
}

#[test]
fn idlbridge_rejects_bad_plot_size() {
    let output = Command::new(idlbridge_bin())
        .args(["--size", "0,250", "print, 1"])
        .output()
        .expect("run idlbridge --size 0,250");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("--size"));
}

#[test]
fn idlbridge_requires_code_in_script_mode() {
    let output = Command::new(idlbridge_bin())
        .args(["--profile", "gdl", "--gdl-cmd", "/bin/false"])
        .output()
        .expect("run idlbridge without code");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("no code given"));
}

#[test]
fn idlbridge_reports_unavailable_interpreter() {
    let output = Command::new(idlbridge_bin())
        .args([
            "--profile",
            "gdl",
            "--gdl-cmd",
            "/bin/false",
            "--startup-timeout-ms",
            "3000",
            "print, 1",
        ])
        .output()
        .expect("run idlbridge with a dead interpreter");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("no IDL/GDL interpreter could be started"));
}

#[test]
fn idlbridge_ipc_emits_error_event_when_interpreter_missing() {
    let output = Command::new(idlbridge_bin())
        .args([
            "--json-ipc",
            "--profile",
            "gdl",
            "--gdl-cmd",
            "/bin/false",
            "--startup-timeout-ms",
            "3000",
        ])
        .stdin(Stdio::null())
        .output()
        .expect("run idlbridge --json-ipc");
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().expect("one event line");
    let event: serde_json::Value = serde_json::from_str(first).expect("event is JSON");
    assert_eq!(event["event"], "error");
    assert_eq!(event["kind"], "session_unavailable");
}

#[test]
fn idlbridge_rejects_ipc_with_positional_code() {
    let output = Command::new(idlbridge_bin())
        .args(["--json-ipc", "print, 1"])
        .output()
        .expect("run idlbridge --json-ipc with code");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("--json-ipc cannot be combined"));
}
