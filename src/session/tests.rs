use super::*;
use crate::plot::PlotSize;
use crate::profile::{common_info_prefixes, PlotTemplates, SessionProfile};
use std::time::Duration;

const TEST_PROMPT: &str = "TEST>";

fn shell_profile(args: &[&str]) -> SessionProfile {
    SessionProfile {
        name: "sh".to_string(),
        display_name: "Shell".to_string(),
        command: "/bin/sh".to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        prompt: TEST_PROMPT.to_string(),
        raster: PlotTemplates {
            preamble: String::new(),
            postamble: String::new(),
        },
        vector: None,
        default_size: PlotSize::default(),
        info_prefixes: common_info_prefixes(),
        marker_template: "echo '{marker}'".to_string(),
        batch_template: ". {path}".to_string(),
        exit_command: "exit".to_string(),
    }
}

fn options(startup_ms: u64, reply_ms: Option<u64>) -> InterpreterOptions {
    InterpreterOptions {
        working_dir: "/".to_string(),
        term_value: "dumb".to_string(),
        startup_timeout: Duration::from_millis(startup_ms),
        reply_timeout: reply_ms.map(Duration::from_millis),
        env: vec![
            ("PS1".to_string(), format!("{TEST_PROMPT} ")),
            ("ENV".to_string(), "/dev/null".to_string()),
        ],
    }
}

fn start_shell() -> PtyInterpreter {
    PtyInterpreter::start(shell_profile(&["-i"]), &options(5_000, Some(5_000)))
        .expect("interactive shell should show its prompt")
}

#[test]
fn execute_returns_printed_output() {
    let mut shell = start_shell();
    assert_eq!(
        shell.execute("echo hello", true).expect("echo"),
        Some("hello".to_string())
    );
    assert_eq!(shell.prompt(), TEST_PROMPT);
}

#[test]
fn silent_statement_has_no_reply() {
    let mut shell = start_shell();
    assert_eq!(shell.execute("X=1", true).expect("assign"), None);
    assert_eq!(
        shell.execute("echo $X", true).expect("echo"),
        Some("1".to_string())
    );
}

#[test]
fn reply_is_suppressed_when_not_wanted() {
    let mut shell = start_shell();
    assert_eq!(shell.execute("echo hidden", false).expect("echo"), None);
}

#[test]
fn percent_lines_surface_as_interpreter_errors() {
    let mut shell = start_shell();
    match shell.execute("echo '% Variable is undefined: Y.'", true) {
        Err(SessionError::Interpreter(message)) => {
            assert_eq!(message, "% Variable is undefined: Y.")
        }
        other => panic!("expected interpreter error, got {other:?}"),
    }
    // The session stays usable after an error.
    assert_eq!(
        shell.execute("echo still here", true).expect("echo"),
        Some("still here".to_string())
    );
}

#[test]
fn info_lines_are_dropped() {
    let mut shell = start_shell();
    assert_eq!(
        shell
            .execute("echo '% Compiled module: MEAN.'; echo 2.00000", true)
            .expect("echo"),
        Some("2.00000".to_string())
    );
}

#[test]
fn process_exiting_at_startup_is_a_startup_error() {
    let result = PtyInterpreter::start(shell_profile(&["-c", "exit 0"]), &options(5_000, None));
    assert!(matches!(result, Err(SessionError::Startup(_))));
}

#[test]
fn missing_prompt_times_out_at_startup() {
    let result = PtyInterpreter::start(shell_profile(&["-c", "sleep 5"]), &options(200, None));
    match result {
        Err(SessionError::Startup(detail)) => assert!(detail.contains("never printed")),
        Err(other) => panic!("expected startup error, got {other}"),
        Ok(_) => panic!("expected startup error"),
    }
}

#[test]
fn slow_reply_hits_the_reply_timeout() {
    let mut shell =
        PtyInterpreter::start(shell_profile(&["-i"]), &options(5_000, Some(100))).expect("shell");
    assert!(matches!(
        shell.execute("sleep 2", true),
        Err(SessionError::Timeout)
    ));
}

#[test]
fn session_refuses_requests_after_a_timeout() {
    let mut shell =
        PtyInterpreter::start(shell_profile(&["-i"]), &options(5_000, Some(100))).expect("shell");
    assert!(matches!(
        shell.execute("sleep 1; echo late", true),
        Err(SessionError::Timeout)
    ));
    std::thread::sleep(Duration::from_millis(1_200));
    assert!(matches!(
        shell.execute("echo again", true),
        Err(SessionError::Unusable)
    ));
}

#[test]
fn prompt_printed_by_the_request_does_not_split_the_reply() {
    let mut shell = start_shell();
    assert_eq!(
        shell
            .execute("sleep 0.2; echo 'TEST>'; sleep 0.3; echo late", true)
            .expect("echo"),
        Some("TEST>\nlate".to_string())
    );
    assert_eq!(
        shell.execute("echo second", true).expect("echo"),
        Some("second".to_string())
    );
}

#[test]
fn long_request_is_not_truncated_by_the_terminal() {
    let mut shell = start_shell();
    let payload = "a".repeat(6_000);
    let reply = shell
        .execute(&format!("echo {payload} | wc -c"), true)
        .expect("wc");
    assert_eq!(reply.as_deref().map(str::trim), Some("6001"));
}

#[test]
fn long_assignment_keeps_its_value_in_the_session() {
    let mut shell = start_shell();
    let value = "b".repeat(5_000);
    assert_eq!(shell.execute(&format!("X='{value}'"), true).expect("assign"), None);
    assert_eq!(
        shell.execute("echo ${#X}", true).expect("length"),
        Some("5000".to_string())
    );
}

#[test]
fn exited_process_is_reported() {
    let mut shell = start_shell();
    assert!(matches!(
        shell.execute("exit", true),
        Err(SessionError::Exited)
    ));
}

#[test]
fn unmarshallable_assignment_sends_nothing() {
    let mut shell = start_shell();
    assert!(matches!(
        shell.assign("x", &serde_json::Value::Null),
        Err(SessionError::Marshal(crate::marshal::MarshalError::Null))
    ));
}
