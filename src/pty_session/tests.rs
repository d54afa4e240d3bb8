use super::io::*;
use super::pty::*;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn pipe_pair() -> (RawFd, RawFd) {
    let mut fds = [0; 2];
    let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(
        result,
        0,
        "pipe() failed with errno {}",
        io::Error::last_os_error()
    );
    (fds[0], fds[1])
}

fn close_fd_pair(read_fd: RawFd, write_fd: RawFd) {
    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

fn read_all(fd: RawFd) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            break;
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
    out
}

fn sh_spec(script: &str) -> SpawnSpec {
    SpawnSpec {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        working_dir: "/".to_string(),
        term_value: "dumb".to_string(),
        env: Vec::new(),
        exit_command: "exit".to_string(),
    }
}

/// Collect output until the reader thread closes or the deadline passes.
fn collect_until_closed(session: &PtySession, deadline: Duration) -> String {
    let start = Instant::now();
    let mut out = Vec::new();
    while start.elapsed() < deadline {
        match session.recv_chunk(Some(Duration::from_millis(100))) {
            ReadOutcome::Data(chunk) => out.extend(chunk),
            ReadOutcome::TimedOut => continue,
            ReadOutcome::Closed => break,
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

/// Collect output until `needle` shows up or the deadline passes.
fn collect_until_contains(session: &PtySession, needle: &str, deadline: Duration) -> String {
    let start = Instant::now();
    let mut out = Vec::new();
    while start.elapsed() < deadline {
        if String::from_utf8_lossy(&out).contains(needle) {
            break;
        }
        match session.recv_chunk(Some(Duration::from_millis(100))) {
            ReadOutcome::Data(chunk) => out.extend(chunk),
            ReadOutcome::TimedOut => continue,
            ReadOutcome::Closed => break,
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

#[test]
fn should_retry_read_error_only_for_transient_errors() {
    assert!(should_retry_read_error(&io::Error::from(
        ErrorKind::Interrupted
    )));
    assert!(should_retry_read_error(&io::Error::from(
        ErrorKind::WouldBlock
    )));
    assert!(!should_retry_read_error(&io::Error::from(
        ErrorKind::BrokenPipe
    )));
}

#[test]
fn write_all_writes_entire_buffer() {
    let (read_fd, write_fd) = pipe_pair();
    write_all(write_fd, b"print, 1\n").expect("write should succeed");
    unsafe {
        libc::close(write_fd);
    }
    assert_eq!(read_all(read_fd), b"print, 1\n".to_vec());
    unsafe {
        libc::close(read_fd);
    }
}

#[test]
fn write_all_reports_closed_reader() {
    let (read_fd, write_fd) = pipe_pair();
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        libc::close(read_fd);
    }
    assert!(write_all(write_fd, b"x").is_err());
    unsafe {
        libc::close(write_fd);
    }
}

#[test]
fn errno_error_includes_context() {
    let err = errno_error("openpty failed");
    assert!(format!("{err}").starts_with("openpty failed"));
}

#[test]
fn waitpid_failed_only_for_negative_results() {
    assert!(waitpid_failed(-1));
    assert!(!waitpid_failed(0));
    assert!(!waitpid_failed(42));
}

#[test]
fn wait_for_exit_with_zero_timeout_returns_false() {
    assert!(!wait_for_exit(1, Duration::ZERO));
}

#[test]
fn spawned_child_sees_requested_term_and_env() {
    let mut spec = sh_spec("echo term=$TERM extra=$IDLBRIDGE_TEST_VALUE");
    spec.env.push(("IDLBRIDGE_TEST_VALUE".to_string(), "42".to_string()));
    let session = PtySession::spawn(&spec).expect("spawn sh");
    let output = collect_until_closed(&session, Duration::from_secs(5));
    assert!(output.contains("term=dumb"), "output: {output:?}");
    assert!(output.contains("extra=42"), "output: {output:?}");
}

#[test]
fn send_line_reaches_child_without_echo() {
    let mut session =
        PtySession::spawn(&sh_spec("read line; echo got:$line")).expect("spawn sh");
    session.send_line("abc").expect("send line");
    let output = collect_until_closed(&session, Duration::from_secs(5));
    assert!(output.contains("got:abc"), "output: {output:?}");
    assert_eq!(output.matches("abc").count(), 1, "echo leaked: {output:?}");
}

#[test]
fn missing_program_closes_output_stream() {
    let mut spec = sh_spec("");
    spec.program = "/definitely/not/an/interpreter".to_string();
    spec.args.clear();
    let mut session = PtySession::spawn(&spec).expect("fork still succeeds");
    let output = collect_until_closed(&session, Duration::from_secs(5));
    assert!(output.contains("execvp"), "output: {output:?}");
    let start = Instant::now();
    while session.try_wait().is_none() && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!session.is_alive());
}

#[test]
fn drop_terminates_child_that_ignores_exit_command() {
    let session = PtySession::spawn(&sh_spec("sleep 30")).expect("spawn sleep");
    let pid = session.pid();
    assert!(session.is_alive());
    let start = Instant::now();
    drop(session);
    assert!(start.elapsed() < Duration::from_secs(5));
    let still_running = unsafe { libc::kill(pid, 0) } == 0;
    assert!(!still_running, "child {pid} survived drop");
}

#[test]
fn read_output_drains_without_blocking() {
    let session = PtySession::spawn(&sh_spec("sleep 1")).expect("spawn sleep");
    let start = Instant::now();
    let drained = session.read_output();
    assert!(drained.is_empty());
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn close_fd_pair_helper_is_safe_on_fresh_pipes() {
    let (read_fd, write_fd) = pipe_pair();
    close_fd_pair(read_fd, write_fd);
}

#[test]
fn reader_thread_exits_on_stop_flag_while_writer_is_open() {
    let (read_fd, write_fd) = pipe_pair();
    unsafe { set_nonblocking(read_fd) }.expect("nonblocking pipe");
    let (tx, rx) = crossbeam_channel::bounded(4);
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_reader_thread(read_fd, tx, Arc::clone(&stop));

    write_all(write_fd, b"before stop").expect("write");
    let first = rx.recv_timeout(Duration::from_secs(2)).expect("chunk");
    assert_eq!(first, b"before stop");

    stop.store(true, Ordering::Release);
    let start = Instant::now();
    handle.join().expect("reader thread joins");
    assert!(start.elapsed() < Duration::from_secs(1));

    // Nothing is read after the thread is gone, even though the fd is still open.
    write_all(write_fd, b"after stop").expect("write");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    close_fd_pair(read_fd, write_fd);
}

#[test]
fn reader_thread_exits_when_receiver_dropped_on_full_channel() {
    let (read_fd, write_fd) = pipe_pair();
    unsafe { set_nonblocking(read_fd) }.expect("nonblocking pipe");
    let (tx, rx) = crossbeam_channel::bounded(1);
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_reader_thread(read_fd, tx, Arc::clone(&stop));

    write_all(write_fd, b"one").expect("write");
    std::thread::sleep(Duration::from_millis(100));
    write_all(write_fd, b"two").expect("write");
    std::thread::sleep(Duration::from_millis(100));

    drop(rx);
    let start = Instant::now();
    handle.join().expect("reader thread joins");
    assert!(start.elapsed() < Duration::from_secs(1));
    close_fd_pair(read_fd, write_fd);
}

#[test]
fn back_to_back_sessions_only_see_their_own_output() {
    for round in 0..5 {
        let marker = format!("ready-{round}");
        let session =
            PtySession::spawn(&sh_spec(&format!("echo {marker}; sleep 5"))).expect("spawn sh");
        let output = collect_until_contains(&session, &marker, Duration::from_secs(5));
        assert!(output.contains(&marker), "round {round} output: {output:?}");
        for earlier in 0..round {
            assert!(
                !output.contains(&format!("ready-{earlier}")),
                "round {round} saw output from round {earlier}: {output:?}"
            );
        }
        let start = Instant::now();
        drop(session);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
