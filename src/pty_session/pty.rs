//! Pseudo-terminal (PTY) session management.
//!
//! Spawns the IDL/GDL interpreter in a PTY so it behaves as if running in an
//! interactive terminal and prints its prompt after every command. Handles I/O
//! forwarding and graceful process termination.

use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::io::{spawn_reader_thread, write_all};

/// Max pending output chunks between the reader thread and the session owner.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Everything needed to launch one interpreter process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: String,
    pub term_value: String,
    pub env: Vec<(String, String)>,
    /// Command sent on drop to ask the interpreter to quit.
    pub exit_command: String,
}

/// Outcome of waiting for the next output chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    TimedOut,
    Closed,
}

/// Interpreter process running under a PTY with echo disabled.
pub struct PtySession {
    pub(super) master_fd: RawFd,
    pub(super) child_pid: i32,
    pub(super) exit_command: String,
    /// Stream of raw PTY output chunks from the child process.
    pub output_rx: Receiver<Vec<u8>>,
    reader_stop: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl PtySession {
    /// Start the interpreter under a pseudo-terminal.
    pub fn spawn(spec: &SpawnSpec) -> Result<Self> {
        let cwd = CString::new(spec.working_dir.as_str()).with_context(|| {
            format!(
                "working directory contains NUL byte: {}",
                spec.working_dir
            )
        })?;
        let mut env_pairs: Vec<(CString, CString)> = Vec::with_capacity(spec.env.len() + 1);
        env_pairs.push((
            c_string("TERM")?,
            CString::new(spec.term_value.as_str())
                .with_context(|| format!("TERM contains NUL byte: {}", spec.term_value))?,
        ));
        for (key, value) in &spec.env {
            env_pairs.push((
                CString::new(key.as_str())
                    .with_context(|| format!("env key contains NUL byte: {key}"))?,
                CString::new(value.as_str())
                    .with_context(|| format!("env value contains NUL byte: {key}"))?,
            ));
        }
        let mut argv: Vec<CString> = Vec::with_capacity(spec.args.len() + 1);
        argv.push(
            CString::new(spec.program.as_str())
                .with_context(|| format!("program contains NUL byte: {}", spec.program))?,
        );
        for arg in &spec.args {
            argv.push(
                CString::new(arg.as_str())
                    .with_context(|| format!("interpreter arg contains NUL byte: {arg}"))?,
            );
        }

        // SAFETY: argv/cwd/env are valid CStrings; spawn_pty_child returns a valid master fd.
        // set_nonblocking only touches the returned master fd.
        unsafe {
            let (master_fd, child_pid) = spawn_pty_child(&argv, &cwd, &env_pairs)?;
            if let Err(err) = set_nonblocking(master_fd) {
                close_fd(master_fd);
                return Err(err);
            }

            let (tx, rx) = bounded(OUTPUT_CHANNEL_CAPACITY);
            let reader_stop = Arc::new(AtomicBool::new(false));
            let output_thread = spawn_reader_thread(master_fd, tx, Arc::clone(&reader_stop));

            log_debug(&format!(
                "PTY session started: pid={child_pid} program={}",
                spec.program
            ));
            Ok(Self {
                master_fd,
                child_pid,
                exit_command: spec.exit_command.clone(),
                output_rx: rx,
                reader_stop,
                output_thread: Some(output_thread),
            })
        }
    }

    /// Write one line to the PTY, ensuring it ends with a newline.
    pub fn send_line(&mut self, text: &str) -> Result<()> {
        write_all(self.master_fd, text.as_bytes())?;
        if !text.ends_with('\n') {
            write_all(self.master_fd, b"\n")?;
        }
        Ok(())
    }

    /// Block for the next output chunk. `None` waits until data arrives or the
    /// reader thread exits.
    pub fn recv_chunk(&self, timeout: Option<Duration>) -> ReadOutcome {
        match timeout {
            Some(timeout) => match self.output_rx.recv_timeout(timeout) {
                Ok(chunk) => ReadOutcome::Data(chunk),
                Err(RecvTimeoutError::Timeout) => ReadOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => ReadOutcome::Closed,
            },
            None => match self.output_rx.recv() {
                Ok(chunk) => ReadOutcome::Data(chunk),
                Err(_) => ReadOutcome::Closed,
            },
        }
    }

    /// Drain any waiting output without blocking.
    pub fn read_output(&self) -> Vec<Vec<u8>> {
        let mut output = Vec::new();
        while let Ok(chunk) = self.output_rx.try_recv() {
            output.push(chunk);
        }
        output
    }

    /// Peek whether the child is still running (without reaping it).
    pub fn is_alive(&self) -> bool {
        if self.child_pid < 0 {
            return false;
        }
        unsafe {
            // SAFETY: child_pid is owned by this session; waitpid with WNOHANG only inspects state.
            let mut status = 0;
            let ret = libc::waitpid(self.child_pid, &mut status, libc::WNOHANG);
            ret == 0 // 0 means still running
        }
    }

    /// Non-blocking check for child exit; reaps the child on completion.
    pub fn try_wait(&mut self) -> Option<std::process::ExitStatus> {
        if self.child_pid < 0 {
            return None;
        }
        unsafe {
            let mut status = 0;
            let ret = libc::waitpid(self.child_pid, &mut status, libc::WNOHANG);
            if ret <= 0 {
                None
            } else {
                self.child_pid = -1;
                Some(std::process::ExitStatus::from_raw(status))
            }
        }
    }

    pub fn pid(&self) -> i32 {
        self.child_pid
    }
}

impl PtySession {
    /// Ask the child to exit, then escalate to SIGTERM and SIGKILL.
    fn terminate_child(&mut self) {
        let exit_command = self.exit_command.clone();
        if let Err(err) = self.send_line(&exit_command) {
            log_debug(&format!("failed to send PTY exit command: {err:#}"));
        }
        if wait_for_exit(self.child_pid, Duration::from_millis(500)) {
            return;
        }
        // SAFETY: child_pid comes from spawn_pty_child and has not been reaped yet.
        unsafe {
            if libc::kill(self.child_pid, libc::SIGTERM) != 0 {
                log_debug(&format!(
                    "SIGTERM to PTY session failed: {}",
                    io::Error::last_os_error()
                ));
            }
            if wait_for_exit(self.child_pid, Duration::from_millis(500)) {
                return;
            }
            if libc::kill(self.child_pid, libc::SIGKILL) != 0 {
                log_debug(&format!(
                    "SIGKILL to PTY session failed: {}",
                    io::Error::last_os_error()
                ));
            }
            let mut status = 0;
            let ret = libc::waitpid(self.child_pid, &mut status, 0);
            if waitpid_failed(ret) {
                log_debug(&format!(
                    "waitpid after SIGKILL failed: {}",
                    io::Error::last_os_error()
                ));
            }
        }
    }

    /// Stop and join the reader thread. Must run before `master_fd` is closed,
    /// otherwise the thread could read from a recycled descriptor.
    fn stop_reader(&mut self) {
        self.reader_stop.store(true, Ordering::Release);
        // Dropping the receiver unblocks a reader waiting on a full channel.
        self.output_rx = crossbeam_channel::never();
        if let Some(handle) = self.output_thread.take() {
            if handle.join().is_err() {
                log_debug("PTY reader thread panicked");
            }
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if self.child_pid >= 0 {
            self.terminate_child();
        }
        self.stop_reader();
        // SAFETY: the reader thread has been joined, so nothing else uses master_fd.
        unsafe {
            close_fd(self.master_fd);
        }
    }
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).with_context(|| format!("value contains NUL byte: {value}"))
}

/// Forks and execs a child process under a new PTY.
///
/// # Safety
///
/// This function performs low-level PTY allocation and process forking.
/// The caller must ensure:
/// - `argv` contains valid null-terminated C strings
/// - `working_dir` is a valid directory path
/// - The returned file descriptor is eventually closed
///
/// The child process calls `_exit(1)` on any setup failure to avoid
/// undefined behavior from returning after `fork()`.
pub(super) unsafe fn spawn_pty_child(
    argv: &[CString],
    working_dir: &CString,
    env: &[(CString, CString)],
) -> Result<(RawFd, i32)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;

    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut winsize: libc::winsize = mem::zeroed();
    winsize.ws_row = 24;
    winsize.ws_col = 200;
    winsize.ws_xpixel = 0;
    winsize.ws_ypixel = 0;

    #[allow(clippy::unnecessary_mut_passed)]
    // SAFETY: openpty expects valid pointers for master/slave/winsize; we pass stack locals.
    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut winsize,
    ) != 0
    {
        return Err(errno_error("openpty failed"));
    }

    // Replies are framed by the prompt; an echoed request would be mixed into them.
    if let Err(err) = disable_echo(slave_fd) {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(err);
    }

    // SAFETY: fork is called before any unsafe Rust invariants are relied on.
    let pid = libc::fork();
    if pid < 0 {
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(errno_error("fork failed"));
    }

    if pid == 0 {
        close_fd(master_fd);
        child_exec(slave_fd, argv, working_dir, env);
    }

    close_fd(slave_fd);
    Ok((master_fd, pid))
}

/// Clear ECHO on the slave side of the PTY.
///
/// # Safety
///
/// `fd` must be a valid, open terminal file descriptor.
pub(super) unsafe fn disable_echo(fd: RawFd) -> Result<()> {
    let mut termios: libc::termios = mem::zeroed();
    if libc::tcgetattr(fd, &mut termios) != 0 {
        return Err(errno_error("tcgetattr failed"));
    }
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL);
    if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
        return Err(errno_error("tcsetattr failed"));
    }
    Ok(())
}

/// Child process setup after fork: configures PTY and execs the target binary.
///
/// # Safety
///
/// Must only be called in the child process after `fork()`. This function
/// never returns - it either calls `execvp()` to replace the process image
/// or `_exit(1)` on failure.
pub(super) unsafe fn child_exec(
    slave_fd: RawFd,
    argv: &[CString],
    working_dir: &CString,
    env: &[(CString, CString)],
) -> ! {
    let fail = |context: &str| -> ! {
        let err = io::Error::last_os_error();
        let msg = format!("child_exec {context} failed: {err}\n");
        // SAFETY: write is async-signal-safe and stderr is a valid fd in the child.
        let _ = libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
        libc::_exit(1);
    };

    if libc::setsid() == -1 {
        fail("setsid");
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
        fail("ioctl(TIOCSCTTY)");
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail("dup2");
    }
    close_fd(slave_fd);

    if libc::chdir(working_dir.as_ptr()) != 0 {
        fail("chdir");
    }

    for (key, value) in env {
        if libc::setenv(key.as_ptr(), value.as_ptr(), 1) != 0 {
            fail("setenv");
        }
    }

    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());

    libc::execvp(argv_ptrs[0], argv_ptrs.as_ptr());
    fail("execvp");
}

/// Configure the PTY master for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
pub(super) unsafe fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(errno_error("fcntl(F_GETFL) failed"));
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(errno_error("fcntl(F_SETFL) failed"));
    }
    Ok(())
}

/// Helper that formats OS errors with additional context.
pub(super) fn errno_error(context: &str) -> anyhow::Error {
    anyhow!("{context}: {}", io::Error::last_os_error())
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or -1 to ignore).
pub(super) unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}

pub(super) fn waitpid_failed(ret: i32) -> bool {
    ret < 0
}

/// Wait for the child process to terminate, but bail out after a short timeout.
pub(super) fn wait_for_exit(child_pid: i32, timeout: Duration) -> bool {
    if timeout.is_zero() {
        return false;
    }
    let start = Instant::now();
    let mut status = 0;
    while start.elapsed() < timeout {
        // SAFETY: child_pid is owned by this session; waitpid with WNOHANG only inspects state.
        let result = unsafe { libc::waitpid(child_pid, &mut status, libc::WNOHANG) };
        if result > 0 {
            return true;
        }
        if result < 0 {
            log_debug(&format!(
                "waitpid({}) failed: {}",
                child_pid,
                io::Error::last_os_error()
            ));
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}
