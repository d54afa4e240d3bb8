use super::reply::{clean_reply, ReplyBuffer};
use super::{Interpreter, SessionError};
use crate::config::AppConfig;
use crate::marshal::{self, ElementKind};
use crate::profile::SessionProfile;
use crate::pty_session::{PtySession, ReadOutcome, SpawnSpec};
use crate::{log_debug, log_debug_content};
use serde_json::Value;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Longer requests go through a batch file. A terminal in canonical mode
/// truncates input lines at 4095 bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 1000;

const BATCH_FILE_NAME: &str = "idlbridge_batch.pro";

/// Launch settings shared by every candidate profile.
#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    pub working_dir: String,
    pub term_value: String,
    pub startup_timeout: Duration,
    /// `None` waits for the prompt indefinitely.
    pub reply_timeout: Option<Duration>,
    pub env: Vec<(String, String)>,
}

impl InterpreterOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let working_dir = std::env::current_dir()
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_else(|_| ".".to_string());
        Self {
            working_dir,
            term_value: config.term_value.clone(),
            startup_timeout: config.startup_timeout(),
            reply_timeout: config.reply_timeout(),
            env: Vec::new(),
        }
    }
}

/// An IDL/GDL process driven through a pseudo-terminal.
pub struct PtyInterpreter {
    profile: SessionProfile,
    session: PtySession,
    buffer: ReplyBuffer,
    reply_timeout: Option<Duration>,
    /// Requests sent so far; numbers the end-of-reply markers.
    sequence: u64,
    /// Set once a reply timed out. Late output could be mistaken for the next
    /// reply, so the session refuses further requests.
    unusable: bool,
    batch_dir: Option<TempDir>,
}

impl PtyInterpreter {
    /// Spawn the profile's interpreter and wait for its first prompt.
    pub fn start(
        profile: SessionProfile,
        options: &InterpreterOptions,
    ) -> Result<Self, SessionError> {
        let spec = SpawnSpec {
            program: profile.command.clone(),
            args: profile.args.clone(),
            working_dir: options.working_dir.clone(),
            term_value: options.term_value.clone(),
            env: options.env.clone(),
            exit_command: profile.exit_command.clone(),
        };
        let session = PtySession::spawn(&spec)
            .map_err(|err| SessionError::Startup(format!("{}: {err:#}", profile.command_line())))?;
        let mut interpreter = Self {
            profile,
            session,
            buffer: ReplyBuffer::new(),
            reply_timeout: options.reply_timeout,
            sequence: 0,
            unusable: false,
            batch_dir: None,
        };
        let prompt = interpreter.profile.prompt.clone();
        let first_prompt = interpreter.wait_for(Some(options.startup_timeout), |buffer| {
            buffer.ends_with_prompt(&prompt).then_some(())
        });
        match first_prompt {
            Ok(()) => {}
            Err(SessionError::Timeout) => {
                let banner = interpreter.buffer.clear();
                log_debug_content(&format!("startup output without prompt: {banner:?}"));
                return Err(SessionError::Startup(format!(
                    "{} never printed '{}' within {}ms",
                    interpreter.profile.command_line(),
                    interpreter.profile.prompt,
                    options.startup_timeout.as_millis()
                )));
            }
            Err(SessionError::Exited) => {
                let banner = interpreter.buffer.clear();
                return Err(SessionError::Startup(format!(
                    "{} exited during startup: {}",
                    interpreter.profile.command_line(),
                    banner.trim()
                )));
            }
            Err(err) => return Err(err),
        }
        let banner = interpreter.buffer.clear();
        log_debug_content(&format!("interpreter banner: {banner:?}"));
        log_debug(&format!(
            "{} ready (pid {})",
            interpreter.profile.display_name,
            interpreter.session.pid()
        ));
        Ok(interpreter)
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    /// Read output until `ready` recognises a complete reply in the buffer.
    fn wait_for<T>(
        &mut self,
        timeout: Option<Duration>,
        mut ready: impl FnMut(&mut ReplyBuffer) -> Option<T>,
    ) -> Result<T, SessionError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if let Some(reply) = ready(&mut self.buffer) {
                return Ok(reply);
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(SessionError::Timeout);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            match self.session.recv_chunk(remaining) {
                ReadOutcome::Data(chunk) => self.buffer.feed(&chunk),
                ReadOutcome::TimedOut => {}
                ReadOutcome::Closed => return Err(SessionError::Exited),
            }
        }
    }

    /// The line actually typed for `line`: the line itself, or a batch-file
    /// call when it is too long for the terminal.
    fn typed_line(&mut self, line: &str) -> Result<String, SessionError> {
        if line.len() <= MAX_REQUEST_BYTES {
            return Ok(line.to_string());
        }
        let dir = match self.batch_dir.take() {
            Some(dir) => dir,
            None => tempfile::Builder::new()
                .prefix("idlbridge-batch-")
                .tempdir()
                .map_err(|err| SessionError::Io(err.into()))?,
        };
        let path = dir.path().join(BATCH_FILE_NAME);
        let written = fs::write(&path, format!("{line}\n"));
        let typed = self.profile.batch_command(&path.to_string_lossy());
        self.batch_dir = Some(dir);
        written.map_err(|err| SessionError::Io(err.into()))?;
        log_debug(&format!(
            "request of {} bytes sent through {}",
            line.len(),
            path.display()
        ));
        Ok(typed)
    }

    /// Send one line and return its cleaned reply text.
    fn request(&mut self, line: &str) -> Result<String, SessionError> {
        if self.unusable {
            return Err(SessionError::Unusable);
        }
        if let Some(status) = self.session.try_wait() {
            log_debug(&format!("interpreter gone before request: {status}"));
            return Err(SessionError::Exited);
        }
        let stale: usize = self.session.read_output().iter().map(Vec::len).sum();
        if stale > 0 {
            log_debug(&format!("discarding {stale} bytes of unsolicited output"));
        }
        self.buffer.clear();

        let typed = self.typed_line(line)?;
        self.sequence += 1;
        let marker = format!("idlbridge-sync-{}-{}", std::process::id(), self.sequence);
        let marker_command = self.profile.marker_command(&marker);
        log_debug_content(&format!("request: {typed}"));
        // One write so nothing can run between the request and its marker.
        self.session.send_line(&format!("{typed}\n{marker_command}"))?;

        let prompt = self.profile.prompt.clone();
        let raw = match self.wait_for(self.reply_timeout, |buffer| {
            buffer.take_through_marker(&marker, &marker_command, &prompt)
        }) {
            Ok(raw) => raw,
            Err(SessionError::Timeout) => {
                self.unusable = true;
                log_debug("reply timed out; session marked unusable");
                return Err(SessionError::Timeout);
            }
            Err(err) => return Err(err),
        };
        let profile = &self.profile;
        let cleaned = clean_reply(&raw, &typed, |text| profile.is_info_line(text));
        if !cleaned.errors.is_empty() {
            let message = cleaned.errors.join("\n");
            log_debug_content(&format!("interpreter error: {message}"));
            return Err(SessionError::Interpreter(message));
        }
        Ok(cleaned.text)
    }
}

impl Interpreter for PtyInterpreter {
    fn execute(&mut self, line: &str, wants_reply: bool) -> Result<Option<String>, SessionError> {
        let text = self.request(line)?;
        if wants_reply && !text.trim().is_empty() {
            Ok(Some(text))
        } else {
            Ok(None)
        }
    }

    fn assign(&mut self, name: &str, value: &Value) -> Result<(), SessionError> {
        let literal = marshal::to_literal(value)?;
        self.request(&format!("{name} = {literal}"))?;
        Ok(())
    }

    fn evaluate(&mut self, name: &str) -> Result<Value, SessionError> {
        let described = marshal::parse_description(&self.request(&marshal::describe_command(name))?)?;
        if !described.is_defined() {
            return Err(SessionError::Undefined(name.to_string()));
        }
        let kind = ElementKind::from_type_code(described.type_code)?;
        let dimensions = if described.rank == 0 {
            Vec::new()
        } else {
            marshal::parse_dimensions(&self.request(&marshal::dimensions_command(name))?)?
        };
        let printed = self.request(&marshal::values_command(name, kind))?;
        let elements = marshal::parse_elements(&printed, kind)?;
        Ok(marshal::reshape(elements, &dimensions)?)
    }

    fn prompt(&self) -> &str {
        &self.profile.prompt
    }
}
