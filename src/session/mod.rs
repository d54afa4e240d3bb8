//! Request/reply access to an IDL/GDL interpreter.
//!
//! `Interpreter` is the seam the adapter talks to; `PtyInterpreter` drives a
//! real interpreter process and the adapter tests substitute a scripted one.

mod pty_interpreter;
mod reply;
#[cfg(test)]
mod tests;

pub use pty_interpreter::{InterpreterOptions, PtyInterpreter};

use crate::marshal::MarshalError;
use serde_json::Value;
use std::fmt;

/// Failures reported by an interpreter session.
#[derive(Debug)]
pub enum SessionError {
    /// The process could not be launched or never showed its prompt.
    Startup(String),
    /// The interpreter printed an error for the request.
    Interpreter(String),
    /// No prompt arrived within the configured reply timeout.
    Timeout,
    /// An earlier reply timed out, so replies can no longer be told apart.
    Unusable,
    /// The interpreter process went away.
    Exited,
    /// The named variable is not defined in the session.
    Undefined(String),
    /// The value cannot be expressed on the other side.
    Marshal(MarshalError),
    Io(anyhow::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Startup(detail) => write!(f, "interpreter did not start: {detail}"),
            SessionError::Interpreter(message) => write!(f, "{message}"),
            SessionError::Timeout => write!(f, "timed out waiting for the interpreter prompt"),
            SessionError::Unusable => write!(
                f,
                "interpreter session is unusable after a timed-out reply; restart it"
            ),
            SessionError::Exited => write!(f, "interpreter process exited"),
            SessionError::Undefined(name) => write!(f, "variable {name} is undefined"),
            SessionError::Marshal(err) => write!(f, "{err}"),
            SessionError::Io(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<MarshalError> for SessionError {
    fn from(err: MarshalError) -> Self {
        Self::Marshal(err)
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        Self::Io(err)
    }
}

/// One live interpreter session. Requests are strictly sequential.
pub trait Interpreter {
    /// Submit one line. The cleaned reply is returned only when `wants_reply` is set
    /// and the interpreter printed something.
    fn execute(&mut self, line: &str, wants_reply: bool) -> Result<Option<String>, SessionError>;

    /// Bind `name` in the session to `value`.
    fn assign(&mut self, name: &str, value: &Value) -> Result<(), SessionError>;

    /// Read the current value of `name` from the session.
    fn evaluate(&mut self, name: &str) -> Result<Value, SessionError>;

    fn prompt(&self) -> &str;
}
