use std::fmt;

/// Which namespace was missing a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSide {
    Host,
    Session,
}

impl NameSide {
    pub fn label(self) -> &'static str {
        match self {
            NameSide::Host => "host",
            NameSide::Session => "session",
        }
    }
}

/// Errors surfaced by the session adapter to its host.
#[derive(Debug)]
pub enum AdapterError {
    /// No candidate interpreter could be started.
    SessionUnavailable { attempts: Vec<String> },
    NameNotFound { name: String, side: NameSide },
    /// An execution unit failed during `run`; later units were skipped.
    ExecutionFailed { line: String, reason: String },
    InvalidArguments(String),
    /// A value could not cross the boundary, or the session failed while moving it.
    Transfer { name: String, reason: String },
    Io(anyhow::Error),
}

impl AdapterError {
    /// Stable identifier used in IPC error events.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::SessionUnavailable { .. } => "session_unavailable",
            AdapterError::NameNotFound { .. } => "name_not_found",
            AdapterError::ExecutionFailed { .. } => "execution_failed",
            AdapterError::InvalidArguments(_) => "invalid_arguments",
            AdapterError::Transfer { .. } => "transfer",
            AdapterError::Io(_) => "io",
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::SessionUnavailable { attempts } => {
                write!(f, "no IDL/GDL interpreter could be started")?;
                if !attempts.is_empty() {
                    write!(f, " ({})", attempts.join("; "))?;
                }
                Ok(())
            }
            AdapterError::NameNotFound { name, side } => {
                write!(f, "name '{name}' is not defined in the {} namespace", side.label())
            }
            AdapterError::ExecutionFailed { line, reason } => {
                write!(f, "IDL could not complete execution of `{line}`: {reason}")
            }
            AdapterError::InvalidArguments(detail) => write!(f, "invalid arguments: {detail}"),
            AdapterError::Transfer { name, reason } => {
                write!(f, "cannot transfer '{name}': {reason}")
            }
            AdapterError::Io(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<anyhow::Error> for AdapterError {
    fn from(err: anyhow::Error) -> Self {
        Self::Io(err)
    }
}
