//! JSON-based IPC protocol for host integration.
//!
//! Defines the message types exchanged between idlbridge and an external
//! host. Messages are newline-delimited JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// IPC Events (Rust → client)
// ============================================================================

/// Events emitted by idlbridge.
///
/// Serialized as JSON with a `"event"` tag field for type discrimination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum IpcEvent {
    /// Sent once on startup and on request
    #[serde(rename = "capabilities")]
    Capabilities {
        profile: String,
        display_name: String,
        prompt: String,
        version: String,
        plot_size: String,
        plot_format: String,
        plot_dir: String,
    },

    /// Output of a `run`: text first, then images
    #[serde(rename = "display")]
    Display {
        source: String,
        data: Vec<DisplayItem>,
    },

    /// Reply to `get`
    #[serde(rename = "value")]
    Value { name: String, value: Value },

    /// Command finished successfully
    #[serde(rename = "done")]
    Done { cmd: String },

    /// Command failed; the loop keeps running
    #[serde(rename = "error")]
    Error { kind: String, message: String },
}

/// One display entry. Text is inlined; images are referenced by saved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayItem {
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// ============================================================================
// IPC Commands (client → Rust)
// ============================================================================

/// Commands received from an IPC client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd")]
pub enum IpcCommand {
    /// Store a value in the host namespace
    #[serde(rename = "set")]
    Set { name: String, value: Value },

    /// Read a value from the host namespace
    #[serde(rename = "get")]
    Get { name: String },

    /// `push` line: names to copy into the session
    #[serde(rename = "push")]
    Push { line: String },

    /// `pull` line: names to copy out of the session
    #[serde(rename = "pull")]
    Pull { line: String },

    /// `run` line plus optional multi-line body
    #[serde(rename = "run")]
    Run {
        #[serde(default)]
        line: String,
        #[serde(default)]
        cell: Option<String>,
    },

    /// Re-emit the capabilities event
    #[serde(rename = "capabilities")]
    Capabilities,

    /// Stop the loop and shut the interpreter down
    #[serde(rename = "shutdown")]
    Shutdown,
}

impl IpcCommand {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            IpcCommand::Set { .. } => "set",
            IpcCommand::Get { .. } => "get",
            IpcCommand::Push { .. } => "push",
            IpcCommand::Pull { .. } => "pull",
            IpcCommand::Run { .. } => "run",
            IpcCommand::Capabilities => "capabilities",
            IpcCommand::Shutdown => "shutdown",
        }
    }
}

/// Parse one stdin line into a command.
pub(crate) fn parse_command(line: &str) -> Result<IpcCommand, String> {
    serde_json::from_str::<IpcCommand>(line).map_err(|err| format!("Invalid command: {err}"))
}
