use crate::adapter::{AdapterError, NameSide};
use crate::host::Namespace;
use crate::marshal::is_identifier;
use crate::session::Interpreter;
use serde_json::Value;

use super::protocol::{IpcCommand, IpcEvent};
use super::session::{send_event, IpcState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoopControl {
    Continue,
    Stop,
}

// ============================================================================
// Command Handlers
// ============================================================================

/// Run one command to completion and report `done` or `error`.
pub(super) fn handle_command<I: Interpreter>(state: &mut IpcState<I>, cmd: IpcCommand) -> LoopControl {
    let label = cmd.label();
    let result = match cmd {
        IpcCommand::Set { name, value } => handle_set(state, &name, value),
        IpcCommand::Get { name } => handle_get(state, &name),
        IpcCommand::Push { line } => state.adapter.push_line(&line, None, &state.namespace),
        IpcCommand::Pull { line } => state.adapter.pull_line(&line, &mut state.namespace),
        IpcCommand::Run { line, cell } => state
            .adapter
            .run_line(
                &line,
                cell.as_deref(),
                None,
                &mut state.namespace,
                &mut state.display,
            )
            .map(|_| ()),
        IpcCommand::Capabilities => {
            state.emit_capabilities();
            Ok(())
        }
        IpcCommand::Shutdown => {
            send_event(&IpcEvent::Done {
                cmd: label.to_string(),
            });
            return LoopControl::Stop;
        }
    };

    match result {
        Ok(()) => send_event(&IpcEvent::Done {
            cmd: label.to_string(),
        }),
        Err(err) => send_event(&IpcEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }),
    }
    LoopControl::Continue
}

fn handle_set<I: Interpreter>(
    state: &mut IpcState<I>,
    name: &str,
    value: Value,
) -> Result<(), AdapterError> {
    if !is_identifier(name) {
        return Err(AdapterError::InvalidArguments(format!(
            "'{name}' is not a valid variable name"
        )));
    }
    state.namespace.set(name, value);
    Ok(())
}

fn handle_get<I: Interpreter>(state: &mut IpcState<I>, name: &str) -> Result<(), AdapterError> {
    let value = state
        .namespace
        .get(name)
        .ok_or_else(|| AdapterError::NameNotFound {
            name: name.to_string(),
            side: NameSide::Host,
        })?;
    send_event(&IpcEvent::Value {
        name: name.to_string(),
        value,
    });
    Ok(())
}
