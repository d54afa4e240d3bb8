use crate::adapter::SessionAdapter;
use crate::config::AppConfig;
use crate::host::{DisplayData, DisplayPayload, DisplaySink, ImageStore, MapNamespace};
use crate::profile::ProfileRegistry;
use crate::session::Interpreter;
use crate::{log_debug, log_debug_content};
use anyhow::{anyhow, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

#[cfg(test)]
use std::cell::RefCell;

use super::protocol::{parse_command, DisplayItem, IpcCommand, IpcEvent};
use super::router::{handle_command, LoopControl};

/// A parsed command, or the parse error for a line that was not one.
pub(super) type IpcInput = Result<IpcCommand, String>;

// ============================================================================
// IPC State
// ============================================================================

pub(super) struct IpcState<I: Interpreter> {
    pub(super) adapter: SessionAdapter<I>,
    pub(super) namespace: MapNamespace,
    pub(super) display: EventDisplay,
}

impl<I: Interpreter> IpcState<I> {
    pub(super) fn new(adapter: SessionAdapter<I>, plot_dir: impl Into<PathBuf>) -> Self {
        Self {
            adapter,
            namespace: MapNamespace::new(),
            display: EventDisplay::new(plot_dir),
        }
    }

    pub(super) fn emit_capabilities(&self) {
        let profile = self.adapter.profile();
        send_event(&IpcEvent::Capabilities {
            profile: profile.name.clone(),
            display_name: profile.display_name.clone(),
            prompt: profile.prompt.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            plot_size: self.adapter.size().to_string(),
            plot_format: self.adapter.format().extension().to_string(),
            plot_dir: self.display.images.dir().display().to_string(),
        });
    }
}

/// Display sink that saves images and emits one `display` event per payload.
pub(super) struct EventDisplay {
    images: ImageStore,
}

impl EventDisplay {
    pub(super) fn new(plot_dir: impl Into<PathBuf>) -> Self {
        Self {
            images: ImageStore::new(plot_dir),
        }
    }
}

impl DisplaySink for EventDisplay {
    fn publish(&mut self, source: &str, data: &DisplayData) -> Result<()> {
        let mut items = Vec::with_capacity(data.entries.len());
        for entry in &data.entries {
            let item = match &entry.payload {
                DisplayPayload::Text(text) => DisplayItem {
                    mime: entry.mime.clone(),
                    text: Some(text.clone()),
                    path: None,
                },
                DisplayPayload::Binary(bytes) => {
                    let path = self.images.save(&entry.mime, bytes)?;
                    DisplayItem {
                        mime: entry.mime.clone(),
                        text: None,
                        path: Some(path.display().to_string()),
                    }
                }
            };
            items.push(item);
        }
        send_event(&IpcEvent::Display {
            source: source.to_string(),
            data: items,
        });
        Ok(())
    }
}

// ============================================================================
// Event Sending
// ============================================================================

pub(super) fn send_event(event: &IpcEvent) {
    #[cfg(test)]
    if capture_test_event(event) {
        return;
    }
    if let Ok(json) = serde_json::to_string(event) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{json}");
        let _ = stdout.flush();
    }
}

// Events are captured per test thread; the loop never emits from another thread.
#[cfg(test)]
thread_local! {
    static EVENT_SINK: RefCell<Option<Vec<IpcEvent>>> = const { RefCell::new(None) };
}

#[cfg(test)]
fn capture_test_event(event: &IpcEvent) -> bool {
    EVENT_SINK.with(|sink| match sink.borrow_mut().as_mut() {
        Some(events) => {
            events.push(event.clone());
            true
        }
        None => false,
    })
}

#[cfg(test)]
pub(super) fn init_event_sink() {
    EVENT_SINK.with(|sink| *sink.borrow_mut() = Some(Vec::new()));
}

#[cfg(test)]
pub(super) fn take_events() -> Vec<IpcEvent> {
    EVENT_SINK.with(|sink| {
        sink.borrow_mut()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    })
}

// ============================================================================
// Stdin Reader Thread
// ============================================================================

fn spawn_stdin_reader(tx: Sender<IpcInput>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        let stdin_lock = stdin.lock();

        for line in stdin_lock.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if tx.send(parse_command(trimmed)).is_err() {
                break; // Main thread has exited
            }
        }

        log_debug("Stdin reader thread exiting");
    })
}

// ============================================================================
// Main Loop
// ============================================================================

/// Run the JSON IPC protocol until `shutdown` or end of input.
pub fn run_ipc_mode(config: AppConfig) -> Result<()> {
    log_debug("Starting JSON IPC mode");

    let registry = ProfileRegistry::new();
    let adapter = match SessionAdapter::start(&config, &registry) {
        Ok(adapter) => adapter,
        Err(err) => {
            send_event(&IpcEvent::Error {
                kind: err.kind().to_string(),
                message: err.to_string(),
            });
            return Err(anyhow!(err));
        }
    };

    let mut state = IpcState::new(adapter, config.plot_dir.clone());
    state.emit_capabilities();

    let (cmd_tx, cmd_rx) = mpsc::channel();
    let _stdin_handle = spawn_stdin_reader(cmd_tx);
    run_ipc_loop(&mut state, &cmd_rx);
    log_debug("IPC loop finished");
    Ok(())
}

/// Process inputs in arrival order until `shutdown` or the channel closes.
pub(super) fn run_ipc_loop<I: Interpreter>(state: &mut IpcState<I>, cmd_rx: &Receiver<IpcInput>) {
    for input in cmd_rx.iter() {
        match input {
            Ok(cmd) => {
                log_debug_content(&format!("IPC command received: {cmd:?}"));
                if handle_command(state, cmd) == LoopControl::Stop {
                    break;
                }
            }
            Err(message) => {
                send_event(&IpcEvent::Error {
                    kind: "invalid_command".to_string(),
                    message,
                });
            }
        }
    }
}
