//! JSON IPC mode for notebook and frontend integration.
//!
//! A JSON-lines protocol over stdin/stdout lets an external host drive one
//! interpreter session.
//!
//! Architecture:
//! - Stdin reader thread: reads JSON commands, sends them to the main loop via a channel
//! - Main loop: runs each command to completion against the session adapter
//! - Display sink: plot images are saved to disk and referenced by path
//!
//! Protocol:
//! - Each line is a JSON object
//! - Events (Rust → client): {"event": "...", ...}
//! - Commands (client → Rust): {"cmd": "...", ...}

mod protocol;
mod router;
mod session;


pub use protocol::{DisplayItem, IpcCommand, IpcEvent};
pub use session::run_ipc_mode;
