//! Minimal PTY wrapper used to host the IDL/GDL interpreter in a real terminal
//! so one long-lived session keeps its variables between requests.

mod io;
mod pty;

#[cfg(test)]
mod tests;

pub use pty::{PtySession, ReadOutcome, SpawnSpec};
