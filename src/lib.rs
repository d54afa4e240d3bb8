pub mod adapter;
mod app;
pub mod config;
pub mod host;
pub mod ipc;
pub mod magic;
pub mod marshal;
pub mod normalize;
pub mod plot;
pub mod profile;
pub mod pty_session;
pub mod session;
mod telemetry;

pub use app::logging::{init_logging, log_debug, log_debug_content, log_file_path};
pub use telemetry::init_tracing;
