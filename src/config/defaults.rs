pub(super) const MAX_INTERPRETER_ARGS: usize = 32;
pub(super) const MAX_INTERPRETER_ARG_BYTES: usize = 8 * 1024;
pub(super) const MAX_STARTUP_TIMEOUT_MS: u64 = 120_000;
pub(super) const MAX_REPLY_TIMEOUT_MS: u64 = 3_600_000;
pub(super) const MAX_PROMPT_CHARS: usize = 32;

pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 0;
pub const DEFAULT_PLOT_SIZE: &str = "400,250";
pub const DEFAULT_PLOT_FORMAT: &str = "png";

/// Interpreters under a PTY emit fewer escape sequences with a dumb terminal.
pub(super) fn default_term() -> String {
    "dumb".to_string()
}
