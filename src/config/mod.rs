//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use defaults::default_term;
pub use defaults::{
    DEFAULT_PLOT_FORMAT, DEFAULT_PLOT_SIZE, DEFAULT_REPLY_TIMEOUT_MS, DEFAULT_STARTUP_TIMEOUT_MS,
};

/// CLI options for idlbridge. Validated values keep the interpreter subprocess safe.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "idlbridge: run IDL/GDL code and exchange variables and plots with it",
    author,
    version
)]
pub struct AppConfig {
    /// Interpreter profile to start ("auto" tries GDL first, then IDL)
    #[arg(long, value_enum, env = "IDLBRIDGE_PROFILE", default_value_t = ProfileChoice::Auto)]
    pub profile: ProfileChoice,

    /// Path to the GDL binary
    #[arg(long = "gdl-cmd", env = "IDLBRIDGE_GDL_CMD", default_value = "gdl")]
    pub gdl_cmd: String,

    /// Path to the IDL binary
    #[arg(long = "idl-cmd", env = "IDLBRIDGE_IDL_CMD", default_value = "idl")]
    pub idl_cmd: String,

    /// Extra arguments passed to the interpreter (repeatable)
    #[arg(long = "interpreter-arg", action = ArgAction::Append, value_name = "ARG")]
    pub interpreter_args: Vec<String>,

    /// Prompt string that ends every interpreter reply (overrides the profile)
    #[arg(long)]
    pub prompt: Option<String>,

    /// TERM value exported to the interpreter
    #[arg(long = "term", default_value_t = default_term())]
    pub term_value: String,

    /// How long to wait for the first prompt after spawning (milliseconds)
    #[arg(long = "startup-timeout-ms", default_value_t = DEFAULT_STARTUP_TIMEOUT_MS)]
    pub startup_timeout_ms: u64,

    /// Per-reply timeout (milliseconds, 0 waits forever)
    #[arg(long = "reply-timeout-ms", default_value_t = DEFAULT_REPLY_TIMEOUT_MS)]
    pub reply_timeout_ms: u64,

    /// Default plot pixel size, "width,height"
    #[arg(short = 's', long, default_value = DEFAULT_PLOT_SIZE)]
    pub size: String,

    /// Default plot format (png, svg, jpg)
    #[arg(short = 'f', long, default_value = DEFAULT_PLOT_FORMAT)]
    pub format: String,

    /// Directory where published plot images are written
    #[arg(long = "plot-dir", default_value = ".")]
    pub plot_dir: PathBuf,

    /// IDL source file to run (appended after any positional code)
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Run in JSON IPC mode for notebook/frontend integration
    #[arg(long = "json-ipc")]
    pub json_ipc: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "IDLBRIDGE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "IDLBRIDGE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging source lines, replies and values (debug log only)
    #[arg(
        long = "log-content",
        env = "IDLBRIDGE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// IDL code to run in script mode
    #[arg(value_name = "CODE", trailing_var_arg = true, allow_hyphen_values = true)]
    pub code: Vec<String>,
}

/// Interpreter selection from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileChoice {
    Auto,
    Gdl,
    Idl,
}

impl ProfileChoice {
    pub fn label(self) -> &'static str {
        match self {
            ProfileChoice::Auto => "auto",
            ProfileChoice::Gdl => "gdl",
            ProfileChoice::Idl => "idl",
        }
    }
}

impl AppConfig {
    pub fn logging_enabled(&self) -> bool {
        self.logs && !self.no_logs
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// `None` means wait for the prompt indefinitely.
    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_ms > 0).then(|| Duration::from_millis(self.reply_timeout_ms))
    }
}
