//! idlbridge entry point: run IDL code once (script mode) or serve JSON IPC.

use anyhow::{anyhow, bail, Context, Result};
use idlbridge::{
    adapter::SessionAdapter,
    config::AppConfig,
    host::{FileDisplay, MapNamespace},
    init_logging, init_tracing, ipc,
    log_debug, log_file_path,
    magic::RunRequest,
    profile::ProfileRegistry,
};
use std::{fs, io};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    let log_path = log_file_path();
    log_debug("=== idlbridge started ===");
    log_debug(&format!("Log file: {log_path:?}"));

    if config.json_ipc {
        log_debug("Running in JSON IPC mode");
        return ipc::run_ipc_mode(config);
    }

    let result = run_script(&config);
    log_debug("=== idlbridge exiting ===");
    if let Err(ref e) = result {
        log_debug(&format!("Exit with error: {e:#}"));
    }
    result
}

/// Collect positional code and the `--script` file into one block.
fn script_source(config: &AppConfig) -> Result<String> {
    let mut source = config.code.join(" ");
    if let Some(path) = &config.script {
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read script '{}'", path.display()))?;
        if !source.is_empty() {
            source.push('\n');
        }
        source.push_str(&body);
    }
    Ok(source)
}

fn run_script(config: &AppConfig) -> Result<()> {
    let source = script_source(config)?;
    if source.trim().is_empty() {
        bail!("no code given; pass CODE, --script FILE or --json-ipc");
    }

    // Plot size and format defaults come from the config through the profile.
    let mut adapter =
        SessionAdapter::start(config, &ProfileRegistry::new()).map_err(|err| anyhow!(err))?;
    let request = RunRequest {
        code: source,
        ..RunRequest::default()
    };

    let mut namespace = MapNamespace::new();
    let mut display = FileDisplay::new(io::stdout(), &config.plot_dir);
    adapter
        .run(&request, None, &mut namespace, &mut display)
        .map_err(|err| anyhow!(err))?;
    Ok(())
}
