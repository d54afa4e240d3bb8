use super::defaults::{
    MAX_INTERPRETER_ARGS, MAX_INTERPRETER_ARG_BYTES, MAX_PROMPT_CHARS, MAX_REPLY_TIMEOUT_MS,
    MAX_STARTUP_TIMEOUT_MS,
};
use super::AppConfig;
use crate::plot::PlotSize;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if self.startup_timeout_ms == 0 || self.startup_timeout_ms > MAX_STARTUP_TIMEOUT_MS {
            bail!(
                "--startup-timeout-ms must be between 1 and {MAX_STARTUP_TIMEOUT_MS}, got {}",
                self.startup_timeout_ms
            );
        }
        if self.reply_timeout_ms > MAX_REPLY_TIMEOUT_MS {
            bail!(
                "--reply-timeout-ms must be at most {MAX_REPLY_TIMEOUT_MS} (0 disables), got {}",
                self.reply_timeout_ms
            );
        }

        self.size
            .parse::<PlotSize>()
            .map_err(|err| anyhow!("--size {err}"))?;

        if let Some(prompt) = &self.prompt {
            if prompt.trim().is_empty() {
                bail!("--prompt must not be blank");
            }
            if prompt.chars().count() > MAX_PROMPT_CHARS {
                bail!("--prompt must be at most {MAX_PROMPT_CHARS} characters");
            }
            if prompt.chars().any(char::is_control) {
                bail!("--prompt must not contain control characters");
            }
        }

        if self.term_value.is_empty()
            || self
                .term_value
                .chars()
                .any(|ch| ch.is_control() || ch.is_whitespace())
        {
            bail!("--term must be a non-empty value without whitespace or control characters");
        }

        self.gdl_cmd = sanitize_binary(&self.gdl_cmd, "--gdl-cmd", &["gdl"])?;
        self.idl_cmd = sanitize_binary(&self.idl_cmd, "--idl-cmd", &["idl"])?;

        // Avoid huge argument lists when forwarding to the interpreter.
        if self.interpreter_args.len() > MAX_INTERPRETER_ARGS {
            bail!(
                "--interpreter-arg repeated too many times (max {MAX_INTERPRETER_ARGS}, got {})",
                self.interpreter_args.len()
            );
        }
        let total_arg_bytes: usize = self.interpreter_args.iter().map(|arg| arg.len()).sum();
        if total_arg_bytes > MAX_INTERPRETER_ARG_BYTES {
            bail!("combined --interpreter-arg length exceeds {MAX_INTERPRETER_ARG_BYTES} bytes");
        }
        if self
            .interpreter_args
            .iter()
            .any(|arg| arg.contains('\0'))
        {
            bail!("--interpreter-arg must not contain NUL bytes");
        }

        if let Some(script) = &self.script {
            if !script.is_file() {
                bail!("--script '{}' is not a readable file", script.display());
            }
        }
        if self.json_ipc && (self.script.is_some() || !self.code.is_empty()) {
            bail!("--json-ipc cannot be combined with --script or positional code");
        }

        Ok(())
    }
}

/// Allow either a known binary name or an existing executable path.
pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
