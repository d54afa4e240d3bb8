//! The session adapter: one interpreter session exposed as `push`, `pull` and `run`.
//!
//! Every operation is a blocking request/reply exchange; the adapter never has
//! more than one request outstanding.

mod error;

pub use error::{AdapterError, NameSide};

use crate::config::AppConfig;
use crate::host::{DisplayData, DisplaySink, Namespace, DISPLAY_SOURCE};
use crate::magic::{self, RunRequest};
use crate::marshal::is_identifier;
use crate::normalize;
use crate::plot::{PlotFormat, PlotScript, PlotSize, ScratchDir};
use crate::profile::{ProfileRegistry, SessionProfile};
use crate::session::{Interpreter, InterpreterOptions, PtyInterpreter, SessionError};
use crate::{log_debug, log_debug_content};
use serde_json::Value;
use tracing::{debug, info, warn};

/// One live interpreter session plus the plot defaults used by `run`.
pub struct SessionAdapter<I: Interpreter> {
    interpreter: I,
    profile: SessionProfile,
    size: PlotSize,
    format: PlotFormat,
}

impl SessionAdapter<PtyInterpreter> {
    /// Start the first configured candidate that comes up.
    pub fn start(config: &AppConfig, registry: &ProfileRegistry) -> Result<Self, AdapterError> {
        let options = InterpreterOptions::from_config(config);
        let adapter = Self::start_with(registry.candidates(config), |profile| {
            PtyInterpreter::start(profile.clone(), &options)
        })?;
        Ok(adapter.with_format(PlotFormat::parse_lossy(&config.format)))
    }
}

impl<I: Interpreter> SessionAdapter<I> {
    /// Try `candidates` in order with `launch`; the first success wins.
    pub fn start_with<F>(candidates: Vec<SessionProfile>, mut launch: F) -> Result<Self, AdapterError>
    where
        F: FnMut(&SessionProfile) -> Result<I, SessionError>,
    {
        let mut attempts = Vec::new();
        for profile in candidates {
            match launch(&profile) {
                Ok(interpreter) => {
                    info!(profile = %profile.name, command = %profile.command_line(), "interpreter started");
                    return Ok(Self::new(interpreter, profile));
                }
                Err(err) => {
                    warn!(profile = %profile.name, error = %err, "interpreter candidate failed");
                    log_debug(&format!("candidate {} failed: {err}", profile.name));
                    attempts.push(format!("{}: {err}", profile.name));
                }
            }
        }
        Err(AdapterError::SessionUnavailable { attempts })
    }

    pub fn new(interpreter: I, profile: SessionProfile) -> Self {
        let size = profile.default_size;
        Self {
            interpreter,
            profile,
            size,
            format: PlotFormat::default(),
        }
    }

    pub fn with_format(mut self, format: PlotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_size(mut self, size: PlotSize) -> Self {
        self.size = size;
        self
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    pub fn size(&self) -> PlotSize {
        self.size
    }

    pub fn format(&self) -> PlotFormat {
        self.format
    }

    pub fn interpreter_mut(&mut self) -> &mut I {
        &mut self.interpreter
    }

    /// Copy host variables into the session. `local` is searched before `host`.
    ///
    /// Every name is resolved before anything is sent, so a missing name leaves
    /// the session untouched.
    pub fn push(
        &mut self,
        names: &[String],
        local: Option<&dyn Namespace>,
        host: &dyn Namespace,
    ) -> Result<(), AdapterError> {
        debug!(count = names.len(), "push");
        let mut resolved: Vec<(&str, Value)> = Vec::with_capacity(names.len());
        for name in names {
            check_identifier(name)?;
            let value = local
                .and_then(|scope| scope.get(name))
                .or_else(|| host.get(name))
                .ok_or_else(|| AdapterError::NameNotFound {
                    name: name.clone(),
                    side: NameSide::Host,
                })?;
            resolved.push((name.as_str(), value));
        }
        for (name, value) in resolved {
            self.interpreter
                .assign(name, &value)
                .map_err(|err| AdapterError::Transfer {
                    name: name.to_string(),
                    reason: err.to_string(),
                })?;
            log_debug_content(&format!("pushed {name} = {value}"));
        }
        Ok(())
    }

    /// Copy session variables into the host namespace.
    pub fn pull(&mut self, names: &[String], host: &mut dyn Namespace) -> Result<(), AdapterError> {
        debug!(count = names.len(), "pull");
        let mut pulled = Vec::with_capacity(names.len());
        for name in names {
            check_identifier(name)?;
            let value = self.interpreter.evaluate(name).map_err(|err| match err {
                SessionError::Undefined(_) => AdapterError::NameNotFound {
                    name: name.clone(),
                    side: NameSide::Session,
                },
                other => AdapterError::Transfer {
                    name: name.clone(),
                    reason: other.to_string(),
                },
            })?;
            log_debug_content(&format!("pulled {name} = {value}"));
            pulled.push((name, value));
        }
        for (name, value) in pulled {
            host.set(name, value);
        }
        Ok(())
    }

    pub fn push_line(
        &mut self,
        line: &str,
        local: Option<&dyn Namespace>,
        host: &dyn Namespace,
    ) -> Result<(), AdapterError> {
        let names = magic::parse_names(line)?;
        self.push(&names, local, host)
    }

    pub fn pull_line(&mut self, line: &str, host: &mut dyn Namespace) -> Result<(), AdapterError> {
        let names = magic::parse_names(line)?;
        self.pull(&names, host)
    }

    /// Parse a `run` line (plus optional body) and run it.
    pub fn run_line(
        &mut self,
        line: &str,
        cell: Option<&str>,
        local: Option<&dyn Namespace>,
        host: &mut dyn Namespace,
        display: &mut dyn DisplaySink,
    ) -> Result<DisplayData, AdapterError> {
        let request = magic::parse_run(line, cell)?;
        self.run(&request, local, host, display)
    }

    /// Push inputs, run the code between the plot preamble and postamble, pull
    /// outputs and publish the collected text and images.
    ///
    /// On failure nothing is published and text gathered so far is dropped. The
    /// scratch directory is removed on every path.
    pub fn run(
        &mut self,
        request: &RunRequest,
        local: Option<&dyn Namespace>,
        host: &mut dyn Namespace,
        display: &mut dyn DisplaySink,
    ) -> Result<DisplayData, AdapterError> {
        let size = request.size.unwrap_or(self.size);
        let format = request.format.unwrap_or(self.format);
        info!(
            profile = %self.profile.name,
            size = %size,
            format = format.extension(),
            inputs = request.inputs.len(),
            outputs = request.outputs.len(),
            "run"
        );

        self.push(&request.inputs, local, &*host)?;

        let scratch = ScratchDir::new()?;
        let outcome = self.run_in_scratch(&scratch, request, size, format, host);
        let scratch_path = scratch.path().to_path_buf();
        if let Err(err) = scratch.close() {
            warn!(path = %scratch_path.display(), error = %err, "scratch directory not removed");
            log_debug(&format!("scratch cleanup failed: {err:#}"));
        }
        let data = outcome?;

        if !data.is_empty() {
            display.publish(DISPLAY_SOURCE, &data)?;
        }
        info!(entries = data.entries.len(), "run complete");
        Ok(data)
    }

    fn run_in_scratch(
        &mut self,
        scratch: &ScratchDir,
        request: &RunRequest,
        size: PlotSize,
        format: PlotFormat,
        host: &mut dyn Namespace,
    ) -> Result<DisplayData, AdapterError> {
        let script = PlotScript::build(&self.profile, format, size, scratch);
        let units = normalize::assemble(&script.preamble, &request.code, &script.postamble);

        let mut replies = Vec::new();
        for unit in &units {
            match self.interpreter.execute(unit, true) {
                Ok(Some(text)) => replies.push(text),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "execution unit failed");
                    log_debug_content(&format!("failed unit: {unit}"));
                    return Err(AdapterError::ExecutionFailed {
                        line: unit.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let images = scratch.collect_artifacts(script.format)?;
        self.pull(&request.outputs, host)?;

        let mut data = DisplayData::default();
        let text = replies.join("\n");
        if !text.is_empty() {
            data.push_text(text);
        }
        for image in images {
            data.push_image(script.format.mime_type(), image);
        }
        Ok(data)
    }
}

fn check_identifier(name: &str) -> Result<(), AdapterError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(AdapterError::InvalidArguments(format!(
            "'{name}' is not a valid variable name"
        )))
    }
}
