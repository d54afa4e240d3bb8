//! Session profiles for the interpreters idlbridge can drive.
//!
//! A profile is plain data: how to launch the interpreter, which prompt ends
//! each reply, and the plot boilerplate wrapped around user code. GDL and IDL
//! differ only in these values, so there is one adapter and several profiles.

mod gdl;
mod idl;

use crate::config::{AppConfig, ProfileChoice};
use crate::plot::PlotSize;

/// Placeholders recognised in plot templates.
pub const WIDTH_PLACEHOLDER: &str = "{width}";
pub const HEIGHT_PLACEHOLDER: &str = "{height}";
pub const OUTFILE_PLACEHOLDER: &str = "{outfile}";
pub const WRITER_PLACEHOLDER: &str = "{writer}";
pub const MARKER_PLACEHOLDER: &str = "{marker}";
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Preamble/postamble pair for one rendering path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotTemplates {
    pub preamble: String,
    pub postamble: String,
}

/// Configuration describing one interpreter flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    /// Internal identifier ("gdl", "idl").
    pub name: String,
    /// Human-readable name used in events and logs.
    pub display_name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Text the interpreter prints when it is ready for the next request.
    pub prompt: String,
    /// Z-buffer rendering used for png and jpeg output.
    pub raster: PlotTemplates,
    /// Vector rendering used for svg output, when the interpreter has a device for it.
    pub vector: Option<PlotTemplates>,
    pub default_size: PlotSize,
    /// `% ` lines starting with these prefixes are chatter, not errors.
    pub info_prefixes: Vec<String>,
    /// Statement printing `{marker}` on its own line. Sent after every request
    /// so the end of a reply is never inferred from the prompt alone.
    pub marker_template: String,
    /// Statement running the file at `{path}`, for requests too long to type.
    pub batch_template: String,
    pub exit_command: String,
}

impl SessionProfile {
    /// Render one template with the plot geometry, output file literal and writer statement.
    pub fn render(template: &str, size: PlotSize, outfile_literal: &str, writer: &str) -> String {
        template
            .replace(WIDTH_PLACEHOLDER, &size.width.to_string())
            .replace(HEIGHT_PLACEHOLDER, &size.height.to_string())
            .replace(WRITER_PLACEHOLDER, writer)
            .replace(OUTFILE_PLACEHOLDER, outfile_literal)
    }

    pub fn marker_command(&self, marker: &str) -> String {
        self.marker_template.replace(MARKER_PLACEHOLDER, marker)
    }

    pub fn batch_command(&self, path: &str) -> String {
        self.batch_template.replace(PATH_PLACEHOLDER, path)
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_default_size(mut self, size: PlotSize) -> Self {
        self.default_size = size;
        self
    }

    /// Full argv as launched, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.command.clone()];
        parts.extend(self.args.iter().cloned());
        shell_words::join(parts)
    }

    pub fn is_info_line(&self, line: &str) -> bool {
        self.info_prefixes
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
    }
}

/// Registry of built-in profiles.
pub struct ProfileRegistry {
    profiles: Vec<SessionProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRegistry {
    /// Create a registry with the built-in profiles in fallback order.
    pub fn new() -> Self {
        Self {
            profiles: vec![gdl::profile(), idl::profile()],
        }
    }

    /// Look up a profile by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&SessionProfile> {
        let name_lower = name.to_lowercase();
        self.profiles
            .iter()
            .find(|profile| profile.name.to_lowercase() == name_lower)
    }

    /// List all available profile names.
    pub fn available(&self) -> Vec<&str> {
        self.profiles
            .iter()
            .map(|profile| profile.name.as_str())
            .collect()
    }

    /// Register an additional profile; it is tried after the built-ins in `auto` mode.
    pub fn register(&mut self, profile: SessionProfile) {
        self.profiles.push(profile);
    }

    /// Ordered startup candidates for the configured choice, with CLI overrides applied.
    pub fn candidates(&self, config: &AppConfig) -> Vec<SessionProfile> {
        let selected: Vec<&SessionProfile> = match config.profile {
            ProfileChoice::Auto => self.profiles.iter().collect(),
            ProfileChoice::Gdl => self.get("gdl").into_iter().collect(),
            ProfileChoice::Idl => self.get("idl").into_iter().collect(),
        };
        let default_size = config.size.parse::<PlotSize>().ok();
        selected
            .into_iter()
            .map(|profile| {
                let mut profile = profile.clone();
                match profile.name.as_str() {
                    "gdl" => profile = profile.with_command(config.gdl_cmd.clone()),
                    "idl" => profile = profile.with_command(config.idl_cmd.clone()),
                    _ => {}
                }
                profile = profile.with_args(config.interpreter_args.clone());
                if let Some(prompt) = &config.prompt {
                    profile = profile.with_prompt(prompt.clone());
                }
                if let Some(size) = default_size {
                    profile = profile.with_default_size(size);
                }
                profile
            })
            .collect()
    }
}

/// IDL and GDL print a quoted literal verbatim.
pub(crate) const PRINT_MARKER: &str = "print, '{marker}'";

/// Batch-file execution; every line in the file runs as if typed at the prompt.
pub(crate) const RUN_BATCH: &str = "@{path}";

/// Info prefixes shared by IDL and GDL.
pub(crate) fn common_info_prefixes() -> Vec<String> {
    [
        "% Compiled module:",
        "% Loaded DLM:",
        "% Restored file:",
        "% Program caused arithmetic error:",
    ]
    .iter()
    .map(|prefix| prefix.to_string())
    .collect()
}
