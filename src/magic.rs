//! Parsing of the `push`, `pull` and `run` invocation lines.
//!
//! Options are tokenized with shell quoting rules, but the code that follows
//! them is taken verbatim from the raw line so IDL string quotes survive.

use crate::adapter::AdapterError;
use crate::marshal::is_identifier;
use crate::plot::{PlotFormat, PlotSize};
use clap::{ArgAction, Parser};

/// Options accepted in front of the code on a `run` line.
#[derive(Debug, Parser)]
#[command(
    name = "run",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct RunArgs {
    /// Host variables to push before running
    #[arg(short = 'i', long = "input", action = ArgAction::Append, value_delimiter = ',')]
    inputs: Vec<String>,

    /// Session variables to pull after running
    #[arg(short = 'o', long = "output", action = ArgAction::Append, value_delimiter = ',')]
    outputs: Vec<String>,

    /// Plot size "width,height"
    #[arg(short = 's', long = "size")]
    size: Option<String>,

    /// Plot format (png, svg, jpg)
    #[arg(short = 'f', long = "format")]
    format: Option<String>,
}

/// Short and long spellings of the options that take a value.
const VALUE_OPTIONS: &[(&str, &str)] = &[
    ("-i", "--input"),
    ("-o", "--output"),
    ("-s", "--size"),
    ("-f", "--format"),
];

/// Fully parsed `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunRequest {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub size: Option<PlotSize>,
    pub format: Option<PlotFormat>,
    pub code: String,
}

/// Split a `push`/`pull` line on whitespace and commas and validate each name.
pub fn parse_names(line: &str) -> Result<Vec<String>, AdapterError> {
    line.split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|name| !name.is_empty())
        .map(validate_name)
        .collect()
}

fn validate_name(name: &str) -> Result<String, AdapterError> {
    if is_identifier(name) {
        Ok(name.to_string())
    } else {
        Err(AdapterError::InvalidArguments(format!(
            "'{name}' is not a valid variable name"
        )))
    }
}

/// Parse `run [-i names] [-o names] [-s W,H] [-f fmt] [code...]` plus an optional body.
pub fn parse_run(line: &str, cell: Option<&str>) -> Result<RunRequest, AdapterError> {
    let (options, inline_code) = split_options(line);
    let tokens = shell_words::split(options).map_err(|err| {
        AdapterError::InvalidArguments(format!("cannot tokenize run options: {err}"))
    })?;
    let tokens: Vec<String> = tokens.into_iter().filter(|token| token != "--").collect();
    let args = RunArgs::try_parse_from(&tokens)
        .map_err(|err| AdapterError::InvalidArguments(first_line(&err.to_string())))?;

    let size = args
        .size
        .as_deref()
        .map(|raw| {
            raw.parse::<PlotSize>()
                .map_err(|err| AdapterError::InvalidArguments(format!("size {err}")))
        })
        .transpose()?;

    let code = match (inline_code.trim(), cell) {
        ("", Some(body)) => body.to_string(),
        ("", None) => String::new(),
        (inline, Some(body)) => format!("{inline}\n{body}"),
        (inline, None) => inline.to_string(),
    };

    Ok(RunRequest {
        inputs: collect_names(&args.inputs)?,
        outputs: collect_names(&args.outputs)?,
        size,
        format: args.format.as_deref().map(PlotFormat::parse_lossy),
        code,
    })
}

fn collect_names(raw: &[String]) -> Result<Vec<String>, AdapterError> {
    raw.iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(validate_name)
        .collect()
}

fn first_line(message: &str) -> String {
    message
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("invalid run options")
        .trim_start_matches("error: ")
        .to_string()
}

/// Split the raw line into the option prefix and the code that follows it.
fn split_options(line: &str) -> (&str, &str) {
    let mut pos = 0;
    let mut expects_value = false;
    while let Some((start, end)) = next_token(line, pos) {
        let token = &line[start..end];
        if expects_value {
            expects_value = false;
            pos = end;
            continue;
        }
        if token == "--" {
            return (&line[..end], &line[end..]);
        }
        match option_kind(token) {
            OptionKind::NeedsValue => expects_value = true,
            OptionKind::WithValue => {}
            OptionKind::NotAnOption => return (&line[..start], &line[start..]),
        }
        pos = end;
    }
    (line, "")
}

enum OptionKind {
    /// `-i` / `--input`; the value is the next token.
    NeedsValue,
    /// `-ix,y` / `--input=x,y`.
    WithValue,
    NotAnOption,
}

fn option_kind(token: &str) -> OptionKind {
    for (short, long) in VALUE_OPTIONS {
        if token == *short || token == *long {
            return OptionKind::NeedsValue;
        }
        if token.starts_with(&format!("{long}=")) {
            return OptionKind::WithValue;
        }
        if token.len() > short.len() && token.starts_with(short) && !token.starts_with("--") {
            return OptionKind::WithValue;
        }
    }
    OptionKind::NotAnOption
}

/// Byte range of the next whitespace-delimited token at or after `pos`,
/// keeping quoted sections together.
fn next_token(line: &str, pos: usize) -> Option<(usize, usize)> {
    let rest = line.get(pos..)?;
    let offset = rest.find(|ch: char| !ch.is_whitespace())?;
    let start = pos + offset;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in line[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(open) if ch == open => quote = None,
            Some('"') if ch == '\\' => escaped = true,
            Some(_) => {}
            None if ch == '\\' => escaped = true,
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch.is_whitespace() => return Some((start, start + idx)),
            None => {}
        }
    }
    Some((start, line.len()))
}
