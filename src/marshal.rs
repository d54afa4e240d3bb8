//! Conversion between host values (JSON) and IDL source/printed output.
//!
//! Pushing builds an IDL literal for an assignment. Pulling asks the session to
//! describe a variable and print its elements one per line behind a `|`
//! sentinel, then rebuilds the JSON shape from the reported dimensions.
//! String elements are printed as hex bytes so trailing blanks and embedded
//! newlines survive the terminal.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::OnceLock;

/// Deepest array literal the interpreter's bracket concatenation accepts.
const MAX_LITERAL_DEPTH: usize = 3;

/// Prefix of every value line printed for a pull.
pub const VALUE_SENTINEL: char = '|';

const INTEGER_FORMAT: &str = "'(\"|\",I0)'";
const FLOAT_FORMAT: &str = "'(\"|\",E26.17)'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    Null,
    EmptyArray,
    EmptyObject,
    RaggedArray,
    TooDeep(usize),
    InvalidField(String),
    UnsupportedType(i64),
    Malformed(String),
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarshalError::Null => write!(f, "null has no IDL equivalent"),
            MarshalError::EmptyArray => write!(f, "IDL has no empty arrays"),
            MarshalError::EmptyObject => write!(f, "IDL structures need at least one field"),
            MarshalError::RaggedArray => write!(f, "nested arrays must be rectangular"),
            MarshalError::TooDeep(depth) => write!(
                f,
                "array nesting depth {depth} exceeds the literal limit of {MAX_LITERAL_DEPTH}"
            ),
            MarshalError::InvalidField(name) => {
                write!(f, "'{name}' is not a valid structure field name")
            }
            MarshalError::UnsupportedType(code) => {
                write!(f, "IDL type code {code} cannot be transferred")
            }
            MarshalError::Malformed(detail) => write!(f, "unexpected session output: {detail}"),
        }
    }
}

impl std::error::Error for MarshalError {}

/// True when `name` is a valid IDL identifier.
pub fn is_identifier(name: &str) -> bool {
    static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();
    let re = IDENTIFIER_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier regex should compile")
    });
    re.is_match(name)
}

/// Quote text as an IDL string literal. Newlines are spliced in with `string(10b)`.
pub fn quote_string(text: &str) -> String {
    text.split('\n')
        .map(|part| format!("'{}'", part.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(" + string(10b) + ")
}

/// Build the IDL literal for a host value.
pub fn to_literal(value: &Value) -> Result<String, MarshalError> {
    match value {
        Value::Null => Err(MarshalError::Null),
        Value::Bool(flag) => Ok(if *flag { "1B" } else { "0B" }.to_string()),
        Value::Number(number) => Ok(number_literal(number)),
        Value::String(text) => Ok(quote_string(text)),
        Value::Array(_) => {
            let depth = array_depth(value)?;
            if depth > MAX_LITERAL_DEPTH {
                return Err(MarshalError::TooDeep(depth));
            }
            array_literal(value)
        }
        Value::Object(fields) => struct_literal(fields),
    }
}

fn number_literal(number: &Number) -> String {
    if let Some(int) = number.as_i64() {
        if i32::try_from(int).is_ok() {
            format!("{int}L")
        } else {
            format!("{int}LL")
        }
    } else if let Some(unsigned) = number.as_u64() {
        format!("{unsigned}ULL")
    } else {
        double_literal(number.as_f64().unwrap_or(f64::NAN))
    }
}

/// Double-precision literal, e.g. `1.5D0`.
pub fn double_literal(value: f64) -> String {
    if value.is_nan() {
        return "!values.d_nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "!values.d_infinity".to_string()
        } else {
            "-!values.d_infinity".to_string()
        };
    }
    format!("{value:e}").replace('e', "D")
}

/// Depth of a rectangular array, or an error for empty or ragged nesting.
fn array_depth(value: &Value) -> Result<usize, MarshalError> {
    Ok(array_shape(value)?.len())
}

fn array_shape(value: &Value) -> Result<Vec<usize>, MarshalError> {
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    let first = items.first().ok_or(MarshalError::EmptyArray)?;
    let inner = array_shape(first)?;
    for item in items.iter().skip(1) {
        if array_shape(item)? != inner {
            return Err(MarshalError::RaggedArray);
        }
    }
    let mut shape = vec![items.len()];
    shape.extend(inner);
    Ok(shape)
}

fn array_literal(value: &Value) -> Result<String, MarshalError> {
    match value {
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(array_literal)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", parts.join(", ")))
        }
        other => to_literal(other),
    }
}

fn struct_literal(fields: &Map<String, Value>) -> Result<String, MarshalError> {
    if fields.is_empty() {
        return Err(MarshalError::EmptyObject);
    }
    let mut parts = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        if !is_identifier(name) {
            return Err(MarshalError::InvalidField(name.clone()));
        }
        parts.push(format!("{name}: {}", to_literal(value)?));
    }
    Ok(format!("{{{}}}", parts.join(", ")))
}

/// Element kinds that survive a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Integer,
    Float,
    String,
}

impl ElementKind {
    /// Map an IDL `size(/type)` code.
    pub fn from_type_code(code: i64) -> Result<Self, MarshalError> {
        match code {
            1 | 2 | 3 | 12 | 13 | 14 | 15 => Ok(ElementKind::Integer),
            4 | 5 => Ok(ElementKind::Float),
            7 => Ok(ElementKind::String),
            other => Err(MarshalError::UnsupportedType(other)),
        }
    }
}

/// Type, element count and rank of a session variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Description {
    pub type_code: i64,
    pub count: usize,
    pub rank: usize,
}

impl Description {
    pub fn is_defined(&self) -> bool {
        self.count > 0 && self.type_code != 0
    }
}

pub fn describe_command(name: &str) -> String {
    format!(
        "print, size({name}, /type), n_elements({name}), size({name}, /n_dimensions), format={INTEGER_FORMAT}"
    )
}

pub fn dimensions_command(name: &str) -> String {
    format!("print, size({name}, /dimensions), format={INTEGER_FORMAT}")
}

pub fn values_command(name: &str, kind: ElementKind) -> String {
    match kind {
        ElementKind::Integer => format!("print, {name}, format={INTEGER_FORMAT}"),
        ElementKind::Float => format!("print, {name}, format={FLOAT_FORMAT}"),
        ElementKind::String => format!(
            "for idlbridge_i = 0L, n_elements({name}) - 1 do print, '{VALUE_SENTINEL}' + strjoin(string(byte({name}[idlbridge_i]), format='(Z02)'), '')"
        ),
    }
}

/// Lines of `reply` carrying the value sentinel, with the sentinel removed.
fn sentinel_lines(reply: &str) -> impl Iterator<Item = &str> {
    reply
        .lines()
        .filter_map(|line| line.strip_prefix(VALUE_SENTINEL))
}

fn parse_integers(reply: &str) -> Result<Vec<i64>, MarshalError> {
    sentinel_lines(reply)
        .map(|line| {
            line.trim()
                .parse::<i64>()
                .map_err(|_| MarshalError::Malformed(format!("expected an integer, got '{line}'")))
        })
        .collect()
}

pub fn parse_description(reply: &str) -> Result<Description, MarshalError> {
    let values = parse_integers(reply)?;
    match values.as_slice() {
        [type_code, count, rank] => Ok(Description {
            type_code: *type_code,
            count: usize::try_from(*count).unwrap_or(0),
            rank: usize::try_from(*rank).unwrap_or(0),
        }),
        _ => Err(MarshalError::Malformed(format!(
            "expected type, count and rank, got {values:?}"
        ))),
    }
}

pub fn parse_dimensions(reply: &str) -> Result<Vec<usize>, MarshalError> {
    parse_integers(reply)?
        .into_iter()
        .map(|dim| {
            usize::try_from(dim)
                .map_err(|_| MarshalError::Malformed(format!("negative dimension {dim}")))
        })
        .collect()
}

/// Decode one hex-printed string element. `byte('')` prints a single zero
/// byte, which IDL strings never contain otherwise.
fn decode_hex_string(text: &str) -> Result<String, MarshalError> {
    let text = text.trim();
    let malformed = || MarshalError::Malformed(format!("expected hex string bytes, got '{text}'"));
    if text.len() % 2 != 0 {
        return Err(malformed());
    }
    let bytes = (0..text.len())
        .step_by(2)
        .map(|start| {
            text.get(start..start + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        })
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(malformed)?;
    if bytes == [0] {
        return Ok(String::new());
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse printed element lines into JSON scalars.
pub fn parse_elements(reply: &str, kind: ElementKind) -> Result<Vec<Value>, MarshalError> {
    sentinel_lines(reply)
        .map(|line| parse_element(line, kind))
        .collect()
}

fn parse_element(line: &str, kind: ElementKind) -> Result<Value, MarshalError> {
    match kind {
        ElementKind::String => decode_hex_string(line).map(Value::String),
        ElementKind::Integer => {
            let text = line.trim();
            if let Ok(int) = text.parse::<i64>() {
                Ok(Value::from(int))
            } else {
                text.parse::<u64>().map(Value::from).map_err(|_| {
                    MarshalError::Malformed(format!("expected an integer, got '{text}'"))
                })
            }
        }
        ElementKind::Float => {
            let text = line.trim().replace(['D', 'd'], "E");
            let parsed = match text.to_ascii_lowercase().as_str() {
                "nan" | "-nan" => f64::NAN,
                "inf" | "infinity" => f64::INFINITY,
                "-inf" | "-infinity" => f64::NEG_INFINITY,
                _ => text.parse::<f64>().map_err(|_| {
                    MarshalError::Malformed(format!("expected a float, got '{}'", line.trim()))
                })?,
            };
            // JSON cannot carry non-finite values.
            Ok(Number::from_f64(parsed).map_or(Value::Null, Value::Number))
        }
    }
}

/// Rebuild a pulled value from its elements and IDL dimensions.
///
/// The first IDL dimension varies fastest, so it becomes the innermost JSON array.
pub fn reshape(elements: Vec<Value>, dimensions: &[usize]) -> Result<Value, MarshalError> {
    if dimensions.is_empty() {
        let mut elements = elements;
        return match elements.len() {
            1 => Ok(elements.remove(0)),
            found => Err(MarshalError::Malformed(format!(
                "expected one scalar element, got {found}"
            ))),
        };
    }
    let expected: usize = dimensions.iter().product();
    if expected != elements.len() {
        return Err(MarshalError::Malformed(format!(
            "dimensions {dimensions:?} need {expected} elements, got {}",
            elements.len()
        )));
    }
    let outer_first: Vec<usize> = dimensions.iter().rev().copied().collect();
    Ok(nest(elements, &outer_first))
}

fn nest(elements: Vec<Value>, shape: &[usize]) -> Value {
    match shape {
        [] | [_] => Value::Array(elements),
        [outer, inner @ ..] => {
            let stride: usize = inner.iter().product();
            let mut rest = elements.into_iter();
            let rows = (0..*outer)
                .map(|_| nest(rest.by_ref().take(stride).collect(), inner))
                .collect();
            Value::Array(rows)
        }
    }
}
