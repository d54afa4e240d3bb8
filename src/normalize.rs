//! Source normalization: comment stripping and continuation joining.
//!
//! The interpreter reads one request per line, so a `$`-continued statement has
//! to be folded into a single line before anything is submitted.

const COMMENT_MARKER: char = ';';
const CONTINUATION_MARKER: char = '$';

/// Split `source` into execution units.
///
/// Comments are removed, continued lines are joined with a single space, and
/// lines that end up blank are dropped.
pub fn execution_units(source: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut pending: Option<String> = None;

    for raw in source.lines() {
        let stripped = strip_comment(raw);
        let line = stripped.trim_end();

        let (body, continues) = match line.strip_suffix(CONTINUATION_MARKER) {
            Some(body) => (body.trim_end(), true),
            None => (line, false),
        };

        let joined = match pending.take() {
            Some(mut head) => {
                let tail = body.trim_start();
                if !head.is_empty() && !tail.is_empty() {
                    head.push(' ');
                }
                head.push_str(tail);
                head
            }
            None => body.to_string(),
        };

        if continues {
            pending = Some(joined);
        } else if !joined.trim().is_empty() {
            units.push(joined);
        }
    }

    // A dangling continuation on the last line is submitted as it stands.
    if let Some(rest) = pending {
        if !rest.trim().is_empty() {
            units.push(rest);
        }
    }
    units
}

/// Normalize the preamble, user code and postamble independently, then concatenate.
pub fn assemble(preamble: &str, code: &str, postamble: &str) -> Vec<String> {
    let mut units = execution_units(preamble);
    units.extend(execution_units(code));
    units.extend(execution_units(postamble));
    units
}

/// Remove a trailing `;` comment, ignoring markers inside quoted strings.
///
/// A `"` directly followed by an octal digit starts an octal literal such as
/// `"17` or `"777L`, not a string. A line with an unterminated string is
/// returned unchanged.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut chars = line.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match quote {
            Some(open) if ch == open => {
                // Doubled quote is an escaped quote, not the end of the string.
                if chars.peek().is_some_and(|(_, next)| *next == open) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            Some(_) => {}
            None if ch == '"' && chars.peek().is_some_and(|(_, next)| is_octal_digit(*next)) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == COMMENT_MARKER => return &line[..idx],
            None => {}
        }
    }
    line
}

fn is_octal_digit(ch: char) -> bool {
    ('0'..='7').contains(&ch)
}
