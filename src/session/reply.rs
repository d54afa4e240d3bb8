use vte::{Parser as VteParser, Perform};

/// Printable text of the interpreter output, with escape sequences removed.
struct TextCollector {
    output: String,
}

impl Perform for TextCollector {
    fn print(&mut self, c: char) {
        self.output.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\t' => self.output.push(byte as char),
            // Carriage returns only ever pair with newlines in replies.
            _ => {}
        }
    }
}

/// Accumulates PTY output until a reply is complete.
///
/// The escape-sequence parser persists across chunks so a sequence split
/// between two reads is still removed.
pub(super) struct ReplyBuffer {
    parser: VteParser,
    text: TextCollector,
}

impl ReplyBuffer {
    pub(super) fn new() -> Self {
        Self {
            parser: VteParser::new(),
            text: TextCollector {
                output: String::new(),
            },
        }
    }

    pub(super) fn feed(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.text, bytes);
    }

    pub(super) fn ends_with_prompt(&self, prompt: &str) -> bool {
        self.text.output.trim_end().ends_with(prompt.trim_end())
    }

    /// Once a line ending in `marker` is followed by nothing but the prompt,
    /// take the reply that preceded it and reset the buffer.
    ///
    /// A marker inside an echoed `marker_command` does not count because the
    /// command wraps it in quotes. The reply is returned without the prompt
    /// that was printed before the marker statement ran and without that
    /// statement's echo.
    pub(super) fn take_through_marker(
        &mut self,
        marker: &str,
        marker_command: &str,
        prompt: &str,
    ) -> Option<String> {
        let text = &self.text.output;
        let prompt = prompt.trim_end();
        let mut offset = 0;
        let mut body_end = None;
        for line in text.split_inclusive('\n') {
            let end = offset + line.len();
            let content = line.trim_end();
            if line.ends_with('\n') && content.ends_with(marker) {
                if text[end..].trim() == prompt {
                    body_end = Some(offset + content.len() - marker.len());
                }
                break;
            }
            offset = end;
        }
        let body_end = body_end?;

        let mut body = text[..body_end].trim_end();
        if let Some(rest) = body.strip_suffix(marker_command.trim()) {
            body = rest.trim_end();
        }
        let body = body.strip_suffix(prompt).unwrap_or(body).to_string();
        self.text.output.clear();
        Some(body)
    }

    /// Discard buffered text (used for the startup banner).
    pub(super) fn clear(&mut self) -> String {
        std::mem::take(&mut self.text.output)
    }
}

/// Reply text split into output and interpreter error messages.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct CleanReply {
    pub(super) text: String,
    pub(super) errors: Vec<String>,
}

/// Drop the echoed request and info chatter, and separate `% ` error lines.
pub(super) fn clean_reply(
    raw: &str,
    request: &str,
    is_info_line: impl Fn(&str) -> bool,
) -> CleanReply {
    let request = request.trim();
    let mut lines: Vec<&str> = Vec::new();
    let mut errors = Vec::new();
    let mut echo_pending = !request.is_empty();

    for line in raw.lines() {
        let trimmed = line.trim();
        if echo_pending && !trimmed.is_empty() {
            echo_pending = false;
            if trimmed == request {
                continue;
            }
        }
        if is_info_line(trimmed) {
            continue;
        }
        if trimmed.starts_with("% ") {
            errors.push(trimmed.to_string());
            continue;
        }
        lines.push(line.trim_end());
    }

    let text = lines.join("\n");
    CleanReply {
        text: text.trim_matches('\n').to_string(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_info(_: &str) -> bool {
        false
    }

    const MARKER: &str = "idlbridge-sync-1-1";
    const MARKER_COMMAND: &str = "print, 'idlbridge-sync-1-1'";

    fn take(buffer: &mut ReplyBuffer, prompt: &str) -> Option<String> {
        buffer.take_through_marker(MARKER, MARKER_COMMAND, prompt)
    }

    #[test]
    fn prompt_detection_ignores_trailing_space() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"      2.00000\r\nGDL> ");
        assert!(buffer.ends_with_prompt("GDL>"));
        assert!(!buffer.ends_with_prompt("IDL>"));
    }

    #[test]
    fn reply_ends_at_marker_not_at_first_prompt() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"      2.00000\r\nGDL> ");
        assert_eq!(take(&mut buffer, "GDL>"), None);
        buffer.feed(b"idlbridge-sync-1-1\r\nGDL> ");
        assert_eq!(take(&mut buffer, "GDL>"), Some("      2.00000\n".to_string()));
        assert!(!buffer.ends_with_prompt("GDL>"));
    }

    #[test]
    fn prompt_text_inside_output_does_not_end_the_reply() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"IDL>\r\n");
        assert_eq!(take(&mut buffer, "IDL>"), None);
        buffer.feed(b"late\r\nIDL> idlbridge-sync-1-1\r\nIDL> ");
        assert_eq!(take(&mut buffer, "IDL>"), Some("IDL>\nlate\n".to_string()));
    }

    #[test]
    fn echoed_marker_command_is_not_the_marker() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"1\r\nGDL> print, 'idlbridge-sync-1-1'\r\n");
        assert_eq!(take(&mut buffer, "GDL>"), None);
        buffer.feed(b"idlbridge-sync-1-1\r\nGDL> ");
        assert_eq!(take(&mut buffer, "GDL>"), Some("1\n".to_string()));
    }

    #[test]
    fn marker_without_following_prompt_is_incomplete() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"GDL> idlbridge-sync-1-1");
        assert_eq!(take(&mut buffer, "GDL>"), None);
        buffer.feed(b"\r\n");
        assert_eq!(take(&mut buffer, "GDL>"), None);
        buffer.feed(b"GDL> ");
        assert_eq!(take(&mut buffer, "GDL>"), Some(String::new()));
    }

    #[test]
    fn escape_sequences_split_across_chunks_are_removed() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"1\r\n\x1b[1");
        buffer.feed(b";32mIDL> \x1b[0midlbridge-sync-1-1\r\nIDL> ");
        assert_eq!(take(&mut buffer, "IDL>"), Some("1\n".to_string()));
    }

    #[test]
    fn partial_prompt_is_not_complete() {
        let mut buffer = ReplyBuffer::new();
        buffer.feed(b"output\nGD");
        assert!(!buffer.ends_with_prompt("GDL>"));
    }

    #[test]
    fn clean_reply_drops_echo_and_keeps_output() {
        let cleaned = clean_reply("print, 1\n       1\n", "print, 1", no_info);
        assert_eq!(cleaned.text, "       1");
        assert!(cleaned.errors.is_empty());
    }

    #[test]
    fn clean_reply_separates_errors_from_info() {
        let raw = "% Compiled module: MEAN.\n% Variable is undefined: Y.\n% Execution halted at: $MAIN$\n";
        let cleaned = clean_reply(raw, "print, mean(y)", |line| {
            line.starts_with("% Compiled module:")
        });
        assert_eq!(cleaned.text, "");
        assert_eq!(
            cleaned.errors,
            vec![
                "% Variable is undefined: Y.".to_string(),
                "% Execution halted at: $MAIN$".to_string()
            ]
        );
    }

    #[test]
    fn clean_reply_keeps_inner_blank_lines() {
        let cleaned = clean_reply("\na\n\nb\n\n", "print, 'a', '', 'b'", no_info);
        assert_eq!(cleaned.text, "a\n\nb");
    }

    #[test]
    fn output_matching_request_later_is_kept() {
        let cleaned = clean_reply("x\nx\n", "x", no_info);
        assert_eq!(cleaned.text, "x");
    }
}
