//! Plain-text line ingestion
//!
//! Turns lines such as `warn@ChatService Slow response` into bus appends.

use crate::bus::LogLevel;

/// A line split into the pieces `LogBus::append` needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub level: LogLevel,
    pub context: Option<String>,
    pub message: String,
}

/// Parse `<level>[@<context>] <message>`
///
/// Lines whose first word is not a level, or that carry no message after
/// the level, are kept whole as `info`. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (line, ""),
    };

    let (level_str, context) = match head.split_once('@') {
        Some((level, context)) => (level, Some(context)),
        None => (head, None),
    };

    match level_str.parse::<LogLevel>() {
        Ok(level) if !rest.is_empty() => Some(ParsedLine {
            level,
            context: context.filter(|c| !c.is_empty()).map(str::to_string),
            message: rest.to_string(),
        }),
        _ => Some(ParsedLine {
            level: LogLevel::Info,
            context: None,
            message: line.to_string(),
        }),
    }
}
