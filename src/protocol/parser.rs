//! Command Line Grammar
//!
//! This module validates a raw input line and splits it into a command name
//! and an optional parameter.
//!
//! ## Grammar
//!
//! ```text
//! line     := name [ "=" param ] [ spaces ] [ terminator ... ]
//! name     := [A-Z0-9_]+
//! param    := "-"? [A-Za-z0-9:]* ( "." [A-Za-z0-9:]* )?     (non-empty)
//! terminator := "\r" | "\n"
//! ```
//!
//! Only the text before the first CR or LF takes part in matching; anything
//! after it is ignored. Any leftover character before the terminator,
//! whitespace included, rejects the whole line.
//!
//! A line without `=` carries no parameter and is reported with the
//! [`NO_PARAM`] sentinel. A line with `=` must carry a non-empty value.
//!
//! The parser is a pure function over borrowed input: the returned
//! [`ParsedCommand`] points into the caller's line and nothing is allocated.

use thiserror::Error;

/// Parameter value handed to handlers when the line has no `=` separator
pub const NO_PARAM: &str = "default";

/// Separates the command name from its parameter
pub const PARAM_SEPARATOR: char = '=';

/// Errors that can occur while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing before the terminator
    #[error("empty input")]
    EmptyInput,

    /// A character that cannot appear in a command name
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { offset: usize, found: char },

    /// `=` was given with nothing after it
    #[error("empty parameter after '='")]
    EmptyParameter,

    /// A character outside the parameter alphabet
    #[error("invalid parameter character {found:?} at offset {offset}")]
    InvalidParameterChar { offset: usize, found: char },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A validated command borrowed from the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Command name, `[A-Z0-9_]+`
    pub name: &'a str,
    /// Parameter value, or [`NO_PARAM`]
    pub param: &'a str,
}

impl<'a> ParsedCommand<'a> {
    /// Returns true if the line carried an explicit parameter.
    ///
    /// A client sending the literal `NAME=default` is indistinguishable
    /// from `NAME`.
    pub fn has_param(&self) -> bool {
        self.param != NO_PARAM
    }
}

/// Parses a single command line.
///
/// # Example
///
/// ```
/// use netsysctrl::protocol::{parse_line, NO_PARAM};
///
/// let cmd = parse_line("SET_PIN=fan:1\r\n").unwrap();
/// assert_eq!(cmd.name, "SET_PIN");
/// assert_eq!(cmd.param, "fan:1");
///
/// let cmd = parse_line("SVR_INFO").unwrap();
/// assert_eq!(cmd.param, NO_PARAM);
///
/// assert!(parse_line("volume=50").is_err());
/// ```
pub fn parse_line(line: &str) -> ParseResult<ParsedCommand<'_>> {
    let line = content_before_terminator(line);
    if line.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let name_len = line.bytes().take_while(|b| is_name_byte(*b)).count();
    if name_len == 0 {
        return Err(unexpected_at(line, 0));
    }

    let (name, rest) = line.split_at(name_len);
    if rest.is_empty() {
        return Ok(ParsedCommand {
            name,
            param: NO_PARAM,
        });
    }

    let param = match rest.strip_prefix(PARAM_SEPARATOR) {
        Some(param) => param,
        None => return Err(unexpected_at(line, name_len)),
    };

    if param.is_empty() {
        return Err(ParseError::EmptyParameter);
    }

    validate_param(param, name_len + PARAM_SEPARATOR.len_utf8())?;

    Ok(ParsedCommand { name, param })
}

/// Returns true if `byte` may appear in a command name.
#[inline]
pub fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_'
}

/// Returns true if `name` could be produced by the grammar as a command name.
pub fn is_valid_command_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_name_byte)
}

/// Returns the part of `line` before the first CR or LF.
#[inline]
fn content_before_terminator(line: &str) -> &str {
    match line.find(['\r', '\n']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Checks `param` against `-?[A-Za-z0-9:]*\.?[A-Za-z0-9:]*`.
///
/// `base` is the offset of `param` within the line, used for error reporting.
fn validate_param(param: &str, base: usize) -> ParseResult<()> {
    let body = param.strip_prefix('-').unwrap_or(param);
    let body_offset = base + (param.len() - body.len());
    let mut seen_dot = false;

    for (idx, ch) in body.char_indices() {
        match ch {
            c if c.is_ascii_alphanumeric() || c == ':' => {}
            '.' if !seen_dot => seen_dot = true,
            found => {
                return Err(ParseError::InvalidParameterChar {
                    offset: body_offset + idx,
                    found,
                })
            }
        }
    }

    Ok(())
}

fn unexpected_at(line: &str, offset: usize) -> ParseError {
    // offset always follows a run of ASCII bytes, so it is a char boundary
    let found = line[offset..].chars().next().unwrap_or('\0');
    ParseError::UnexpectedChar { offset, found }
}
