//! Response Vocabulary
//!
//! Every reply the daemon sends is built from a small, fixed set of sentinel
//! strings. Clients match on these prefixes, so their exact spelling is a
//! compatibility contract.
//!
//! ## Response Forms
//!
//! ```text
//! ~OK<handler output>
//! ~OK\nSUPPORTED COMMANDS:\n...        (HELP)
//! ~INVALID COMMAND SYNTAX
//! ~NO SUCH COMMAND EXISTS
//! ~INVALID PARAMETER; <message>
//! ```
//!
//! On the wire each response is followed by a single `\n`.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The line terminator appended to every serialized response
pub const RESPONSE_TERMINATOR: u8 = b'\n';

/// Sentinel strings shared with clients
pub mod sentinel {
    /// Prefix of every successful response
    pub const OK: &str = "~OK";
    /// The line did not match the command grammar
    pub const INVALID_SYNTAX: &str = "~INVALID COMMAND SYNTAX";
    /// The line was well formed but no table registers the command
    pub const NO_SUCH_COMMAND: &str = "~NO SUCH COMMAND EXISTS";
    /// The handler rejected the parameter value
    pub const INVALID_PARAMETER: &str = "~INVALID PARAMETER";
    /// Separates `INVALID_PARAMETER` from the handler's message
    pub const DETAIL_SEPARATOR: &str = "; ";
}

/// The outcome of executing one command line.
///
/// The three error forms are mutually exclusive and never combined with
/// the OK prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Successful execution. Holds whatever the handler appended after
    /// the OK prefix (often empty).
    Ok(String),

    /// The line did not match the grammar
    InvalidSyntax,

    /// No registered command has this name
    NoSuchCommand,

    /// The handler rejected the parameter; holds its message
    InvalidParameter(String),
}

impl Response {
    /// Creates a bare `~OK` response.
    pub fn ok() -> Self {
        Response::Ok(String::new())
    }

    /// Creates an invalid-parameter response carrying `message`.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Response::InvalidParameter(message.into())
    }

    /// Returns true for the OK form.
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }

    /// Serializes the response into wire format, including the trailing
    /// newline.
    pub fn serialize(&self) -> Bytes {
        let text = self.to_string();
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        buf.put_slice(text.as_bytes());
        buf.put_u8(RESPONSE_TERMINATOR);
        buf.freeze()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok(body) => write!(f, "{}{}", sentinel::OK, body),
            Response::InvalidSyntax => f.write_str(sentinel::INVALID_SYNTAX),
            Response::NoSuchCommand => f.write_str(sentinel::NO_SUCH_COMMAND),
            Response::InvalidParameter(message) => write!(
                f,
                "{}{}{}",
                sentinel::INVALID_PARAMETER,
                sentinel::DETAIL_SEPARATOR,
                message
            ),
        }
    }
}
