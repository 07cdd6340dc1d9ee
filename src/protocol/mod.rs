//! Line Protocol Implementation
//!
//! This module implements the textual wire protocol spoken by netsysctrl.
//!
//! ## Overview
//!
//! Clients send one command per line, optionally with a single parameter:
//!
//! ```text
//! COMMAND
//! COMMAND=PARAM
//! ```
//!
//! Every command produces exactly one response, prefixed with `~`.
//!
//! ## Modules
//!
//! - `parser`: The command grammar
//! - `types`: The `Response` value and its sentinel vocabulary
//!
//! ## Example
//!
//! ```
//! use netsysctrl::protocol::{parse_line, Response};
//!
//! let cmd = parse_line("VOLUME=40\n").unwrap();
//! assert_eq!((cmd.name, cmd.param), ("VOLUME", "40"));
//!
//! let response = Response::invalid_parameter("System volume cannot be greater than 100%");
//! assert_eq!(
//!     response.to_string(),
//!     "~INVALID PARAMETER; System volume cannot be greater than 100%"
//! );
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_line, ParseError, ParseResult, ParsedCommand, NO_PARAM};
pub use types::{sentinel, Response};
