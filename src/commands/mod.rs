//! Command Dispatch Module
//!
//! This module turns parsed command lines into subsystem calls and maps
//! every outcome onto the response vocabulary.
//!
//! ## Architecture
//!
//! ```text
//! Raw line
//!     │
//!     ▼
//! ┌─────────────────┐
//! │  parse_line()   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────┐
//! │ Dispatcher                                  │
//! │                                             │
//! │  HELP? ──> listing of every table           │
//! │                                             │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐   │
//! │  │ Volume   │─>│ Server   │─>│ Gpio     │   │  first match wins
//! │  │ table    │  │ table    │  │ table    │   │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘   │
//! └───────┼─────────────┼─────────────┼─────────┘
//!         ▼             ▼             ▼
//!   VolumeControl   ServerInfo   GpioController
//! ```
//!
//! ## Error Taxonomy
//!
//! - Grammar failure: `~INVALID COMMAND SYNTAX`
//! - No matching descriptor: `~NO SUCH COMMAND EXISTS`
//! - `CommandError::InvalidParameter`: `~INVALID PARAMETER; <message>`
//! - Any other `CommandError`: a handler fault, returned as `DispatchError`

pub mod dispatcher;
pub mod table;

use thiserror::Error;

// Re-export the dispatch types
pub use dispatcher::{Binding, DispatchError, Dispatcher, ShadowedCommand, Subsystem};
pub use table::{CommandDescriptor, CommandTable, HandlerFn, HandlerResult, TableError};

/// The reserved command that lists every registered command
pub const HELP_COMMAND: &str = "HELP";

/// Errors a command handler can report.
///
/// Only [`CommandError::InvalidParameter`] is recoverable: it tells the
/// client what to fix and leaves the subsystem untouched. The other
/// variants describe failures of the handler or its environment.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The parameter was rejected; the message is shown to the client
    #[error("{0}")]
    InvalidParameter(String),

    /// File or process I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The subsystem failed for a reason other than I/O
    #[error("subsystem failure: {0}")]
    Subsystem(String),
}

impl CommandError {
    /// Creates a recoverable invalid-parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        CommandError::InvalidParameter(message.into())
    }

    /// Returns true if the dispatcher should turn this into a response.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CommandError::InvalidParameter(_))
    }
}
