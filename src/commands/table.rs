//! Command Descriptors and Tables
//!
//! A [`CommandDescriptor`] binds one command string to a handler function
//! and a line of help text. Descriptors for one subsystem are grouped into a
//! [`CommandTable`], whose declaration order decides both lookup precedence
//! and the order of the HELP listing.
//!
//! Tables are monomorphic: every handler in a `CommandTable<T>` receives the
//! same receiver type `T`. Handlers are plain function pointers, so a table
//! is cheap to build at startup and safe to read from any thread.

use super::{CommandError, HELP_COMMAND};
use crate::protocol::parser::is_valid_command_name;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Follows each table title in the HELP listing
const TITLE_SUFFIX: &str = ": \n";

/// Result returned by every command handler.
pub type HandlerResult = Result<(), CommandError>;

/// Signature shared by all handlers bound to receiver type `T`.
///
/// Handlers receive the parameter (or the no-parameter sentinel), a buffer
/// appended to the `~OK` prefix on success, and the bound receiver.
pub type HandlerFn<T> = fn(param: &str, response: &mut String, receiver: &T) -> HandlerResult;

/// Errors raised while assembling a command table.
///
/// These are startup-time programming errors, never runtime conditions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The same command string was registered twice in one table
    #[error("command '{command}' registered twice in table '{table}'")]
    DuplicateCommand { table: String, command: String },

    /// The command string cannot be produced by the grammar
    #[error("command '{command}' in table '{table}' is not a valid command name")]
    InvalidCommandName { table: String, command: String },

    /// The command string collides with the reserved listing command
    #[error("command '{command}' in table '{table}' is reserved")]
    ReservedCommand { table: String, command: String },
}

/// An immutable binding of a command string to a handler and its help text.
pub struct CommandDescriptor<T> {
    command: &'static str,
    handler: HandlerFn<T>,
    description: &'static str,
}

impl<T> CommandDescriptor<T> {
    /// Creates a new descriptor.
    pub fn new(command: &'static str, handler: HandlerFn<T>, description: &'static str) -> Self {
        Self {
            command,
            handler,
            description,
        }
    }

    /// The command string clients send.
    pub fn command(&self) -> &'static str {
        self.command
    }

    /// Human-readable help text.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Invokes the handler against `receiver`.
    pub fn invoke(&self, param: &str, response: &mut String, receiver: &T) -> HandlerResult {
        (self.handler)(param, response, receiver)
    }
}

// Manual impls: derives would needlessly require `T: Clone`/`T: Debug`
impl<T> Clone for CommandDescriptor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CommandDescriptor<T> {}

impl<T> fmt::Debug for CommandDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("command", &self.command)
            .field("description", &self.description)
            .finish()
    }
}

/// The ordered set of descriptors for one subsystem.
pub struct CommandTable<T> {
    /// Heading used by the HELP listing
    title: &'static str,
    descriptors: Vec<CommandDescriptor<T>>,
}

impl<T> CommandTable<T> {
    /// Builds a table, validating every command string.
    ///
    /// # Errors
    ///
    /// Returns a [`TableError`] if a command string is duplicated, could
    /// never be produced by the grammar, or is the reserved `HELP` command.
    pub fn new(
        title: &'static str,
        descriptors: Vec<CommandDescriptor<T>>,
    ) -> Result<Self, TableError> {
        let mut seen = HashSet::with_capacity(descriptors.len());

        for descriptor in &descriptors {
            let command = descriptor.command;

            if !is_valid_command_name(command) {
                return Err(TableError::InvalidCommandName {
                    table: title.to_string(),
                    command: command.to_string(),
                });
            }

            if command == HELP_COMMAND {
                return Err(TableError::ReservedCommand {
                    table: title.to_string(),
                    command: command.to_string(),
                });
            }

            if !seen.insert(command) {
                return Err(TableError::DuplicateCommand {
                    table: title.to_string(),
                    command: command.to_string(),
                });
            }
        }

        Ok(Self { title, descriptors })
    }

    /// Heading used by the HELP listing.
    pub fn title(&self) -> &'static str {
        self.title
    }

    /// Finds the descriptor registered for `command`.
    pub fn find(&self, command: &str) -> Option<&CommandDescriptor<T>> {
        self.descriptors.iter().find(|d| d.command == command)
    }

    /// Iterates descriptors in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, CommandDescriptor<T>> {
        self.descriptors.iter()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if the table registers no commands.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Appends this table's section of the HELP listing to `out`.
    pub fn write_listing(&self, out: &mut String) {
        out.push_str(self.title);
        out.push_str(TITLE_SUFFIX);
        for descriptor in &self.descriptors {
            out.push_str(descriptor.command);
            out.push_str(" - ");
            out.push_str(descriptor.description);
            out.push('\n');
        }
    }
}

impl<T> fmt::Debug for CommandTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("title", &self.title)
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

impl<'a, T> IntoIterator for &'a CommandTable<T> {
    type Item = &'a CommandDescriptor<T>;
    type IntoIter = std::slice::Iter<'a, CommandDescriptor<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
