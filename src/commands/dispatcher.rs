//! Command Dispatcher
//!
//! The dispatcher is the single entry point from a raw line to a response:
//!
//! 1. Parse the line; a grammar failure is `~INVALID COMMAND SYNTAX`.
//! 2. `HELP` returns the listing of every table.
//! 3. Scan the tables in fixed order (volume, server, GPIO), each in
//!    declaration order, and run the first matching handler.
//! 4. Map the handler result onto the response vocabulary.
//! 5. No match is `~NO SUCH COMMAND EXISTS`.
//!
//! The set of subsystems is closed. Each [`Subsystem`] variant carries a
//! [`Binding`] that pairs one receiver with its own monomorphic table, so
//! dispatch is a `match` rather than a virtual call.
//!
//! ## Shadowing
//!
//! Command strings are unique within a table but not across tables. When
//! two tables register the same string, the earlier table in scan order
//! wins. Shadowed entries are reported once at construction.

use super::{CommandError, CommandTable, HandlerResult, TableError, HELP_COMMAND};
use crate::protocol::{parse_line, ParsedCommand, Response};
use crate::subsystems::{GpioController, ServerInfo, VolumeControl};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Heading that opens the HELP listing
const LISTING_HEADER: &str = "\nSUPPORTED COMMANDS:\n";

/// A failure the dispatcher does not turn into a response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler failed with something other than an invalid parameter
    #[error("handler for '{command}' failed: {source}")]
    Handler {
        command: String,
        #[source]
        source: CommandError,
    },
}

/// A receiver paired with the table of commands bound to it.
pub struct Binding<T> {
    receiver: Arc<T>,
    table: CommandTable<T>,
}

impl<T> Binding<T> {
    /// Binds `table` to a shared receiver.
    pub fn new(receiver: Arc<T>, table: CommandTable<T>) -> Self {
        Self { receiver, table }
    }

    /// Runs the handler registered for `command`, if any.
    fn try_execute(&self, command: &ParsedCommand<'_>, body: &mut String) -> Option<HandlerResult> {
        let descriptor = self.table.find(command.name)?;
        info!(command = command.name, param = command.param, "Executing command");
        Some(descriptor.invoke(command.param, body, &self.receiver))
    }

    fn command_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.iter().map(|d| d.command())
    }
}

/// One entry per controlled subsystem, in dispatch order.
pub enum Subsystem {
    Volume(Binding<VolumeControl>),
    Server(Binding<ServerInfo>),
    Gpio(Binding<GpioController>),
}

impl Subsystem {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::Volume(_) => "volume",
            Subsystem::Server(_) => "server",
            Subsystem::Gpio(_) => "gpio",
        }
    }

    /// Command strings in declaration order.
    pub fn command_names(&self) -> Vec<&'static str> {
        match self {
            Subsystem::Volume(b) => b.command_names().collect(),
            Subsystem::Server(b) => b.command_names().collect(),
            Subsystem::Gpio(b) => b.command_names().collect(),
        }
    }

    fn write_listing(&self, out: &mut String) {
        match self {
            Subsystem::Volume(b) => b.table.write_listing(out),
            Subsystem::Server(b) => b.table.write_listing(out),
            Subsystem::Gpio(b) => b.table.write_listing(out),
        }
    }

    fn try_execute(&self, command: &ParsedCommand<'_>, body: &mut String) -> Option<HandlerResult> {
        match self {
            Subsystem::Volume(b) => b.try_execute(command, body),
            Subsystem::Server(b) => b.try_execute(command, body),
            Subsystem::Gpio(b) => b.try_execute(command, body),
        }
    }
}

/// A command registered by more than one subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedCommand {
    pub command: &'static str,
    /// The subsystem that handles the command
    pub winner: &'static str,
    /// The subsystem whose entry is unreachable
    pub shadowed: &'static str,
}

/// Resolves and executes command lines against every subsystem.
///
/// The dispatcher is immutable after construction and is shared between
/// connection tasks behind an `Arc`. It holds no locks; subsystems guard
/// their own state.
pub struct Dispatcher {
    subsystems: [Subsystem; 3],
    shadowed: Vec<ShadowedCommand>,
}

impl Dispatcher {
    /// Creates a dispatcher over explicit bindings.
    ///
    /// Tables are scanned in argument order: volume, server, GPIO.
    pub fn new(
        volume: Binding<VolumeControl>,
        server: Binding<ServerInfo>,
        gpio: Binding<GpioController>,
    ) -> Self {
        let subsystems = [
            Subsystem::Volume(volume),
            Subsystem::Server(server),
            Subsystem::Gpio(gpio),
        ];
        let shadowed = find_shadowed(&subsystems);

        for entry in &shadowed {
            warn!(
                command = entry.command,
                winner = entry.winner,
                shadowed = entry.shadowed,
                "Command registered by more than one subsystem; earlier table wins"
            );
        }

        Self {
            subsystems,
            shadowed,
        }
    }

    /// Creates a dispatcher using each subsystem's built-in command table.
    pub fn with_default_tables(
        volume: Arc<VolumeControl>,
        server: Arc<ServerInfo>,
        gpio: Arc<GpioController>,
    ) -> Result<Self, TableError> {
        Ok(Self::new(
            Binding::new(volume, VolumeControl::command_table()?),
            Binding::new(server, ServerInfo::command_table()?),
            Binding::new(gpio, GpioController::command_table()?),
        ))
    }

    /// Executes one command line.
    ///
    /// Every recoverable outcome is returned as `Ok(Response)`. `Err` means
    /// a handler fault, which callers must not report as a protocol
    /// response.
    pub fn execute(&self, line: &str) -> Result<Response, DispatchError> {
        let command = match parse_line(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "Rejected command line");
                return Ok(Response::InvalidSyntax);
            }
        };

        if command.name == HELP_COMMAND {
            return Ok(Response::Ok(self.help_listing()));
        }

        let mut body = String::new();

        for subsystem in &self.subsystems {
            let Some(result) = subsystem.try_execute(&command, &mut body) else {
                continue;
            };

            return match result {
                Ok(()) => Ok(Response::Ok(body)),
                Err(rejected) if rejected.is_recoverable() => {
                    let message = rejected.to_string();
                    debug!(
                        command = command.name,
                        param = command.param,
                        reason = %message,
                        "Parameter rejected"
                    );
                    Ok(Response::InvalidParameter(message))
                }
                Err(source) => {
                    error!(
                        command = command.name,
                        subsystem = subsystem.name(),
                        error = %source,
                        "Command handler failed"
                    );
                    Err(DispatchError::Handler {
                        command: command.name.to_string(),
                        source,
                    })
                }
            };
        }

        debug!(command = command.name, "No such command");
        Ok(Response::NoSuchCommand)
    }

    /// The HELP listing body that follows the `~OK` prefix.
    pub fn help_listing(&self) -> String {
        let mut out = String::from(LISTING_HEADER);
        for (idx, subsystem) in self.subsystems.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            subsystem.write_listing(&mut out);
        }
        out
    }

    /// Subsystems in dispatch order.
    pub fn subsystems(&self) -> &[Subsystem] {
        &self.subsystems
    }

    /// Commands hidden by an earlier table with the same command string.
    pub fn shadowed_commands(&self) -> &[ShadowedCommand] {
        &self.shadowed
    }
}

fn find_shadowed(subsystems: &[Subsystem]) -> Vec<ShadowedCommand> {
    let mut owners: HashMap<&'static str, &'static str> = HashMap::new();
    let mut shadowed = Vec::new();

    for subsystem in subsystems {
        for command in subsystem.command_names() {
            match owners.get(command) {
                Some(&winner) => shadowed.push(ShadowedCommand {
                    command,
                    winner,
                    shadowed: subsystem.name(),
                }),
                None => {
                    owners.insert(command, subsystem.name());
                }
            }
        }
    }

    shadowed
}
