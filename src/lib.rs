//! # netsysctrl - Network System Control Daemon
//!
//! netsysctrl exposes a small set of system controls over a line-oriented
//! text protocol. Clients send one command per line and receive one response
//! per line, each response beginning with a `~` sentinel.
//!
//! ## Protocol
//!
//! ```text
//! Request:   NAME            (no parameter)
//!            NAME=param      (parameter)
//!            HELP            (lists every command)
//!
//! Response:  ~OK[body]
//!            ~INVALID COMMAND SYNTAX
//!            ~NO SUCH COMMAND EXISTS
//!            ~INVALID PARAMETER; <message>
//! ```
//!
//! Command names are uppercase letters and underscores. Parameters are
//! letters, digits and `:`, with an optional leading `-` and at most one `.`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             netsysctrl                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│ Dispatcher  │                  │
//! │  │ (Listener)  │    │  Handler    │    │             │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │ first table wins        │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   Line      │    │  ┌──────────┐  ┌──────────┐  ┌──────────┐    │   │
//! │  │   Parser    │    │  │ Volume   │  │ Server   │  │ GPIO     │    │   │
//! │  │             │    │  │ table    │  │ table    │  │ table    │    │   │
//! │  └─────────────┘    │  └──────────┘  └──────────┘  └──────────┘    │   │
//! │                     └──────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use netsysctrl::commands::Dispatcher;
//! use netsysctrl::subsystems::{GpioConfig, GpioController, ServerInfo, VolumeConfig, VolumeControl};
//! use std::sync::Arc;
//!
//! let server = Arc::new(ServerInfo::new("127.0.0.1:5000".parse()?));
//! let volume = Arc::new(VolumeControl::new(VolumeConfig::default())?);
//! let gpio = Arc::new(GpioController::new(GpioConfig::default())?);
//!
//! let dispatcher = Dispatcher::with_default_tables(volume, server, gpio)?;
//! let response = dispatcher.execute("SVR_INFO")?;
//! println!("{}", response);
//! ```
//!
//! ## Supported Commands
//!
//! ### System Utils
//! - `VOLUME=<percent>`
//!
//! ### Server
//! - `SVR_INFO`
//! - `CLIENTS_INFO`
//!
//! ### GPIO
//! - `GPIO_PINS`
//! - `SET_PIN=<name>:<0|1>`
//! - `ALL_PINS_LOW`
//!
//! ## Module Overview
//!
//! - [`protocol`]: command grammar and response vocabulary
//! - [`commands`]: command tables and the dispatcher
//! - [`subsystems`]: volume, server and GPIO controls
//! - [`connection`]: client connection management
//! - [`config`]: command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod subsystems;

// Re-export commonly used types for convenience
pub use commands::{CommandTable, Dispatcher};
pub use config::{ConfigAction, DaemonConfig};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{parse_line, ParseError, Response};

/// The default port netsysctrl listens on
pub const DEFAULT_PORT: u16 = 5000;

/// The default host netsysctrl binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of netsysctrl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
