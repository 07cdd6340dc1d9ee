//! Client Connections
//!
//! One task per client turns a byte stream into command lines and command
//! lines into responses. The handler is generic over the stream, so the
//! same code serves `TcpStream` in the daemon and mock streams in tests.
//!
//! ## Framing
//!
//! ```text
//!   read 1: "VOLUME=40\r"        read 2: "\nSVR_INFO\n"
//!              │                           │
//!              ▼                           ▼
//!   line "VOLUME=40"             leading LF dropped (pending CRLF)
//!   remember: last byte was CR   line "SVR_INFO"
//! ```
//!
//! CR, LF and CRLF all end a line. A line still unterminated after 64 KiB
//! closes the connection, as does end of stream in the middle of a line.
//! Bytes that are not UTF-8 are answered with `~INVALID COMMAND SYNTAX`.
//!
//! ## Execution
//!
//! Handlers start mixer processes and write sysfs files, so each line is
//! run through `Dispatcher::execute` on Tokio's blocking pool. Lines from
//! one client are handled strictly in order; separate clients run in
//! parallel. A handler fault is logged and ends only that client's
//! connection, with nothing written for the failed line.
//!
//! While its task is alive a client is listed by `CLIENTS_INFO`; the
//! registration is dropped together with the handler.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
