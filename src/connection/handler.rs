//! Connection Handler Module
//!
//! This module handles individual client connections to netsysctrl.
//! Each client gets its own handler task that runs in a loop,
//! reading command lines and sending responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned, client registered with ServerInfo
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  Read bytes from socket      │
//!    │              │               │
//!    │              ▼               │
//!    │  Split off complete lines    │
//!    │              │               │
//!    │              ▼               │
//!    │  Dispatcher::execute         │
//!    │  (on the blocking pool)      │
//!    │              │               │
//!    │              ▼               │
//!    │  Send "<response>\n"         │
//!    │              │               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error / handler fault
//!        │
//!        ▼
//! 5. Handler task ends, client unregistered
//! ```
//!
//! ## Line Splitting
//!
//! Lines end at CR, LF or CRLF. A CR that arrives as the last byte of a read
//! leaves the handler expecting a possible LF at the start of the next read,
//! so a CRLF split across packets still counts as one terminator.

use crate::commands::{DispatchError, Dispatcher};
use crate::protocol::Response;
use crate::subsystems::{ClientRegistration, ServerInfo};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::JoinError;
use tracing::{debug, error, info, trace, warn};

/// Maximum length of a pending, unterminated line (64 KB)
const MAX_LINE_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total command lines processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so the same loop serves TCP sockets and
/// in-memory test streams.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Set when the previous line ended with a CR at the end of the buffer
    skip_leading_lf: bool,

    /// The command dispatcher (shared across connections)
    dispatcher: Arc<Dispatcher>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Keeps this client listed by CLIENTS_INFO
    _registration: ClientRegistration,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `dispatcher` - The shared command dispatcher
    /// * `server` - Server info the client is registered with
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        server: &Arc<ServerInfo>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            skip_leading_lf: false,
            dispatcher,
            stats,
            _registration: server.register_client(addr),
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads command lines from the client, executes them, and sends back
    /// responses until the client disconnects, an I/O error occurs, or a
    /// command handler faults.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                ConnectionError::Dispatch(_) | ConnectionError::HandlerPanicked(_) => {
                    error!(client = %self.addr, error = %e, "Closing connection after handler fault")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(line) = self.next_line() {
                let response = self.execute(line).await?;
                self.stats.command_processed();
                self.send_response(&response).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Splits the next complete line off the buffer, without its terminator.
    fn next_line(&mut self) -> Option<BytesMut> {
        if self.skip_leading_lf && !self.buffer.is_empty() {
            if self.buffer[0] == b'\n' {
                self.buffer.advance(1);
            }
            self.skip_leading_lf = false;
        }

        let pos = self
            .buffer
            .iter()
            .position(|b| *b == b'\r' || *b == b'\n')?;
        let terminator = self.buffer[pos];

        let line = self.buffer.split_to(pos);
        self.buffer.advance(1);

        if terminator == b'\r' {
            if self.buffer.is_empty() {
                self.skip_leading_lf = true;
            } else if self.buffer[0] == b'\n' {
                self.buffer.advance(1);
            }
        }

        trace!(
            client = %self.addr,
            length = line.len(),
            remaining = self.buffer.len(),
            "Split command line"
        );
        Some(line)
    }

    /// Executes one line on the blocking pool; handlers may wait on
    /// processes or device files.
    async fn execute(&self, line: BytesMut) -> Result<Response, ConnectionError> {
        let line = match String::from_utf8(line.to_vec()) {
            Ok(line) => line,
            Err(_) => {
                debug!(client = %self.addr, "Command line is not valid UTF-8");
                return Ok(Response::InvalidSyntax);
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let response = tokio::task::spawn_blocking(move || dispatcher.execute(&line)).await??;
        Ok(response)
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Check buffer size limit
        if self.buffer.len() >= MAX_LINE_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Line length limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 256 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Stream closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Unterminated line in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A command handler faulted
    #[error("command failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// A command handler panicked on the blocking pool
    #[error("command handler panicked: {0}")]
    HandlerPanicked(#[from] JoinError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Stream ended in the middle of a line
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Line length limit exceeded
    #[error("Line length limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The client stream
/// * `addr` - The client's socket address
/// * `dispatcher` - The shared command dispatcher
/// * `server` - Server info the client is registered with
/// * `stats` - Shared connection statistics
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    server: Arc<ServerInfo>,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, dispatcher, &server, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::{GpioConfig, GpioController, VolumeConfig, VolumeControl};
    use std::path::PathBuf;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    fn create_dispatcher(server: &Arc<ServerInfo>, mixer: &str) -> Arc<Dispatcher> {
        let volume = VolumeControl::new(VolumeConfig {
            mixer_program: PathBuf::from(mixer),
            ..VolumeConfig::default()
        })
        .unwrap();
        let gpio = GpioController::new(GpioConfig::default()).unwrap();

        Arc::new(
            Dispatcher::with_default_tables(Arc::new(volume), Arc::clone(server), Arc::new(gpio))
                .unwrap(),
        )
    }

    async fn create_test_server_with_mixer(
        mixer: &str,
    ) -> (SocketAddr, Arc<ServerInfo>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(ServerInfo::new(addr));
        let dispatcher = create_dispatcher(&server, mixer);
        let stats = Arc::new(ConnectionStats::new());

        let server_clone = Arc::clone(&server);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    Arc::clone(&dispatcher),
                    Arc::clone(&server_clone),
                    Arc::clone(&stats_clone),
                ));
            }
        });

        (addr, server, stats)
    }

    async fn create_test_server() -> (SocketAddr, Arc<ServerInfo>, Arc<ConnectionStats>) {
        create_test_server_with_mixer("true").await
    }

    /// Reads one response line, without its trailing newline.
    async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end_matches('\n').to_string()
    }

    #[tokio::test]
    async fn test_volume_round_trip() {
        let (addr, _, _) = create_test_server().await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        client.get_mut().write_all(b"VOLUME=50\r\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "~OK");

        client.get_mut().write_all(b"VOLUME=150\n").await.unwrap();
        assert_eq!(
            read_line(&mut client).await,
            "~INVALID PARAMETER; System volume cannot be greater than 100%"
        );

        client.get_mut().write_all(b"volume=50\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "~INVALID COMMAND SYNTAX");
    }

    #[tokio::test]
    async fn test_multiple_commands() {
        let (addr, _, _) = create_test_server().await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        // Several lines in one write, mixing terminators
        client
            .get_mut()
            .write_all(b"FOO=1\nSVR_INFO\r\nVOLUME=\r")
            .await
            .unwrap();

        assert_eq!(read_line(&mut client).await, "~NO SUCH COMMAND EXISTS");
        assert_eq!(read_line(&mut client).await, "~OK");
        assert_eq!(read_line(&mut client).await, "ADDRESS: 127.0.0.1");
        assert_eq!(read_line(&mut client).await, format!("PORT: {}", addr.port()));
        assert_eq!(read_line(&mut client).await, "~INVALID COMMAND SYNTAX");
    }

    #[tokio::test]
    async fn test_clients_info_lists_connection() {
        let (addr, server, _) = create_test_server().await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        let local = client.get_ref().local_addr().unwrap();

        client.get_mut().write_all(b"CLIENTS_INFO\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "~OK");
        assert_eq!(read_line(&mut client).await, "CONNECTED CLIENTS: 1");
        assert_eq!(read_line(&mut client).await, local.to_string());

        drop(client);
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(server.client_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_fault_closes_connection() {
        let (addr, _, stats) = create_test_server_with_mixer("false").await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        client.get_mut().write_all(b"VOLUME=20\n").await.unwrap();

        let mut line = String::new();
        let n = client.read_line(&mut line).await.unwrap();
        assert_eq!(n, 0, "expected the server to close without a response");

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.get_mut().write_all(b"HELP\n").await.unwrap();
        assert_eq!(read_line(&mut client).await, "~OK");

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let server = Arc::new(ServerInfo::new("127.0.0.1:5000".parse().unwrap()));
        let dispatcher = create_dispatcher(&server, "true");
        let stats = Arc::new(ConnectionStats::new());

        let mock = tokio_test::io::Builder::new()
            .read(b"SVR_INFO\r")
            .write(b"~OK\nADDRESS: 127.0.0.1\nPORT: 5000\n")
            .read(b"\nFOO\n")
            .write(b"~NO SUCH COMMAND EXISTS\n")
            .build();

        let handler = ConnectionHandler::new(
            mock,
            "10.0.0.9:41000".parse().unwrap(),
            dispatcher,
            &server,
            Arc::clone(&stats),
        );
        assert_eq!(server.client_count(), 1);

        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
        assert_eq!(server.client_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_syntax_error() {
        let server = Arc::new(ServerInfo::new("127.0.0.1:5000".parse().unwrap()));
        let dispatcher = create_dispatcher(&server, "true");

        let mock = tokio_test::io::Builder::new()
            .read(b"\xff\xfe\n")
            .write(b"~INVALID COMMAND SYNTAX\n")
            .build();

        let handler = ConnectionHandler::new(
            mock,
            "10.0.0.9:41000".parse().unwrap(),
            dispatcher,
            &server,
            Arc::new(ConnectionStats::new()),
        );

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::ClientDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_unterminated_line_at_eof() {
        let server = Arc::new(ServerInfo::new("127.0.0.1:5000".parse().unwrap()));
        let dispatcher = create_dispatcher(&server, "true");

        let mock = tokio_test::io::Builder::new().read(b"HELP").build();

        let handler = ConnectionHandler::new(
            mock,
            "10.0.0.9:41000".parse().unwrap(),
            dispatcher,
            &server,
            Arc::new(ConnectionStats::new()),
        );

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::UnexpectedEof)
        ));
    }
}
