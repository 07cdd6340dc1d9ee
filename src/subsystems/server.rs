//! Server Introspection
//!
//! Exposes the listener's bound address and the set of connected clients.
//! The connection layer registers each client for the lifetime of its
//! connection through a [`ClientRegistration`] guard.

use crate::commands::{CommandDescriptor, CommandTable, HandlerResult, TableError};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Heading of the server table in the HELP listing
pub const TABLE_TITLE: &str = "SERVER COMMANDS";

/// Networking information about the running server.
#[derive(Debug)]
pub struct ServerInfo {
    /// Address the listener is bound to
    local_addr: SocketAddr,

    /// Connected clients keyed by registration order
    clients: Mutex<BTreeMap<u64, SocketAddr>>,

    next_client_id: AtomicU64,
}

impl ServerInfo {
    /// Creates server info for a listener bound to `local_addr`.
    pub fn new(local_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            clients: Mutex::new(BTreeMap::new()),
            next_client_id: AtomicU64::new(0),
        }
    }

    /// The listener's bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Records a connected client until the returned guard is dropped.
    pub fn register_client(self: &Arc<Self>, addr: SocketAddr) -> ClientRegistration {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().unwrap().insert(id, addr);
        trace!(client = %addr, id, "Client registered");

        ClientRegistration {
            server: Arc::clone(self),
            id,
        }
    }

    /// Snapshot of connected clients in connection order.
    pub fn clients(&self) -> Vec<SocketAddr> {
        self.clients.lock().unwrap().values().copied().collect()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    fn unregister_client(&self, id: u64) {
        if let Some(addr) = self.clients.lock().unwrap().remove(&id) {
            trace!(client = %addr, id, "Client unregistered");
        }
    }

    /// The server command table.
    pub fn command_table() -> Result<CommandTable<Self>, TableError> {
        CommandTable::new(
            TABLE_TITLE,
            vec![
                CommandDescriptor::new(
                    "SVR_INFO",
                    handle_server_info,
                    "Gets the server's networking information",
                ),
                CommandDescriptor::new(
                    "CLIENTS_INFO",
                    handle_clients_info,
                    "Gets the IP and port #s of connected clients",
                ),
            ],
        )
    }
}

/// Keeps a client listed in [`ServerInfo`] while alive.
#[derive(Debug)]
pub struct ClientRegistration {
    server: Arc<ServerInfo>,
    id: u64,
}

impl Drop for ClientRegistration {
    fn drop(&mut self) {
        self.server.unregister_client(self.id);
    }
}

/// SVR_INFO
fn handle_server_info(_param: &str, response: &mut String, server: &ServerInfo) -> HandlerResult {
    let addr = server.local_addr();
    response.push_str(&format!("\nADDRESS: {}\nPORT: {}", addr.ip(), addr.port()));
    Ok(())
}

/// CLIENTS_INFO
fn handle_clients_info(_param: &str, response: &mut String, server: &ServerInfo) -> HandlerResult {
    let clients = server.clients();
    response.push_str(&format!("\nCONNECTED CLIENTS: {}", clients.len()));
    for client in clients {
        response.push_str(&format!("\n{}", client));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_server_info_output() {
        let server = ServerInfo::new(addr("192.168.1.20:5000"));
        let mut out = String::new();
        handle_server_info("default", &mut out, &server).unwrap();
        assert_eq!(out, "\nADDRESS: 192.168.1.20\nPORT: 5000");
    }

    #[test]
    fn test_client_registration_lifecycle() {
        let server = Arc::new(ServerInfo::new(addr("127.0.0.1:5000")));

        let first = server.register_client(addr("10.0.0.1:40000"));
        let second = server.register_client(addr("10.0.0.2:40001"));
        assert_eq!(server.client_count(), 2);
        assert_eq!(
            server.clients(),
            vec![addr("10.0.0.1:40000"), addr("10.0.0.2:40001")]
        );

        drop(first);
        assert_eq!(server.clients(), vec![addr("10.0.0.2:40001")]);

        drop(second);
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn test_clients_info_output() {
        let server = Arc::new(ServerInfo::new(addr("127.0.0.1:5000")));

        let mut out = String::new();
        handle_clients_info("default", &mut out, &server).unwrap();
        assert_eq!(out, "\nCONNECTED CLIENTS: 0");

        let _a = server.register_client(addr("10.0.0.1:40000"));
        let _b = server.register_client(addr("[::1]:40001"));

        let mut out = String::new();
        handle_clients_info("default", &mut out, &server).unwrap();
        assert_eq!(out, "\nCONNECTED CLIENTS: 2\n10.0.0.1:40000\n[::1]:40001");
    }

    #[test]
    fn test_command_table() {
        let table = ServerInfo::command_table().unwrap();
        let commands: Vec<_> = table.iter().map(|d| d.command()).collect();
        assert_eq!(commands, vec!["SVR_INFO", "CLIENTS_INFO"]);
    }
}
