//! Transport connection table for the poll server
//!
//! This module tracks the UDP peers currently talking to the server:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Connection id assignment, monotonic and never reused
//! - Connection health monitoring and automatic cleanup
//! - Capacity management and address lookup in both directions
//!
//! Connection ids are the volatile transport handles the session layer keys
//! responses by; identities (names) live in the participant registry.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected UDP peer
#[derive(Debug)]
pub struct Client {
    /// Connection id assigned by the server
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client and marks it as recently active
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from the client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Enforces the capacity limit and hands out connection ids. Ids are never
/// reused, so a stale id can never end up pointing at someone else.
pub struct ClientManager {
    /// Connected clients indexed by connection id
    clients: HashMap<ConnectionId, Client>,
    /// Next available connection id
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Silence after which a client is dropped
    timeout: Duration,
}

impl ClientManager {
    /// Creates an empty client table with the given capacity and timeout
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(connection_id) if successful, None if the server is at
    /// capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = ConnectionId(self.next_client_id);
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a connection id by network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: ConnectionId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Refreshes the activity timestamp; returns false for unknown ids
    pub fn touch(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
            true
        } else {
            false
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed connection ids so the session can treat them as
    /// disconnects.
    pub fn check_timeouts(&mut self) -> Vec<ConnectionId> {
        let timeout = self.timeout;
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all connection ids and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
