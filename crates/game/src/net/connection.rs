use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::stats::{PacketLossSimulation, generate_salt};
use super::tracking::ReceiveWindow;
use crate::cosmos::EntityId;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub type ClientId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ChallengeResponse,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("server full")]
    ServerFull,
    #[error("challenge response does not match")]
    BadChallenge,
    #[error("unknown client")]
    UnknownClient,
}

/// Server-side record of one remote peer.
#[derive(Debug)]
pub struct ClientConnection {
    pub addr: SocketAddr,
    pub client_id: ClientId,
    pub state: ConnectionState,
    pub client_salt: u64,
    pub server_salt: u64,
    pub last_receive_time: Instant,
    /// Character this client controls once accepted.
    pub character: Option<EntityId>,
    pub receive_window: ReceiveWindow,
    pub send_sequence: u32,
    pub packet_loss_sim: PacketLossSimulation,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, client_id: ClientId, client_salt: u64) -> Self {
        Self {
            addr,
            client_id,
            state: ConnectionState::Connecting,
            client_salt,
            server_salt: generate_salt(),
            last_receive_time: Instant::now(),
            character: None,
            receive_window: ReceiveWindow::new(),
            send_sequence: 0,
            packet_loss_sim: PacketLossSimulation::default(),
        }
    }

    pub fn combined_salt(&self) -> u64 {
        self.client_salt ^ self.server_salt
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }

    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }

    /// Checks the challenge answer and promotes the connection.
    pub fn verify_challenge(&mut self, combined_salt: u64) -> Result<(), HandshakeError> {
        if combined_salt != self.combined_salt() {
            return Err(HandshakeError::BadChallenge);
        }
        self.state = ConnectionState::Connected;
        self.touch();
        Ok(())
    }
}

/// Salt-challenge handshakes, client cap and timeouts for a server socket.
#[derive(Debug)]
pub struct ConnectionManager {
    clients_by_addr: HashMap<SocketAddr, ClientId>,
    clients: HashMap<ClientId, ClientConnection>,
    next_client_id: ClientId,
    max_clients: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(max_clients: usize, timeout_secs: u64) -> Self {
        Self {
            clients_by_addr: HashMap::new(),
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Returns the record for `addr`, creating a pending one on first contact.
    pub fn get_or_create_pending(
        &mut self,
        addr: SocketAddr,
        client_salt: u64,
    ) -> Result<&mut ClientConnection, HandshakeError> {
        if let Some(&client_id) = self.clients_by_addr.get(&addr) {
            return self
                .clients
                .get_mut(&client_id)
                .ok_or(HandshakeError::UnknownClient);
        }

        if self.clients.len() >= self.max_clients {
            return Err(HandshakeError::ServerFull);
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;
        self.clients_by_addr.insert(addr, client_id);

        let connection = ClientConnection::new(addr, client_id, client_salt);
        Ok(self.clients.entry(client_id).or_insert(connection))
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&ClientConnection> {
        self.clients_by_addr
            .get(addr)
            .and_then(|id| self.clients.get(id))
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientConnection> {
        let id = self.clients_by_addr.get(addr)?;
        self.clients.get_mut(id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&ClientConnection> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut ClientConnection> {
        self.clients.get_mut(&client_id)
    }

    pub fn remove(&mut self, client_id: ClientId) -> Option<ClientConnection> {
        let conn = self.clients.remove(&client_id)?;
        self.clients_by_addr.remove(&conn.addr);
        Some(conn)
    }

    pub fn remove_by_addr(&mut self, addr: &SocketAddr) -> Option<ClientConnection> {
        let client_id = self.clients_by_addr.remove(addr)?;
        self.clients.remove(&client_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientConnection> {
        self.clients.values_mut()
    }

    /// Drops silent peers and returns them so their characters can be removed.
    pub fn cleanup_timed_out(&mut self) -> Vec<ClientConnection> {
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_timed_out(self.timeout))
            .map(|(&id, _)| id)
            .collect();

        timed_out.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn connected_count(&self) -> usize {
        self.clients.values().filter(|c| c.is_connected()).count()
    }

    pub fn total_count(&self) -> usize {
        self.clients.len()
    }
}
