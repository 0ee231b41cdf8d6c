use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use super::connection::ConnectionState;
use super::protocol::{MAX_PACKET_SIZE, Packet, PacketHeader, PacketType};
use super::stats::NetworkStats;
use super::tracking::{SendWindow, ReceiveWindow};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_TRACKED_SENDS: usize = 256;

/// Non-blocking UDP socket with sequence numbering and ack bookkeeping.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    state: ConnectionState,
    send_sequence: u32,
    send_window: SendWindow,
    receive_window: ReceiveWindow,
    stats: NetworkStats,
    recv_buffer: Box<[u8]>,
    timeout: Duration,
    last_receive_time: Instant,
    running: Arc<AtomicBool>,
    /// Servers see many peers on one socket and track duplicates per client.
    server_mode: bool,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            remote_addr: None,
            state: ConnectionState::Disconnected,
            send_sequence: 0,
            send_window: SendWindow::new(MAX_TRACKED_SENDS),
            receive_window: ReceiveWindow::new(),
            stats: NetworkStats::default(),
            recv_buffer: vec![0u8; MAX_PACKET_SIZE].into_boxed_slice(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            last_receive_time: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            server_mode: false,
        })
    }

    pub fn set_server_mode(&mut self, server_mode: bool) {
        self.server_mode = server_mode;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn set_remote(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> io::Result<usize> {
        let data = packet
            .serialize()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let bytes = self.socket.send_to(&data, addr)?;

        self.send_window.track_packet(packet.header.sequence);
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }

    pub fn send(&mut self, packet: &Packet) -> io::Result<usize> {
        let addr = self
            .remote_addr
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "No remote address set"))?;
        self.send_to(packet, addr)
    }

    /// Wraps `payload` with this endpoint's next sequence and current acks.
    pub fn create_packet(&mut self, payload: PacketType) -> Packet {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);

        let (ack, ack_bitfield) = self.receive_window.ack_data();
        Packet::new(PacketHeader::new(sequence, ack, ack_bitfield), payload)
    }

    /// Drains the socket. Malformed datagrams are logged and dropped.
    pub fn receive(&mut self) -> io::Result<Vec<(Packet, SocketAddr)>> {
        let mut packets = Vec::new();

        loop {
            let (size, addr) = match self.socket.recv_from(&mut self.recv_buffer) {
                Ok(received) => received,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            };

            let packet = match Packet::deserialize(&self.recv_buffer[..size]) {
                Ok(packet) => packet,
                Err(error) => {
                    log::debug!("dropping {size} byte datagram from {addr}: {error}");
                    self.stats.packets_malformed += 1;
                    continue;
                }
            };

            if !self.server_mode && !self.receive_window.record_received(packet.header.sequence)
            {
                continue;
            }

            self.send_window
                .process_ack(packet.header.ack, packet.header.ack_bitfield);

            self.stats.packets_received += 1;
            self.stats.bytes_received += size as u64;
            self.stats.rtt_ms = self.send_window.srtt();
            self.stats.rtt_variance = self.send_window.rtt_var();
            if self.stats.packets_sent > 0 {
                let unacked = self.send_window.unacked_count() as f32;
                let sent = self.stats.packets_sent as f32;
                self.stats.packet_loss_percent = (unacked / sent.max(1.0)) * 100.0;
            }

            self.last_receive_time = Instant::now();
            packets.push((packet, addr));
        }

        Ok(packets)
    }

    pub fn is_timed_out(&self) -> bool {
        self.last_receive_time.elapsed() > self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.send_sequence = 0;
        self.send_window = SendWindow::new(MAX_TRACKED_SENDS);
        self.receive_window = ReceiveWindow::new();
        self.stats = NetworkStats::default();
        self.last_receive_time = Instant::now();
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}
