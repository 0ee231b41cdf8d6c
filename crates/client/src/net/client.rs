use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use cosmic::net::generate_salt;
use cosmic::{ConnectionState, NetworkEndpoint, NetworkStats, PacketType};

use super::config::ClientConfig;

/// Client end of the handshake and the datagram socket.
///
/// Handshake traffic is handled here; everything the game cares about is
/// handed back from [`NetworkClient::poll`].
pub struct NetworkClient {
    endpoint: NetworkEndpoint,
    config: ClientConfig,
    state: ConnectionState,
    client_salt: u64,
    challenge_answer: Option<u64>,
    last_handshake_send: Instant,
    last_ping_time: Instant,
    connection_start_time: Option<Instant>,
}

impl NetworkClient {
    pub fn new(config: ClientConfig) -> io::Result<Self> {
        let mut endpoint = NetworkEndpoint::bind("0.0.0.0:0")?;
        endpoint.set_timeout(Duration::from_secs(config.connection_timeout_secs));

        Ok(Self {
            endpoint,
            state: ConnectionState::Disconnected,
            client_salt: generate_salt(),
            challenge_answer: None,
            last_handshake_send: Instant::now(),
            last_ping_time: Instant::now(),
            connection_start_time: None,
            config,
        })
    }

    pub fn connect(&mut self, server_addr: SocketAddr) -> io::Result<()> {
        log::info!("connecting to {server_addr}");
        self.endpoint.set_remote(server_addr);
        self.state = ConnectionState::Connecting;
        self.connection_start_time = Some(Instant::now());
        self.send_handshake()
    }

    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            let _ = self.send(PacketType::Disconnect);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.challenge_answer = None;
        self.client_salt = generate_salt();
        self.connection_start_time = None;
        self.endpoint.reset();
    }

    /// Sends one game payload to the server.
    pub fn send(&mut self, payload: PacketType) -> io::Result<()> {
        let packet = self.endpoint.create_packet(payload);
        self.endpoint.send(&packet)?;
        Ok(())
    }

    fn send_handshake(&mut self) -> io::Result<()> {
        self.last_handshake_send = Instant::now();
        let payload = match self.challenge_answer {
            Some(combined_salt) => PacketType::ChallengeResponse { combined_salt },
            None => PacketType::ConnectionRequest {
                client_salt: self.client_salt,
            },
        };
        self.send(payload)
    }

    /// Drains the socket, advances the handshake and keeps the link alive.
    /// Returns the payloads meant for the game, in arrival order.
    pub fn poll(&mut self) -> io::Result<Vec<PacketType>> {
        let mut game = Vec::new();
        for (packet, _) in self.endpoint.receive()? {
            if let Some(payload) = self.handle_payload(packet.payload)? {
                game.push(payload);
            }
        }

        match self.state {
            ConnectionState::Connecting | ConnectionState::ChallengeResponse => {
                let timeout = Duration::from_secs(self.config.connection_timeout_secs);
                if self.connection_start_time.is_some_and(|s| s.elapsed() > timeout) {
                    log::warn!("connection attempt timed out");
                    self.reset();
                } else if self.last_handshake_send.elapsed().as_secs_f32()
                    >= self.config.handshake_retry_secs
                {
                    self.send_handshake()?;
                }
            }
            ConnectionState::Connected => {
                if self.last_ping_time.elapsed().as_secs_f32() >= self.config.ping_interval_secs {
                    self.last_ping_time = Instant::now();
                    self.send(PacketType::Ping {
                        timestamp: now_millis(),
                    })?;
                }
                if self.endpoint.is_timed_out() {
                    log::warn!("server connection lost");
                    self.reset();
                }
            }
            _ => {}
        }

        Ok(game)
    }

    fn handle_payload(&mut self, payload: PacketType) -> io::Result<Option<PacketType>> {
        match payload {
            PacketType::ConnectionChallenge {
                server_salt,
                challenge,
            } => {
                let expected = self.client_salt ^ server_salt;
                if challenge != expected {
                    log::warn!("challenge does not match our salt, ignoring");
                    return Ok(None);
                }
                self.state = ConnectionState::ChallengeResponse;
                self.challenge_answer = Some(expected);
                self.send_handshake()?;
                Ok(None)
            }
            PacketType::ConnectionAccepted {
                client_id,
                character,
                ..
            } => {
                if self.state == ConnectionState::Connected {
                    return Ok(None);
                }
                log::info!("connected as client {client_id}, playing {character}");
                self.state = ConnectionState::Connected;
                self.endpoint.set_state(ConnectionState::Connected);
                Ok(Some(payload))
            }
            PacketType::ConnectionDenied { reason } => {
                log::warn!("connection denied: {reason}");
                self.reset();
                Ok(None)
            }
            PacketType::Pong { timestamp } => {
                log::trace!("rtt {} ms", now_millis().saturating_sub(timestamp));
                Ok(None)
            }
            PacketType::Disconnect => {
                log::info!("disconnected by server");
                self.reset();
                Ok(None)
            }
            other if self.state == ConnectionState::Connected => Ok(Some(other)),
            _ => Ok(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
