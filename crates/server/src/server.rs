use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cosmic::scene::ScriptedBot;
use cosmic::{
    ClientId, ConnectionManager, ConnectionState, CosmosError, NetworkEndpoint, NetworkStats,
    Packet, PacketHeader, PacketType, ServerSetup, Setup,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Socket, handshakes and the authoritative setup, driven from one thread.
pub struct GameServer {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
    config: ServerConfig,
    setup: ServerSetup,
    host_bot: Option<ScriptedBot>,
    last_tick_time: Instant,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<ServerEvent>,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> anyhow::Result<Self> {
        let mut endpoint = NetworkEndpoint::bind(bind_addr)?;
        endpoint.set_server_mode(true);

        let mut setup = ServerSetup::new(config.setup.clone())?;
        let host_bot = if config.host_bot {
            let character = setup.spawn_host()?;
            log::info!("host bot plays {character}");
            Some(ScriptedBot::new(config.setup.simulation.seed))
        } else {
            None
        };

        Ok(Self {
            running: endpoint.running(),
            endpoint,
            connections: ConnectionManager::with_timeout(config.max_clients, config.timeout_secs),
            setup,
            host_bot,
            last_tick_time: Instant::now(),
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn run(&mut self) {
        let mut last_report = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            for event in self.drain_events() {
                event.log();
            }
            if last_report.elapsed() >= STATS_INTERVAL {
                last_report = Instant::now();
                self.stats().log();
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown_connections();
        for event in self.drain_events() {
            event.log();
        }
    }

    pub fn shutdown_connections(&mut self) {
        let client_ids: Vec<ClientId> = self.connections.iter().map(|c| c.client_id).collect();
        for client_id in client_ids {
            self.drop_client(client_id, DisconnectReason::Shutdown);
        }
    }

    fn drop_client(&mut self, client_id: ClientId, reason: DisconnectReason) {
        if let Some(mut client) = self.connections.remove(client_id) {
            if !matches!(reason, DisconnectReason::Graceful) {
                let header = PacketHeader::new(client.next_sequence(), 0, 0);
                let packet = Packet::new(header, PacketType::Disconnect);
                let _ = self.endpoint.send_to(&packet, client.addr);
            }
            self.setup.remove_player(client_id);
            self.pending_events
                .push_back(ServerEvent::ClientDisconnected { client_id, reason });
        }
    }

    /// Receives, steps the cosmos as often as wall time demands, sends.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let frame_delta = (now - self.last_tick_time).as_secs_f32();
        self.last_tick_time = now;

        if let Err(e) = self.process_network() {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("network error: {e}"),
            });
        }

        if let Some(bot) = &mut self.host_bot {
            self.setup.control(bot.next_input());
        }
        let steps = self.setup.advance(frame_delta);
        if steps > 0 {
            self.flush_outgoing();
        }
        for shot in self.setup.drain_shot_confirmations() {
            self.pending_events.push_back(ServerEvent::ShotJudged {
                client_id: shot.shooter,
                target: shot.hit.map(|hit| hit.target),
                step: shot.hit.map(|hit| hit.step),
            });
        }

        for client in self.connections.cleanup_timed_out() {
            self.setup.remove_player(client.client_id);
            self.pending_events.push_back(ServerEvent::ClientDisconnected {
                client_id: client.client_id,
                reason: DisconnectReason::Timeout,
            });
        }
    }

    fn flush_outgoing(&mut self) {
        for (client_id, payload) in self.setup.drain_outgoing() {
            let Some(client) = self.connections.get_mut(client_id) else {
                continue;
            };
            let header = PacketHeader::new(client.next_sequence(), 0, 0);
            if client.packet_loss_sim.should_drop()
                || self
                    .config
                    .global_packet_loss
                    .as_ref()
                    .is_some_and(|sim| sim.should_drop())
            {
                continue;
            }

            let addr = client.addr;
            let packet = Packet::new(header, payload);
            if let Err(e) = self.endpoint.send_to(&packet, addr) {
                self.pending_events.push_back(ServerEvent::Error {
                    message: format!("failed to send {} to {addr}: {e}", packet.payload.name()),
                });
            }
        }
    }

    fn process_network(&mut self) -> io::Result<()> {
        for (packet, addr) in self.endpoint.receive()? {
            self.handle_packet(packet, addr)?;
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) -> io::Result<()> {
        let sequence = packet.header.sequence;
        match packet.payload {
            PacketType::ConnectionRequest { client_salt } => {
                self.handle_connection_request(addr, client_salt)?;
            }
            PacketType::ChallengeResponse { combined_salt } => {
                self.handle_challenge_response(addr, combined_salt)?;
            }
            PacketType::Ping { timestamp } => {
                let sequence = self
                    .connections
                    .get_by_addr_mut(&addr)
                    .map_or(0, |client| client.next_sequence());
                let packet = Packet::new(
                    PacketHeader::new(sequence, 0, 0),
                    PacketType::Pong { timestamp },
                );
                self.endpoint.send_to(&packet, addr)?;
            }
            PacketType::Disconnect => {
                if let Some(client_id) = self.connections.get_by_addr(&addr).map(|c| c.client_id) {
                    self.drop_client(client_id, DisconnectReason::Graceful);
                }
                return Ok(());
            }
            payload => {
                let Some(client) = self.connections.get_by_addr_mut(&addr) else {
                    return Ok(());
                };
                if client.state != ConnectionState::Connected
                    || !client.receive_window.record_received(sequence)
                {
                    return Ok(());
                }
                client.touch();
                let client_id = client.client_id;
                self.setup.handle_packet(client_id, payload);
                return Ok(());
            }
        }

        if let Some(client) = self.connections.get_by_addr_mut(&addr) {
            client.touch();
        }
        Ok(())
    }

    fn handle_connection_request(&mut self, addr: SocketAddr, client_salt: u64) -> io::Result<()> {
        self.pending_events
            .push_back(ServerEvent::ClientConnecting { addr });

        let client = match self.connections.get_or_create_pending(addr, client_salt) {
            Ok(client) => client,
            Err(reason) => {
                let packet = Packet::new(
                    PacketHeader::new(0, 0, 0),
                    PacketType::ConnectionDenied {
                        reason: reason.to_string(),
                    },
                );
                self.endpoint.send_to(&packet, addr)?;
                self.pending_events.push_back(ServerEvent::ConnectionDenied {
                    addr,
                    reason: reason.to_string(),
                });
                return Ok(());
            }
        };

        let challenge = PacketType::ConnectionChallenge {
            server_salt: client.server_salt,
            challenge: client.combined_salt(),
        };
        let packet = Packet::new(PacketHeader::new(client.next_sequence(), 0, 0), challenge);
        self.endpoint.send_to(&packet, addr)?;
        Ok(())
    }

    fn handle_challenge_response(
        &mut self,
        addr: SocketAddr,
        combined_salt: u64,
    ) -> io::Result<()> {
        let Some(client) = self.connections.get_by_addr_mut(&addr) else {
            return Ok(());
        };
        if client.is_connected() {
            // A retransmitted answer; the acceptance went out already.
            return Ok(());
        }
        if let Err(e) = client.verify_challenge(combined_salt) {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("{e} from {addr}"),
            });
            return Ok(());
        }
        let client_id = client.client_id;

        let character = match self.setup.add_player(client_id) {
            Ok(character) => character,
            Err(e) => return self.deny_after_handshake(client_id, addr, e),
        };
        let Some(client) = self.connections.get_mut(client_id) else {
            return Ok(());
        };
        client.character = Some(character);

        let accepted = PacketType::ConnectionAccepted {
            client_id,
            character,
            steps_per_second: self.setup.steps_per_second(),
        };
        let packet = Packet::new(PacketHeader::new(client.next_sequence(), 0, 0), accepted);
        self.endpoint.send_to(&packet, addr)?;

        self.pending_events.push_back(ServerEvent::ClientConnected {
            client_id,
            addr,
            character,
        });
        Ok(())
    }

    fn deny_after_handshake(
        &mut self,
        client_id: ClientId,
        addr: SocketAddr,
        error: CosmosError,
    ) -> io::Result<()> {
        self.connections.remove(client_id);
        let reason = error.to_string();
        let packet = Packet::new(
            PacketHeader::new(0, 0, 0),
            PacketType::ConnectionDenied {
                reason: reason.clone(),
            },
        );
        self.endpoint.send_to(&packet, addr)?;
        self.pending_events
            .push_back(ServerEvent::ConnectionDenied { addr, reason });
        Ok(())
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            step: self.setup.cosmos().step(),
            client_count: self.connections.connected_count(),
            max_clients: self.config.max_clients,
            entity_count: self.setup.cosmos().entity_count(),
            network_stats: self.endpoint.stats().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub step: u32,
    pub client_count: usize,
    pub max_clients: usize,
    pub entity_count: usize,
    pub network_stats: NetworkStats,
}

impl ServerStats {
    pub fn log(&self) {
        log::info!(
            "step {} | {}/{} clients | {} entities | rtt {:.1} ms | {} malformed",
            self.step,
            self.client_count,
            self.max_clients,
            self.entity_count,
            self.network_stats.rtt_ms,
            self.network_stats.packets_malformed,
        );
    }
}
