//! Server and client setups talking over simulated links.

use glam::Vec2;

use cosmic::cosmos::{Character, Transform};
use cosmic::net::{InputBatch, InputEntry, LinkConditions, SimulatedLink, StatePayload};
use cosmic::setup::{ClientSetupConfig, ClientState, ServerSetupConfig};
use cosmic::{
    ClientSetup, CosmicEntropy, Cosmos, EntityId, GameIntent, Packet, PacketHeader, PacketType,
    PlayerEntropy, ServerSetup, Setup,
};

const CLIENT: u32 = 1;

fn holding(intent: GameIntent) -> PlayerEntropy {
    let mut entropy = PlayerEntropy::default();
    entropy.press(intent);
    entropy
}

struct Session {
    server: ServerSetup,
    client: ClientSetup,
    uplink: SimulatedLink,
    downlink: SimulatedLink,
    character: EntityId,
    full_states: u32,
    deltas: u32,
    sequence: u32,
}

impl Session {
    fn new(conditions: LinkConditions, client_config: ClientSetupConfig) -> Self {
        let mut server = ServerSetup::new(ServerSetupConfig {
            populate_scene: false,
            ..Default::default()
        })
        .unwrap();
        let character = server.add_player(CLIENT).unwrap();

        let mut client = ClientSetup::new(client_config, server.steps_per_second());
        client
            .handle_packet(PacketType::ConnectionAccepted {
                client_id: CLIENT,
                character,
                steps_per_second: server.steps_per_second(),
            })
            .unwrap();

        Self {
            server,
            client,
            uplink: SimulatedLink::new(conditions.clone(), 11),
            downlink: SimulatedLink::new(conditions, 23),
            character,
            full_states: 0,
            deltas: 0,
            sequence: 0,
        }
    }

    fn wrap(&mut self, payload: PacketType) -> Packet {
        self.sequence += 1;
        Packet::new(PacketHeader::new(self.sequence, 0, 0), payload)
    }

    /// One client step, one server step, and everything in between.
    fn round(&mut self, input: Option<PlayerEntropy>) {
        if let Some(input) = input {
            self.client.control(input);
            self.client.tick();
        }
        self.flush_client();

        self.uplink.tick();
        for packet in self.uplink.receive() {
            self.server.handle_packet(CLIENT, packet.unwrap().payload);
        }

        self.server.tick();
        for (client_id, payload) in self.server.drain_outgoing() {
            // Other players are fed directly; only this client has a link.
            if client_id != CLIENT {
                continue;
            }
            let packet = self.wrap(payload);
            self.downlink.send(&packet).unwrap();
        }

        self.downlink.tick();
        for packet in self.downlink.receive() {
            let payload = packet.unwrap().payload;
            match payload {
                PacketType::FullState(_) => self.full_states += 1,
                PacketType::Delta(_) => self.deltas += 1,
                _ => {}
            }
            // Sync errors are recovered inside the client by a resync.
            let _ = self.client.handle_packet(payload);
        }
    }

    fn flush_client(&mut self) {
        for payload in self.client.drain_outgoing() {
            let packet = self.wrap(payload);
            self.uplink.send(&packet).unwrap();
        }
    }

    /// Heals both links and keeps stepping until everything is acknowledged.
    fn settle(&mut self, rounds: u32) {
        self.uplink = SimulatedLink::perfect();
        self.downlink = SimulatedLink::perfect();
        for _ in 0..rounds {
            self.round(Some(PlayerEntropy::default()));
        }
        self.round(None);
    }
}

#[test]
fn perfect_link_predicts_without_corrections() {
    let mut session = Session::new(LinkConditions::default(), ClientSetupConfig::default());

    for tick in 0..120 {
        let intent = if tick < 60 {
            GameIntent::MoveForward
        } else {
            GameIntent::MoveLeft
        };
        session.round(Some(holding(intent)));
    }
    session.settle(5);

    assert_eq!(session.client.state(), ClientState::Predicting);
    assert_eq!(session.client.stats().mispredictions, 0);
    assert_eq!(session.client.predicted(), session.server.cosmos());
    assert_eq!(session.full_states, 1);
    assert!(session.deltas > 100);
}

#[test]
fn lossy_jittery_link_still_converges() {
    let conditions = LinkConditions {
        loss_percent: 20.0,
        latency_ticks: 3,
        jitter_ticks: 4,
    };
    let mut session = Session::new(conditions, ClientSetupConfig::default());

    for tick in 0..240 {
        let intent = match (tick / 30) % 4 {
            0 => GameIntent::MoveForward,
            1 => GameIntent::MoveRight,
            2 => GameIntent::MoveBackward,
            _ => GameIntent::MoveLeft,
        };
        session.round(Some(holding(intent)));
    }
    assert!(session.downlink.dropped() > 0);

    session.settle(40);

    assert_eq!(session.client.pending_inputs(), 0);
    assert_eq!(session.client.referential(), session.server.cosmos());
    assert_eq!(
        session.client.predicted().structural_hash(),
        session.server.cosmos().structural_hash()
    );
}

#[test]
fn silent_server_triggers_resync_then_recovers() {
    let config = ClientSetupConfig {
        desync_timeout_steps: 20,
        resync_retry_steps: 10,
        ..Default::default()
    };
    let mut session = Session::new(LinkConditions::default(), config);
    for _ in 0..10 {
        session.round(Some(PlayerEntropy::default()));
    }

    session.downlink = SimulatedLink::new(
        LinkConditions {
            loss_percent: 100.0,
            ..Default::default()
        },
        5,
    );
    for _ in 0..30 {
        session.round(Some(PlayerEntropy::default()));
    }
    assert_eq!(session.client.state(), ClientState::Desynced);
    assert!(session.client.stats().resyncs >= 1);

    session.settle(5);
    assert_eq!(session.client.state(), ClientState::Predicting);
    assert_eq!(session.client.referential(), session.server.cosmos());
}

#[test]
fn corrected_prediction_does_not_diverge() {
    let mut server = Cosmos::default();
    let character = server.spawn(Character::at(Vec2::ZERO)).unwrap().id();

    let mut client = ClientSetup::new(ClientSetupConfig::default(), 60);
    client.set_controlled(character);
    client
        .handle_packet(PacketType::FullState(Box::new(StatePayload {
            acked_sequence: 0,
            cosmos: server.clone(),
        })))
        .unwrap();

    for _ in 0..10 {
        client.control(holding(GameIntent::MoveForward));
        client.tick();
    }
    let mut uncorrected = client.predicted().clone();

    for _ in 0..5 {
        server.advance(&CosmicEntropy::for_subject(
            character,
            holding(GameIntent::MoveForward),
        ));
    }
    const EPSILON: f32 = 0.5;
    server
        .component_mut::<Transform>(character)
        .unwrap()
        .position
        .x += EPSILON;

    client
        .handle_packet(PacketType::FullState(Box::new(StatePayload {
            acked_sequence: 5,
            cosmos: server,
        })))
        .unwrap();
    assert_eq!(client.stats().mispredictions, 1);
    assert_eq!(client.predicted().step(), uncorrected.step());

    let gap = |client: &ClientSetup, uncorrected: &Cosmos| {
        let corrected = client.predicted().component::<Transform>(character).unwrap();
        let original = uncorrected.component::<Transform>(character).unwrap();
        corrected.position.distance(original.position)
    };

    let initial = gap(&client, &uncorrected);
    assert!(initial > EPSILON / 2.0);

    let mut previous = initial;
    for _ in 0..60 {
        client.control(holding(GameIntent::MoveForward));
        client.tick();
        uncorrected.advance(&CosmicEntropy::for_subject(
            character,
            holding(GameIntent::MoveForward),
        ));
        let current = gap(&client, &uncorrected);
        assert!(current <= previous + 1e-3, "gap grew from {previous} to {current}");
        previous = current;
    }
}

#[test]
fn hitscan_is_judged_where_the_shooter_saw_the_target() {
    let conditions = LinkConditions {
        latency_ticks: 5,
        ..Default::default()
    };
    let mut session = Session::new(conditions, ClientSetupConfig::default());
    let target = session.server.add_player(2).unwrap();

    for sequence in 1..=40 {
        let batch = InputBatch {
            entries: vec![InputEntry {
                sequence,
                entropy: holding(GameIntent::MoveRight),
            }],
        };
        session.server.handle_packet(2, PacketType::Input(batch));
        session.round(Some(PlayerEntropy::default()));
    }

    let now = session.server.cosmos().step();
    let seen_step = session.server.acked_step(CLIENT).unwrap();
    assert!(seen_step < now);

    let seen = session.server.rewind_position(target, seen_step).unwrap();
    let current = session
        .server
        .cosmos()
        .component::<Transform>(target)
        .unwrap()
        .position;
    assert!(current.x - seen.x > 40.0);

    let origin = seen - Vec2::new(0.0, 300.0);
    let hit = session
        .server
        .lag_compensated_hitscan(CLIENT, origin, Vec2::Y, 1000.0)
        .expect("target was in the line of fire when the shot was taken");
    assert_eq!(hit.target, target);
    assert_eq!(hit.step, seen_step);

    assert_ne!(hit.target, session.character);
}
