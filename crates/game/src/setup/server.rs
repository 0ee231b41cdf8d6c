//! The authoritative side.
//!
//! Steps at a fixed rate no matter when client input arrives, keeps a short
//! history for delta baselines and lag compensation, and leaves every
//! outgoing packet in an outbox for the I/O layer.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::cosmos::{Character, Cosmos, EntityId, SimulationConfig, Transform};
use crate::error::CosmosError;
use crate::history::CosmosHistory;
use crate::net::{
    ClientId, CosmosDelta, DeltaPayload, MAX_STATE_FRAGMENTS, PacketType, STATE_FRAGMENT_BYTES,
    StateFragment, StatePayload,
};
use crate::scene::{populate_test_scene, spawn_player};
use crate::simulation::{FixedTimestep, InputAdmission, InputBuffer, InputBufferConfig};
use crate::step::{CosmicEntropy, GameIntent, PlayerEntropy, StepArtifacts};

use super::Setup;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LagCompensationConfig {
    pub enabled: bool,
    /// How far back a shot may be judged.
    pub max_rewind_steps: u32,
    /// Reach of the instant ray used to confirm a client's shot.
    pub confirm_range: f32,
}

impl Default for LagCompensationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rewind_steps: 30,
            confirm_range: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSetupConfig {
    pub simulation: SimulationConfig,
    pub populate_scene: bool,
    /// A client with no full state for this many steps gets one anyway.
    pub full_state_interval: u32,
    /// Encoded states above this size go out as `StateFragment`s.
    pub max_state_bytes: usize,
    pub history_capacity: usize,
    pub input: InputBufferConfig,
    pub lag_compensation: LagCompensationConfig,
}

impl Default for ServerSetupConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            populate_scene: true,
            full_state_interval: 600,
            max_state_bytes: STATE_FRAGMENT_BYTES,
            history_capacity: 128,
            input: InputBufferConfig::default(),
            lag_compensation: LagCompensationConfig::default(),
        }
    }
}

#[derive(Debug)]
struct RemoteClient {
    character: EntityId,
    inputs: InputBuffer,
    acked_step: Option<u32>,
    needs_full_state: bool,
    last_full_state_step: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitscanHit {
    pub target: EntityId,
    pub point: Vec2,
    pub distance: f32,
    /// Step whose positions the shot was judged against.
    pub step: u32,
}

/// Outcome of judging one trigger pull.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotConfirmation {
    pub shooter: ClientId,
    pub hit: Option<HitscanHit>,
}

pub struct ServerSetup {
    config: ServerSetupConfig,
    cosmos: Cosmos,
    clients: BTreeMap<ClientId, RemoteClient>,
    history: CosmosHistory,
    timestep: FixedTimestep,
    outbox: Vec<(ClientId, PacketType)>,
    host: Option<EntityId>,
    host_input: PlayerEntropy,
    last_artifacts: StepArtifacts,
    confirmations: Vec<ShotConfirmation>,
    new_sample: bool,
}

impl ServerSetup {
    pub fn new(config: ServerSetupConfig) -> Result<Self, CosmosError> {
        let mut cosmos = Cosmos::new(&config.simulation);
        if config.populate_scene {
            populate_test_scene(&mut cosmos)?;
        }

        let mut history = CosmosHistory::new(config.history_capacity);
        history.push(&cosmos);

        Ok(Self {
            timestep: FixedTimestep::new(config.simulation.steps_per_second),
            config,
            cosmos,
            clients: BTreeMap::new(),
            history,
            outbox: Vec::new(),
            host: None,
            host_input: PlayerEntropy::default(),
            last_artifacts: StepArtifacts::default(),
            confirmations: Vec::new(),
            new_sample: true,
        })
    }

    pub fn cosmos(&self) -> &Cosmos {
        &self.cosmos
    }

    pub fn steps_per_second(&self) -> u32 {
        self.cosmos.clock().steps_per_second
    }

    pub fn last_artifacts(&self) -> &StepArtifacts {
        &self.last_artifacts
    }

    /// Gives the machine running the server a character of its own.
    pub fn spawn_host(&mut self) -> Result<EntityId, CosmosError> {
        let id = spawn_player(&mut self.cosmos)?;
        self.host = Some(id);
        Ok(id)
    }

    pub fn add_player(&mut self, client_id: ClientId) -> Result<EntityId, CosmosError> {
        let character = spawn_player(&mut self.cosmos)?;
        self.clients.insert(
            client_id,
            RemoteClient {
                character,
                inputs: InputBuffer::new(self.config.input.clone()),
                acked_step: None,
                needs_full_state: true,
                last_full_state_step: None,
            },
        );
        log::info!("client {client_id} joined as {character}");
        Ok(character)
    }

    pub fn remove_player(&mut self, client_id: ClientId) -> Option<EntityId> {
        let client = self.clients.remove(&client_id)?;
        if let Err(error) = self.cosmos.delete_entity(client.character) {
            log::debug!("client {client_id} left without a character: {error}");
        }
        log::info!("client {client_id} left");
        Some(client.character)
    }

    pub fn character_of(&self, client_id: ClientId) -> Option<EntityId> {
        self.clients.get(&client_id).map(|c| c.character)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Highest input sequence applied for `client_id`.
    pub fn acked_sequence(&self, client_id: ClientId) -> Option<u32> {
        self.clients.get(&client_id).map(|c| c.inputs.last_applied())
    }

    pub fn acked_step(&self, client_id: ClientId) -> Option<u32> {
        self.clients.get(&client_id).and_then(|c| c.acked_step)
    }

    pub fn handle_packet(&mut self, client_id: ClientId, packet: PacketType) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            log::debug!("{} from unknown client {client_id}", packet.name());
            return;
        };

        match packet {
            PacketType::Input(batch) => {
                for entry in batch.entries {
                    match client.inputs.push(entry.sequence, entry.entropy) {
                        InputAdmission::Accepted | InputAdmission::Duplicate => {}
                        rejected => log::debug!(
                            "client {client_id} input {} dropped: {rejected:?}",
                            entry.sequence
                        ),
                    }
                }
            }
            PacketType::StateAck { step } => {
                let newer = client.acked_step.is_none_or(|acked| step > acked);
                if newer && self.history.contains(step) {
                    client.acked_step = Some(step);
                }
            }
            PacketType::ResyncRequest => {
                log::info!("client {client_id} requested a resync");
                client.needs_full_state = true;
            }
            other => log::debug!("ignoring {} from client {client_id}", other.name()),
        }
    }

    /// One authoritative step followed by a broadcast.
    pub fn tick(&mut self) -> &StepArtifacts {
        let mut entropy = CosmicEntropy::default();
        if let Some(host) = self.host {
            entropy.insert(host, std::mem::take(&mut self.host_input));
        }
        let mut shooters = Vec::new();
        for (&client_id, client) in &mut self.clients {
            if let Some((_, input)) = client.inputs.drain_for_tick() {
                let pulled = input
                    .intents
                    .iter()
                    .any(|change| change.intent == GameIntent::Shoot && change.pressed);
                if pulled {
                    shooters.push(client_id);
                }
                entropy.insert(client.character, input);
            }
        }
        for shooter in shooters {
            self.confirm_shot(shooter);
        }

        self.last_artifacts = self.cosmos.advance(&entropy);
        self.history.push(&self.cosmos);
        self.broadcast();
        self.new_sample = true;
        &self.last_artifacts
    }

    fn broadcast(&mut self) {
        let step = self.cosmos.step();
        let mut encoded = None;

        for (&client_id, client) in &mut self.clients {
            let acked_sequence = client.inputs.last_applied();
            let baseline = client.acked_step.and_then(|s| self.history.get(s));
            let full_state_due = client
                .last_full_state_step
                .is_none_or(|last| step.saturating_sub(last) >= self.config.full_state_interval);

            let packets = match baseline {
                Some(baseline) if !client.needs_full_state && !full_state_due => {
                    vec![PacketType::Delta(Box::new(DeltaPayload {
                        acked_sequence,
                        delta: CosmosDelta::compute(baseline, &self.cosmos),
                    }))]
                }
                _ => {
                    let packets = full_state_packets(
                        &self.cosmos,
                        &mut encoded,
                        acked_sequence,
                        self.config.max_state_bytes,
                    );
                    client.needs_full_state = packets.is_empty();
                    client.last_full_state_step = Some(step);
                    packets
                }
            };
            self.outbox
                .extend(packets.into_iter().map(|packet| (client_id, packet)));
        }
    }

    pub fn drain_outgoing(&mut self) -> Vec<(ClientId, PacketType)> {
        std::mem::take(&mut self.outbox)
    }

    /// Judges a trigger pull along the shooter's facing against the state
    /// the shooter was looking at. Hits are reported back to the shooter.
    fn confirm_shot(&mut self, shooter: ClientId) {
        let Some(character) = self.character_of(shooter) else {
            return;
        };
        let Some(&Transform { position, facing }) = self.cosmos.component::<Transform>(character)
        else {
            return;
        };

        let hit = self.lag_compensated_hitscan(
            shooter,
            position,
            facing,
            self.config.lag_compensation.confirm_range,
        );
        if let Some(hit) = hit {
            log::debug!(
                "client {shooter} hit {} at step {} ({:.1} away)",
                hit.target,
                hit.step,
                hit.distance
            );
            self.outbox.push((
                shooter,
                PacketType::HitConfirmed {
                    target: hit.target,
                    step: hit.step,
                },
            ));
        }
        self.confirmations.push(ShotConfirmation { shooter, hit });
    }

    /// Shots judged since the last call, in the order they were taken.
    pub fn drain_shot_confirmations(&mut self) -> Vec<ShotConfirmation> {
        std::mem::take(&mut self.confirmations)
    }

    /// Where `id` was at `step`, if still in history.
    pub fn rewind_position(&self, id: EntityId, step: u32) -> Option<Vec2> {
        self.history.position_at(id, step)
    }

    /// Step whose positions `client_id` was looking at.
    fn viewed_step(&self, client_id: ClientId) -> u32 {
        let now = self.cosmos.step();
        if !self.config.lag_compensation.enabled {
            return now;
        }
        let earliest = now.saturating_sub(self.config.lag_compensation.max_rewind_steps);
        self.acked_step(client_id)
            .unwrap_or(now)
            .clamp(earliest, now)
    }

    /// Instant ray test judged against what the shooter saw.
    pub fn lag_compensated_hitscan(
        &self,
        shooter: ClientId,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
    ) -> Option<HitscanHit> {
        let direction = direction.try_normalize()?;
        let step = self.viewed_step(shooter);
        let cosmos = self.history.get(step).unwrap_or(&self.cosmos);
        let own = self.character_of(shooter);

        cosmos
            .pool::<Character>()
            .ids()
            .filter(|&id| Some(id) != own)
            .filter_map(|id| {
                let character = cosmos.pool::<Character>().get(id.raw)?;
                if character.is_driving() {
                    return None;
                }
                let distance = ray_circle(
                    origin,
                    direction,
                    character.transform.position,
                    character.body.radius,
                )?;
                (distance <= max_distance).then_some(HitscanHit {
                    target: id,
                    point: origin + direction * distance,
                    distance,
                    step: cosmos.step(),
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Distance along a unit ray to the first point inside the circle.
fn ray_circle(origin: Vec2, direction: Vec2, center: Vec2, radius: f32) -> Option<f32> {
    let m = origin - center;
    let b = m.dot(direction);
    let c = m.length_squared() - radius * radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    Some((-b - discriminant.sqrt()).max(0.0))
}

impl Setup for ServerSetup {
    fn advance(&mut self, frame_delta: f32) -> u32 {
        self.timestep.accumulate(frame_delta);
        let mut steps = 0;
        while self.timestep.consume_tick() {
            self.tick();
            steps += 1;
        }
        steps
    }

    fn control(&mut self, entropy: PlayerEntropy) {
        self.host_input.merge(entropy);
    }

    fn viewed_cosmos(&self) -> &Cosmos {
        &self.cosmos
    }

    fn viewed_character(&self) -> Option<EntityId> {
        self.host
    }

    fn interpolation_ratio(&self) -> f32 {
        self.timestep.ratio()
    }

    fn take_new_state_sample(&mut self) -> bool {
        std::mem::take(&mut self.new_sample)
    }
}

/// A whole `FullState` when the encoded cosmos fits in `max_bytes`,
/// otherwise its encoding split into fragments. `encoded` caches the
/// encoding across the clients of one broadcast.
fn full_state_packets(
    cosmos: &Cosmos,
    encoded: &mut Option<Vec<u8>>,
    acked_sequence: u32,
    max_bytes: usize,
) -> Vec<PacketType> {
    if encoded.is_none() {
        match cosmos.to_bytes() {
            Ok(bytes) => *encoded = Some(bytes),
            Err(error) => {
                log::error!("cannot encode step {}: {error}", cosmos.step());
                return Vec::new();
            }
        }
    }
    let Some(bytes) = encoded.as_deref() else {
        return Vec::new();
    };

    if bytes.len() <= max_bytes {
        return vec![PacketType::FullState(Box::new(StatePayload {
            acked_sequence,
            cosmos: cosmos.clone(),
        }))];
    }

    let chunks = bytes.chunks(max_bytes.clamp(1, STATE_FRAGMENT_BYTES));
    if chunks.len() > usize::from(MAX_STATE_FRAGMENTS) {
        log::error!(
            "step {} encodes to {} bytes, more than {MAX_STATE_FRAGMENTS} fragments",
            cosmos.step(),
            bytes.len()
        );
        return Vec::new();
    }

    let count = chunks.len() as u16;
    log::debug!(
        "step {} encodes to {} bytes, sending {count} fragments",
        cosmos.step(),
        bytes.len()
    );
    chunks
        .enumerate()
        .map(|(index, chunk)| {
            PacketType::StateFragment(Box::new(StateFragment {
                step: cosmos.step(),
                acked_sequence,
                index: index as u16,
                count,
                bytes: chunk.to_vec(),
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::Transform;
    use crate::net::{InputBatch, InputEntry};
    use crate::step::GameIntent;

    fn server() -> ServerSetup {
        ServerSetup::new(ServerSetupConfig {
            populate_scene: false,
            ..Default::default()
        })
        .unwrap()
    }

    fn batch(from: u32, to: u32, intent: GameIntent) -> PacketType {
        let entries = (from..=to)
            .map(|sequence| {
                let mut entropy = PlayerEntropy::default();
                entropy.press(intent);
                InputEntry { sequence, entropy }
            })
            .collect();
        PacketType::Input(InputBatch { entries })
    }

    #[test]
    fn first_broadcast_is_full_then_deltas() {
        let mut server = server();
        server.add_player(1).unwrap();

        server.tick();
        let out = server.drain_outgoing();
        assert!(matches!(out[0], (1, PacketType::FullState(_))));

        server.handle_packet(1, PacketType::StateAck { step: 1 });
        server.tick();
        let out = server.drain_outgoing();
        let (_, PacketType::Delta(payload)) = &out[0] else {
            panic!("expected delta");
        };
        assert_eq!(payload.delta.base_step, 1);
    }

    fn server_with_state_limit(max_state_bytes: usize) -> ServerSetup {
        ServerSetup::new(ServerSetupConfig {
            populate_scene: false,
            max_state_bytes,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn oversized_states_go_out_in_fragments() {
        let mut whole = server();
        whole.add_player(1).unwrap();
        whole.tick();
        let encoded = whole.cosmos().to_bytes().unwrap();

        let mut split = server_with_state_limit(encoded.len() / 3 + 1);
        split.add_player(1).unwrap();
        split.tick();

        let fragments: Vec<_> = split
            .drain_outgoing()
            .into_iter()
            .map(|(client_id, packet)| {
                assert_eq!(client_id, 1);
                let PacketType::StateFragment(fragment) = packet else {
                    panic!("expected fragments, got {}", packet.name());
                };
                fragment
            })
            .collect();

        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.count == 3 && f.step == 1));
        let joined: Vec<u8> = fragments.iter().flat_map(|f| f.bytes.clone()).collect();
        assert_eq!(joined, encoded);
        assert_eq!(&Cosmos::from_bytes(&joined).unwrap(), split.cosmos());
    }

    #[test]
    fn states_past_the_fragment_limit_are_withheld() {
        let mut server = server_with_state_limit(1);
        server.add_player(1).unwrap();
        server.tick();
        assert!(server.drain_outgoing().is_empty());

        server.tick();
        assert!(server.drain_outgoing().is_empty());
    }

    #[test]
    fn resync_request_forces_full_state() {
        let mut server = server();
        server.add_player(1).unwrap();
        server.tick();
        server.handle_packet(1, PacketType::StateAck { step: 1 });
        server.handle_packet(1, PacketType::ResyncRequest);
        server.drain_outgoing();

        server.tick();
        assert!(matches!(
            server.drain_outgoing()[0],
            (1, PacketType::FullState(_))
        ));
    }

    #[test]
    fn acks_for_unknown_steps_are_ignored() {
        let mut server = server();
        server.add_player(1).unwrap();
        server.handle_packet(1, PacketType::StateAck { step: 500 });
        assert_eq!(server.acked_step(1), None);
    }

    #[test]
    fn redundant_inputs_apply_once() {
        let mut server = server();
        let character = server.add_player(1).unwrap();

        server.handle_packet(1, batch(1, 1, GameIntent::MoveRight));
        server.handle_packet(1, batch(1, 2, GameIntent::MoveRight));
        server.tick();
        server.tick();
        server.tick();

        assert_eq!(server.acked_sequence(1), Some(2));
        let body = server
            .cosmos()
            .component::<crate::cosmos::RigidBody>(character)
            .unwrap();
        assert!(body.velocity.x > 0.0);
    }

    #[test]
    fn hitscan_uses_the_step_the_shooter_saw() {
        let mut server = server();
        let _shooter = server.add_player(1).unwrap();
        let target = server.add_player(2).unwrap();

        server.tick();
        server.handle_packet(1, PacketType::StateAck { step: 1 });
        let seen = server.rewind_position(target, 1).unwrap();

        // The target has since moved well out of the line of fire.
        server.cosmos.component_mut::<Transform>(target).unwrap().position += Vec2::new(0.0, 500.0);
        server.tick();

        let origin = seen - Vec2::new(300.0, 0.0);
        let hit = server
            .lag_compensated_hitscan(1, origin, Vec2::X, 1000.0)
            .expect("hit at the rewound position");
        assert_eq!(hit.target, target);
        assert_eq!(hit.step, 1);
        assert!((hit.distance - (300.0 - 16.0)).abs() < 1e-3);

        server.config.lag_compensation.enabled = false;
        assert!(server.lag_compensated_hitscan(1, origin, Vec2::X, 1000.0).is_none());
    }

    #[test]
    fn trigger_pulls_are_confirmed_against_the_seen_step() {
        let mut server = server();
        let shooter = server.add_player(1).unwrap();
        let target = server.add_player(2).unwrap();
        *server.cosmos.component_mut::<Transform>(shooter).unwrap() = Transform {
            position: Vec2::new(-300.0, 0.0),
            facing: Vec2::X,
        };
        server.cosmos.component_mut::<Transform>(target).unwrap().position = Vec2::ZERO;

        server.tick();
        server.handle_packet(1, PacketType::StateAck { step: 1 });
        server.cosmos.component_mut::<Transform>(target).unwrap().position += Vec2::new(0.0, 500.0);
        server.tick();
        server.drain_outgoing();

        server.handle_packet(1, batch(1, 1, GameIntent::Shoot));
        server.tick();

        let confirmations = server.drain_shot_confirmations();
        assert_eq!(confirmations.len(), 1);
        let hit = confirmations[0].hit.expect("target stood in the line of fire at step 1");
        assert_eq!(confirmations[0].shooter, 1);
        assert_eq!(hit.target, target);
        assert_eq!(hit.step, 1);
        assert!(server.drain_outgoing().iter().any(|(client_id, payload)| {
            *client_id == 1
                && matches!(payload, PacketType::HitConfirmed { target: t, step: 1 } if *t == target)
        }));
        assert!(server.drain_shot_confirmations().is_empty());
    }

    #[test]
    fn leaving_removes_the_character() {
        let mut server = server();
        let character = server.add_player(7).unwrap();
        assert_eq!(server.remove_player(7), Some(character));
        assert!(!server.cosmos().alive(character));
        assert_eq!(server.client_count(), 0);
    }
}
