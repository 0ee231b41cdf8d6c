//! Client-side prediction and reconciliation.
//!
//! The client keeps two cosmoi. REFERENTIAL is the last state the server
//! sent. PREDICTED is REFERENTIAL with every unacknowledged local input
//! replayed on top; that is what the player sees. Each server state replaces
//! REFERENTIAL, drops the inputs it covers, and rebuilds PREDICTED.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cosmos::{Cosmos, EntityId};
use crate::error::SyncError;
use crate::history::CosmosHistory;
use crate::net::{
    DeltaPayload, InputBatch, InputEntry, MAX_STATE_FRAGMENTS, PacketType, StateFragment,
    StatePayload,
};
use crate::simulation::FixedTimestep;
use crate::step::{CosmicEntropy, PlayerEntropy};

use super::Setup;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSetupConfig {
    /// Steps without any server state before the client calls itself desynced.
    pub desync_timeout_steps: u32,
    /// While desynced, a resync request goes out this often.
    pub resync_retry_steps: u32,
    /// Received states kept as delta baselines.
    pub history_capacity: usize,
    /// Unacknowledged inputs kept for replay; older ones are forgotten.
    pub max_pending_inputs: usize,
    /// Inputs carried per `Input` packet, oldest unacknowledged first.
    pub max_batch_inputs: usize,
}

impl Default for ClientSetupConfig {
    fn default() -> Self {
        Self {
            desync_timeout_steps: 180,
            resync_retry_steps: 30,
            history_capacity: 128,
            max_pending_inputs: 256,
            max_batch_inputs: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    AwaitingFirstState,
    Predicting,
    Reconciling,
    Desynced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationStats {
    pub reconciliations: u64,
    pub mispredictions: u64,
    pub resyncs: u64,
    pub dropped_packets: u64,
    /// Own shots the server judged as hits.
    pub confirmed_hits: u64,
}

#[derive(Debug, Clone)]
struct PendingInput {
    sequence: u32,
    entropy: PlayerEntropy,
    /// PREDICTED's hash right after this input was applied.
    predicted_hash: u64,
}

/// Fragments of one oversized full state, gathered until all have arrived.
#[derive(Debug)]
struct StateAssembly {
    step: u32,
    acked_sequence: u32,
    parts: Vec<Option<Vec<u8>>>,
}

impl StateAssembly {
    fn new(step: u32, acked_sequence: u32, count: u16) -> Self {
        Self {
            step,
            acked_sequence,
            parts: vec![None; usize::from(count)],
        }
    }

    fn is_complete(&self) -> bool {
        self.parts.iter().all(Option::is_some)
    }

    fn into_bytes(self) -> Vec<u8> {
        self.parts.into_iter().flatten().flatten().collect()
    }
}

pub struct ClientSetup {
    config: ClientSetupConfig,
    state: ClientState,
    controlled: Option<EntityId>,
    referential: Cosmos,
    predicted: Cosmos,
    received: CosmosHistory,
    pending: VecDeque<PendingInput>,
    next_sequence: u32,
    last_server_step: Option<u32>,
    accumulated: PlayerEntropy,
    timestep: FixedTimestep,
    outbox: Vec<PacketType>,
    stats: ReconciliationStats,
    steps_since_state: u32,
    assembly: Option<StateAssembly>,
    new_sample: bool,
}

impl ClientSetup {
    pub fn new(config: ClientSetupConfig, steps_per_second: u32) -> Self {
        Self {
            received: CosmosHistory::new(config.history_capacity),
            config,
            state: ClientState::AwaitingFirstState,
            controlled: None,
            referential: Cosmos::default(),
            predicted: Cosmos::default(),
            pending: VecDeque::new(),
            next_sequence: 1,
            last_server_step: None,
            accumulated: PlayerEntropy::default(),
            timestep: FixedTimestep::new(steps_per_second),
            outbox: Vec::new(),
            stats: ReconciliationStats::default(),
            steps_since_state: 0,
            assembly: None,
            new_sample: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn stats(&self) -> ReconciliationStats {
        self.stats
    }

    pub fn set_controlled(&mut self, character: EntityId) {
        self.controlled = Some(character);
    }

    pub fn referential(&self) -> &Cosmos {
        &self.referential
    }

    pub fn predicted(&self) -> &Cosmos {
        &self.predicted
    }

    pub fn pending_inputs(&self) -> usize {
        self.pending.len()
    }

    /// Packets for the server, in send order.
    pub fn drain_outgoing(&mut self) -> Vec<PacketType> {
        std::mem::take(&mut self.outbox)
    }

    fn entropy_for(&self, entropy: PlayerEntropy) -> CosmicEntropy {
        match self.controlled {
            Some(subject) => CosmicEntropy::for_subject(subject, entropy),
            None => CosmicEntropy::default(),
        }
    }

    /// One local step: predict with the queued input and send it.
    pub fn tick(&mut self) {
        if self.state == ClientState::AwaitingFirstState {
            self.accumulated = PlayerEntropy::default();
            return;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let entropy = std::mem::take(&mut self.accumulated);

        self.predicted.advance(&self.entropy_for(entropy.clone()));
        self.new_sample = true;
        self.pending.push_back(PendingInput {
            sequence,
            entropy,
            predicted_hash: self.predicted.structural_hash(),
        });
        while self.pending.len() > self.config.max_pending_inputs {
            self.pending.pop_front();
        }

        let entries = self
            .pending
            .iter()
            .take(self.config.max_batch_inputs)
            .map(|p| InputEntry {
                sequence: p.sequence,
                entropy: p.entropy.clone(),
            })
            .collect();
        self.outbox.push(PacketType::Input(InputBatch { entries }));

        self.steps_since_state += 1;
        self.watch_for_desync();
    }

    fn watch_for_desync(&mut self) {
        if self.steps_since_state < self.config.desync_timeout_steps {
            return;
        }
        if self.state != ClientState::Desynced {
            log::warn!(
                "no server state for {} steps, requesting resync",
                self.steps_since_state
            );
            self.state = ClientState::Desynced;
        }
        let overdue = self.steps_since_state - self.config.desync_timeout_steps;
        if overdue % self.config.resync_retry_steps.max(1) == 0 {
            self.request_resync();
        }
    }

    fn request_resync(&mut self) {
        self.stats.resyncs += 1;
        self.outbox.push(PacketType::ResyncRequest);
    }

    /// Feeds one server packet in. Errors are recoverable; the client has
    /// already asked for a resync when it returns one.
    pub fn handle_packet(&mut self, packet: PacketType) -> Result<(), SyncError> {
        match packet {
            PacketType::ConnectionAccepted { character, .. } => {
                self.set_controlled(character);
                Ok(())
            }
            PacketType::FullState(payload) => {
                let StatePayload {
                    acked_sequence,
                    cosmos,
                } = *payload;
                if self.is_stale(cosmos.step()) {
                    return Ok(());
                }
                cosmos.verify_integrity()?;
                self.adopt(cosmos, acked_sequence);
                Ok(())
            }
            PacketType::StateFragment(fragment) => self.gather_fragment(*fragment),
            PacketType::Delta(payload) => {
                let DeltaPayload {
                    acked_sequence,
                    delta,
                } = *payload;
                if self.is_stale(delta.target_step()) {
                    return Ok(());
                }
                let Some(baseline) = self.received.get(delta.base_step) else {
                    self.request_resync();
                    return Err(SyncError::BaselineMissing {
                        base_step: delta.base_step,
                    });
                };
                match delta.apply(baseline) {
                    Ok(cosmos) => {
                        self.adopt(cosmos, acked_sequence);
                        Ok(())
                    }
                    Err(error) => {
                        log::warn!("{error}");
                        self.request_resync();
                        Err(error)
                    }
                }
            }
            PacketType::HitConfirmed { target, step } => {
                log::debug!("hit on {target} confirmed at step {step}");
                self.stats.confirmed_hits += 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn gather_fragment(&mut self, fragment: StateFragment) -> Result<(), SyncError> {
        let StateFragment {
            step,
            acked_sequence,
            index,
            count,
            bytes,
        } = fragment;
        if self.is_stale(step) {
            return Ok(());
        }
        if count == 0 || count > MAX_STATE_FRAGMENTS || index >= count {
            return Err(SyncError::FragmentOutOfRange { index, count });
        }
        if self.assembly.as_ref().is_some_and(|a| a.step > step) {
            self.stats.dropped_packets += 1;
            return Ok(());
        }
        if self
            .assembly
            .as_ref()
            .is_none_or(|a| a.step != step || a.parts.len() != usize::from(count))
        {
            self.assembly = Some(StateAssembly::new(step, acked_sequence, count));
        }

        let Some(assembly) = &mut self.assembly else {
            return Ok(());
        };
        assembly.parts[usize::from(index)] = Some(bytes);
        if !assembly.is_complete() {
            return Ok(());
        }
        let Some(assembly) = self.assembly.take() else {
            return Ok(());
        };

        let acked_sequence = assembly.acked_sequence;
        match Cosmos::from_bytes(&assembly.into_bytes()) {
            Ok(cosmos) if cosmos.step() == step => {
                self.adopt(cosmos, acked_sequence);
                Ok(())
            }
            Ok(cosmos) => {
                self.request_resync();
                Err(SyncError::BaselineMismatch {
                    expected: step,
                    actual: cosmos.step(),
                })
            }
            Err(error) => {
                log::warn!("reassembled state for step {step} is unusable: {error}");
                self.request_resync();
                Err(error.into())
            }
        }
    }

    fn is_stale(&mut self, step: u32) -> bool {
        let stale = self.last_server_step.is_some_and(|last| step <= last);
        if stale {
            log::debug!("dropping out-of-order state for step {step}");
            self.stats.dropped_packets += 1;
        }
        stale
    }

    fn adopt(&mut self, cosmos: Cosmos, acked_sequence: u32) {
        let step = cosmos.step();
        self.received.push(&cosmos);
        self.referential = cosmos;
        self.last_server_step = Some(step);
        self.steps_since_state = 0;

        self.reconcile(acked_sequence);

        self.outbox.push(PacketType::StateAck { step });
    }

    fn reconcile(&mut self, acked_sequence: u32) {
        self.state = ClientState::Reconciling;

        let expected = self.referential.structural_hash();
        if let Some(acked) = self.pending.iter().find(|p| p.sequence == acked_sequence) {
            if acked.predicted_hash != expected {
                self.stats.mispredictions += 1;
                log::debug!(
                    "misprediction at input {acked_sequence}: predicted {:#018x}, server {:#018x}",
                    acked.predicted_hash,
                    expected
                );
            }
        }
        while self
            .pending
            .front()
            .is_some_and(|p| p.sequence <= acked_sequence)
        {
            self.pending.pop_front();
        }

        let mut predicted = self.referential.clone();
        for index in 0..self.pending.len() {
            let entropy = self.entropy_for(self.pending[index].entropy.clone());
            predicted.advance(&entropy);
            self.pending[index].predicted_hash = predicted.structural_hash();
        }
        self.predicted = predicted;

        self.stats.reconciliations += 1;
        self.state = ClientState::Predicting;
        self.new_sample = true;
    }
}

impl Setup for ClientSetup {
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
        self.accumulated.merge(entropy);
    }

    fn viewed_cosmos(&self) -> &Cosmos {
        &self.predicted
    }

    fn viewed_character(&self) -> Option<EntityId> {
        self.controlled
    }

    fn interpolation_ratio(&self) -> f32 {
        self.timestep.ratio()
    }

    fn take_new_state_sample(&mut self) -> bool {
        std::mem::take(&mut self.new_sample)
    }
}
