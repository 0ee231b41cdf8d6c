use crate::cosmos::{Cosmos, EntityId, SimulationConfig};
use crate::error::CosmosError;
use crate::scene::{populate_test_scene, spawn_player};
use crate::simulation::FixedTimestep;
use crate::step::{CosmicEntropy, PlayerEntropy, StepArtifacts};

use super::Setup;

/// Single player, no network: the local cosmos is authoritative.
pub struct LocalSetup {
    cosmos: Cosmos,
    player: EntityId,
    timestep: FixedTimestep,
    pending: PlayerEntropy,
    last_artifacts: StepArtifacts,
    new_sample: bool,
}

impl LocalSetup {
    pub fn new(config: &SimulationConfig) -> Result<Self, CosmosError> {
        let mut cosmos = Cosmos::new(config);
        populate_test_scene(&mut cosmos)?;
        let player = spawn_player(&mut cosmos)?;

        Ok(Self {
            timestep: FixedTimestep::new(config.steps_per_second),
            cosmos,
            player,
            pending: PlayerEntropy::default(),
            last_artifacts: StepArtifacts::default(),
            new_sample: true,
        })
    }

    pub fn player(&self) -> EntityId {
        self.player
    }

    pub fn last_artifacts(&self) -> &StepArtifacts {
        &self.last_artifacts
    }

    /// One fixed step with whatever input is queued.
    pub fn tick(&mut self) -> &StepArtifacts {
        let entropy = std::mem::take(&mut self.pending);
        self.last_artifacts = self
            .cosmos
            .advance(&CosmicEntropy::for_subject(self.player, entropy));
        self.new_sample = true;
        &self.last_artifacts
    }
}

impl Setup for LocalSetup {
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
        self.pending.merge(entropy);
    }

    fn viewed_cosmos(&self) -> &Cosmos {
        &self.cosmos
    }

    fn viewed_character(&self) -> Option<EntityId> {
        Some(self.player)
    }

    fn interpolation_ratio(&self) -> f32 {
        self.timestep.ratio()
    }

    fn take_new_state_sample(&mut self) -> bool {
        std::mem::take(&mut self.new_sample)
    }
}
