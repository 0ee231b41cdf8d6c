mod entropy;
mod messages;

pub use entropy::{CosmicEntropy, GameIntent, IntentChange, PlayerEntropy};
pub use messages::{
    DamageMessage, IntentMessage, Message, MessageQueues, MotionMessage, QueueDestruction,
    SpawnedMessage,
};

use crate::cosmos::{Cosmos, DestructionObserver, EntityId};

/// Everything a system may touch while the cosmos advances one step.
pub struct LogicStep<'a> {
    pub cosmos: &'a mut Cosmos,
    pub messages: &'a mut MessageQueues,
    pub artifacts: &'a mut StepArtifacts,
}

impl LogicStep<'_> {
    pub fn post<M: Message>(&mut self, message: M) {
        self.messages.post(message);
    }

    pub fn delta_secs(&self) -> f32 {
        self.cosmos.fixed_delta_secs()
    }
}

/// What a step produced, for consumers outside the cosmos (effects, caches).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepArtifacts {
    /// Step the cosmos reached after this advance.
    pub step: u32,
    pub spawned: Vec<EntityId>,
    pub destroyed: Vec<EntityId>,
    pub damages: Vec<DamageMessage>,
}

impl StepArtifacts {
    pub fn notify(&self, observer: &mut impl DestructionObserver) {
        for &id in &self.destroyed {
            observer.on_destroy(id);
        }
    }
}
