use glam::Vec2;

use super::GameIntent;
use crate::cosmos::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentMessage {
    pub subject: EntityId,
    pub intent: GameIntent,
    pub pressed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionMessage {
    pub subject: EntityId,
    pub offset: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageMessage {
    pub subject: EntityId,
    pub sender: EntityId,
    pub amount: f32,
    pub point: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDestruction {
    pub subject: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedMessage {
    pub subject: EntityId,
    pub spawner: Option<EntityId>,
}

/// One append-only queue per message kind. Cleared at the start of every
/// step, so a system only ever sees what earlier systems posted this step.
#[derive(Debug, Default)]
pub struct MessageQueues {
    intents: Vec<IntentMessage>,
    motions: Vec<MotionMessage>,
    damages: Vec<DamageMessage>,
    destructions: Vec<QueueDestruction>,
    spawns: Vec<SpawnedMessage>,
}

pub trait Message: Sized {
    fn queue(queues: &MessageQueues) -> &Vec<Self>;
    fn queue_mut(queues: &mut MessageQueues) -> &mut Vec<Self>;
}

impl MessageQueues {
    pub fn post<M: Message>(&mut self, message: M) {
        M::queue_mut(self).push(message);
    }

    pub fn get<M: Message>(&self) -> &[M] {
        M::queue(self)
    }

    pub fn take<M: Message>(&mut self) -> Vec<M> {
        std::mem::take(M::queue_mut(self))
    }

    pub fn clear(&mut self) {
        self.intents.clear();
        self.motions.clear();
        self.damages.clear();
        self.destructions.clear();
        self.spawns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
            && self.motions.is_empty()
            && self.damages.is_empty()
            && self.destructions.is_empty()
            && self.spawns.is_empty()
    }
}

impl Message for IntentMessage {
    fn queue(queues: &MessageQueues) -> &Vec<Self> {
        &queues.intents
    }

    fn queue_mut(queues: &mut MessageQueues) -> &mut Vec<Self> {
        &mut queues.intents
    }
}

impl Message for MotionMessage {
    fn queue(queues: &MessageQueues) -> &Vec<Self> {
        &queues.motions
    }

    fn queue_mut(queues: &mut MessageQueues) -> &mut Vec<Self> {
        &mut queues.motions
    }
}

impl Message for DamageMessage {
    fn queue(queues: &MessageQueues) -> &Vec<Self> {
        &queues.damages
    }

    fn queue_mut(queues: &mut MessageQueues) -> &mut Vec<Self> {
        &mut queues.damages
    }
}

impl Message for QueueDestruction {
    fn queue(queues: &MessageQueues) -> &Vec<Self> {
        &queues.destructions
    }

    fn queue_mut(queues: &mut MessageQueues) -> &mut Vec<Self> {
        &mut queues.destructions
    }
}

impl Message for SpawnedMessage {
    fn queue(queues: &MessageQueues) -> &Vec<Self> {
        &queues.spawns
    }

    fn queue_mut(queues: &mut MessageQueues) -> &mut Vec<Self> {
        &mut queues.spawns
    }
}
