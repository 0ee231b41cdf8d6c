use std::collections::BTreeMap;

use glam::Vec2;
use rkyv::{Archive, Deserialize, Serialize};

use super::messages::{IntentMessage, MessageQueues, MotionMessage};
use crate::cosmos::EntityId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Serialize, Deserialize,
)]
#[rkyv(derive(Debug))]
pub enum GameIntent {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    Walk,
    Sprint,
    Shoot,
    SwitchLook,
    UseVehicle,
}

impl GameIntent {
    /// Intents a driver hands over to the vehicle it owns.
    pub fn is_movement(self) -> bool {
        matches!(
            self,
            GameIntent::MoveForward
                | GameIntent::MoveBackward
                | GameIntent::MoveLeft
                | GameIntent::MoveRight
                | GameIntent::Walk
                | GameIntent::Sprint
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct IntentChange {
    pub intent: GameIntent,
    pub pressed: bool,
}

/// Input of one player for one step: discrete press/release events in
/// submission order plus accumulated crosshair motion in whole pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerEntropy {
    pub intents: Vec<IntentChange>,
    pub motion: [i16; 2],
}

impl PlayerEntropy {
    pub fn press(&mut self, intent: GameIntent) {
        self.intents.push(IntentChange {
            intent,
            pressed: true,
        });
    }

    pub fn release(&mut self, intent: GameIntent) {
        self.intents.push(IntentChange {
            intent,
            pressed: false,
        });
    }

    pub fn add_motion(&mut self, dx: i16, dy: i16) {
        self.motion[0] = self.motion[0].saturating_add(dx);
        self.motion[1] = self.motion[1].saturating_add(dy);
    }

    pub fn motion(&self) -> Vec2 {
        Vec2::new(self.motion[0] as f32, self.motion[1] as f32)
    }

    /// Appends `later` after this entropy, as if both were submitted in one step.
    pub fn merge(&mut self, later: PlayerEntropy) {
        self.intents.extend(later.intents);
        self.add_motion(later.motion[0], later.motion[1]);
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty() && self.motion == [0, 0]
    }
}

/// Input for a whole step, keyed by the entity each player controls.
///
/// Ordered by subject id so every machine posts messages in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CosmicEntropy {
    players: BTreeMap<EntityId, PlayerEntropy>,
}

impl CosmicEntropy {
    pub fn for_subject(subject: EntityId, entropy: PlayerEntropy) -> Self {
        let mut cosmic = Self::default();
        cosmic.insert(subject, entropy);
        cosmic
    }

    pub fn insert(&mut self, subject: EntityId, entropy: PlayerEntropy) {
        self.players.entry(subject).or_default().merge(entropy);
    }

    pub fn get(&self, subject: EntityId) -> Option<&PlayerEntropy> {
        self.players.get(&subject)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &PlayerEntropy)> {
        self.players.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.players.values().all(PlayerEntropy::is_empty)
    }

    pub(crate) fn post_to(&self, queues: &mut MessageQueues) {
        for (&subject, entropy) in &self.players {
            for change in &entropy.intents {
                queues.post(IntentMessage {
                    subject,
                    intent: change.intent,
                    pressed: change.pressed,
                });
            }
            if entropy.motion != [0, 0] {
                queues.post(MotionMessage {
                    subject,
                    offset: entropy.motion(),
                });
            }
        }
    }
}
