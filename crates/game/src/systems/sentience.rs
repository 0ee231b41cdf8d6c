use glam::Vec2;

use crate::cosmos::{Character, EntityId, Movement, Sentience, TypedId};
use crate::step::{DamageMessage, LogicStep, QueueDestruction};

/// Applies this step's damage in posting order. A character whose health
/// crosses zero is queued for destruction exactly once.
pub fn apply_damage(step: &mut LogicStep<'_>) {
    let damages = step.messages.take::<DamageMessage>();

    for damage in damages {
        let Some(sentience) = step.cosmos.component_mut::<Sentience>(damage.subject) else {
            continue;
        };
        let was_alive = sentience.is_alive();
        sentience.health -= damage.amount;

        if was_alive && !sentience.is_alive() {
            log::debug!("{} killed by {}", damage.subject, damage.sender);
            step.post(QueueDestruction {
                subject: damage.subject,
            });
        }
        step.artifacts.damages.push(damage);
    }
}

pub fn regenerate_consciousness(step: &mut LogicStep<'_>) {
    let delta = step.delta_secs();
    let regen = step.cosmos.settings().consciousness_regen_per_second * delta;
    let ids: Vec<EntityId> = step.cosmos.pool::<Character>().ids().collect();

    for id in ids {
        let Some(typed) = TypedId::<Character>::try_from_id(id) else {
            continue;
        };
        let Some(character) = step.cosmos.get_typed_mut(typed) else {
            continue;
        };
        if is_sprinting(&character.movement) {
            continue;
        }
        let sentience = &mut character.sentience;
        sentience.consciousness = (sentience.consciousness + regen).min(sentience.max_consciousness);
    }
}

fn is_sprinting(movement: &Movement) -> bool {
    movement.sprint_enabled && movement.input_direction() != Vec2::ZERO
}
