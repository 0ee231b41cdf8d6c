use crate::cosmos::{Character, EntityId, Gun, Projectile, TypedId};
use crate::step::{GameIntent, IntentMessage, LogicStep, SpawnedMessage};

const MUZZLE_CLEARANCE: f32 = 2.0;

pub fn handle_trigger_intents(step: &mut LogicStep<'_>) {
    let triggers: Vec<(EntityId, bool)> = step
        .messages
        .get::<IntentMessage>()
        .iter()
        .filter(|m| m.intent == GameIntent::Shoot)
        .map(|m| (m.subject, m.pressed))
        .collect();

    for (subject, pressed) in triggers {
        if let Some(gun) = step.cosmos.component_mut::<Gun>(subject) {
            gun.trigger_pressed = pressed;
        }
    }
}

/// Cools guns down and fires the ones whose trigger is held.
///
/// Characters are visited in slot order and spread is drawn from the cosmos
/// generator, so spawned projectile ids and directions match on every machine.
pub fn fire_guns(step: &mut LogicStep<'_>) {
    let lifetime = step.cosmos.settings().projectile_lifetime_steps;
    let shooters: Vec<EntityId> = step.cosmos.pool::<Character>().ids().collect();

    for shooter in shooters {
        let Some(typed) = TypedId::<Character>::try_from_id(shooter) else {
            continue;
        };
        let Some(character) = step.cosmos.get_typed_mut(typed) else {
            continue;
        };

        if character.gun.remaining_cooldown > 0 {
            character.gun.remaining_cooldown -= 1;
            continue;
        }
        if !character.gun.trigger_pressed || character.is_driving() {
            continue;
        }
        character.gun.remaining_cooldown = character.gun.cooldown_steps;

        let gun = character.gun;
        let facing = character.transform.facing;
        let origin = character.transform.position;
        let clearance = character.body.radius + MUZZLE_CLEARANCE;
        let inherited = character.body.velocity;

        let deviation = step.cosmos.rng_mut().next_signed() * gun.spread;
        let direction = (facing + facing.perp() * deviation)
            .try_normalize()
            .unwrap_or(facing);

        let mut projectile = Projectile::fired(
            shooter,
            origin + direction * clearance,
            direction,
            gun.muzzle_speed,
            gun.damage,
            lifetime,
        );
        projectile.body.velocity += inherited;
        projectile.transform.position += direction * projectile.body.radius;

        match step.cosmos.spawn(projectile) {
            Ok(id) => {
                let id = id.id();
                step.artifacts.spawned.push(id);
                step.post(SpawnedMessage {
                    subject: id,
                    spawner: Some(shooter),
                });
            }
            Err(error) => log::warn!("{shooter} could not fire: {error}"),
        }
    }
}
