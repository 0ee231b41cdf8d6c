//! Two-phase movement: intents set flags, then flags turn into velocity.
//!
//! `apply_movement_forces` runs after `set_movement_flags_from_input` in the
//! same step, so a key pressed this step already moves the body this step.

use crate::cosmos::{CosmosSettings, EntityMut, Movement, RigidBody, Sentience};
use crate::step::{GameIntent, IntentMessage, LogicStep};

pub fn set_movement_flags_from_input(step: &mut LogicStep<'_>) {
    let intents: Vec<IntentMessage> = step.messages.get::<IntentMessage>().to_vec();

    for message in intents {
        let Some(movement) = step.cosmos.component_mut::<Movement>(message.subject) else {
            continue;
        };
        let flag = match message.intent {
            GameIntent::MoveForward => &mut movement.moving_forward,
            GameIntent::MoveBackward => &mut movement.moving_backward,
            GameIntent::MoveLeft => &mut movement.moving_left,
            GameIntent::MoveRight => &mut movement.moving_right,
            GameIntent::Walk => &mut movement.walking_enabled,
            GameIntent::Sprint => &mut movement.sprint_enabled,
            _ => continue,
        };
        *flag = message.pressed;
    }
}

pub fn apply_movement_forces(step: &mut LogicStep<'_>) {
    let delta = step.delta_secs();
    let settings = step.cosmos.settings().clone();

    for id in step.cosmos.ids_with::<Movement>() {
        match step.cosmos.try_get_mut(id) {
            Some(EntityMut::Character(character)) => {
                if character.is_driving() {
                    continue;
                }
                accelerate(
                    &character.movement,
                    &mut character.body,
                    Some(&mut character.sentience),
                    &settings,
                    delta,
                );
            }
            Some(EntityMut::Vehicle(vehicle)) => {
                accelerate(&vehicle.movement, &mut vehicle.body, None, &settings, delta);
            }
            _ => {}
        }
    }
}

fn accelerate(
    movement: &Movement,
    body: &mut RigidBody,
    stamina: Option<&mut Sentience>,
    settings: &CosmosSettings,
    delta: f32,
) {
    let direction = movement.input_direction();
    if direction == glam::Vec2::ZERO {
        return;
    }

    let mut acceleration = movement.acceleration;
    let mut max_speed = movement.max_speed;

    if movement.walking_enabled {
        acceleration *= settings.walk_multiplier;
        max_speed *= settings.walk_multiplier;
    } else if movement.sprint_enabled {
        let can_sprint = match stamina {
            Some(sentience) if sentience.consciousness > 0.0 => {
                let drain = settings.sprint_drain_per_second * delta;
                sentience.consciousness = (sentience.consciousness - drain).max(0.0);
                true
            }
            Some(_) => false,
            None => true,
        };
        if can_sprint {
            max_speed *= settings.sprint_multiplier;
        }
    }

    body.velocity += direction.normalize() * acceleration * delta;

    let speed = body.velocity.length();
    if speed > max_speed {
        body.velocity *= max_speed / speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::Character;
    use crate::systems::testing::{arena, idle, press, release};

    #[test]
    fn flags_follow_press_and_release() {
        let (mut cosmos, character) = arena();

        cosmos.advance(&press(character, &[GameIntent::MoveLeft, GameIntent::Walk]));
        let movement = cosmos.component::<Movement>(character).unwrap();
        assert!(movement.moving_left);
        assert!(movement.walking_enabled);

        cosmos.advance(&release(character, &[GameIntent::MoveLeft]));
        let movement = cosmos.component::<Movement>(character).unwrap();
        assert!(!movement.moving_left);
        assert!(movement.walking_enabled);
    }

    #[test]
    fn flags_take_effect_in_the_same_step() {
        let (mut cosmos, character) = arena();
        cosmos.advance(&press(character, &[GameIntent::MoveForward]));
        let body = cosmos.component::<RigidBody>(character).unwrap();
        assert!(body.velocity.y > 0.0);
    }

    #[test]
    fn speed_is_capped() {
        let (mut cosmos, character) = arena();
        cosmos.advance(&press(character, &[GameIntent::MoveRight]));
        idle(&mut cosmos, 120);

        let max_speed = cosmos.component::<Movement>(character).unwrap().max_speed;
        let speed = cosmos.component::<RigidBody>(character).unwrap().velocity.length();
        assert!(speed <= max_speed * 1.0001);
    }

    #[test]
    fn sprint_drains_consciousness_and_stops_when_empty() {
        let (mut cosmos, character) = arena();
        cosmos
            .get_typed_mut(crate::cosmos::TypedId::<Character>::try_from_id(character).unwrap())
            .unwrap()
            .sentience
            .consciousness = 0.5;

        cosmos.advance(&press(character, &[GameIntent::MoveForward, GameIntent::Sprint]));
        idle(&mut cosmos, 240);

        let character_state = cosmos.component::<Sentience>(character).unwrap();
        assert!(character_state.consciousness < character_state.max_consciousness);
        let max_speed = cosmos.component::<Movement>(character).unwrap().max_speed;
        let speed = cosmos.component::<RigidBody>(character).unwrap().velocity.length();
        assert!(speed <= max_speed * 1.0001);
    }
}
