use crate::cosmos::{Crosshair, EntityMut, OrbitMode};
use crate::step::{GameIntent, IntentMessage, LogicStep, MotionMessage};

pub fn handle_crosshair_intents(step: &mut LogicStep<'_>) {
    let toggles: Vec<_> = step
        .messages
        .get::<IntentMessage>()
        .iter()
        .filter(|m| m.intent == GameIntent::SwitchLook && m.pressed)
        .map(|m| m.subject)
        .collect();

    for subject in toggles {
        if let Some(crosshair) = step.cosmos.component_mut::<Crosshair>(subject) {
            crosshair.orbit_mode = match crosshair.orbit_mode {
                OrbitMode::Look => OrbitMode::Angled,
                OrbitMode::Angled => OrbitMode::Look,
            };
        }
    }
}

/// Applies crosshair motion and turns characters in look mode toward it.
pub fn update_base_offsets(step: &mut LogicStep<'_>) {
    let motions: Vec<MotionMessage> = step.messages.get::<MotionMessage>().to_vec();

    for motion in motions {
        let Some(EntityMut::Character(character)) = step.cosmos.try_get_mut(motion.subject) else {
            continue;
        };
        let crosshair = &mut character.crosshair;

        crosshair.base_offset += motion.offset * crosshair.sensitivity;
        let distance = crosshair.base_offset.length();
        if distance > crosshair.max_distance {
            crosshair.base_offset *= crosshair.max_distance / distance;
        }

        if crosshair.orbit_mode == OrbitMode::Look {
            character.transform.facing = crosshair
                .base_offset
                .try_normalize()
                .unwrap_or(character.transform.facing);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::cosmos::Transform;
    use crate::step::{CosmicEntropy, PlayerEntropy};
    use crate::systems::testing::{arena, press};

    fn motion(subject: crate::cosmos::EntityId, dx: i16, dy: i16) -> CosmicEntropy {
        let mut entropy = PlayerEntropy::default();
        entropy.add_motion(dx, dy);
        CosmicEntropy::for_subject(subject, entropy)
    }

    #[test]
    fn motion_turns_character_in_look_mode() {
        let (mut cosmos, character) = arena();
        let start = cosmos.component::<Crosshair>(character).unwrap().base_offset;

        cosmos.advance(&motion(character, 100, -100));

        let crosshair = cosmos.component::<Crosshair>(character).unwrap();
        assert_eq!(crosshair.base_offset, start + Vec2::new(100.0, -100.0));
        let facing = cosmos.component::<Transform>(character).unwrap().facing;
        assert!((facing - Vec2::X).length() < 1e-6);
    }

    #[test]
    fn angled_mode_keeps_facing() {
        let (mut cosmos, character) = arena();
        cosmos.advance(&press(character, &[GameIntent::SwitchLook]));
        assert_eq!(
            cosmos.component::<Crosshair>(character).unwrap().orbit_mode,
            OrbitMode::Angled
        );

        let before = cosmos.component::<Transform>(character).unwrap().facing;
        cosmos.advance(&motion(character, 300, 0));
        assert_eq!(cosmos.component::<Transform>(character).unwrap().facing, before);
    }

    #[test]
    fn offset_is_clamped_to_range() {
        let (mut cosmos, character) = arena();
        cosmos.advance(&motion(character, i16::MAX, 0));
        let crosshair = cosmos.component::<Crosshair>(character).unwrap();
        assert!(crosshair.base_offset.length() <= crosshair.max_distance * 1.0001);
    }
}
