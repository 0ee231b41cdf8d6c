//! Entering, leaving and steering vehicles.

use crate::cosmos::{Cosmos, Driver, EntityId, Movement, RigidBody, Seat, Transform, Vehicle};
use crate::step::{GameIntent, IntentMessage, LogicStep};

pub fn assign_drivers_from_intents(step: &mut LogicStep<'_>) {
    let requests: Vec<EntityId> = step
        .messages
        .get::<IntentMessage>()
        .iter()
        .filter(|m| m.intent == GameIntent::UseVehicle && m.pressed)
        .map(|m| m.subject)
        .collect();

    for subject in requests {
        let Some(driver) = step.cosmos.component::<Driver>(subject).copied() else {
            continue;
        };

        match driver.owned_vehicle {
            Some(vehicle) => release_driver(step.cosmos, subject, vehicle),
            None => {
                if let Some(vehicle) = nearest_free_vehicle(step.cosmos, subject) {
                    assign_driver(step.cosmos, subject, vehicle);
                }
            }
        }
    }
}

/// Re-posts the movement intents of every driver to the vehicle it owns.
pub fn delegate_movement_intents(step: &mut LogicStep<'_>) {
    let delegated: Vec<IntentMessage> = step
        .messages
        .get::<IntentMessage>()
        .iter()
        .filter(|m| m.intent.is_movement())
        .filter_map(|m| {
            let vehicle = step.cosmos.component::<Driver>(m.subject)?.owned_vehicle?;
            Some(IntentMessage {
                subject: vehicle,
                ..*m
            })
        })
        .collect();

    for message in delegated {
        step.post(message);
    }
}

fn nearest_free_vehicle(cosmos: &Cosmos, subject: EntityId) -> Option<EntityId> {
    let origin = cosmos.component::<Transform>(subject)?.position;
    let reach = cosmos.settings().interaction_radius;

    let mut best: Option<(EntityId, f32)> = None;
    for id in cosmos.pool::<Vehicle>().ids() {
        let Some(vehicle) = cosmos.try_get(id) else {
            continue;
        };
        if vehicle.get::<Seat>().is_some_and(|seat| seat.occupant.is_some()) {
            continue;
        }
        let Some(transform) = vehicle.get::<Transform>() else {
            continue;
        };
        let Some(body_radius) = vehicle.get::<RigidBody>().map(|b| b.radius) else {
            continue;
        };

        let distance = transform.position.distance(origin) - body_radius;
        if distance > reach {
            continue;
        }
        // Strict comparison keeps the lowest slot on ties.
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((id, distance));
        }
    }
    best.map(|(id, _)| id)
}

fn assign_driver(cosmos: &mut Cosmos, driver: EntityId, vehicle: EntityId) {
    if let Some(seat) = cosmos.component_mut::<Seat>(vehicle) {
        seat.occupant = Some(driver);
    }
    if let Some(owner) = cosmos.component_mut::<Driver>(driver) {
        owner.owned_vehicle = Some(vehicle);
    }
    if let Some(movement) = cosmos.component_mut::<Movement>(driver) {
        let (acceleration, max_speed) = (movement.acceleration, movement.max_speed);
        *movement = Movement::with_limits(acceleration, max_speed);
    }
    log::debug!("{driver} took the wheel of {vehicle}");
}

fn release_driver(cosmos: &mut Cosmos, driver: EntityId, vehicle: EntityId) {
    if let Some(seat) = cosmos.component_mut::<Seat>(vehicle) {
        if seat.occupant == Some(driver) {
            seat.occupant = None;
        }
    }
    if let Some(movement) = cosmos.component_mut::<Movement>(vehicle) {
        let (acceleration, max_speed) = (movement.acceleration, movement.max_speed);
        *movement = Movement::with_limits(acceleration, max_speed);
    }
    if let Some(owner) = cosmos.component_mut::<Driver>(driver) {
        owner.owned_vehicle = None;
    }
    log::debug!("{driver} left {vehicle}");
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::systems::testing::{press, with_vehicle};

    #[test]
    fn use_vehicle_enters_and_leaves() {
        let (mut cosmos, character, vehicle) = with_vehicle(Vec2::new(60.0, 0.0));

        cosmos.advance(&press(character, &[GameIntent::UseVehicle]));
        assert_eq!(
            cosmos.component::<Driver>(character).unwrap().owned_vehicle,
            Some(vehicle)
        );
        assert_eq!(
            cosmos.component::<Seat>(vehicle).unwrap().occupant,
            Some(character)
        );

        cosmos.advance(&press(character, &[GameIntent::UseVehicle]));
        assert_eq!(cosmos.component::<Driver>(character).unwrap().owned_vehicle, None);
        assert_eq!(cosmos.component::<Seat>(vehicle).unwrap().occupant, None);
    }

    #[test]
    fn out_of_reach_vehicle_is_ignored() {
        let (mut cosmos, character, _) = with_vehicle(Vec2::new(900.0, 0.0));
        cosmos.advance(&press(character, &[GameIntent::UseVehicle]));
        assert_eq!(cosmos.component::<Driver>(character).unwrap().owned_vehicle, None);
    }

    #[test]
    fn driver_movement_steers_vehicle() {
        let (mut cosmos, character, vehicle) = with_vehicle(Vec2::new(60.0, 0.0));
        cosmos.advance(&press(character, &[GameIntent::UseVehicle]));
        cosmos.advance(&press(character, &[GameIntent::MoveForward]));

        assert!(cosmos.component::<Movement>(vehicle).unwrap().moving_forward);
        assert!(cosmos.component::<RigidBody>(vehicle).unwrap().velocity.y > 0.0);
    }
}
