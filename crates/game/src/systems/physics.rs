//! Deterministic kinematic integration.
//!
//! Plain explicit Euler on f32 with damping and an arena box. Only basic
//! arithmetic and `sqrt` are used, which IEEE-754 rounds identically everywhere.

use glam::Vec2;

use crate::cosmos::{
    Character, Cosmos, Driver, EntityId, EntityMut, EntityType, Projectile, RigidBody, Transform,
};
use crate::step::{DamageMessage, LogicStep, QueueDestruction};

pub fn integrate(step: &mut LogicStep<'_>) {
    let delta = step.delta_secs();
    let bounds = step.cosmos.settings().arena_half_extent;

    for id in step.cosmos.ids_with::<RigidBody>() {
        let Some(entity) = step.cosmos.try_get_mut(id) else {
            continue;
        };
        let kind = entity.kind();
        let (transform, body) = match entity {
            EntityMut::Character(c) => (&mut c.transform, &mut c.body),
            EntityMut::Vehicle(v) => (&mut v.transform, &mut v.body),
            EntityMut::Projectile(p) => (&mut p.transform, &mut p.body),
        };

        let damping = (1.0 - body.linear_damping * delta).max(0.0);
        body.velocity *= damping;
        transform.position += body.velocity * delta;

        if kind == EntityType::Projectile {
            if outside(transform.position, bounds) {
                step.messages.post(QueueDestruction { subject: id });
            }
        } else {
            confine(transform, body, bounds);
        }
    }

    carry_drivers(step.cosmos);
    detect_hits(step);
}

fn outside(position: Vec2, bounds: Vec2) -> bool {
    position.x.abs() > bounds.x || position.y.abs() > bounds.y
}

fn confine(transform: &mut Transform, body: &mut RigidBody, bounds: Vec2) {
    let limit = (bounds - Vec2::splat(body.radius)).max(Vec2::ZERO);

    if transform.position.x.abs() > limit.x {
        transform.position.x = transform.position.x.clamp(-limit.x, limit.x);
        body.velocity.x = 0.0;
    }
    if transform.position.y.abs() > limit.y {
        transform.position.y = transform.position.y.clamp(-limit.y, limit.y);
        body.velocity.y = 0.0;
    }
}

/// Drivers ride along with their vehicle.
fn carry_drivers(cosmos: &mut Cosmos) {
    let drivers: Vec<(EntityId, EntityId)> = cosmos
        .pool::<Character>()
        .ids()
        .filter_map(|id| {
            let vehicle = cosmos.component::<Driver>(id)?.owned_vehicle?;
            Some((id, vehicle))
        })
        .collect();

    for (driver, vehicle) in drivers {
        let Some((position, velocity)) = cosmos.try_get(vehicle).and_then(|v| {
            Some((v.get::<Transform>()?.position, v.get::<RigidBody>()?.velocity))
        }) else {
            continue;
        };
        if let Some(EntityMut::Character(character)) = cosmos.try_get_mut(driver) {
            character.transform.position = position;
            character.body.velocity = velocity;
        }
    }
}

/// Projectile against character circle overlap. Each projectile hits at most
/// the first character in slot order and never its sender.
fn detect_hits(step: &mut LogicStep<'_>) {
    let targets: Vec<(EntityId, Vec2, f32)> = step
        .cosmos
        .pool::<Character>()
        .iter()
        .filter(|(_, c)| !c.is_driving())
        .map(|(raw, c)| {
            (
                EntityId::new(EntityType::Character, raw),
                c.transform.position,
                c.body.radius,
            )
        })
        .collect();

    let mut hits = Vec::new();
    for (raw, projectile) in step.cosmos.pool::<Projectile>().iter() {
        let id = EntityId::new(EntityType::Projectile, raw);
        let position = projectile.transform.position;

        let victim = targets.iter().find(|(target, center, radius)| {
            *target != projectile.missile.sender
                && position.distance_squared(*center)
                    <= (radius + projectile.body.radius) * (radius + projectile.body.radius)
        });

        if let Some(&(target, _, _)) = victim {
            hits.push((
                id,
                DamageMessage {
                    subject: target,
                    sender: projectile.missile.sender,
                    amount: projectile.missile.damage,
                    point: position,
                },
            ));
        }
    }

    for (projectile, damage) in hits {
        step.post(damage);
        step.post(QueueDestruction {
            subject: projectile,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::testing::idle;

    #[test]
    fn bodies_stay_inside_the_arena() {
        let mut cosmos = Cosmos::default();
        let mut character = Character::at(Vec2::new(1500.0, 0.0));
        character.body.velocity = Vec2::new(5000.0, 0.0);
        character.body.linear_damping = 0.0;
        let id = cosmos.spawn(character).unwrap().id();

        idle(&mut cosmos, 10);

        let bounds = cosmos.settings().arena_half_extent;
        let transform = cosmos.component::<Transform>(id).unwrap();
        let body = cosmos.component::<RigidBody>(id).unwrap();
        assert!(transform.position.x <= bounds.x - body.radius);
        assert_eq!(body.velocity.x, 0.0);
    }

    #[test]
    fn damping_slows_bodies_down() {
        let mut cosmos = Cosmos::default();
        let mut character = Character::at(Vec2::ZERO);
        character.body.velocity = Vec2::new(100.0, 0.0);
        let id = cosmos.spawn(character).unwrap().id();

        idle(&mut cosmos, 30);
        assert!(cosmos.component::<RigidBody>(id).unwrap().velocity.x < 100.0);
    }

    #[test]
    fn projectile_hits_first_character_in_path() {
        let mut cosmos = Cosmos::default();
        let shooter = cosmos.spawn(Character::at(Vec2::new(0.0, -400.0))).unwrap().id();
        let target = cosmos.spawn(Character::at(Vec2::new(0.0, 0.0))).unwrap().id();

        let projectile = Projectile::fired(shooter, Vec2::new(0.0, -25.0), Vec2::Y, 600.0, 25.0, 60);
        let projectile = cosmos.spawn(projectile).unwrap().id();

        let artifacts = cosmos.advance(&Default::default());

        assert_eq!(artifacts.damages.len(), 1);
        assert_eq!(artifacts.damages[0].subject, target);
        assert_eq!(artifacts.damages[0].sender, shooter);
        assert!(!cosmos.alive(projectile));
        assert!(artifacts.destroyed.contains(&projectile));
    }

    #[test]
    fn projectile_leaving_arena_is_destroyed() {
        let mut cosmos = Cosmos::default();
        let sender = EntityId::new(EntityType::Character, crate::cosmos::RawId::new(9, 1));
        let bounds = cosmos.settings().arena_half_extent;
        let projectile = Projectile::fired(sender, Vec2::new(bounds.x - 1.0, 0.0), Vec2::X, 600.0, 1.0, 60);
        let id = cosmos.spawn(projectile).unwrap().id();

        cosmos.advance(&Default::default());
        assert!(!cosmos.alive(id));
    }
}
