use crate::cosmos::{EntityId, EntityType, Projectile};
use crate::step::{LogicStep, QueueDestruction};

/// Counts projectile lifetimes down and expires the ones that ran out.
pub fn expire(step: &mut LogicStep<'_>) {
    let mut expired = Vec::new();

    for (raw, projectile) in step.cosmos.pool_mut::<Projectile>().iter_mut() {
        let missile = &mut projectile.missile;
        missile.remaining_steps = missile.remaining_steps.saturating_sub(1);
        if missile.remaining_steps == 0 {
            expired.push(EntityId::new(EntityType::Projectile, raw));
        }
    }

    for subject in expired {
        step.post(QueueDestruction { subject });
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use crate::cosmos::{Cosmos, EntityId, EntityType, Projectile, RawId};
    use crate::systems::testing::idle;

    #[test]
    fn projectile_expires_after_its_lifetime() {
        let mut cosmos = Cosmos::default();
        let sender = EntityId::new(EntityType::Character, RawId::new(0, 1));
        let id = cosmos
            .spawn(Projectile::fired(sender, Vec2::ZERO, Vec2::X, 10.0, 1.0, 5))
            .unwrap()
            .id();

        idle(&mut cosmos, 4);
        assert!(cosmos.alive(id));
        idle(&mut cosmos, 1);
        assert!(!cosmos.alive(id));
    }
}
