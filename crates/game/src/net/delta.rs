//! Slot-by-slot cosmos deltas.
//!
//! A delta reproduces the target exactly: pool shapes and slot versions
//! included, so ids minted afterwards agree on both ends. The receiver checks
//! the result against the sender's structural hash.

use rkyv::{Archive, Deserialize, Serialize};

use crate::cosmos::{
    Character, Cosmos, CosmosClock, CosmosSettings, Crosshair, Driver, EntityKind, Gun, Missile,
    Movement, Pool, Projectile, RawId, RigidBody, Seat, SeededRandom, Sentience, Slot,
    StructuralHash, Transform, Vehicle,
};
use crate::error::SyncError;

/// Ceiling for pools created without a capacity limit.
const MAX_UNBOUNDED_SLOTS: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub enum ComponentChange {
    Transform(Transform),
    RigidBody(RigidBody),
    Movement(Movement),
    Crosshair(Crosshair),
    Sentience(Sentience),
    Driver(Driver),
    Seat(Seat),
    Gun(Gun),
    Missile(Missile),
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum SlotChange<T> {
    Vacant,
    Spawned(T),
    Changed(Vec<ComponentChange>),
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SlotDelta<T> {
    pub index: u32,
    pub version: u32,
    pub change: SlotChange<T>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PoolDelta<T> {
    pub slot_count: u32,
    pub slots: Vec<SlotDelta<T>>,
}

impl<T: Aggregate> PoolDelta<T> {
    fn compute(reference: &Pool<T>, target: &Pool<T>) -> Self {
        let before = reference.slots();
        let mut slots = Vec::new();

        for (index, after) in target.slots().iter().enumerate() {
            let index = index as u32;
            let full = |after: &Slot<T>| SlotDelta {
                index,
                version: after.version(),
                change: match after.value() {
                    Some(entity) => SlotChange::Spawned(entity.clone()),
                    None => SlotChange::Vacant,
                },
            };

            let Some(before) = before.get(index as usize) else {
                slots.push(full(after));
                continue;
            };

            match (before.value(), after.value()) {
                _ if before.version() != after.version() => slots.push(full(after)),
                (Some(old), Some(new)) => {
                    let mut changes = Vec::new();
                    old.diff(new, &mut changes);
                    if !changes.is_empty() {
                        slots.push(SlotDelta {
                            index,
                            version: after.version(),
                            change: SlotChange::Changed(changes),
                        });
                    }
                }
                (None, None) => {}
                _ => slots.push(full(after)),
            }
        }

        Self {
            slot_count: target.slot_count() as u32,
            slots,
        }
    }

    /// Bounds checks on wire-supplied sizes, run before anything is
    /// allocated.
    fn validate(&self, pool: &Pool<T>) -> Result<(), SyncError> {
        let limit = pool.capacity_limit().unwrap_or(MAX_UNBOUNDED_SLOTS);
        if self.slot_count > limit {
            return Err(SyncError::PoolTooLarge {
                kind: T::KIND,
                slot_count: self.slot_count,
                limit,
            });
        }
        match self.slots.iter().find(|slot| slot.index >= self.slot_count) {
            Some(slot) => Err(SyncError::SlotMismatch {
                kind: T::KIND,
                index: slot.index,
            }),
            None => Ok(()),
        }
    }

    fn apply(&self, pool: &mut Pool<T>) -> Result<(), SyncError> {
        pool.resize_slots(self.slot_count as usize);

        for slot in &self.slots {
            match &slot.change {
                SlotChange::Vacant => pool.restore_slot(slot.index, slot.version, None),
                SlotChange::Spawned(entity) => {
                    pool.restore_slot(slot.index, slot.version, Some(entity.clone()))
                }
                SlotChange::Changed(changes) => {
                    let mismatch = || SyncError::SlotMismatch {
                        kind: T::KIND,
                        index: slot.index,
                    };
                    let entity = pool
                        .get_mut(RawId::new(slot.index, slot.version))
                        .ok_or_else(mismatch)?;
                    for &change in changes {
                        if !entity.apply_change(change) {
                            return Err(mismatch());
                        }
                    }
                }
            }
        }

        pool.rebuild_free_list();
        Ok(())
    }
}

/// Difference between two states of the same cosmos.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CosmosDelta {
    /// Step of the state this delta must be applied to.
    pub base_step: u32,
    pub clock: CosmosClock,
    pub rng: SeededRandom,
    pub settings: Option<CosmosSettings>,
    pub characters: PoolDelta<Character>,
    pub vehicles: PoolDelta<Vehicle>,
    pub projectiles: PoolDelta<Projectile>,
    pub target_hash: u64,
}

impl CosmosDelta {
    pub fn compute(reference: &Cosmos, target: &Cosmos) -> Self {
        Self {
            base_step: reference.step(),
            clock: target.clock(),
            rng: target.rng().clone(),
            settings: (reference.settings() != target.settings())
                .then(|| target.settings().clone()),
            characters: PoolDelta::compute(reference.pool(), target.pool()),
            vehicles: PoolDelta::compute(reference.pool(), target.pool()),
            projectiles: PoolDelta::compute(reference.pool(), target.pool()),
            target_hash: target.structural_hash(),
        }
    }

    pub fn target_step(&self) -> u32 {
        self.clock.step
    }

    /// Number of slots this delta rewrites.
    pub fn touched_slots(&self) -> usize {
        self.characters.slots.len() + self.vehicles.slots.len() + self.projectiles.slots.len()
    }

    /// Rebuilds the target from `reference`, which must be the state at
    /// `base_step`.
    pub fn apply(&self, reference: &Cosmos) -> Result<Cosmos, SyncError> {
        if reference.step() != self.base_step {
            return Err(SyncError::BaselineMismatch {
                expected: self.base_step,
                actual: reference.step(),
            });
        }

        self.characters.validate(reference.pool())?;
        self.vehicles.validate(reference.pool())?;
        self.projectiles.validate(reference.pool())?;

        let mut cosmos = reference.clone();
        self.characters.apply(cosmos.pool_mut())?;
        self.vehicles.apply(cosmos.pool_mut())?;
        self.projectiles.apply(cosmos.pool_mut())?;
        cosmos.restore_globals(self.clock, self.rng.clone(), self.settings.as_ref());

        let actual = cosmos.structural_hash();
        if actual != self.target_hash {
            return Err(SyncError::DesyncDetected {
                step: self.clock.step,
                expected: self.target_hash,
                actual,
            });
        }
        cosmos.verify_integrity()?;
        Ok(cosmos)
    }
}

/// An entity type the delta encoder can diff component by component.
pub trait Aggregate: EntityKind + StructuralHash {
    fn diff(&self, target: &Self, changes: &mut Vec<ComponentChange>);

    /// Returns false when `change` names a component this aggregate lacks.
    fn apply_change(&mut self, change: ComponentChange) -> bool;
}

macro_rules! diff_components {
    ($old:expr, $new:expr, $changes:expr, { $($field:ident => $variant:ident),* $(,)? }) => {
        $(
            if $old.$field != $new.$field {
                $changes.push(ComponentChange::$variant($new.$field));
            }
        )*
    };
}

impl Aggregate for Character {
    fn diff(&self, target: &Self, changes: &mut Vec<ComponentChange>) {
        diff_components!(self, target, changes, {
            transform => Transform,
            body => RigidBody,
            movement => Movement,
            crosshair => Crosshair,
            sentience => Sentience,
            driver => Driver,
            gun => Gun,
        });
    }

    fn apply_change(&mut self, change: ComponentChange) -> bool {
        match change {
            ComponentChange::Transform(c) => self.transform = c,
            ComponentChange::RigidBody(c) => self.body = c,
            ComponentChange::Movement(c) => self.movement = c,
            ComponentChange::Crosshair(c) => self.crosshair = c,
            ComponentChange::Sentience(c) => self.sentience = c,
            ComponentChange::Driver(c) => self.driver = c,
            ComponentChange::Gun(c) => self.gun = c,
            ComponentChange::Seat(_) | ComponentChange::Missile(_) => return false,
        }
        true
    }
}

impl Aggregate for Vehicle {
    fn diff(&self, target: &Self, changes: &mut Vec<ComponentChange>) {
        diff_components!(self, target, changes, {
            transform => Transform,
            body => RigidBody,
            movement => Movement,
            seat => Seat,
        });
    }

    fn apply_change(&mut self, change: ComponentChange) -> bool {
        match change {
            ComponentChange::Transform(c) => self.transform = c,
            ComponentChange::RigidBody(c) => self.body = c,
            ComponentChange::Movement(c) => self.movement = c,
            ComponentChange::Seat(c) => self.seat = c,
            _ => return false,
        }
        true
    }
}

impl Aggregate for Projectile {
    fn diff(&self, target: &Self, changes: &mut Vec<ComponentChange>) {
        diff_components!(self, target, changes, {
            transform => Transform,
            body => RigidBody,
            missile => Missile,
        });
    }

    fn apply_change(&mut self, change: ComponentChange) -> bool {
        match change {
            ComponentChange::Transform(c) => self.transform = c,
            ComponentChange::RigidBody(c) => self.body = c,
            ComponentChange::Missile(c) => self.missile = c,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::cosmos::EntityType;
    use crate::step::GameIntent;
    use crate::systems::testing::{idle, press};

    fn busy_cosmos() -> (Cosmos, crate::cosmos::EntityId) {
        let mut cosmos = Cosmos::default();
        let a = cosmos.spawn(Character::at(Vec2::ZERO)).unwrap().id();
        cosmos.spawn(Character::at(Vec2::new(300.0, 0.0))).unwrap();
        cosmos.spawn(Vehicle::at(Vec2::new(-200.0, 0.0))).unwrap();
        (cosmos, a)
    }

    #[test]
    fn apply_reproduces_target() {
        let (reference, shooter) = busy_cosmos();
        let mut target = reference.clone();
        target.advance(&press(shooter, &[GameIntent::Shoot, GameIntent::MoveRight]));
        idle(&mut target, 20);

        let delta = CosmosDelta::compute(&reference, &target);
        let rebuilt = delta.apply(&reference).unwrap();

        assert_eq!(rebuilt, target);
        assert_eq!(rebuilt.structural_hash(), target.structural_hash());
    }

    #[test]
    fn reproduces_deletions_and_versions() {
        let (reference, shooter) = busy_cosmos();
        let mut target = reference.clone();
        target.delete_entity(shooter).unwrap();
        let respawned = target.spawn(Character::at(Vec2::ONE)).unwrap().id();
        assert_eq!(respawned.version(), shooter.version() + 1);

        let rebuilt = CosmosDelta::compute(&reference, &target)
            .apply(&reference)
            .unwrap();

        assert!(!rebuilt.alive(shooter));
        assert!(rebuilt.alive(respawned));
        assert_eq!(rebuilt, target);
    }

    #[test]
    fn unchanged_state_is_a_small_delta() {
        let (reference, _) = busy_cosmos();
        let delta = CosmosDelta::compute(&reference, &reference);
        assert_eq!(delta.touched_slots(), 0);
        assert!(delta.settings.is_none());
        assert_eq!(delta.apply(&reference).unwrap(), reference);
    }

    #[test]
    fn only_changed_components_travel() {
        let (reference, shooter) = busy_cosmos();
        let mut target = reference.clone();
        target.component_mut::<Sentience>(shooter).unwrap().health = 40.0;

        let delta = CosmosDelta::compute(&reference, &target);
        assert_eq!(delta.characters.slots.len(), 1);
        assert_eq!(
            delta.characters.slots[0].change,
            SlotChange::Changed(vec![ComponentChange::Sentience(
                *target.component::<Sentience>(shooter).unwrap()
            )])
        );
    }

    #[test]
    fn wrong_baseline_is_rejected() {
        let (reference, _) = busy_cosmos();
        let mut target = reference.clone();
        idle(&mut target, 2);
        let delta = CosmosDelta::compute(&reference, &target);

        let mut other = reference.clone();
        idle(&mut other, 1);
        assert!(matches!(
            delta.apply(&other),
            Err(SyncError::BaselineMismatch { expected: 0, actual: 1 })
        ));
    }

    #[test]
    fn oversized_pools_are_rejected_before_allocating() {
        let (reference, _) = busy_cosmos();
        let mut target = reference.clone();
        idle(&mut target, 1);

        let mut delta = CosmosDelta::compute(&reference, &target);
        delta.characters.slot_count = 50_000_000;
        assert!(matches!(
            delta.apply(&reference),
            Err(SyncError::PoolTooLarge {
                kind: EntityType::Character,
                slot_count: 50_000_000,
                limit: 64,
            })
        ));
    }

    #[test]
    fn slots_past_the_pool_end_are_rejected() {
        let (reference, _) = busy_cosmos();
        let mut target = reference.clone();
        idle(&mut target, 1);

        let mut delta = CosmosDelta::compute(&reference, &target);
        delta.vehicles.slots.push(SlotDelta {
            index: 4_000_000_000,
            version: 1,
            change: SlotChange::Vacant,
        });
        assert!(matches!(
            delta.apply(&reference),
            Err(SyncError::SlotMismatch {
                kind: EntityType::Vehicle,
                index: 4_000_000_000,
            })
        ));
    }

    #[test]
    fn diverged_baseline_is_detected() {
        let (reference, shooter) = busy_cosmos();
        let mut target = reference.clone();
        idle(&mut target, 1);
        let delta = CosmosDelta::compute(&reference, &target);

        let mut diverged = reference.clone();
        diverged.component_mut::<Transform>(shooter).unwrap().position.x += 0.5;
        assert!(matches!(
            delta.apply(&diverged),
            Err(SyncError::DesyncDetected { .. })
        ));
    }
}
