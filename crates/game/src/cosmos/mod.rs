//! The cosmos: every piece of simulation state that must agree across machines.

mod clock;
mod components;
mod entity;
mod hash;
mod id;
mod pool;
mod random;

use glam::Vec2;
use rkyv::rancor;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

pub use clock::CosmosClock;
pub use components::{
    Crosshair, Driver, Gun, Missile, Movement, OrbitMode, RigidBody, Seat, Sentience, Transform,
};
pub use entity::{
    Character, Component, EntityKind, EntityMut, EntityRef, Projectile, Vehicle,
};
pub use hash::{FieldHasher, StructuralHash, avalanche};
pub use id::{EntityId, EntityType, RawId, TypedId};
pub use pool::{Pool, Slot};
pub use random::SeededRandom;

use crate::error::CosmosError;
use crate::step::{CosmicEntropy, LogicStep, MessageQueues, StepArtifacts};
use crate::systems;

/// Tunables stored inside the cosmos so every machine steps with the same values.
#[derive(
    Debug,
    Clone,
    PartialEq,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(default)]
pub struct CosmosSettings {
    pub arena_half_extent: Vec2,
    pub interaction_radius: f32,
    pub projectile_lifetime_steps: u32,
    pub walk_multiplier: f32,
    pub sprint_multiplier: f32,
    pub sprint_drain_per_second: f32,
    pub consciousness_regen_per_second: f32,
}

impl Default for CosmosSettings {
    fn default() -> Self {
        Self {
            arena_half_extent: Vec2::new(1600.0, 1200.0),
            interaction_radius: 90.0,
            projectile_lifetime_steps: 90,
            walk_multiplier: 0.5,
            sprint_multiplier: 1.6,
            sprint_drain_per_second: 25.0,
            consciousness_regen_per_second: 10.0,
        }
    }
}

impl CosmosSettings {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_vec2(self.arena_half_extent);
        h.write_f32(self.interaction_radius);
        h.write_u32(self.projectile_lifetime_steps);
        h.write_f32(self.walk_multiplier);
        h.write_f32(self.sprint_multiplier);
        h.write_f32(self.sprint_drain_per_second);
        h.write_f32(self.consciousness_regen_per_second);
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub steps_per_second: u32,
    pub seed: u32,
    pub settings: CosmosSettings,
    pub max_characters: u32,
    pub max_vehicles: u32,
    pub max_projectiles: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_second: crate::net::DEFAULT_TICK_RATE,
            seed: 0x5EED_C05,
            settings: CosmosSettings::default(),
            max_characters: 64,
            max_vehicles: 32,
            max_projectiles: 1024,
        }
    }
}

/// Anything holding per-entity data outside the cosmos that must be dropped
/// when the entity goes away.
pub trait DestructionObserver {
    fn on_destroy(&mut self, id: EntityId);
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Cosmos {
    pub(crate) clock: CosmosClock,
    pub(crate) rng: SeededRandom,
    pub(crate) settings: CosmosSettings,
    pub(crate) characters: Pool<Character>,
    pub(crate) vehicles: Pool<Vehicle>,
    pub(crate) projectiles: Pool<Projectile>,
}

impl Default for Cosmos {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

impl Cosmos {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            clock: CosmosClock::new(config.steps_per_second),
            rng: SeededRandom::new(config.seed),
            settings: config.settings.clone(),
            characters: Pool::with_capacity_limit(config.max_characters),
            vehicles: Pool::with_capacity_limit(config.max_vehicles),
            projectiles: Pool::with_capacity_limit(config.max_projectiles),
        }
    }

    pub fn clock(&self) -> CosmosClock {
        self.clock
    }

    pub fn step(&self) -> u32 {
        self.clock.step
    }

    pub fn fixed_delta_secs(&self) -> f32 {
        self.clock.fixed_delta_secs()
    }

    pub fn settings(&self) -> &CosmosSettings {
        &self.settings
    }

    pub fn rng(&self) -> &SeededRandom {
        &self.rng
    }

    pub(crate) fn rng_mut(&mut self) -> &mut SeededRandom {
        &mut self.rng
    }

    pub(crate) fn restore_globals(
        &mut self,
        clock: CosmosClock,
        rng: SeededRandom,
        settings: Option<&CosmosSettings>,
    ) {
        self.clock = clock;
        self.rng = rng;
        if let Some(settings) = settings {
            self.settings = settings.clone();
        }
    }

    pub fn pool<E: EntityKind>(&self) -> &Pool<E> {
        E::pool(self)
    }

    pub(crate) fn pool_mut<E: EntityKind>(&mut self) -> &mut Pool<E> {
        E::pool_mut(self)
    }

    pub fn spawn<E: EntityKind>(&mut self, entity: E) -> Result<TypedId<E>, CosmosError> {
        E::pool_mut(self).allocate(entity).map(TypedId::from_raw)
    }

    pub fn get_typed<E: EntityKind>(&self, id: TypedId<E>) -> Option<&E> {
        E::pool(self).get(id.raw())
    }

    pub fn get_typed_mut<E: EntityKind>(&mut self, id: TypedId<E>) -> Option<&mut E> {
        E::pool_mut(self).get_mut(id.raw())
    }

    pub fn try_get(&self, id: EntityId) -> Option<EntityRef<'_>> {
        match id.kind {
            EntityType::Character => self.characters.get(id.raw).map(EntityRef::Character),
            EntityType::Vehicle => self.vehicles.get(id.raw).map(EntityRef::Vehicle),
            EntityType::Projectile => self.projectiles.get(id.raw).map(EntityRef::Projectile),
        }
    }

    pub fn get(&self, id: EntityId) -> Result<EntityRef<'_>, CosmosError> {
        self.try_get(id).ok_or(CosmosError::StaleReference(id))
    }

    pub fn try_get_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        match id.kind {
            EntityType::Character => self.characters.get_mut(id.raw).map(EntityMut::Character),
            EntityType::Vehicle => self.vehicles.get_mut(id.raw).map(EntityMut::Vehicle),
            EntityType::Projectile => {
                self.projectiles.get_mut(id.raw).map(EntityMut::Projectile)
            }
        }
    }

    pub fn component<C: Component>(&self, id: EntityId) -> Option<&C> {
        self.try_get(id).and_then(|entity| entity.get::<C>())
    }

    pub fn component_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        self.try_get_mut(id).and_then(|entity| entity.get_mut::<C>())
    }

    pub fn alive(&self, id: EntityId) -> bool {
        self.try_get(id).is_some()
    }

    /// All live ids, ordered by kind then slot index.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.characters
            .ids()
            .chain(self.vehicles.ids())
            .chain(self.projectiles.ids())
            .collect()
    }

    pub fn ids_with<C: Component>(&self) -> Vec<EntityId> {
        self.entity_ids()
            .into_iter()
            .filter(|&id| self.component::<C>(id).is_some())
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.characters.len() + self.vehicles.len() + self.projectiles.len()
    }

    /// Frees the entity and clears every in-cosmos reference to it.
    pub fn delete_entity(&mut self, id: EntityId) -> Result<(), CosmosError> {
        let linked = match self.get(id)? {
            EntityRef::Character(character) => character.driver.owned_vehicle,
            EntityRef::Vehicle(vehicle) => vehicle.seat.occupant,
            EntityRef::Projectile(_) => None,
        };

        if let Some(other) = linked {
            if let Some(seat) = self.component_mut::<Seat>(other) {
                if seat.occupant == Some(id) {
                    seat.occupant = None;
                }
            }
            if let Some(driver) = self.component_mut::<Driver>(other) {
                if driver.owned_vehicle == Some(id) {
                    driver.owned_vehicle = None;
                }
            }
        }

        match id.kind {
            EntityType::Character => drop(self.characters.deallocate(id.raw)?),
            EntityType::Vehicle => drop(self.vehicles.deallocate(id.raw)?),
            EntityType::Projectile => drop(self.projectiles.deallocate(id.raw)?),
        }
        Ok(())
    }

    pub fn verify_integrity(&self) -> Result<(), CosmosError> {
        self.characters.verify_integrity()?;
        self.vehicles.verify_integrity()?;
        self.projectiles.verify_integrity()
    }

    pub fn advance(&mut self, entropy: &CosmicEntropy) -> StepArtifacts {
        let mut messages = MessageQueues::default();
        self.advance_with(entropy, &mut messages)
    }

    /// Runs one fixed step. `messages` is cleared first and holds the step's
    /// final queues afterwards.
    pub fn advance_with(
        &mut self,
        entropy: &CosmicEntropy,
        messages: &mut MessageQueues,
    ) -> StepArtifacts {
        messages.clear();
        entropy.post_to(messages);

        let mut artifacts = StepArtifacts::default();
        let mut step = LogicStep {
            cosmos: self,
            messages,
            artifacts: &mut artifacts,
        };
        systems::run_pipeline(&mut step);

        self.clock.advance();
        artifacts.step = self.clock.step;
        artifacts
    }

    pub fn structural_hash(&self) -> u64 {
        let mut entities = 0u64;
        let mut vacancies = 0u64;

        fn fold_pool<E: EntityKind + StructuralHash>(
            pool: &Pool<E>,
            entities: &mut u64,
            vacancies: &mut u64,
        ) {
            for (index, slot) in pool.slots().iter().enumerate() {
                let mut h = FieldHasher::new();
                EntityId::new(E::KIND, RawId::new(index as u32, slot.version())).hash_fields(&mut h);
                match slot.value() {
                    Some(entity) => {
                        entity.hash_fields(&mut h);
                        *entities ^= avalanche(h.finish());
                    }
                    None => *vacancies ^= avalanche(h.finish()),
                }
            }
        }

        fold_pool(&self.characters, &mut entities, &mut vacancies);
        fold_pool(&self.vehicles, &mut entities, &mut vacancies);
        fold_pool(&self.projectiles, &mut entities, &mut vacancies);

        let mut h = FieldHasher::new();
        h.write_u64(entities);
        h.write_u64(vacancies);
        h.write_u32(self.characters.slot_count() as u32);
        h.write_u32(self.vehicles.slot_count() as u32);
        h.write_u32(self.projectiles.slot_count() as u32);
        h.write_u32(self.clock.step);
        h.write_u32(self.clock.steps_per_second);
        h.write_u32(self.rng.state());
        self.settings.hash_fields(&mut h);
        h.finish()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CosmosError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(CosmosError::Persistence)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CosmosError> {
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let cosmos = rkyv::from_bytes::<Self, rancor::Error>(&aligned)
            .map_err(CosmosError::Persistence)?;
        cosmos.verify_integrity()?;
        Ok(cosmos)
    }
}
