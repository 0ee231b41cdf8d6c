use rkyv::{Archive, Deserialize, Serialize};

use super::EntityKind;
use super::id::{EntityId, RawId};
use crate::error::CosmosError;

const INITIAL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Slot<T> {
    pub(crate) version: u32,
    pub(crate) value: Option<T>,
}

impl<T> Slot<T> {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_vacant(&self) -> bool {
        self.value.is_none()
    }
}

/// Generation-checked slot storage for one entity kind.
///
/// Slots never move once created. Vacant indices are kept in `free` in
/// descending order, so the lowest one is always reused first and two
/// machines allocating in the same order hand out the same ids.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: u32,
    capacity_limit: Option<u32>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            capacity_limit: None,
        }
    }

    pub fn with_capacity_limit(limit: u32) -> Self {
        Self {
            slots: Vec::with_capacity(limit.min(1024) as usize),
            free: Vec::new(),
            live: 0,
            capacity_limit: Some(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.live as usize
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity_limit(&self) -> Option<u32> {
        self.capacity_limit
    }

    pub fn slots(&self) -> &[Slot<T>] {
        &self.slots
    }

    pub fn get(&self, raw: RawId) -> Option<&T> {
        self.slots
            .get(raw.index as usize)
            .filter(|slot| slot.version == raw.version)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, raw: RawId) -> Option<&mut T> {
        self.slots
            .get_mut(raw.index as usize)
            .filter(|slot| slot.version == raw.version)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, raw: RawId) -> bool {
        self.get(raw).is_some()
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (RawId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (RawId::new(index as u32, slot.version), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RawId, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let version = slot.version;
            slot.value
                .as_mut()
                .map(|value| (RawId::new(index as u32, version), value))
        })
    }

    pub fn raw_ids(&self) -> Vec<RawId> {
        self.iter().map(|(raw, _)| raw).collect()
    }

    /// Overwrites one slot wholesale. Used when reproducing another
    /// machine's pool; call [`Pool::rebuild_free_list`] afterwards.
    pub(crate) fn restore_slot(&mut self, index: u32, version: u32, value: Option<T>) {
        let index = index as usize;
        while self.slots.len() <= index {
            self.slots.push(Slot {
                version: INITIAL_VERSION,
                value: None,
            });
        }
        self.slots[index] = Slot { version, value };
    }

    pub(crate) fn resize_slots(&mut self, count: usize) {
        self.slots.truncate(count);
        while self.slots.len() < count {
            self.slots.push(Slot {
                version: INITIAL_VERSION,
                value: None,
            });
        }
    }

    pub(crate) fn rebuild_free_list(&mut self) {
        self.free = self
            .slots
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| slot.value.is_none())
            .map(|(index, _)| index as u32)
            .collect();
        self.live = (self.slots.len() - self.free.len()) as u32;
    }
}

impl<T: EntityKind> Pool<T> {
    pub fn allocate(&mut self, value: T) -> Result<RawId, CosmosError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.live += 1;
            return Ok(RawId::new(index, slot.version));
        }

        if let Some(limit) = self.capacity_limit {
            if self.slots.len() as u32 >= limit {
                return Err(CosmosError::CapacityExceeded {
                    kind: T::KIND,
                    limit,
                });
            }
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            version: INITIAL_VERSION,
            value: Some(value),
        });
        self.live += 1;
        Ok(RawId::new(index, INITIAL_VERSION))
    }

    /// Removes the entity and returns it. The slot's version is bumped so every
    /// outstanding id for it turns stale.
    pub fn deallocate(&mut self, raw: RawId) -> Result<T, CosmosError> {
        let stale = || CosmosError::StaleReference(EntityId::new(T::KIND, raw));

        let slot = self.slots.get_mut(raw.index as usize).ok_or_else(stale)?;
        if slot.version != raw.version {
            return Err(stale());
        }
        let value = slot.value.take().ok_or_else(stale)?;
        slot.version = slot.version.wrapping_add(1);

        let position = self.free.partition_point(|&free| free > raw.index);
        self.free.insert(position, raw.index);
        self.live -= 1;

        Ok(value)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|(raw, _)| EntityId::new(T::KIND, raw))
    }

    /// Checks that the free list is exactly the vacant slots, in descending order.
    pub fn verify_integrity(&self) -> Result<(), CosmosError> {
        let expected: Vec<u32> = self
            .slots
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| slot.value.is_none())
            .map(|(index, _)| index as u32)
            .collect();

        if expected != self.free {
            return Err(CosmosError::DeterminismViolation(format!(
                "{} pool free list out of sync with vacant slots",
                T::KIND
            )));
        }
        if self.live as usize + self.free.len() != self.slots.len() {
            return Err(CosmosError::DeterminismViolation(format!(
                "{} pool live count {} does not match occupancy",
                T::KIND,
                self.live
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::{Projectile, Vehicle};
    use glam::Vec2;

    fn vehicle() -> Vehicle {
        Vehicle::at(Vec2::ZERO)
    }

    #[test]
    fn reallocated_slot_gets_new_version() {
        let mut pool = Pool::new();

        let first = pool.allocate(vehicle()).unwrap();
        pool.deallocate(first).unwrap();
        let second = pool.allocate(vehicle()).unwrap();

        assert_eq!(first.index, second.index);
        assert_ne!(first.version, second.version);
        assert!(pool.get(first).is_none());
        assert!(pool.get(second).is_some());
    }

    #[test]
    fn lowest_free_slot_is_reused_first() {
        let mut pool = Pool::new();
        let ids: Vec<RawId> = (0..5).map(|_| pool.allocate(vehicle()).unwrap()).collect();

        pool.deallocate(ids[3]).unwrap();
        pool.deallocate(ids[1]).unwrap();
        pool.deallocate(ids[4]).unwrap();

        assert_eq!(pool.allocate(vehicle()).unwrap().index, 1);
        assert_eq!(pool.allocate(vehicle()).unwrap().index, 3);
        assert_eq!(pool.allocate(vehicle()).unwrap().index, 4);
        assert_eq!(pool.allocate(vehicle()).unwrap().index, 5);
        pool.verify_integrity().unwrap();
    }

    #[test]
    fn stale_deallocate_is_rejected() {
        let mut pool = Pool::new();
        let id = pool.allocate(vehicle()).unwrap();
        pool.deallocate(id).unwrap();

        assert!(matches!(
            pool.deallocate(id),
            Err(CosmosError::StaleReference(_))
        ));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let mut pool: Pool<Projectile> = Pool::with_capacity_limit(2);
        let sender = crate::cosmos::EntityId::new(
            crate::cosmos::EntityType::Character,
            RawId::new(0, 1),
        );
        let make = || Projectile::fired(sender, Vec2::ZERO, Vec2::X, 10.0, 1.0, 30);

        pool.allocate(make()).unwrap();
        pool.allocate(make()).unwrap();
        assert!(matches!(
            pool.allocate(make()),
            Err(CosmosError::CapacityExceeded { limit: 2, .. })
        ));
    }

    #[test]
    fn rebuild_matches_incremental_free_list() {
        let mut pool = Pool::new();
        let ids: Vec<RawId> = (0..6).map(|_| pool.allocate(vehicle()).unwrap()).collect();
        pool.deallocate(ids[0]).unwrap();
        pool.deallocate(ids[4]).unwrap();

        let mut rebuilt = pool.clone();
        rebuilt.rebuild_free_list();
        assert_eq!(pool, rebuilt);
    }
}
