use glam::Vec2;

use crate::cosmos::{Cosmos, EntityId, Transform};

/// Ring of past cosmos states indexed by step.
///
/// Backs both delta baselines and lag compensation. Lookups verify the
/// stored step, so an overwritten slot reads as missing.
#[derive(Debug)]
pub struct CosmosHistory {
    states: Vec<Option<Cosmos>>,
    capacity: usize,
}

impl CosmosHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            states: (0..capacity).map(|_| None).collect(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, cosmos: &Cosmos) {
        let index = cosmos.step() as usize % self.capacity;
        self.states[index] = Some(cosmos.clone());
    }

    pub fn get(&self, step: u32) -> Option<&Cosmos> {
        let index = step as usize % self.capacity;
        self.states[index].as_ref().filter(|c| c.step() == step)
    }

    pub fn contains(&self, step: u32) -> bool {
        self.get(step).is_some()
    }

    pub fn latest(&self) -> Option<&Cosmos> {
        self.states.iter().flatten().max_by_key(|c| c.step())
    }

    pub fn oldest_step(&self) -> Option<u32> {
        self.states.iter().flatten().map(Cosmos::step).min()
    }

    /// Where `id` was at `step`, if that state is still held.
    pub fn position_at(&self, id: EntityId, step: u32) -> Option<Vec2> {
        self.get(step)?
            .component::<Transform>(id)
            .map(|t| t.position)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.states {
            *slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.states.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
