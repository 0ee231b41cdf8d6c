//! Structural hashing of cosmos state.
//!
//! Fields are fed explicitly in a fixed order, floats by their bit pattern,
//! so the result never depends on struct layout, padding or the std hasher.
//! Per-entity hashes are avalanched and XOR-combined, which makes the total
//! independent of the order entities are visited in.

use glam::Vec2;

use super::components::{
    Crosshair, Driver, Gun, Missile, Movement, OrbitMode, RigidBody, Seat, Sentience, Transform,
};
use super::entity::{Character, Projectile, Vehicle};
use super::id::{EntityId, RawId};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const AVALANCHE_K: u64 = 0x517c_c1b7_2722_0a95;

/// FNV-1a over explicitly written fields.
#[derive(Debug, Clone)]
pub struct FieldHasher {
    state: u64,
}

impl Default for FieldHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldHasher {
    pub fn new() -> Self {
        Self { state: FNV_OFFSET }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= *byte as u64;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bytes(&[value as u8]);
    }

    pub fn write_vec2(&mut self, value: Vec2) {
        self.write_f32(value.x);
        self.write_f32(value.y);
    }

    pub fn finish(&self) -> u64 {
        self.state
    }
}

#[inline]
pub fn avalanche(mut h: u64) -> u64 {
    h = (h ^ (h >> 30)).wrapping_mul(AVALANCHE_K);
    h ^ (h >> 27)
}

pub trait StructuralHash {
    fn hash_fields(&self, hasher: &mut FieldHasher);

    fn structural_hash(&self) -> u64 {
        let mut hasher = FieldHasher::new();
        self.hash_fields(&mut hasher);
        hasher.finish()
    }
}

impl StructuralHash for RawId {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_u32(self.index);
        h.write_u32(self.version);
    }
}

impl StructuralHash for EntityId {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_u32(self.kind.tag());
        self.raw.hash_fields(h);
    }
}

impl StructuralHash for Option<EntityId> {
    fn hash_fields(&self, h: &mut FieldHasher) {
        match self {
            Some(id) => {
                h.write_bool(true);
                id.hash_fields(h);
            }
            None => h.write_bool(false),
        }
    }
}

impl StructuralHash for Transform {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_vec2(self.position);
        h.write_vec2(self.facing);
    }
}

impl StructuralHash for RigidBody {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_vec2(self.velocity);
        h.write_f32(self.mass);
        h.write_f32(self.linear_damping);
        h.write_f32(self.radius);
    }
}

impl StructuralHash for Movement {
    fn hash_fields(&self, h: &mut FieldHasher) {
        let flags = [
            self.moving_forward,
            self.moving_backward,
            self.moving_left,
            self.moving_right,
            self.walking_enabled,
            self.sprint_enabled,
        ];
        let packed = flags
            .iter()
            .enumerate()
            .fold(0u8, |bits, (i, &set)| bits | ((set as u8) << i));
        h.write_bytes(&[packed]);
        h.write_f32(self.acceleration);
        h.write_f32(self.max_speed);
    }
}

impl StructuralHash for Crosshair {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_vec2(self.base_offset);
        h.write_f32(self.sensitivity);
        h.write_f32(self.max_distance);
        h.write_bool(self.orbit_mode == OrbitMode::Look);
    }
}

impl StructuralHash for Sentience {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_f32(self.health);
        h.write_f32(self.max_health);
        h.write_f32(self.consciousness);
        h.write_f32(self.max_consciousness);
    }
}

impl StructuralHash for Driver {
    fn hash_fields(&self, h: &mut FieldHasher) {
        self.owned_vehicle.hash_fields(h);
    }
}

impl StructuralHash for Seat {
    fn hash_fields(&self, h: &mut FieldHasher) {
        self.occupant.hash_fields(h);
    }
}

impl StructuralHash for Gun {
    fn hash_fields(&self, h: &mut FieldHasher) {
        h.write_u32(self.cooldown_steps);
        h.write_u32(self.remaining_cooldown);
        h.write_f32(self.muzzle_speed);
        h.write_f32(self.spread);
        h.write_f32(self.damage);
        h.write_bool(self.trigger_pressed);
    }
}

impl StructuralHash for Missile {
    fn hash_fields(&self, h: &mut FieldHasher) {
        self.sender.hash_fields(h);
        h.write_f32(self.damage);
        h.write_u32(self.remaining_steps);
    }
}

impl StructuralHash for Character {
    fn hash_fields(&self, h: &mut FieldHasher) {
        self.transform.hash_fields(h);
        self.body.hash_fields(h);
        self.movement.hash_fields(h);
        self.crosshair.hash_fields(h);
        self.sentience.hash_fields(h);
        self.driver.hash_fields(h);
        self.gun.hash_fields(h);
    }
}

impl StructuralHash for Vehicle {
    fn hash_fields(&self, h: &mut FieldHasher) {
        self.transform.hash_fields(h);
        self.body.hash_fields(h);
        self.movement.hash_fields(h);
        self.seat.hash_fields(h);
    }
}

impl StructuralHash for Projectile {
    fn hash_fields(&self, h: &mut FieldHasher) {
        self.transform.hash_fields(h);
        self.body.hash_fields(h);
        self.missile.hash_fields(h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_hashes_differently() {
        let a = Transform::at(Vec2::new(0.0, 1.0));
        let b = Transform::at(Vec2::new(-0.0, 1.0));
        assert_ne!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn xor_combination_is_order_independent() {
        let hashes = [11u64, 222, 3333].map(avalanche);
        let forward = hashes.iter().fold(0, |acc, h| acc ^ h);
        let backward = hashes.iter().rev().fold(0, |acc, h| acc ^ h);
        assert_eq!(forward, backward);
    }

    #[test]
    fn movement_flags_affect_hash() {
        let idle = Movement::default();
        let moving = Movement {
            moving_left: true,
            ..idle
        };
        assert_ne!(idle.structural_hash(), moving.structural_hash());
    }
}
