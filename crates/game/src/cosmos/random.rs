//! Seeded xorshift32 generator carried inside the cosmos.
//!
//! Every random decision a system makes draws from this generator, so two
//! machines stepping the same inputs draw the same numbers in the same order.

use rkyv::{Archive, Deserialize, Serialize};

const UNIT_SCALE: f32 = 1.0 / 16_777_216.0;

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct SeededRandom {
    state: u32,
}

impl SeededRandom {
    /// Seed 0 would lock xorshift at zero, so it is remapped to 1.
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `[0, 1)`. Uses the top 24 bits so the result is exact in f32.
    pub fn next_unit(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 * UNIT_SCALE
    }

    /// Uniform in `[-1, 1)`.
    pub fn next_signed(&mut self) -> f32 {
        self.next_unit() * 2.0 - 1.0
    }

    pub fn next_range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_unit() * (max - min)
    }

    pub fn next_below(&mut self, max: u32) -> u32 {
        ((self.next_u32() as u64 * max as u64) >> 32) as u32
    }

    pub fn state(&self) -> u32 {
        self.state
    }
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::new(1)
    }
}
