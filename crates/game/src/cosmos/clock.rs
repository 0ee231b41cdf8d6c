use rkyv::{Archive, Deserialize, Serialize};

/// Logical time of a cosmos: how many fixed steps it has taken and how long
/// one step lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct CosmosClock {
    pub step: u32,
    pub steps_per_second: u32,
}

impl CosmosClock {
    pub fn new(steps_per_second: u32) -> Self {
        Self {
            step: 0,
            steps_per_second: steps_per_second.max(1),
        }
    }

    pub fn fixed_delta_secs(&self) -> f32 {
        1.0 / self.steps_per_second as f32
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.step as f64 / self.steps_per_second as f64
    }

    /// Whole steps covering `secs`, rounded up.
    pub fn steps_in(&self, secs: f32) -> u32 {
        (secs * self.steps_per_second as f32).ceil().max(0.0) as u32
    }

    pub(crate) fn advance(&mut self) {
        self.step = self.step.wrapping_add(1);
    }
}

impl Default for CosmosClock {
    fn default() -> Self {
        Self::new(crate::net::DEFAULT_TICK_RATE)
    }
}
