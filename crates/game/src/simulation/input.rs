use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::step::PlayerEntropy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBufferConfig {
    /// Inputs further ahead of the last applied sequence are rejected.
    pub window: u32,
    /// Depth above which the server consumes extra inputs per step.
    pub jitter_buffer: usize,
    /// Extra inputs consumed per step while catching up.
    pub max_catch_up: usize,
    /// Steps to wait for a missing sequence before skipping past it.
    pub gap_patience: u32,
}

impl Default for InputBufferConfig {
    fn default() -> Self {
        Self {
            window: 128,
            jitter_buffer: 3,
            max_catch_up: 2,
            gap_patience: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAdmission {
    Accepted,
    Duplicate,
    Late,
    TooFarAhead,
}

/// Per-client inputs waiting to be applied, keyed by client sequence.
///
/// Clients resend every unacknowledged input, so most arrivals are
/// duplicates. Sequences start at 1.
#[derive(Debug, Default)]
pub struct InputBuffer {
    pending: BTreeMap<u32, PlayerEntropy>,
    last_applied: u32,
    stalled: u32,
    config: InputBufferConfig,
}

impl InputBuffer {
    pub fn new(config: InputBufferConfig) -> Self {
        Self {
            pending: BTreeMap::new(),
            last_applied: 0,
            stalled: 0,
            config,
        }
    }

    pub fn push(&mut self, sequence: u32, entropy: PlayerEntropy) -> InputAdmission {
        if sequence <= self.last_applied {
            return InputAdmission::Late;
        }
        if sequence - self.last_applied > self.config.window {
            return InputAdmission::TooFarAhead;
        }
        if self.pending.contains_key(&sequence) {
            return InputAdmission::Duplicate;
        }
        self.pending.insert(sequence, entropy);
        InputAdmission::Accepted
    }

    /// Highest sequence applied so far; the client drops everything up to it.
    pub fn last_applied(&self) -> u32 {
        self.last_applied
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Input for one server step, merged from consecutive sequences.
    ///
    /// Returns the highest sequence consumed along with the merged entropy,
    /// or `None` when nothing is ready.
    pub fn drain_for_tick(&mut self) -> Option<(u32, PlayerEntropy)> {
        let &first = self.pending.keys().next()?;

        if first != self.last_applied + 1 {
            self.stalled += 1;
            if self.stalled <= self.config.gap_patience {
                return None;
            }
            log::debug!(
                "skipping lost inputs {}..{}",
                self.last_applied + 1,
                first
            );
            self.last_applied = first - 1;
        }
        self.stalled = 0;

        let budget = if self.pending.len() > self.config.jitter_buffer {
            1 + self.config.max_catch_up
        } else {
            1
        };

        let mut merged = PlayerEntropy::default();
        for _ in 0..budget {
            let next = self.last_applied + 1;
            let Some(entropy) = self.pending.remove(&next) else {
                break;
            };
            merged.merge(entropy);
            self.last_applied = next;
        }
        Some((self.last_applied, merged))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.stalled = 0;
    }
}
