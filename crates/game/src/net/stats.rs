use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

/// Artificial outgoing loss for exercising the protocol.
#[derive(Debug, Clone, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn lossy(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent,
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        if self.loss_percent >= 100.0 {
            return true;
        }
        rand_percent() * 100.0 < self.loss_percent
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub packets_malformed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
    pub packet_loss_percent: f32,
}

/// Uniform in `[0, 1]`.
pub fn rand_percent() -> f32 {
    rand_u64() as f32 / u64::MAX as f32
}

/// Non-cryptographic randomness for salts and loss simulation. Never used
/// inside the cosmos, which has its own seeded generator.
pub fn rand_u64() -> u64 {
    let mut hasher = RandomState::new().build_hasher();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    hasher.write_u64(nanos);
    hasher.finish()
}

pub fn generate_salt() -> u64 {
    rand_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_simulation_never_drops() {
        let sim = PacketLossSimulation {
            loss_percent: 100.0,
            ..Default::default()
        };
        assert!(!sim.should_drop());
    }

    #[test]
    fn total_loss_always_drops() {
        let sim = PacketLossSimulation::lossy(100.0);
        assert!((0..32).all(|_| sim.should_drop()));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
