use rkyv::rancor;

use crate::cosmos::{EntityId, EntityType};
use crate::net::PacketError;

#[derive(Debug, thiserror::Error)]
pub enum CosmosError {
    #[error("stale reference to {0}")]
    StaleReference(EntityId),
    #[error("{kind} pool is full ({limit} entities)")]
    CapacityExceeded { kind: EntityType, limit: u32 },
    #[error("determinism violation: {0}")]
    DeterminismViolation(String),
    #[error("cosmos persistence failed: {0}")]
    Persistence(rancor::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no baseline for step {base_step}")]
    BaselineMissing { base_step: u32 },
    #[error("delta is based on step {expected} but the reference is at step {actual}")]
    BaselineMismatch { expected: u32, actual: u32 },
    #[error("{kind} slot {index} does not match the delta baseline")]
    SlotMismatch { kind: EntityType, index: u32 },
    #[error("{kind} pool of {slot_count} slots exceeds its limit of {limit}")]
    PoolTooLarge {
        kind: EntityType,
        slot_count: u32,
        limit: u32,
    },
    #[error("state fragment {index} of {count} is out of range")]
    FragmentOutOfRange { index: u16, count: u16 },
    #[error("desync detected at step {step}: expected {expected:#018x}, got {actual:#018x}")]
    DesyncDetected {
        step: u32,
        expected: u64,
        actual: u64,
    },
    #[error(transparent)]
    Cosmos(#[from] CosmosError),
    #[error(transparent)]
    MalformedPacket(#[from] PacketError),
}

/// Reports a broken determinism invariant. Panics in debug builds; release
/// builds log and keep running.
pub fn report_determinism_violation(error: &CosmosError) {
    log::error!("{error}");
    debug_assert!(false, "{error}");
}
