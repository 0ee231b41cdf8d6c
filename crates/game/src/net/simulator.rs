//! In-memory datagram link with seeded loss, latency and reordering.
//!
//! Time is counted in whole link ticks so runs over it are reproducible.
//! Packets pass through the real codec on the way.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::protocol::{Packet, PacketError};
use crate::cosmos::SeededRandom;

#[derive(Debug, Clone, Default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub latency_ticks: u32,
    /// Extra random delay in `[0, jitter_ticks]`, which also reorders.
    pub jitter_ticks: u32,
}

#[derive(Debug)]
struct DelayedDatagram {
    release_tick: u64,
    order: u64,
    bytes: Vec<u8>,
}

impl PartialEq for DelayedDatagram {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DelayedDatagram {}

impl PartialOrd for DelayedDatagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedDatagram {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap.
        (other.release_tick, other.order).cmp(&(self.release_tick, self.order))
    }
}

/// One direction of a simulated connection.
#[derive(Debug)]
pub struct SimulatedLink {
    conditions: LinkConditions,
    rng: SeededRandom,
    queue: BinaryHeap<DelayedDatagram>,
    now: u64,
    sent: u64,
    dropped: u64,
}

impl SimulatedLink {
    pub fn new(conditions: LinkConditions, seed: u32) -> Self {
        Self {
            conditions,
            rng: SeededRandom::new(seed),
            queue: BinaryHeap::new(),
            now: 0,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn perfect() -> Self {
        Self::new(LinkConditions::default(), 1)
    }

    pub fn send(&mut self, packet: &Packet) -> Result<(), PacketError> {
        let bytes = packet.serialize()?;
        self.sent += 1;

        if self.rng.next_unit() * 100.0 < self.conditions.loss_percent {
            self.dropped += 1;
            return Ok(());
        }

        let jitter = match self.conditions.jitter_ticks {
            0 => 0,
            max => self.rng.next_below(max + 1),
        };
        self.queue.push(DelayedDatagram {
            release_tick: self.now + u64::from(self.conditions.latency_ticks + jitter),
            order: self.sent,
            bytes,
        });
        Ok(())
    }

    /// Pushes raw bytes, bypassing the codec. For feeding garbage.
    pub fn send_raw(&mut self, bytes: Vec<u8>) {
        self.sent += 1;
        self.queue.push(DelayedDatagram {
            release_tick: self.now,
            order: self.sent,
            bytes,
        });
    }

    pub fn tick(&mut self) {
        self.now += 1;
    }

    /// Everything due by now, decoded. Malformed datagrams come back as errors.
    pub fn receive(&mut self) -> Vec<Result<Packet, PacketError>> {
        let mut delivered = Vec::new();
        while self.queue.peek().is_some_and(|d| d.release_tick <= self.now) {
            if let Some(datagram) = self.queue.pop() {
                delivered.push(Packet::deserialize(&datagram.bytes));
            }
        }
        delivered
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
