//! Send and receive windows behind the packet header's `ack`/`ack_bitfield`.
//!
//! The header carries the newest remote sequence plus 32 bits for the ones
//! before it. Receivers remember 64 sequences so that late replays of a
//! state packet are still recognised after they fall out of the header.

use std::time::Instant;

use super::protocol::sequence_greater_than;

/// Sequences covered by one header: `ack` and the 32 before it.
const HEADER_SPAN: u32 = 32;
/// Sequences a receiver can still tell apart from replays.
const RECEIVE_SPAN: u32 = 64;
const INITIAL_SRTT_MS: f32 = 100.0;
const INITIAL_RTT_VAR_MS: f32 = 50.0;
const RTT_GAIN: f32 = 0.125;
const RTT_VAR_GAIN: f32 = 0.25;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    sequence: u32,
    sent_at: Instant,
}

/// Outgoing packets awaiting an ack, in a ring keyed by sequence.
///
/// A send that wraps onto an occupied slot evicts it; that packet counts as
/// lost for RTT purposes.
#[derive(Debug)]
pub struct SendWindow {
    slots: Box<[Option<InFlight>]>,
    srtt: f32,
    rtt_var: f32,
}

impl SendWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(HEADER_SPAN as usize + 1)].into_boxed_slice(),
            srtt: INITIAL_SRTT_MS,
            rtt_var: INITIAL_RTT_VAR_MS,
        }
    }

    fn slot(&self, sequence: u32) -> usize {
        sequence as usize % self.slots.len()
    }

    pub fn track_packet(&mut self, sequence: u32) {
        let slot = self.slot(sequence);
        self.slots[slot] = Some(InFlight {
            sequence,
            sent_at: Instant::now(),
        });
    }

    /// Settles every in-flight packet the header covers and returns their
    /// sequences, oldest first. Packets already settled are not reported twice.
    pub fn process_ack(&mut self, ack: u32, ack_bitfield: u32) -> Vec<u32> {
        let now = Instant::now();
        let mut settled = Vec::new();

        for age in (0..=HEADER_SPAN).rev() {
            if age > 0 && ack_bitfield & (1 << (age - 1)) == 0 {
                continue;
            }
            let sequence = ack.wrapping_sub(age);
            let slot = self.slot(sequence);
            if let Some(flight) = self.slots[slot].take_if(|f| f.sequence == sequence) {
                self.sample_rtt(now.duration_since(flight.sent_at).as_secs_f32() * 1000.0);
                settled.push(sequence);
            }
        }

        settled
    }

    fn sample_rtt(&mut self, rtt_ms: f32) {
        self.rtt_var += RTT_VAR_GAIN * ((rtt_ms - self.srtt).abs() - self.rtt_var);
        self.srtt += RTT_GAIN * (rtt_ms - self.srtt);
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn unacked_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

/// Remote sequences seen so far.
#[derive(Debug, Default)]
pub struct ReceiveWindow {
    newest: Option<u32>,
    /// Bit `n` set means `newest - n` arrived.
    seen: u64,
}

impl ReceiveWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false for a replay, or for a sequence too far behind the
    /// newest to rule one out.
    pub fn record_received(&mut self, sequence: u32) -> bool {
        let Some(newest) = self.newest else {
            self.newest = Some(sequence);
            self.seen = 1;
            return true;
        };

        if sequence_greater_than(sequence, newest) {
            let shift = sequence.wrapping_sub(newest);
            self.seen = if shift < RECEIVE_SPAN {
                (self.seen << shift) | 1
            } else {
                1
            };
            self.newest = Some(sequence);
            return true;
        }

        let age = newest.wrapping_sub(sequence);
        if age >= RECEIVE_SPAN {
            return false;
        }
        let bit = 1u64 << age;
        if self.seen & bit != 0 {
            return false;
        }
        self.seen |= bit;
        true
    }

    /// `(ack, ack_bitfield)` for the next outgoing header.
    pub fn ack_data(&self) -> (u32, u32) {
        // Bit 0 of the header is `ack - 1`, so the newest bit is dropped.
        (self.newest.unwrap_or(0), (self.seen >> 1) as u32)
    }
}
