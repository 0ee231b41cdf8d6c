use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use super::delta::CosmosDelta;
use crate::cosmos::{Cosmos, EntityId};
use crate::step::PlayerEntropy;

/// Largest datagram either side will send or accept. Sits just under the UDP
/// payload limit.
pub const MAX_PACKET_SIZE: usize = 65_000;
/// Encoded cosmos bytes per `StateFragment`, leaving room for the framing.
pub const STATE_FRAGMENT_BYTES: usize = MAX_PACKET_SIZE - 1024;
/// Most fragments a single full state may be split into.
pub const MAX_STATE_FRAGMENTS: u16 = 64;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x434F_534D;
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
            ack,
            ack_bitfield,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// One client step worth of input, tagged with the client's input sequence.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct InputEntry {
    pub sequence: u32,
    pub entropy: PlayerEntropy,
}

/// Every input the client has not seen acknowledged yet, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct InputBatch {
    pub entries: Vec<InputEntry>,
}

impl InputBatch {
    pub fn newest_sequence(&self) -> Option<u32> {
        self.entries.last().map(|e| e.sequence)
    }
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct StatePayload {
    /// Highest input sequence of the receiving client folded into `cosmos`.
    pub acked_sequence: u32,
    pub cosmos: Cosmos,
}

/// One slice of an encoded cosmos too large for a single `FullState`.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct StateFragment {
    pub step: u32,
    pub acked_sequence: u32,
    pub index: u16,
    pub count: u16,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct DeltaPayload {
    pub acked_sequence: u32,
    pub delta: CosmosDelta,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum PacketType {
    ConnectionRequest {
        client_salt: u64,
    },
    ConnectionChallenge {
        server_salt: u64,
        challenge: u64,
    },
    ChallengeResponse {
        combined_salt: u64,
    },
    ConnectionAccepted {
        client_id: u32,
        character: EntityId,
        steps_per_second: u32,
    },
    ConnectionDenied {
        reason: String,
    },
    Input(InputBatch),
    FullState(Box<StatePayload>),
    StateFragment(Box<StateFragment>),
    Delta(Box<DeltaPayload>),
    /// The client holds the authoritative state of `step` as its baseline.
    StateAck {
        step: u32,
    },
    ResyncRequest,
    /// The server judged the receiver's shot a hit on `target`, using the
    /// positions of `step`.
    HitConfirmed {
        target: EntityId,
        step: u32,
    },
    Ping {
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },
    Disconnect,
}

impl PacketType {
    pub fn name(&self) -> &'static str {
        match self {
            PacketType::ConnectionRequest { .. } => "connection_request",
            PacketType::ConnectionChallenge { .. } => "connection_challenge",
            PacketType::ChallengeResponse { .. } => "challenge_response",
            PacketType::ConnectionAccepted { .. } => "connection_accepted",
            PacketType::ConnectionDenied { .. } => "connection_denied",
            PacketType::Input(_) => "input",
            PacketType::FullState(_) => "full_state",
            PacketType::StateFragment(_) => "state_fragment",
            PacketType::Delta(_) => "delta",
            PacketType::StateAck { .. } => "state_ack",
            PacketType::ResyncRequest => "resync_request",
            PacketType::HitConfirmed { .. } => "hit_confirmed",
            PacketType::Ping { .. } => "ping",
            PacketType::Pong { .. } => "pong",
            PacketType::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: PacketType,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("packet of {0} bytes exceeds the datagram limit")]
    Oversized(usize),
    #[error("bad magic or protocol version")]
    InvalidHeader,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: PacketType) -> Self {
        Self { header, payload }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)?;
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(PacketError::Oversized(bytes.len()));
        }
        Ok(bytes)
    }

    /// Validates and decodes a datagram. Receive buffers carry no alignment
    /// guarantee, so the bytes are copied into an aligned buffer first.
    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);

        let packet = rkyv::from_bytes::<Self, rancor::Error>(&aligned)
            .map_err(PacketError::Deserialize)?;
        if !packet.header.is_valid() {
            return Err(PacketError::InvalidHeader);
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::Character;
    use crate::step::GameIntent;
    use glam::Vec2;

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn input_batch_survives_the_wire() {
        let mut entropy = PlayerEntropy::default();
        entropy.press(GameIntent::Sprint);
        entropy.add_motion(3, -4);
        let batch = InputBatch {
            entries: vec![InputEntry {
                sequence: 7,
                entropy: entropy.clone(),
            }],
        };

        let packet = Packet::new(PacketHeader::new(1, 0, 0), PacketType::Input(batch));
        let decoded = Packet::deserialize(&packet.serialize().unwrap()).unwrap();

        match decoded.payload {
            PacketType::Input(batch) => {
                assert_eq!(batch.newest_sequence(), Some(7));
                assert_eq!(batch.entries[0].entropy, entropy);
            }
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn full_state_keeps_the_cosmos_hash() {
        let mut cosmos = Cosmos::default();
        cosmos.spawn(Character::at(Vec2::new(5.0, 6.0))).unwrap();
        let payload = StatePayload {
            acked_sequence: 3,
            cosmos: cosmos.clone(),
        };

        let packet = Packet::new(
            PacketHeader::new(0, 0, 0),
            PacketType::FullState(Box::new(payload)),
        );
        let decoded = Packet::deserialize(&packet.serialize().unwrap()).unwrap();

        let PacketType::FullState(state) = decoded.payload else {
            panic!("expected full state");
        };
        assert_eq!(state.cosmos.structural_hash(), cosmos.structural_hash());
        assert_eq!(state.acked_sequence, 3);
    }

    #[test]
    fn a_full_fragment_fits_in_one_datagram() {
        let fragment = StateFragment {
            step: 9,
            acked_sequence: 4,
            index: MAX_STATE_FRAGMENTS - 1,
            count: MAX_STATE_FRAGMENTS,
            bytes: vec![0x5A; STATE_FRAGMENT_BYTES],
        };
        let packet = Packet::new(
            PacketHeader::new(u32::MAX, u32::MAX, u32::MAX),
            PacketType::StateFragment(Box::new(fragment)),
        );

        let bytes = packet.serialize().unwrap();
        assert!(bytes.len() <= MAX_PACKET_SIZE);
        let PacketType::StateFragment(decoded) = Packet::deserialize(&bytes).unwrap().payload
        else {
            panic!("expected a fragment");
        };
        assert_eq!(decoded.bytes.len(), STATE_FRAGMENT_BYTES);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Packet::deserialize(&[0xAB; 40]).is_err());
        assert!(Packet::deserialize(&[]).is_err());
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let mut header = PacketHeader::new(0, 0, 0);
        header.magic = 0xDEAD_BEEF;
        let bytes = Packet::new(header, PacketType::Disconnect)
            .serialize()
            .unwrap();
        assert!(matches!(
            Packet::deserialize(&bytes),
            Err(PacketError::InvalidHeader)
        ));
    }
}
