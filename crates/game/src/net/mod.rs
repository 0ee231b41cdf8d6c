mod connection;
mod delta;
mod endpoint;
mod protocol;
mod simulator;
mod stats;
mod tracking;

pub use connection::{
    ClientConnection, ClientId, ConnectionManager, ConnectionState, HandshakeError,
};
pub use delta::{Aggregate, ComponentChange, CosmosDelta, PoolDelta, SlotChange, SlotDelta};
pub use endpoint::NetworkEndpoint;
pub use protocol::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, DeltaPayload, InputBatch, InputEntry, MAX_PACKET_SIZE,
    MAX_STATE_FRAGMENTS, PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketError, PacketHeader,
    PacketType, STATE_FRAGMENT_BYTES, StateFragment, StatePayload, sequence_greater_than,
};
pub use simulator::{LinkConditions, SimulatedLink};
pub use stats::{NetworkStats, PacketLossSimulation, generate_salt, rand_u64};
pub use tracking::{SendWindow, ReceiveWindow};
