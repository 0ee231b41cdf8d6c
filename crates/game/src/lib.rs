//! A deterministic 2D cosmos shared over the network.
//!
//! The same [`Cosmos`] steps on the server and on every client. Clients
//! predict their own input ahead of the server and reconcile when
//! authoritative state arrives; the server judges shots against what each
//! shooter actually saw.

pub mod cosmos;
pub mod error;
pub mod frame;
pub mod history;
pub mod interpolation;
pub mod net;
pub mod scene;
pub mod setup;
pub mod simulation;
pub mod step;
pub mod systems;
pub mod visibility;

pub use cosmos::{
    Character, Cosmos, CosmosClock, CosmosSettings, EntityId, EntityType, Projectile,
    SimulationConfig, Vehicle,
};
pub use error::{CosmosError, SyncError};
pub use frame::{FrameReader, FrameWriter, GameFrameBuffer, frame_buffer_swapper};
pub use history::CosmosHistory;
pub use interpolation::{InterpolationConfig, InterpolationSystem};
pub use net::{
    ClientConnection, ClientId, ConnectionManager, ConnectionState, CosmosDelta,
    DEFAULT_PORT, DEFAULT_TICK_RATE, NetworkEndpoint, NetworkStats, Packet, PacketError,
    PacketHeader, PacketLossSimulation, PacketType,
};
pub use setup::{ClientSetup, LocalSetup, ServerSetup, Setup, SetupVariant};
pub use simulation::{FixedTimestep, InputBuffer};
pub use step::{CosmicEntropy, GameIntent, PlayerEntropy, StepArtifacts};
pub use visibility::{CameraCone, VisibilityLayers, VisibleEntity, visible_entities};
