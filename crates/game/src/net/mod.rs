pub mod connection;
pub mod interpolation;
pub mod protocol;
pub mod queue;
pub mod stats;
pub mod tracking;
pub mod transport;

pub use connection::{
    CHARACTER_MOVEMENTS_CAPACITY, CharacterMovement, ClientState, HALF_PING_SAMPLES, HalfPing,
    MAX_PEERS, MovementRing, NetworkConnection, Topology, TriggerQueue,
};
pub use interpolation::{WARP_DISCREPANCY, interpolate_character, resolve_discrepancy};
pub use protocol::{
    BROADCAST_PEER, DEFAULT_PORT, GameMessage, MAX_MESSAGE_SIZE, MAX_PACKET_SIZE, MessageBody,
    MessageChannel, NET_NAME_SIZE, PROTOCOL_VERSION, Role, WireError, decode, encode_into,
};
pub use queue::MessageQueue;
pub use stats::{NetworkStats, PacketLossSimulation};
pub use tracking::{AckRing, RECEIVED_ACKS_CAPACITY, RealtimeInbound, TriggerInbound};
pub use transport::{
    LIVENESS_TIMEOUT_MS, TransportConfig, WORKER_TICK_MS, WorkerShared, spawn_client_worker,
    spawn_server_worker,
};
