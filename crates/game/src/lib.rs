pub mod net;
pub mod session;
pub mod sim;
pub mod time;

pub use net::{
    BROADCAST_PEER, CharacterMovement, ClientState, DEFAULT_PORT, GameMessage, HalfPing,
    LIVENESS_TIMEOUT_MS, MAX_MESSAGE_SIZE, MAX_PACKET_SIZE, MessageBody, MessageChannel,
    MessageQueue, MovementRing, NetworkConnection, NetworkStats, PROTOCOL_VERSION,
    PacketLossSimulation, Role, Topology, TransportConfig, TriggerQueue, WORKER_TICK_MS,
    WireError,
};
pub use session::{ConnectError, GameSession, HostConfig, SessionEvent};
pub use sim::{
    AiDifficulty, Board, Character, CharacterId, CharacterRole, ColoredBy, Direction,
    FixedTimestep, NetRole, SoundKind, TICK_DT, Tile, Weapon, World,
};
pub use time::{Clock, ManualClock, MonotonicClock};
