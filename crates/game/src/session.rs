use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::net::connection::{CharacterMovement, NetworkConnection, Topology};
use crate::net::interpolation::{interpolate_character, resolve_discrepancy};
use crate::net::protocol::{
    DEFAULT_PORT, GameMessage, MessageBody, PROTOCOL_VERSION, Role,
};
use crate::net::queue::MessageQueue;
use crate::net::stats::NetworkStats;
use crate::net::transport::{TransportConfig, WorkerShared, spawn_client_worker, spawn_server_worker};
use crate::sim::ai::AiDifficulty;
use crate::sim::character::{
    CHARACTER_ALIVE_Z, CharacterId, CharacterRole, Direction, NetRole,
};
use crate::sim::tick::{FixedTimestep, TICK_DT};
use crate::sim::tile::ColoredBy;
use crate::sim::world::{Outgoing, SoundKind, TickEffects, World};
use crate::sim::OBJECT_FALLING_STEP;
use crate::time::Clock;

/// Pings go out at 10 Hz per peer; the wire format does not care about the
/// rate, only the retransmission loop does.
pub const PING_INTERVAL_MS: u32 = 100;

/// Cap on how much one-way latency is folded into a remote fire.
const MAX_FIRE_COMPENSATION_MS: u32 = 110;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to bind socket: {0}")]
    Bind(#[source] io::Error),
    #[error("could not resolve server address `{0}`")]
    Resolve(String),
    #[error("failed to spawn transport worker: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PeerJoined { character: CharacterId, name: String },
    WaitingForPlayers { count: u8 },
    Accepted { character: CharacterId, lives: u8 },
    GameStarted,
    Sound(SoundKind),
    LaggedOut { character: CharacterId },
    /// The server refused us (usually a protocol version mismatch).
    Rejected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub bind: String,
    pub port: u16,
    /// Remote human players to wait for, 1..=3.
    pub net_humans: u8,
    pub lives: u8,
    pub ai_difficulty: AiDifficulty,
    pub local_name: String,
    /// Whether the host seat is played locally or handed to the AI.
    pub local_role: CharacterRole,
    pub transport: TransportConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            net_humans: 1,
            lives: 5,
            ai_difficulty: AiDifficulty::Easy,
            local_name: "Player".into(),
            local_role: CharacterRole::Human,
            transport: TransportConfig::default(),
        }
    }
}

/// The simulation task: owns the world, drives fixed ticks, and exchanges
/// messages with the transport worker through the two queues.
pub struct GameSession {
    pub world: World,
    connection: Option<NetworkConnection>,
    clock: Arc<dyn Clock>,
    timestep: FixedTimestep,
    events: VecDeque<SessionEvent>,
    stats: Arc<Mutex<NetworkStats>>,
    fx: TickEffects,
}

impl GameSession {
    /// Bind a socket, seat the four characters, and start hosting.
    pub fn host(config: HostConfig, clock: Arc<dyn Clock>) -> Result<Self, ConnectError> {
        let net_humans = config.net_humans.clamp(1, 3);
        let socket = UdpSocket::bind((config.bind.as_str(), config.port))
            .map_err(ConnectError::Bind)?;
        socket.set_nonblocking(true).map_err(ConnectError::Bind)?;

        let mut world = World::new(true, config.ai_difficulty);
        world.local_character = Some(CharacterId::PinkBubbleGum);
        {
            let host = world.character_mut(CharacterId::PinkBubbleGum);
            host.role = config.local_role;
            host.backup_role = config.local_role;
            host.net_role = NetRole::Playing;
            host.name = Some(config.local_name.clone());
        }
        for (slot, id) in [
            CharacterId::RedRover,
            CharacterId::GreenTree,
            CharacterId::BlueLightning,
        ]
        .into_iter()
        .enumerate()
        {
            let human = (slot as u8) < net_humans;
            let character = world.character_mut(id);
            character.role = if human {
                CharacterRole::Human
            } else {
                CharacterRole::Ai
            };
            character.backup_role = character.role;
            character.net_role = if human {
                NetRole::Pending
            } else {
                NetRole::Playing
            };
        }
        world.init_round(config.lives, true);

        let inbound = Arc::new(MessageQueue::new());
        let outbound = Arc::new(MessageQueue::new());
        let topology = Arc::new(Mutex::new(Topology::new()));
        let stats = Arc::new(Mutex::new(NetworkStats::default()));

        let mut connection = NetworkConnection::new(
            Role::Server,
            Arc::clone(&inbound),
            Arc::clone(&outbound),
            Arc::clone(&topology),
        );
        connection.character_lives = config.lives;
        connection.players_waiting = net_humans;

        let shared = WorkerShared {
            inbound,
            outbound,
            topology,
            clock: Arc::clone(&clock),
            stats: Arc::clone(&stats),
        };
        let worker = spawn_server_worker(socket, shared, net_humans, config.transport)
            .map_err(ConnectError::Spawn)?;
        connection.set_worker(worker);

        log::info!("hosting on port {} for {net_humans} player(s)", config.port);

        Ok(Self {
            world,
            connection: Some(connection),
            clock,
            timestep: FixedTimestep::new(),
            events: VecDeque::new(),
            stats,
            fx: TickEffects::default(),
        })
    }

    /// Resolve `server`, bind an ephemeral socket, and ask to play.
    pub fn join(
        server: &str,
        name: &str,
        transport: TransportConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConnectError> {
        let server_addr = resolve_server(server)?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(ConnectError::Bind)?;
        socket.set_nonblocking(true).map_err(ConnectError::Bind)?;

        let world = World::new(false, AiDifficulty::Easy);

        let inbound = Arc::new(MessageQueue::new());
        let outbound = Arc::new(MessageQueue::new());
        let topology = Arc::new(Mutex::new(Topology::new()));
        let stats = Arc::new(Mutex::new(NetworkStats::default()));

        let connection = NetworkConnection::new(
            Role::Client,
            Arc::clone(&inbound),
            Arc::clone(&outbound),
            Arc::clone(&topology),
        );
        connection.send_to_server(MessageBody::CanIPlay {
            version: PROTOCOL_VERSION,
            name: name.to_string(),
        });

        let shared = WorkerShared {
            inbound,
            outbound,
            topology,
            clock: Arc::clone(&clock),
            stats: Arc::clone(&stats),
        };
        let worker = spawn_client_worker(socket, server_addr, shared, transport)
            .map_err(ConnectError::Spawn)?;

        let mut connection = connection;
        connection.set_worker(worker);

        log::info!("connecting to {server_addr} as {name}");

        Ok(Self {
            world,
            connection: Some(connection),
            clock,
            timestep: FixedTimestep::new(),
            events: VecDeque::new(),
            stats,
            fx: TickEffects::default(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.connection.as_ref().map(|c| c.role)
    }

    pub fn local_character(&self) -> Option<CharacterId> {
        self.world.local_character
    }

    pub fn half_ping_ms(&self) -> u32 {
        self.connection
            .as_ref()
            .map(|c| c.half_ping_ms())
            .unwrap_or(0)
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn players_waiting(&self) -> u8 {
        self.connection
            .as_ref()
            .map(|c| c.players_waiting)
            .unwrap_or(0)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.events.drain(..)
    }

    /// Advance the session by `delta` wall-clock seconds.
    pub fn update(&mut self, delta: f64) {
        self.timestep.accumulate(delta);
        while self.timestep.consume_tick() {
            let now = self.clock.now_ms();
            self.drain_inbound(now);
            let Some(role) = self.role() else {
                break;
            };

            if role == Role::Client {
                self.play_triggers(now);
                self.interpolate(now);
            }

            self.fx.clear();
            if role == Role::Server {
                self.world.server_tick(&mut self.fx);
            } else {
                self.world.client_tick(&mut self.fx);
            }
            self.route_effects();
            self.send_pings(now);

            if self.world.should_reset {
                self.reset_round();
            }
        }
    }

    /// Local player input for this frame.
    pub fn local_input(&mut self, direction: Direction, fire: bool) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        let Some(local) = self.world.local_character else {
            return;
        };
        match connection.role {
            Role::Server => {
                let character = self.world.character_mut(local);
                character.direction = direction;
                character.turn(direction);
                if fire {
                    let (x, y, pointing) = {
                        let c = self.world.character(local);
                        (c.position.x, c.position.y, c.pointing)
                    };
                    self.world.prepare_fire(local, x, y, pointing, 0.0);
                }
            }
            Role::Client => {
                let character = self.world.character(local);
                if direction != character.direction && character.active {
                    connection.send_to_server(MessageBody::MovementRequest { direction });
                    let deadline = self.clock.now_ms() + connection.half_ping_ms();
                    let character = self.world.character_mut(local);
                    character.predicted_direction = direction;
                    character.predicted_direction_deadline_ms = deadline;
                }
                if fire {
                    let (x, y, pointing) = {
                        let c = self.world.character(local);
                        (c.position.x, c.position.y, c.pointing)
                    };
                    // The fire step sends the request and starts the local
                    // predicted animation.
                    self.world.prepare_fire(local, x, y, pointing, 0.0);
                }
            }
        }
    }

    /// Normal shutdown path; the teardown completes when the worker's
    /// synthetic inbound `Quit` arrives.
    pub fn local_quit(&mut self) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        match connection.role {
            Role::Server => connection.send_to_clients(None, MessageBody::Quit),
            Role::Client => connection.send_to_server(MessageBody::Quit),
        }
    }

    /// Host-only: start the next round once a winner stands.
    pub fn request_new_game(&mut self) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        if connection.role == Role::Server
            && self.world.winner.is_some()
            && !self.world.should_reset
        {
            connection.send_to_clients(None, MessageBody::NewGame);
            self.world.should_reset = true;
        }
    }

    fn reset_round(&mut self) {
        let lives = self
            .connection
            .as_ref()
            .map(|c| c.character_lives)
            .unwrap_or(self.world.character(CharacterId::PinkBubbleGum).lives.max(1));
        self.world.init_round(lives, false);
    }

    fn drain_inbound(&mut self, now: u32) {
        let messages = match self.connection.as_ref() {
            Some(connection) => connection.inbound.pop_all(),
            None => return,
        };
        for message in messages {
            if self.connection.is_none() {
                break;
            }
            self.apply_message(message, now);
        }
    }

    fn apply_message(&mut self, message: GameMessage, now: u32) {
        if message.body == MessageBody::Quit {
            self.teardown();
            return;
        }
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        match message.body {
            MessageBody::PlayerJoined {
                character,
                name,
                remaining,
            } => {
                connection.players_waiting = remaining;
                {
                    let joined = self.world.character_mut(character);
                    joined.net_role = NetRole::Playing;
                    joined.name = Some(name.clone());
                }
                let slot = character.peer_slot().unwrap_or(0);
                connection.outbound.push(GameMessage::to_peer(
                    slot,
                    MessageBody::ServerAcceptance {
                        character,
                        lives: connection.character_lives,
                    },
                ));
                // Introduce everyone to everyone.
                connection.send_to_clients(
                    Some(character),
                    MessageBody::NetName {
                        character,
                        name: name.clone(),
                    },
                );
                for other in CharacterId::ALL {
                    if other == character {
                        continue;
                    }
                    if let Some(other_name) = self.world.character(other).name.clone() {
                        connection.outbound.push(GameMessage::to_peer(
                            slot,
                            MessageBody::NetName {
                                character: other,
                                name: other_name,
                            },
                        ));
                    }
                }
                if remaining == 0 {
                    connection.send_to_clients(None, MessageBody::StartGame);
                    self.events.push_back(SessionEvent::GameStarted);
                } else {
                    connection
                        .send_to_clients(None, MessageBody::PlayersWaiting { count: remaining });
                    self.events
                        .push_back(SessionEvent::WaitingForPlayers { count: remaining });
                }
                self.events
                    .push_back(SessionEvent::PeerJoined { character, name });
            }
            MessageBody::MovementRequest { direction } => {
                if let Some(character) = CharacterId::from_peer_slot(message.peer.max(0) as u8) {
                    let c = self.world.character_mut(character);
                    c.direction = direction;
                    c.turn(direction);
                }
            }
            MessageBody::FireRequest => {
                if let Some(character) = CharacterId::from_peer_slot(message.peer.max(0) as u8) {
                    let slot = message.peer.max(0) as usize;
                    let half_ping = connection.half_pings[slot].mean_ms();
                    let compensation =
                        half_ping.min(MAX_FIRE_COMPENSATION_MS) as f32 / 1000.0;
                    let (x, y, pointing) = {
                        let c = self.world.character(character);
                        (c.position.x, c.position.y, c.pointing)
                    };
                    self.world.prepare_fire(character, x, y, pointing, compensation);
                }
            }
            MessageBody::Pong { timestamp_ms } => {
                let half = now.saturating_sub(timestamp_ms) / 2;
                let slot = match connection.role {
                    Role::Server => message.peer.max(0) as usize,
                    Role::Client => 0,
                };
                connection.half_pings[slot].record(half);
            }
            MessageBody::Movement {
                character,
                x,
                y,
                direction,
                pointing,
                dead,
            } => {
                let half_ping = connection.half_ping_ms();
                if self.world.should_reset || now < half_ping {
                    return;
                }
                let mut set_directly = half_ping == 0;
                if half_ping > 0 {
                    let ring = &mut connection.movements[character.index()];
                    if ring.is_empty() {
                        set_directly = true;
                    }
                    ring.push(CharacterMovement {
                        x,
                        y,
                        direction,
                        pointing,
                        dead,
                        tick_ms: now - half_ping,
                    });
                }
                if set_directly {
                    let c = self.world.character_mut(character);
                    c.active = true;
                    c.position.x = x;
                    c.position.y = y;
                    let currently_dead = !c.is_alive();
                    if currently_dead != dead {
                        if !currently_dead {
                            c.position.z -= OBJECT_FALLING_STEP;
                        } else {
                            c.position.z = CHARACTER_ALIVE_Z;
                        }
                    }
                    c.direction = direction;
                    c.pointing = pointing;
                }
            }
            MessageBody::FireUpdate { .. }
            | MessageBody::ColorTile { .. }
            | MessageBody::TileFalling { .. }
            | MessageBody::RecoverTile { .. }
            | MessageBody::PlayerKilled { .. } => {
                if !self.world.should_reset {
                    // Played back at render time, one half-ping in the past.
                    let mut scheduled = message;
                    scheduled.ticks = now.saturating_sub(connection.half_ping_ms()).max(1);
                    connection.triggers.schedule(scheduled);
                }
            }
            MessageBody::CharacterKills { character, kills } => {
                self.world.character_mut(character).kills = kills;
            }
            MessageBody::GameStartNumber { value } => {
                self.world.start_number = value as i32;
                if value == 0 {
                    self.world.game_has_started = true;
                }
            }
            MessageBody::PlayersWaiting { count } => {
                connection.players_waiting = count;
                self.events
                    .push_back(SessionEvent::WaitingForPlayers { count });
            }
            MessageBody::NetName { character, name } => {
                self.world.character_mut(character).name = Some(name);
            }
            MessageBody::StartGame => {
                self.world
                    .character_mut(CharacterId::PinkBubbleGum)
                    .net_role = NetRole::Playing;
                self.events.push_back(SessionEvent::GameStarted);
            }
            MessageBody::NewGame => {
                self.world.should_reset = true;
                for ring in &mut connection.movements {
                    ring.clear();
                }
                connection.triggers.clear();
            }
            MessageBody::ServerAcceptance { character, lives } => {
                connection.local_character = character;
                connection.character_lives = lives;
                self.world.local_character = Some(character);
                self.world.init_round(lives, true);
                // The host seat reads as pending until StartGame arrives.
                self.world
                    .character_mut(CharacterId::PinkBubbleGum)
                    .net_role = NetRole::Pending;
                self.events
                    .push_back(SessionEvent::Accepted { character, lives });
            }
            MessageBody::LaggedOut { character } => {
                {
                    let c = self.world.character_mut(character);
                    c.name = Some("DISCON".into());
                }
                if connection.role == Role::Server {
                    self.world.character_mut(character).role = CharacterRole::Ai;
                    if let Some(slot) = character.peer_slot() {
                        connection.half_pings[slot as usize].reset();
                    }
                }
                self.events.push_back(SessionEvent::LaggedOut { character });
            }
            MessageBody::ServerRejection => {
                self.events.push_back(SessionEvent::Rejected);
            }
            _ => {}
        }
    }

    fn teardown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.join_worker();
            connection.inbound.deplete();
            connection.outbound.deplete();
        }
        for player in &mut self.world.players {
            player.net_role = NetRole::None;
            player.name = None;
            player.wins = 0;
            player.role = player.backup_role;
        }
        self.events.push_back(SessionEvent::Disconnected);
        log::info!("network session ended");
    }

    fn play_triggers(&mut self, now: u32) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let half_ping = connection.half_ping_ms();
        let render = now.saturating_sub(3 * half_ping);
        for trigger in connection.triggers.take_ready(render) {
            match trigger.body {
                MessageBody::FireUpdate {
                    x,
                    y,
                    character,
                    pointing,
                } => {
                    self.world.character_mut(character).pointing = pointing;
                    self.world.prepare_fire(character, x, y, pointing, 0.0);
                }
                MessageBody::ColorTile { character, tile } => {
                    let color = self.world.character(character).weapon.color;
                    let t = tile as usize;
                    {
                        let tile = self.world.tiles.tile_mut(t);
                        tile.color = color;
                        tile.colored_by = ColoredBy::Player(character);
                        // Crack right away unless a local prediction is
                        // already timing it.
                        if tile.cracked_deadline == 0.0 {
                            tile.cracked = true;
                        }
                        tile.predicted_color = None;
                        tile.predicted_color_time = 0.0;
                    }
                    self.world.clear_predictions_for(character);
                }
                MessageBody::TileFalling { tile, dead } => {
                    let t = self.world.tiles.tile_mut(tile as usize);
                    if dead {
                        t.is_dead = true;
                    } else {
                        t.in_play = false;
                    }
                    t.position.z -= OBJECT_FALLING_STEP;
                    self.events
                        .push_back(SessionEvent::Sound(SoundKind::TileFalling));
                }
                MessageBody::RecoverTile { tile } => {
                    self.world.tiles.restore(tile as usize);
                }
                MessageBody::PlayerKilled { character, lives } => {
                    {
                        let c = self.world.character_mut(character);
                        c.lives = lives;
                        c.active = false;
                    }
                    self.world.note_elimination(character);
                    self.world.character_mut(character).position.z -= OBJECT_FALLING_STEP;
                }
                _ => {}
            }
        }
    }

    fn interpolate(&mut self, now: u32) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if now == 0 {
            return;
        }
        let half_ping = connection.half_ping_ms();
        let render = now.saturating_sub(3 * half_ping);

        for id in CharacterId::ALL {
            if let Some((mut prev, next)) = connection.movements[id.index()].window_at(render) {
                interpolate_character(
                    self.world.character_mut(id),
                    half_ping,
                    &mut prev,
                    &next,
                );
            }
        }
        for id in CharacterId::ALL {
            resolve_discrepancy(self.world.character_mut(id), TICK_DT as f32);
        }
    }

    fn route_effects(&mut self) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        for outgoing in self.fx.outgoing.drain(..) {
            match outgoing {
                Outgoing::Broadcast { except, body } => {
                    if connection.role == Role::Server {
                        connection.send_to_clients(except, body);
                    }
                }
                Outgoing::ToServer(body) => {
                    if connection.role == Role::Client {
                        connection.send_to_server(body);
                    }
                }
            }
        }
        for sound in self.fx.sounds.drain(..) {
            self.events.push_back(SessionEvent::Sound(sound));
        }
    }

    fn send_pings(&mut self, now: u32) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if now.saturating_sub(connection.last_ping_ms) < PING_INTERVAL_MS {
            return;
        }
        connection.last_ping_ms = now;
        match connection.role {
            Role::Server => {
                connection.send_to_clients(None, MessageBody::Ping { timestamp_ms: now })
            }
            Role::Client => connection.send_to_server(MessageBody::Ping { timestamp_ms: now }),
        }
    }
}

fn resolve_server(server: &str) -> Result<SocketAddr, ConnectError> {
    let lookup = |input: &str| -> Option<SocketAddr> {
        input.to_socket_addrs().ok().and_then(|mut a| a.next())
    };
    if server.contains(':') {
        if let Some(addr) = lookup(server) {
            return Ok(addr);
        }
    } else if let Some(addr) = lookup(&format!("{server}:{DEFAULT_PORT}")) {
        return Ok(addr);
    }
    Err(ConnectError::Resolve(server.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_appends_default_port() {
        let addr = resolve_server("127.0.0.1").unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
        let addr = resolve_server("127.0.0.1:9999").unwrap();
        assert_eq!(addr.port(), 9999);
    }

    #[test]
    fn resolve_rejects_garbage() {
        assert!(matches!(
            resolve_server("not a host name"),
            Err(ConnectError::Resolve(_))
        ));
    }
}
