use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::sim::character::{CharacterId, Direction};

use super::protocol::{BROADCAST_PEER, GameMessage, MessageBody, Role};
use super::queue::MessageQueue;

pub const MAX_PEERS: usize = 3;
pub const CHARACTER_MOVEMENTS_CAPACITY: usize = 20;
pub const HALF_PING_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Alive,
    Dead,
}

/// The one piece of connection state both tasks touch: slot assignment and
/// the peer address book. Guarded by a single mutex.
#[derive(Debug, Default)]
pub struct Topology {
    pub current_slot: u8,
    pub client_states: [ClientState; MAX_PEERS],
    pub peer_addrs: [Option<SocketAddr>; MAX_PEERS],
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot_for_addr(&self, addr: SocketAddr) -> Option<u8> {
        (0..self.current_slot).find(|&slot| self.peer_addrs[slot as usize] == Some(addr))
    }

    pub fn is_alive(&self, slot: u8) -> bool {
        slot < self.current_slot && self.client_states[slot as usize] == ClientState::Alive
    }
}

/// Moving average of one-way latency over the last ten samples.
#[derive(Debug, Clone, Default)]
pub struct HalfPing {
    samples: [u32; HALF_PING_SAMPLES],
    next: usize,
    mean: u32,
}

impl HalfPing {
    pub fn record(&mut self, half_ping_ms: u32) {
        self.samples[self.next % HALF_PING_SAMPLES] = half_ping_ms;
        self.next += 1;
        let mut sum = 0u32;
        let mut count = 0u32;
        for &sample in &self.samples {
            if sample != 0 {
                sum += sample;
                count += 1;
            }
        }
        self.mean = if count > 0 { sum / count } else { 0 };
    }

    pub fn mean_ms(&self) -> u32 {
        self.mean
    }

    pub fn reset(&mut self) {
        *self = HalfPing::default();
    }
}

/// One authoritative character snapshot as received over the realtime
/// channel, stamped with the estimated server time it describes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterMovement {
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    pub pointing: Direction,
    pub dead: bool,
    pub tick_ms: u32,
}

/// Fixed-capacity history of past movements per character; appends wrap
/// once full.
#[derive(Debug)]
pub struct MovementRing {
    entries: [CharacterMovement; CHARACTER_MOVEMENTS_CAPACITY],
    count: u32,
}

impl MovementRing {
    pub fn new() -> Self {
        Self {
            entries: [CharacterMovement::default(); CHARACTER_MOVEMENTS_CAPACITY],
            count: 0,
        }
    }

    pub fn push(&mut self, movement: CharacterMovement) {
        self.entries[self.count as usize % CHARACTER_MOVEMENTS_CAPACITY] = movement;
        self.count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// The newest entry at or before `render_ms` together with its
    /// successor; `None` if the render time falls outside the buffered
    /// window.
    pub fn window_at(&self, render_ms: u32) -> Option<(CharacterMovement, CharacterMovement)> {
        let available = (self.count as usize).min(CHARACTER_MOVEMENTS_CAPACITY) as u32;
        if available == 0 {
            return None;
        }
        let newest = self.count - 1;
        for back in 0..available {
            let index = newest - back;
            let entry = self.entries[index as usize % CHARACTER_MOVEMENTS_CAPACITY];
            if entry.tick_ms <= render_ms {
                if back == 0 {
                    return None;
                }
                let next = self.entries[(index as usize + 1) % CHARACTER_MOVEMENTS_CAPACITY];
                return Some((entry, next));
            }
        }
        None
    }
}

impl Default for MovementRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger messages waiting for their playback time on the client.
/// Consumed slots (ticks == 0) are reused before the queue grows.
#[derive(Debug, Default)]
pub struct TriggerQueue {
    entries: Vec<GameMessage>,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, message: GameMessage) {
        debug_assert!(message.ticks != 0);
        if let Some(slot) = self.entries.iter_mut().find(|m| m.ticks == 0) {
            *slot = message;
        } else {
            self.entries.push(message);
        }
    }

    /// Pull every message due at `render_ms`, preserving insertion order.
    pub fn take_ready(&mut self, render_ms: u32) -> Vec<GameMessage> {
        let mut ready = Vec::new();
        for entry in &mut self.entries {
            if entry.ticks != 0 && render_ms >= entry.ticks {
                ready.push(entry.clone());
                entry.ticks = 0;
            }
        }
        ready
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Simulation-task handle to an active connection. The worker thread holds
/// clones of the queues and topology; everything else here is private to
/// the simulation task.
pub struct NetworkConnection {
    pub role: Role,
    pub inbound: Arc<MessageQueue>,
    pub outbound: Arc<MessageQueue>,
    pub topology: Arc<Mutex<Topology>>,
    worker: Option<JoinHandle<()>>,

    /// Per-peer one-way latency estimates; clients use slot 0 for the
    /// server.
    pub half_pings: [HalfPing; MAX_PEERS],
    pub movements: [MovementRing; 4],
    pub triggers: TriggerQueue,
    pub character_lives: u8,
    pub local_character: CharacterId,
    pub players_waiting: u8,
    pub last_ping_ms: u32,
}

impl NetworkConnection {
    pub fn new(
        role: Role,
        inbound: Arc<MessageQueue>,
        outbound: Arc<MessageQueue>,
        topology: Arc<Mutex<Topology>>,
    ) -> Self {
        Self {
            role,
            inbound,
            outbound,
            topology,
            worker: None,
            half_pings: Default::default(),
            movements: Default::default(),
            triggers: TriggerQueue::new(),
            character_lives: 0,
            local_character: CharacterId::PinkBubbleGum,
            players_waiting: 0,
            last_ping_ms: 0,
        }
    }

    pub fn set_worker(&mut self, handle: JoinHandle<()>) {
        self.worker = Some(handle);
    }

    pub fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::warn!("transport worker panicked");
            }
        }
    }

    /// Client-side one-way latency to the server.
    pub fn half_ping_ms(&self) -> u32 {
        self.half_pings[0].mean_ms()
    }

    pub fn send_to_server(&self, body: MessageBody) {
        debug_assert!(self.role == Role::Client);
        self.outbound.push(GameMessage::new(body));
    }

    /// Queue `body` for every live peer, optionally skipping the peer that
    /// controls `except`. A `Quit` also gets a peerless copy so the worker
    /// shuts down even with no clients connected.
    pub fn send_to_clients(&self, except: Option<CharacterId>, body: MessageBody) {
        debug_assert!(self.role == Role::Server);
        let skip = except.and_then(CharacterId::peer_slot);
        let mut batch = Vec::new();
        {
            let topology = self.topology.lock().unwrap();
            for slot in 0..topology.current_slot {
                if Some(slot) == skip || !topology.is_alive(slot) {
                    continue;
                }
                batch.push(GameMessage::to_peer(slot, body.clone()));
            }
        }
        if body == MessageBody::Quit {
            let mut message = GameMessage::new(body);
            message.peer = BROADCAST_PEER;
            batch.push(message);
        }
        self.outbound.push_all(batch);
    }
}
