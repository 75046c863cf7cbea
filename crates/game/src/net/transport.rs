use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::sim::character::CharacterId;
use crate::time::Clock;

use super::connection::{ClientState, MAX_PEERS, Topology};
use super::protocol::{
    self, GameMessage, MAX_MESSAGE_SIZE, MAX_PACKET_SIZE, MessageBody, MessageChannel,
    PROTOCOL_VERSION, Role,
};
use super::queue::MessageQueue;
use super::stats::{NetworkStats, PacketLossSimulation};
use super::tracking::{AckRing, RealtimeInbound, TriggerInbound};

/// Minimum worker cycle period. Doubles as the effective retransmission
/// interval, since unacked reliable messages are re-enqueued every drain.
pub const WORKER_TICK_MS: u32 = 5;

/// A peer that has not answered a ping for this long is gone.
pub const LIVENESS_TIMEOUT_MS: u32 = 4000;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub liveness_timeout_ms: u32,
    pub worker_tick_ms: u32,
    pub loss: PacketLossSimulation,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_ms: LIVENESS_TIMEOUT_MS,
            worker_tick_ms: WORKER_TICK_MS,
            loss: PacketLossSimulation::default(),
        }
    }
}

/// State shared between the simulation task and a transport worker.
#[derive(Clone)]
pub struct WorkerShared {
    pub inbound: Arc<MessageQueue>,
    pub outbound: Arc<MessageQueue>,
    pub topology: Arc<Mutex<Topology>>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<Mutex<NetworkStats>>,
}

pub fn spawn_server_worker(
    socket: UdpSocket,
    shared: WorkerShared,
    players_to_wait_for: u8,
    config: TransportConfig,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("sc-net-server".into())
        .spawn(move || ServerWorker::new(socket, shared, players_to_wait_for, config).run())
}

pub fn spawn_client_worker(
    socket: UdpSocket,
    server_addr: SocketAddr,
    shared: WorkerShared,
    config: TransportConfig,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("sc-net-client".into())
        .spawn(move || ClientWorker::new(socket, server_addr, shared, config).run())
}

fn coalesce_outbound(messages: &[GameMessage]) -> Vec<bool> {
    let mut skip = vec![false; messages.len()];
    let mut seen_movement = [[false; 4]; MAX_PEERS];
    let mut seen_ping = [false; MAX_PEERS + 1];
    for i in (0..messages.len()).rev() {
        match &messages[i].body {
            MessageBody::Movement { character, .. } if messages[i].peer >= 0 => {
                let slot = messages[i].peer as usize % MAX_PEERS;
                let index = character.index();
                if seen_movement[slot][index] {
                    skip[i] = true;
                } else {
                    seen_movement[slot][index] = true;
                }
            }
            MessageBody::Ping { .. } => {
                let slot = if messages[i].peer >= 0 {
                    messages[i].peer as usize % MAX_PEERS
                } else {
                    MAX_PEERS
                };
                if seen_ping[slot] {
                    skip[i] = true;
                } else {
                    seen_ping[slot] = true;
                }
            }
            _ => {}
        }
    }
    skip
}

struct ServerWorker {
    socket: UdpSocket,
    shared: WorkerShared,
    config: TransportConfig,
    waiting: u8,
    trigger_out: [u32; MAX_PEERS],
    realtime_out: [u32; MAX_PEERS],
    trigger_in: [TriggerInbound; MAX_PEERS],
    acks: [AckRing; MAX_PEERS],
    last_pong_ms: [u32; MAX_PEERS],
    bufs: Box<[[u8; MAX_PACKET_SIZE]; MAX_PEERS]>,
    lens: [usize; MAX_PEERS],
    rng: SmallRng,
    quitting: bool,
}

impl ServerWorker {
    fn new(
        socket: UdpSocket,
        shared: WorkerShared,
        players_to_wait_for: u8,
        config: TransportConfig,
    ) -> Self {
        Self {
            socket,
            shared,
            config,
            waiting: players_to_wait_for,
            trigger_out: [1; MAX_PEERS],
            realtime_out: [1; MAX_PEERS],
            trigger_in: Default::default(),
            acks: Default::default(),
            last_pong_ms: [0; MAX_PEERS],
            bufs: Box::new([[0; MAX_PACKET_SIZE]; MAX_PEERS]),
            lens: [0; MAX_PEERS],
            rng: SmallRng::from_entropy(),
            quitting: false,
        }
    }

    fn run(mut self) {
        loop {
            let cycle_start = self.shared.clock.now_ms();

            self.flush_outbound();
            if self.quitting {
                self.shared.inbound.push(GameMessage::new(MessageBody::Quit));
                return;
            }

            self.check_liveness(self.shared.clock.now_ms());
            self.receive();
            if self.quitting {
                self.shared.inbound.push(GameMessage::new(MessageBody::Quit));
                return;
            }

            let elapsed = self.shared.clock.now_ms().saturating_sub(cycle_start);
            if elapsed < self.config.worker_tick_ms {
                std::thread::sleep(Duration::from_millis(
                    (self.config.worker_tick_ms - elapsed) as u64,
                ));
            }
        }
    }

    fn peer_addrs(&self) -> [Option<SocketAddr>; MAX_PEERS] {
        self.shared.topology.lock().unwrap().peer_addrs
    }

    fn flush_outbound(&mut self) {
        let messages = self.shared.outbound.pop_all();
        if messages.is_empty() {
            return;
        }
        let addrs = self.peer_addrs();
        let skip = coalesce_outbound(&messages);
        let mut retransmit = Vec::new();

        for (message, skipped) in messages.into_iter().zip(skip) {
            if self.quitting && message.body != MessageBody::Quit {
                continue;
            }
            let mut message = message;
            match message.channel() {
                MessageChannel::Trigger => {
                    let Some(slot) = peer_slot(&message) else {
                        continue;
                    };
                    // A cleared address means the peer is gone; stop
                    // retransmitting into the void.
                    if addrs[slot].is_none() {
                        continue;
                    }
                    if message.seq == 0 {
                        message.seq = self.trigger_out[slot];
                        self.trigger_out[slot] += 1;
                    } else if self.acks[slot].contains(message.seq) {
                        continue;
                    }
                    // Keep re-sending until the ack comes back.
                    retransmit.push(message.clone());
                    self.append(slot, &message, addrs[slot]);
                }
                MessageChannel::Realtime => {
                    if skipped {
                        continue;
                    }
                    let Some(slot) = peer_slot(&message) else {
                        continue;
                    };
                    message.seq = self.realtime_out[slot];
                    self.realtime_out[slot] += 1;
                    self.append(slot, &message, addrs[slot]);
                }
                MessageChannel::Control => match &message.body {
                    MessageBody::Quit => {
                        if let Some(slot) = peer_slot(&message) {
                            if let Some(addr) = addrs[slot] {
                                let mut quit = [0u8; MAX_MESSAGE_SIZE];
                                let n = protocol::encode_into(&message, &mut quit);
                                self.send_packet(&quit[..n], addr);
                            }
                        }
                        self.quitting = true;
                    }
                    MessageBody::Ping { .. } => {
                        if skipped {
                            continue;
                        }
                        if let Some(slot) = peer_slot(&message) {
                            self.append(slot, &message, addrs[slot]);
                        }
                    }
                    MessageBody::Ack | MessageBody::Pong { .. } => {
                        if let Some(slot) = peer_slot(&message) {
                            self.append(slot, &message, addrs[slot]);
                        }
                    }
                    _ => {}
                },
            }
        }

        for slot in 0..MAX_PEERS {
            if self.lens[slot] > 0 {
                if let Some(addr) = addrs[slot] {
                    let packet: Vec<u8> = self.bufs[slot][..self.lens[slot]].to_vec();
                    self.send_packet(&packet, addr);
                }
                self.lens[slot] = 0;
            }
        }

        self.shared.outbound.push_all(retransmit);
    }

    fn append(&mut self, slot: usize, message: &GameMessage, addr: Option<SocketAddr>) {
        let Some(addr) = addr else {
            return;
        };
        let at = self.lens[slot];
        let written = protocol::encode_into(message, &mut self.bufs[slot][at..]);
        self.lens[slot] = at + written;
        if self.lens[slot] >= MAX_PACKET_SIZE - MAX_MESSAGE_SIZE {
            let packet: Vec<u8> = self.bufs[slot][..self.lens[slot]].to_vec();
            self.send_packet(&packet, addr);
            self.lens[slot] = 0;
        }
    }

    fn send_packet(&mut self, data: &[u8], addr: SocketAddr) {
        if self.config.loss.should_drop(&mut self.rng) {
            self.shared.stats.lock().unwrap().simulated_drops += 1;
            return;
        }
        match self.socket.send_to(data, addr) {
            Ok(bytes) => {
                let mut stats = self.shared.stats.lock().unwrap();
                stats.packets_sent += 1;
                stats.bytes_sent += bytes as u64;
            }
            Err(e) => log::debug!("send to {addr} failed: {e}"),
        }
    }

    fn check_liveness(&mut self, now: u32) {
        for slot in 0..MAX_PEERS {
            if self.last_pong_ms[slot] != 0
                && now.saturating_sub(self.last_pong_ms[slot]) >= self.config.liveness_timeout_ms
            {
                self.disconnect_peer(slot as u8);
            }
        }
    }

    fn disconnect_peer(&mut self, slot: u8) {
        let character = CharacterId::from_peer_slot(slot).unwrap();
        log::info!("peer {slot} ({character:?}) disconnected");

        let others: Vec<u8> = {
            let mut topology = self.shared.topology.lock().unwrap();
            topology.client_states[slot as usize] = ClientState::Dead;
            topology.peer_addrs[slot as usize] = None;
            (0..topology.current_slot)
                .filter(|&other| other != slot && topology.is_alive(other))
                .collect()
        };
        for other in others {
            self.shared.outbound.push(GameMessage::to_peer(
                other,
                MessageBody::LaggedOut { character },
            ));
        }
        self.shared
            .inbound
            .push(GameMessage::to_peer(slot, MessageBody::LaggedOut { character }));

        self.last_pong_ms[slot as usize] = 0;
    }

    fn receive(&mut self) {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    {
                        let mut stats = self.shared.stats.lock().unwrap();
                        stats.packets_received += 1;
                        stats.bytes_received += len as u64;
                    }
                    let now = self.shared.clock.now_ms();
                    self.handle_datagram(addr, &buf[..len], now);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::debug!("recv failed: {e}");
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, addr: SocketAddr, data: &[u8], now: u32) {
        let mut at = 0;
        while at < data.len() {
            match protocol::decode(Role::Server, &data[at..]) {
                Ok((message, used)) => {
                    at += used;
                    self.dispatch(addr, message, now);
                }
                Err(e) => {
                    // One bad datagram must not kill the peer; drop the rest.
                    log::debug!("dropping datagram tail from {addr}: {e}");
                    self.shared.stats.lock().unwrap().decode_errors += 1;
                    break;
                }
            }
        }
    }

    fn slot_for(&self, addr: SocketAddr) -> Option<u8> {
        self.shared.topology.lock().unwrap().slot_for_addr(addr)
    }

    fn dispatch(&mut self, addr: SocketAddr, message: GameMessage, now: u32) {
        match message.body {
            MessageBody::CanIPlay { version, name } => {
                self.handle_can_i_play(addr, message.seq, version, name, now);
            }
            MessageBody::MovementRequest { .. } | MessageBody::FireRequest => {
                let Some(slot) = self.slot_for(addr) else {
                    return;
                };
                if self.trigger_in[slot as usize].accept(message.seq) {
                    let mut delivered = message;
                    delivered.peer = slot as i8;
                    self.shared.inbound.push(delivered);
                    self.queue_ack(slot, self.trigger_in[slot as usize].delivered());
                } else if self.trigger_in[slot as usize].should_ack(message.seq) {
                    self.queue_ack(slot, message.seq);
                }
            }
            MessageBody::Ack => {
                if let Some(slot) = self.slot_for(addr) {
                    self.acks[slot as usize].record(message.seq);
                }
            }
            MessageBody::Ping { timestamp_ms } => {
                if let Some(slot) = self.slot_for(addr) {
                    self.shared
                        .outbound
                        .push(GameMessage::to_peer(slot, MessageBody::Pong { timestamp_ms }));
                }
            }
            MessageBody::Pong { timestamp_ms } => {
                if let Some(slot) = self.slot_for(addr) {
                    self.last_pong_ms[slot as usize] = now;
                    self.shared
                        .inbound
                        .push(GameMessage::to_peer(slot, MessageBody::Pong { timestamp_ms }));
                }
            }
            MessageBody::Quit => {
                if let Some(slot) = self.slot_for(addr) {
                    self.disconnect_peer(slot);
                }
            }
            _ => {}
        }
    }

    fn handle_can_i_play(
        &mut self,
        addr: SocketAddr,
        seq: u32,
        version: u8,
        name: String,
        now: u32,
    ) {
        let existing = self.slot_for(addr);
        let acceptable =
            version == PROTOCOL_VERSION && seq == 1 && (existing.is_some() || self.waiting > 0);

        if !acceptable {
            if existing.is_none() {
                let rejection = GameMessage::new(MessageBody::ServerRejection);
                let mut out = [0u8; MAX_MESSAGE_SIZE];
                let n = protocol::encode_into(&rejection, &mut out);
                self.send_packet(&out[..n], addr);
            }
            return;
        }

        let slot = match existing {
            Some(slot) => slot,
            None => {
                let slot = {
                    let mut topology = self.shared.topology.lock().unwrap();
                    if topology.current_slot as usize >= MAX_PEERS {
                        return;
                    }
                    let slot = topology.current_slot;
                    topology.peer_addrs[slot as usize] = Some(addr);
                    topology.client_states[slot as usize] = ClientState::Alive;
                    topology.current_slot += 1;
                    slot
                };
                // The slot-claiming CanIPlay counts as delivered seq 1.
                self.trigger_in[slot as usize].force_delivered(1);
                self.last_pong_ms[slot as usize] = now;
                self.waiting -= 1;
                let character = CharacterId::from_peer_slot(slot).unwrap();
                log::info!("{name} joined as {character:?} (slot {slot})");
                self.shared.inbound.push(GameMessage::to_peer(
                    slot,
                    MessageBody::PlayerJoined {
                        character,
                        name,
                        remaining: self.waiting,
                    },
                ));
                slot
            }
        };

        if self.trigger_in[slot as usize].should_ack(seq) {
            self.queue_ack(slot, seq);
        }
    }

    fn queue_ack(&mut self, slot: u8, seq: u32) {
        let mut ack = GameMessage::to_peer(slot, MessageBody::Ack);
        ack.seq = seq;
        self.shared.outbound.push(ack);
    }
}

fn peer_slot(message: &GameMessage) -> Option<usize> {
    (message.peer >= 0 && (message.peer as usize) < MAX_PEERS).then(|| message.peer as usize)
}

struct ClientWorker {
    socket: UdpSocket,
    server_addr: SocketAddr,
    shared: WorkerShared,
    config: TransportConfig,
    trigger_out: u32,
    trigger_in: TriggerInbound,
    realtime_in: RealtimeInbound,
    acks: AckRing,
    last_pong_ms: u32,
    buf: Box<[u8; MAX_PACKET_SIZE]>,
    len: usize,
    rng: SmallRng,
    quitting: bool,
}

impl ClientWorker {
    fn new(
        socket: UdpSocket,
        server_addr: SocketAddr,
        shared: WorkerShared,
        config: TransportConfig,
    ) -> Self {
        let last_pong_ms = shared.clock.now_ms();
        Self {
            socket,
            server_addr,
            shared,
            config,
            trigger_out: 1,
            trigger_in: TriggerInbound::new(),
            realtime_in: RealtimeInbound::new(),
            acks: AckRing::new(),
            last_pong_ms,
            buf: Box::new([0; MAX_PACKET_SIZE]),
            len: 0,
            rng: SmallRng::from_entropy(),
            quitting: false,
        }
    }

    fn run(mut self) {
        loop {
            let cycle_start = self.shared.clock.now_ms();

            self.flush_outbound();

            if !self.quitting
                && self
                    .shared
                    .clock
                    .now_ms()
                    .saturating_sub(self.last_pong_ms)
                    >= self.config.liveness_timeout_ms
            {
                log::warn!("server went silent, giving up");
                self.quitting = true;
            }

            if !self.quitting {
                self.receive();
            }

            if self.quitting {
                self.shared.inbound.push(GameMessage::new(MessageBody::Quit));
                return;
            }

            let elapsed = self.shared.clock.now_ms().saturating_sub(cycle_start);
            if elapsed < self.config.worker_tick_ms {
                std::thread::sleep(Duration::from_millis(
                    (self.config.worker_tick_ms - elapsed) as u64,
                ));
            }
        }
    }

    fn flush_outbound(&mut self) {
        let messages = self.shared.outbound.pop_all();
        if messages.is_empty() {
            return;
        }
        let skip = coalesce_outbound(&messages);
        let mut retransmit = Vec::new();

        for (message, skipped) in messages.into_iter().zip(skip) {
            if self.quitting && message.body != MessageBody::Quit {
                continue;
            }
            let mut message = message;
            match message.channel() {
                MessageChannel::Trigger => {
                    if message.seq == 0 {
                        message.seq = self.trigger_out;
                        self.trigger_out += 1;
                    } else if self.acks.contains(message.seq) {
                        continue;
                    }
                    retransmit.push(message.clone());
                    self.append(&message);
                }
                MessageChannel::Realtime => {}
                MessageChannel::Control => match &message.body {
                    MessageBody::Quit => {
                        let mut quit = [0u8; MAX_MESSAGE_SIZE];
                        let n = protocol::encode_into(&message, &mut quit);
                        self.send_packet_raw(&quit[..n]);
                        self.quitting = true;
                    }
                    MessageBody::Ping { .. } => {
                        if !skipped {
                            self.append(&message);
                        }
                    }
                    MessageBody::Ack | MessageBody::Pong { .. } => {
                        self.append(&message);
                    }
                    _ => {}
                },
            }
        }

        if self.len > 0 {
            let packet: Vec<u8> = self.buf[..self.len].to_vec();
            self.send_packet_raw(&packet);
            self.len = 0;
        }

        self.shared.outbound.push_all(retransmit);
    }

    fn append(&mut self, message: &GameMessage) {
        let written = protocol::encode_into(message, &mut self.buf[self.len..]);
        self.len += written;
        if self.len >= MAX_PACKET_SIZE - MAX_MESSAGE_SIZE {
            let packet: Vec<u8> = self.buf[..self.len].to_vec();
            self.send_packet_raw(&packet);
            self.len = 0;
        }
    }

    fn send_packet_raw(&mut self, data: &[u8]) {
        if self.config.loss.should_drop(&mut self.rng) {
            self.shared.stats.lock().unwrap().simulated_drops += 1;
            return;
        }
        match self.socket.send_to(data, self.server_addr) {
            Ok(bytes) => {
                let mut stats = self.shared.stats.lock().unwrap();
                stats.packets_sent += 1;
                stats.bytes_sent += bytes as u64;
            }
            Err(e) => log::debug!("send failed: {e}"),
        }
    }

    fn receive(&mut self) {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    if addr != self.server_addr {
                        continue;
                    }
                    {
                        let mut stats = self.shared.stats.lock().unwrap();
                        stats.packets_received += 1;
                        stats.bytes_received += len as u64;
                    }
                    let now = self.shared.clock.now_ms();
                    self.handle_datagram(&buf[..len], now);
                    if self.quitting {
                        return;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::debug!("recv failed: {e}");
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8], now: u32) {
        let mut at = 0;
        while at < data.len() && !self.quitting {
            match protocol::decode(Role::Client, &data[at..]) {
                Ok((message, used)) => {
                    at += used;
                    self.dispatch(message, now);
                }
                Err(e) => {
                    log::debug!("dropping datagram tail: {e}");
                    self.shared.stats.lock().unwrap().decode_errors += 1;
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, message: GameMessage, now: u32) {
        match &message.body {
            MessageBody::ServerRejection => {
                self.shared
                    .inbound
                    .push(GameMessage::new(MessageBody::ServerRejection));
                self.quitting = true;
            }
            MessageBody::Quit => {
                self.quitting = true;
            }
            MessageBody::Movement { .. } => {
                if self.realtime_in.fresher(message.seq) {
                    self.shared.inbound.push(message);
                }
            }
            MessageBody::Ack => {
                self.acks.record(message.seq);
            }
            MessageBody::Ping { timestamp_ms } => {
                self.shared.outbound.push(GameMessage::new(MessageBody::Pong {
                    timestamp_ms: *timestamp_ms,
                }));
            }
            MessageBody::Pong { .. } => {
                self.last_pong_ms = now;
                self.shared.inbound.push(message);
            }
            MessageBody::ServerAcceptance { .. }
            | MessageBody::PlayersWaiting { .. }
            | MessageBody::NetName { .. }
            | MessageBody::StartGame
            | MessageBody::GameStartNumber { .. }
            | MessageBody::FireUpdate { .. }
            | MessageBody::PlayerKilled { .. }
            | MessageBody::CharacterKills { .. }
            | MessageBody::ColorTile { .. }
            | MessageBody::TileFalling { .. }
            | MessageBody::RecoverTile { .. }
            | MessageBody::NewGame
            | MessageBody::LaggedOut { .. } => {
                if self.trigger_in.accept(message.seq) {
                    self.queue_ack(message.seq);
                    self.shared.inbound.push(message);
                } else if self.trigger_in.should_ack(message.seq) {
                    self.queue_ack(message.seq);
                }
            }
            _ => {}
        }
    }

    fn queue_ack(&mut self, seq: u32) {
        let mut ack = GameMessage::new(MessageBody::Ack);
        ack.seq = seq;
        self.shared.outbound.push(ack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::character::Direction;

    fn movement(peer: i8, character: CharacterId) -> GameMessage {
        let mut message = GameMessage::new(MessageBody::Movement {
            character,
            x: 0.0,
            y: 0.0,
            direction: Direction::None,
            pointing: Direction::Right,
            dead: false,
        });
        message.peer = peer;
        message
    }

    #[test]
    fn coalescing_keeps_newest_movement_per_peer_and_character() {
        let messages = vec![
            movement(0, CharacterId::RedRover),
            movement(0, CharacterId::GreenTree),
            movement(0, CharacterId::RedRover),
            movement(1, CharacterId::RedRover),
        ];
        let skip = coalesce_outbound(&messages);
        assert_eq!(skip, vec![true, false, false, false]);
    }

    #[test]
    fn coalescing_keeps_newest_ping_per_peer() {
        let mut ping0 = GameMessage::new(MessageBody::Ping { timestamp_ms: 1 });
        ping0.peer = 0;
        let mut ping1 = GameMessage::new(MessageBody::Ping { timestamp_ms: 2 });
        ping1.peer = 0;
        let other = GameMessage::new(MessageBody::StartGame);
        let skip = coalesce_outbound(&[ping0, other, ping1]);
        assert_eq!(skip, vec![true, false, false]);
    }

    #[test]
    fn coalescing_handles_peerless_client_pings() {
        let ping0 = GameMessage::new(MessageBody::Ping { timestamp_ms: 1 });
        let ping1 = GameMessage::new(MessageBody::Ping { timestamp_ms: 2 });
        let skip = coalesce_outbound(&[ping0, ping1]);
        assert_eq!(skip, vec![true, false]);
    }
}
