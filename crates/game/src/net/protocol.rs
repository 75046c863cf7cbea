use thiserror::Error;

use crate::sim::character::{CharacterId, Direction};

/// Bump on any incompatible wire change.
pub const PROTOCOL_VERSION: u8 = 2;
pub const DEFAULT_PORT: u16 = 4893;

/// Soft cap for one datagram; buffers flush once a message might not fit.
pub const MAX_PACKET_SIZE: usize = 500;
pub const MAX_MESSAGE_SIZE: usize = 32;

/// Names occupy 12-byte buffers in memory and 11 NUL-padded bytes on the
/// wire.
pub const NET_NAME_SIZE: usize = 12;
const WIRE_NAME_LEN: usize = NET_NAME_SIZE - 1;

const TAG_CAN_I_PLAY: u8 = 1;
const TAG_MOVEMENT_REQUEST: u8 = 2;
const TAG_FIRE: u8 = 3;
const TAG_ACK: u8 = 4;
const TAG_PING: u8 = 5;
const TAG_PONG: u8 = 6;
const TAG_QUIT: u8 = 7;
const TAG_SERVER_REJECTION: u8 = 8;
const TAG_SERVER_ACCEPTANCE: u8 = 9;
const TAG_PLAYERS_WAITING: u8 = 10;
const TAG_NET_NAME: u8 = 11;
const TAG_START_GAME: u8 = 12;
const TAG_GAME_START_NUMBER: u8 = 13;
const TAG_MOVEMENT: u8 = 14;
const TAG_PLAYER_KILLED: u8 = 15;
const TAG_CHARACTER_KILLS: u8 = 16;
const TAG_COLOR_TILE: u8 = 17;
const TAG_TILE_FALLING: u8 = 18;
const TAG_RECOVER_TILE: u8 = 19;
const TAG_NEW_GAME: u8 = 20;
const TAG_LAGGED_OUT: u8 = 21;

/// Peer index meaning "no specific peer" (broadcast bookkeeping).
pub const BROADCAST_PEER: i8 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Delivery class of a message kind.
///
/// Trigger messages are reliable and per-peer ordered; realtime messages
/// are latest-wins; control messages bypass sequencing entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageChannel {
    Trigger,
    Realtime,
    Control,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    // Control plane.
    Quit,
    Ack,
    Ping {
        timestamp_ms: u32,
    },
    Pong {
        timestamp_ms: u32,
    },
    ServerRejection,

    // Client -> server.
    CanIPlay {
        version: u8,
        name: String,
    },
    MovementRequest {
        direction: Direction,
    },
    FireRequest,

    // Server -> client.
    ServerAcceptance {
        character: CharacterId,
        lives: u8,
    },
    PlayersWaiting {
        count: u8,
    },
    NetName {
        character: CharacterId,
        name: String,
    },
    StartGame,
    GameStartNumber {
        value: u8,
    },
    Movement {
        character: CharacterId,
        x: f32,
        y: f32,
        direction: Direction,
        pointing: Direction,
        dead: bool,
    },
    FireUpdate {
        x: f32,
        y: f32,
        character: CharacterId,
        pointing: Direction,
    },
    PlayerKilled {
        character: CharacterId,
        lives: u8,
    },
    CharacterKills {
        character: CharacterId,
        kills: u8,
    },
    ColorTile {
        character: CharacterId,
        tile: u8,
    },
    TileFalling {
        tile: u8,
        dead: bool,
    },
    RecoverTile {
        tile: u8,
    },
    NewGame,
    LaggedOut {
        character: CharacterId,
    },

    /// Worker -> simulation only, emitted when a `CanIPlay` claims a slot.
    /// Never encoded.
    PlayerJoined {
        character: CharacterId,
        name: String,
        remaining: u8,
    },
}

impl MessageBody {
    pub fn channel(&self) -> MessageChannel {
        match self {
            MessageBody::Movement { .. } => MessageChannel::Realtime,
            MessageBody::Quit
            | MessageBody::Ack
            | MessageBody::Ping { .. }
            | MessageBody::Pong { .. }
            | MessageBody::ServerRejection
            | MessageBody::PlayerJoined { .. } => MessageChannel::Control,
            _ => MessageChannel::Trigger,
        }
    }
}

/// One queued message. `seq` is zero until the transport worker assigns a
/// sequence number at first send; for realtime movement it is a freshness
/// stamp instead. `peer` is the server-side slot this message belongs to.
/// `ticks` is only used client-side to schedule trigger playback.
#[derive(Debug, Clone, PartialEq)]
pub struct GameMessage {
    pub seq: u32,
    pub peer: i8,
    pub ticks: u32,
    pub body: MessageBody,
}

impl GameMessage {
    pub fn new(body: MessageBody) -> Self {
        Self {
            seq: 0,
            peer: BROADCAST_PEER,
            ticks: 0,
            body,
        }
    }

    pub fn to_peer(peer: u8, body: MessageBody) -> Self {
        Self {
            seq: 0,
            peer: peer as i8,
            ticks: 0,
            body,
        }
    }

    pub fn channel(&self) -> MessageChannel {
        self.body.channel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("{0} out of range")]
    BadField(&'static str),
}

struct Writer<'a> {
    out: &'a mut [u8],
    at: usize,
}

impl<'a> Writer<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self { out, at: 0 }
    }

    fn u8(&mut self, value: u8) {
        self.out[self.at] = value;
        self.at += 1;
    }

    fn u32(&mut self, value: u32) {
        self.out[self.at..self.at + 4].copy_from_slice(&value.to_le_bytes());
        self.at += 4;
    }

    fn f32(&mut self, value: f32) {
        self.out[self.at..self.at + 4].copy_from_slice(&value.to_le_bytes());
        self.at += 4;
    }

    fn name(&mut self, name: &str) {
        let mut padded = [0u8; WIRE_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(WIRE_NAME_LEN);
        padded[..len].copy_from_slice(&bytes[..len]);
        self.out[self.at..self.at + WIRE_NAME_LEN].copy_from_slice(&padded);
        self.at += WIRE_NAME_LEN;
    }
}

struct Reader<'a> {
    input: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, at: 0 }
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        let value = *self.input.get(self.at).ok_or(WireError::Truncated)?;
        self.at += 1;
        Ok(value)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self
            .input
            .get(self.at..self.at + 4)
            .ok_or(WireError::Truncated)?;
        self.at += 4;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_bits(self.u32()?))
    }

    fn name(&mut self) -> Result<String, WireError> {
        let bytes = self
            .input
            .get(self.at..self.at + WIRE_NAME_LEN)
            .ok_or(WireError::Truncated)?;
        self.at += WIRE_NAME_LEN;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(WIRE_NAME_LEN);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

fn character_bits(id: CharacterId) -> u8 {
    id as u8 - 1
}

fn character_from_bits(bits: u8) -> Result<CharacterId, WireError> {
    CharacterId::from_u8((bits & 0x3) + 1).ok_or(WireError::BadField("character id"))
}

fn tile_checked(value: u8) -> Result<u8, WireError> {
    if (value as usize) < crate::sim::tile::TILE_COUNT {
        Ok(value)
    } else {
        Err(WireError::BadField("tile index"))
    }
}

/// Encode one message into `out`, which must hold at least
/// `MAX_MESSAGE_SIZE` bytes. Returns the number of bytes written.
pub fn encode_into(message: &GameMessage, out: &mut [u8]) -> usize {
    debug_assert!(out.len() >= MAX_MESSAGE_SIZE);
    let mut w = Writer::new(out);
    match &message.body {
        MessageBody::Quit => {
            w.u8(TAG_QUIT);
        }
        MessageBody::Ack => {
            w.u8(TAG_ACK);
            w.u32(message.seq);
        }
        MessageBody::Ping { timestamp_ms } => {
            w.u8(TAG_PING);
            w.u32(*timestamp_ms);
        }
        MessageBody::Pong { timestamp_ms } => {
            w.u8(TAG_PONG);
            w.u32(*timestamp_ms);
        }
        MessageBody::ServerRejection => {
            w.u8(TAG_SERVER_REJECTION);
        }
        MessageBody::CanIPlay { version, name } => {
            w.u8(TAG_CAN_I_PLAY);
            w.u32(message.seq);
            w.u8(*version);
            w.name(name);
        }
        MessageBody::MovementRequest { direction } => {
            w.u8(TAG_MOVEMENT_REQUEST);
            w.u32(message.seq);
            w.u8(direction.to_wire());
        }
        MessageBody::FireRequest => {
            w.u8(TAG_FIRE);
            w.u32(message.seq);
        }
        MessageBody::FireUpdate {
            x,
            y,
            character,
            pointing,
        } => {
            w.u8(TAG_FIRE);
            w.u32(message.seq);
            w.f32(*x);
            w.f32(*y);
            w.u8(character_bits(*character) | (pointing.pointing_to_wire() << 2));
        }
        MessageBody::ServerAcceptance { character, lives } => {
            w.u8(TAG_SERVER_ACCEPTANCE);
            w.u32(message.seq);
            w.u8(character_bits(*character) | (lives << 2));
        }
        MessageBody::PlayersWaiting { count } => {
            w.u8(TAG_PLAYERS_WAITING);
            w.u32(message.seq);
            w.u8(*count);
        }
        MessageBody::NetName { character, name } => {
            w.u8(TAG_NET_NAME);
            w.u32(message.seq);
            w.u8(*character as u8);
            w.name(name);
        }
        MessageBody::StartGame => {
            w.u8(TAG_START_GAME);
            w.u32(message.seq);
        }
        MessageBody::GameStartNumber { value } => {
            w.u8(TAG_GAME_START_NUMBER);
            w.u32(message.seq);
            w.u8(*value);
        }
        MessageBody::Movement {
            character,
            x,
            y,
            direction,
            pointing,
            dead,
        } => {
            w.u8(TAG_MOVEMENT);
            w.u32(message.seq);
            w.f32(*x);
            w.f32(*y);
            let mut flags = character_bits(*character);
            flags |= direction.to_wire() << 2;
            flags |= pointing.pointing_to_wire() << 5;
            flags |= (*dead as u8) << 7;
            w.u8(flags);
        }
        MessageBody::PlayerKilled { character, lives } => {
            w.u8(TAG_PLAYER_KILLED);
            w.u32(message.seq);
            w.u8(character_bits(*character) | (lives << 2));
        }
        MessageBody::CharacterKills { character, kills } => {
            w.u8(TAG_CHARACTER_KILLS);
            w.u32(message.seq);
            w.u8(character_bits(*character) | (kills << 2));
        }
        MessageBody::ColorTile { character, tile } => {
            w.u8(TAG_COLOR_TILE);
            w.u32(message.seq);
            w.u8(character_bits(*character) | (tile << 2));
        }
        MessageBody::TileFalling { tile, dead } => {
            w.u8(TAG_TILE_FALLING);
            w.u32(message.seq);
            w.u8((*dead as u8) | (tile << 1));
        }
        MessageBody::RecoverTile { tile } => {
            w.u8(TAG_RECOVER_TILE);
            w.u32(message.seq);
            w.u8(*tile);
        }
        MessageBody::NewGame => {
            w.u8(TAG_NEW_GAME);
            w.u32(message.seq);
        }
        MessageBody::LaggedOut { character } => {
            w.u8(TAG_LAGGED_OUT);
            w.u32(message.seq);
            w.u8(character.peer_slot().unwrap_or(0));
        }
        MessageBody::PlayerJoined { .. } => {
            debug_assert!(false, "internal message reached the codec");
        }
    }
    w.at
}

/// Decode the next message from `input`. Tag 3 is direction-dependent: the
/// server reads it as a fire request, the client as a fire update. Returns
/// the message and the bytes consumed.
pub fn decode(role: Role, input: &[u8]) -> Result<(GameMessage, usize), WireError> {
    let mut r = Reader::new(input);
    let tag = r.u8()?;
    let mut message = GameMessage::new(MessageBody::Quit);

    match tag {
        TAG_QUIT => {}
        TAG_ACK => {
            message.seq = r.u32()?;
            message.body = MessageBody::Ack;
        }
        TAG_PING => {
            message.body = MessageBody::Ping {
                timestamp_ms: r.u32()?,
            };
        }
        TAG_PONG => {
            message.body = MessageBody::Pong {
                timestamp_ms: r.u32()?,
            };
        }
        TAG_SERVER_REJECTION => {
            message.body = MessageBody::ServerRejection;
        }
        TAG_CAN_I_PLAY => {
            message.seq = r.u32()?;
            let version = r.u8()?;
            let name = r.name()?;
            message.body = MessageBody::CanIPlay { version, name };
        }
        TAG_MOVEMENT_REQUEST => {
            message.seq = r.u32()?;
            let direction =
                Direction::from_wire(r.u8()?).ok_or(WireError::BadField("direction"))?;
            message.body = MessageBody::MovementRequest { direction };
        }
        TAG_FIRE => {
            message.seq = r.u32()?;
            message.body = match role {
                Role::Server => MessageBody::FireRequest,
                Role::Client => {
                    let x = r.f32()?;
                    let y = r.f32()?;
                    let flags = r.u8()?;
                    MessageBody::FireUpdate {
                        x,
                        y,
                        character: character_from_bits(flags)?,
                        pointing: Direction::pointing_from_wire(flags >> 2),
                    }
                }
            };
        }
        TAG_SERVER_ACCEPTANCE => {
            message.seq = r.u32()?;
            let flags = r.u8()?;
            let character = character_from_bits(flags)?;
            if character.peer_slot().is_none() {
                return Err(WireError::BadField("slot"));
            }
            message.body = MessageBody::ServerAcceptance {
                character,
                lives: flags >> 2,
            };
        }
        TAG_PLAYERS_WAITING => {
            message.seq = r.u32()?;
            let count = r.u8()?;
            if count >= 4 {
                return Err(WireError::BadField("waiting count"));
            }
            message.body = MessageBody::PlayersWaiting { count };
        }
        TAG_NET_NAME => {
            message.seq = r.u32()?;
            let character =
                CharacterId::from_u8(r.u8()?).ok_or(WireError::BadField("character id"))?;
            let name = r.name()?;
            message.body = MessageBody::NetName { character, name };
        }
        TAG_START_GAME => {
            message.seq = r.u32()?;
            message.body = MessageBody::StartGame;
        }
        TAG_GAME_START_NUMBER => {
            message.seq = r.u32()?;
            message.body = MessageBody::GameStartNumber { value: r.u8()? };
        }
        TAG_MOVEMENT => {
            message.seq = r.u32()?;
            let x = r.f32()?;
            let y = r.f32()?;
            let flags = r.u8()?;
            let direction = Direction::from_wire((flags >> 2) & 0x7)
                .ok_or(WireError::BadField("direction"))?;
            message.body = MessageBody::Movement {
                character: character_from_bits(flags)?,
                x,
                y,
                direction,
                pointing: Direction::pointing_from_wire(flags >> 5),
                dead: (flags >> 7) != 0,
            };
        }
        TAG_PLAYER_KILLED => {
            message.seq = r.u32()?;
            let flags = r.u8()?;
            message.body = MessageBody::PlayerKilled {
                character: character_from_bits(flags)?,
                lives: flags >> 2,
            };
        }
        TAG_CHARACTER_KILLS => {
            message.seq = r.u32()?;
            let flags = r.u8()?;
            message.body = MessageBody::CharacterKills {
                character: character_from_bits(flags)?,
                kills: flags >> 2,
            };
        }
        TAG_COLOR_TILE => {
            message.seq = r.u32()?;
            let flags = r.u8()?;
            message.body = MessageBody::ColorTile {
                character: character_from_bits(flags)?,
                tile: tile_checked(flags >> 2)?,
            };
        }
        TAG_TILE_FALLING => {
            message.seq = r.u32()?;
            let flags = r.u8()?;
            message.body = MessageBody::TileFalling {
                tile: tile_checked(flags >> 1)?,
                dead: (flags & 0x1) != 0,
            };
        }
        TAG_RECOVER_TILE => {
            message.seq = r.u32()?;
            message.body = MessageBody::RecoverTile {
                tile: tile_checked(r.u8()?)?,
            };
        }
        TAG_NEW_GAME => {
            message.seq = r.u32()?;
            message.body = MessageBody::NewGame;
        }
        TAG_LAGGED_OUT => {
            message.seq = r.u32()?;
            let character = CharacterId::from_peer_slot(r.u8()?)
                .ok_or(WireError::BadField("peer index"))?;
            message.body = MessageBody::LaggedOut { character };
        }
        other => return Err(WireError::UnknownTag(other)),
    }

    Ok((message, r.at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(role: Role, message: GameMessage) -> GameMessage {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let written = encode_into(&message, &mut buf);
        assert!(written <= MAX_MESSAGE_SIZE);
        let (decoded, consumed) = decode(role, &buf[..written]).unwrap();
        assert_eq!(consumed, written);
        decoded
    }

    fn with_seq(seq: u32, body: MessageBody) -> GameMessage {
        let mut message = GameMessage::new(body);
        message.seq = seq;
        message
    }

    #[test]
    fn every_kind_round_trips() {
        use MessageBody::*;
        let client_bound = [
            with_seq(
                1,
                ServerAcceptance {
                    character: CharacterId::RedRover,
                    lives: 5,
                },
            ),
            with_seq(2, PlayersWaiting { count: 2 }),
            with_seq(
                3,
                NetName {
                    character: CharacterId::GreenTree,
                    name: "Kale".into(),
                },
            ),
            with_seq(4, StartGame),
            with_seq(5, GameStartNumber { value: 3 }),
            with_seq(
                9,
                Movement {
                    character: CharacterId::BlueLightning,
                    x: 4.25,
                    y: -1.5,
                    direction: crate::sim::Direction::Down,
                    pointing: crate::sim::Direction::Down,
                    dead: false,
                },
            ),
            with_seq(
                6,
                FireUpdate {
                    x: 2.0,
                    y: 8.0,
                    character: CharacterId::PinkBubbleGum,
                    pointing: crate::sim::Direction::Left,
                },
            ),
            with_seq(
                7,
                PlayerKilled {
                    character: CharacterId::RedRover,
                    lives: 3,
                },
            ),
            with_seq(
                8,
                CharacterKills {
                    character: CharacterId::RedRover,
                    kills: 17,
                },
            ),
            with_seq(
                10,
                ColorTile {
                    character: CharacterId::GreenTree,
                    tile: 63,
                },
            ),
            with_seq(11, TileFalling { tile: 40, dead: true }),
            with_seq(
                12,
                TileFalling {
                    tile: 21,
                    dead: false,
                },
            ),
            with_seq(13, RecoverTile { tile: 9 }),
            with_seq(14, NewGame),
            with_seq(
                15,
                LaggedOut {
                    character: CharacterId::BlueLightning,
                },
            ),
            GameMessage::new(Pong {
                timestamp_ms: 123_456,
            }),
            GameMessage::new(Ping { timestamp_ms: 99 }),
            GameMessage::new(Quit),
            GameMessage::new(ServerRejection),
        ];
        for message in client_bound {
            assert_eq!(round_trip(Role::Client, message.clone()), message);
        }

        let server_bound = [
            with_seq(
                1,
                CanIPlay {
                    version: PROTOCOL_VERSION,
                    name: "Kale".into(),
                },
            ),
            with_seq(
                2,
                MovementRequest {
                    direction: crate::sim::Direction::Right,
                },
            ),
            with_seq(3, FireRequest),
            with_seq(44, Ack),
            GameMessage::new(Ping { timestamp_ms: 7 }),
            GameMessage::new(Quit),
        ];
        for message in server_bound {
            assert_eq!(round_trip(Role::Server, message.clone()), message);
        }
    }

    #[test]
    fn acceptance_flags_match_wire_layout() {
        // First slot, five lives: slot bits 1, lives 5 << 2 -> 0x15.
        let message = with_seq(
            1,
            MessageBody::ServerAcceptance {
                character: CharacterId::RedRover,
                lives: 5,
            },
        );
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let written = encode_into(&message, &mut buf);
        assert_eq!(written, 6);
        assert_eq!(buf[0], 9);
        assert_eq!(&buf[1..5], &1u32.to_le_bytes());
        assert_eq!(buf[5], 0x15);
    }

    #[test]
    fn movement_flags_pack_exactly() {
        let message = with_seq(
            3,
            MessageBody::Movement {
                character: CharacterId::GreenTree,
                x: 1.0,
                y: 2.0,
                direction: crate::sim::Direction::Up,
                pointing: crate::sim::Direction::Left,
                dead: true,
            },
        );
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let written = encode_into(&message, &mut buf);
        assert_eq!(written, 14);
        let flags = buf[13];
        assert_eq!(flags & 0x3, 2); // character id 3 -> bits 2
        assert_eq!((flags >> 2) & 0x7, 3); // up
        assert_eq!((flags >> 5) & 0x3, 1); // pointing left
        assert_eq!(flags >> 7, 1); // dead
    }

    #[test]
    fn name_is_nul_padded_to_eleven_bytes() {
        let message = with_seq(
            1,
            MessageBody::CanIPlay {
                version: PROTOCOL_VERSION,
                name: "Kale".into(),
            },
        );
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let written = encode_into(&message, &mut buf);
        assert_eq!(written, 1 + 4 + 1 + 11);
        assert_eq!(&buf[6..10], b"Kale");
        assert!(buf[10..17].iter().all(|&b| b == 0));
    }

    #[test]
    fn long_names_are_truncated() {
        let message = with_seq(
            1,
            MessageBody::NetName {
                character: CharacterId::RedRover,
                name: "TwelveLettersLong".into(),
            },
        );
        let decoded = round_trip(Role::Client, message);
        match decoded.body {
            MessageBody::NetName { name, .. } => assert_eq!(name, "TwelveLette"),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn truncated_input_is_rejected() {
        let message = with_seq(
            7,
            MessageBody::ColorTile {
                character: CharacterId::RedRover,
                tile: 12,
            },
        );
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let written = encode_into(&message, &mut buf);
        for len in 0..written {
            assert_eq!(
                decode(Role::Client, &buf[..len]).unwrap_err(),
                WireError::Truncated,
                "length {len}"
            );
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(
            decode(Role::Client, &[200, 0, 0, 0, 0]).unwrap_err(),
            WireError::UnknownTag(200)
        );
    }

    #[test]
    fn out_of_range_direction_is_rejected() {
        let message = with_seq(
            2,
            MessageBody::MovementRequest {
                direction: crate::sim::Direction::Left,
            },
        );
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let written = encode_into(&message, &mut buf);
        buf[written - 1] = 9;
        assert_eq!(
            decode(Role::Server, &buf[..written]).unwrap_err(),
            WireError::BadField("direction")
        );
    }

    #[test]
    fn fire_tag_depends_on_direction() {
        let request = with_seq(5, MessageBody::FireRequest);
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let written = encode_into(&request, &mut buf);
        assert_eq!(written, 5);
        let (decoded, _) = decode(Role::Server, &buf[..written]).unwrap();
        assert_eq!(decoded.body, MessageBody::FireRequest);

        let update = with_seq(
            5,
            MessageBody::FireUpdate {
                x: 0.0,
                y: 0.0,
                character: CharacterId::RedRover,
                pointing: crate::sim::Direction::Up,
            },
        );
        let written = encode_into(&update, &mut buf);
        let (decoded, _) = decode(Role::Client, &buf[..written]).unwrap();
        assert_eq!(decoded.body, update.body);
    }

    #[test]
    fn many_messages_decode_from_one_datagram() {
        let messages = [
            with_seq(1, MessageBody::StartGame),
            GameMessage::new(MessageBody::Ping { timestamp_ms: 10 }),
            with_seq(2, MessageBody::GameStartNumber { value: 4 }),
        ];
        let mut datagram = [0u8; MAX_PACKET_SIZE];
        let mut at = 0;
        for message in &messages {
            at += encode_into(message, &mut datagram[at..]);
        }

        let mut decoded = Vec::new();
        let mut cursor = 0;
        while cursor < at {
            let (message, used) = decode(Role::Client, &datagram[cursor..at]).unwrap();
            decoded.push(message);
            cursor += used;
        }
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].body, MessageBody::StartGame);
        assert_eq!(decoded[2].body, MessageBody::GameStartNumber { value: 4 });
    }
}
