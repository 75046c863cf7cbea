use glam::Vec3;

use super::tick::TICK_DT;
use super::weapon::Weapon;

pub const CHARACTER_ALIVE_Z: f32 = 2.0;
pub const CHARACTER_TERMINATING_Z: f32 = -70.0;
pub const CHARACTER_FALLING_SPEED: f32 = 25.4237;

// Crossing the board vertically takes ~3.5 seconds at this speed.
pub const INITIAL_CHARACTER_SPEED: f32 = 4.51977;

pub const MAX_CHARACTER_LIVES: u8 = 10;
pub const MAX_WIRE_KILLS: u8 = 31;

/// A weapon destroys at most 7 tiles; the first one destroyed gets the
/// largest head start on its recovery timer.
pub const INITIAL_RECOVERY_DELAY: f64 = 71.0 * TICK_DT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    None,
    Right,
    Left,
    Up,
    Down,
}

impl Direction {
    pub fn from_wire(value: u8) -> Option<Direction> {
        match value {
            0 => Some(Direction::None),
            1 => Some(Direction::Right),
            2 => Some(Direction::Left),
            3 => Some(Direction::Up),
            4 => Some(Direction::Down),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Direction::None => 0,
            Direction::Right => 1,
            Direction::Left => 2,
            Direction::Up => 3,
            Direction::Down => 4,
        }
    }

    /// Pointing directions are packed in two bits, `Right` as zero.
    pub fn pointing_from_wire(bits: u8) -> Direction {
        match bits & 0x3 {
            0 => Direction::Right,
            1 => Direction::Left,
            2 => Direction::Up,
            _ => Direction::Down,
        }
    }

    pub fn pointing_to_wire(self) -> u8 {
        debug_assert!(self != Direction::None);
        self.to_wire().saturating_sub(1)
    }

    pub fn is_some(self) -> bool {
        self != Direction::None
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Right | Direction::Left)
    }
}

/// The four fixed identities. Pink Bubble Gum is always the host; remote
/// peers occupy slots 0..=2 controlling characters 2..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterId {
    PinkBubbleGum = 1,
    RedRover = 2,
    GreenTree = 3,
    BlueLightning = 4,
}

impl CharacterId {
    pub const ALL: [CharacterId; 4] = [
        CharacterId::PinkBubbleGum,
        CharacterId::RedRover,
        CharacterId::GreenTree,
        CharacterId::BlueLightning,
    ];

    pub fn from_u8(value: u8) -> Option<CharacterId> {
        match value {
            1 => Some(CharacterId::PinkBubbleGum),
            2 => Some(CharacterId::RedRover),
            3 => Some(CharacterId::GreenTree),
            4 => Some(CharacterId::BlueLightning),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Server-side peer slot for remote characters; the host has none.
    pub fn peer_slot(self) -> Option<u8> {
        match self {
            CharacterId::PinkBubbleGum => None,
            other => Some(other as u8 - 2),
        }
    }

    pub fn from_peer_slot(slot: u8) -> Option<CharacterId> {
        CharacterId::from_u8(slot + 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterRole {
    Human,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetRole {
    #[default]
    None,
    Pending,
    Playing,
}

#[derive(Debug, Clone)]
pub struct Character {
    pub id: CharacterId,
    pub position: Vec3,
    pub color: [f32; 3],
    pub alpha: f32,
    pub direction: Direction,
    pub pointing: Direction,
    pub speed: f32,
    pub lives: u8,
    pub kills: u8,
    pub wins: u32,
    pub role: CharacterRole,
    pub backup_role: CharacterRole,
    pub net_role: NetRole,
    pub name: Option<String>,
    pub active: bool,
    pub weapon: Weapon,

    // Weapon animation bookkeeping.
    pub animation_timer: f64,
    pub colored_ray: bool,
    pub need_destroy_start: bool,
    pub recovery_delay: f64,
    pub fired_from_tile: Option<usize>,
    pub destroy_cursor: Option<usize>,
    pub recovery_timer: u32,
    pub time_alive: f32,
    pub ai_timer: f32,

    // Client-side interpolation state.
    pub x_discrepancy: f32,
    pub y_discrepancy: f32,
    pub movement_consumed: u32,
    pub predicted_direction: Direction,
    pub predicted_direction_deadline_ms: u32,
}

impl Character {
    pub fn new(id: CharacterId) -> Self {
        let (color, weapon_color) = match id {
            CharacterId::PinkBubbleGum => ([1.0, 0.6, 0.6], [1.0, 0.6, 0.6]),
            CharacterId::RedRover => ([0.9, 0.0, 0.0], [1.0, 0.0, 0.0]),
            CharacterId::GreenTree => ([0.3, 1.0, 0.3], [0.2196, 0.851, 0.2623]),
            CharacterId::BlueLightning => ([0.0, 0.0, 1.0], [0.3, 0.5, 1.0]),
        };
        Self {
            id,
            position: Vec3::ZERO,
            color,
            alpha: 1.0,
            direction: Direction::None,
            pointing: Direction::Right,
            speed: INITIAL_CHARACTER_SPEED,
            lives: 0,
            kills: 0,
            wins: 0,
            role: CharacterRole::Ai,
            backup_role: CharacterRole::Ai,
            net_role: NetRole::None,
            name: None,
            active: false,
            weapon: Weapon::new(weapon_color),
            animation_timer: 0.0,
            colored_ray: false,
            need_destroy_start: true,
            recovery_delay: INITIAL_RECOVERY_DELAY,
            fired_from_tile: None,
            destroy_cursor: None,
            recovery_timer: 0,
            time_alive: 0.0,
            ai_timer: 0.0,
            x_discrepancy: 0.0,
            y_discrepancy: 0.0,
            movement_consumed: 0,
            predicted_direction: Direction::None,
            predicted_direction_deadline_ms: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        (self.position.z - CHARACTER_ALIVE_Z).abs() < 0.001
    }

    /// Per-round state; identity, scores and network role survive resets.
    pub fn reset_round(&mut self) {
        self.alpha = 1.0;
        self.speed = INITIAL_CHARACTER_SPEED;
        self.kills = 0;
        self.weapon.reset();
        self.animation_timer = 0.0;
        self.colored_ray = false;
        self.need_destroy_start = true;
        self.recovery_delay = INITIAL_RECOVERY_DELAY;
        self.fired_from_tile = None;
        self.destroy_cursor = None;
        self.recovery_timer = 0;
        self.time_alive = 0.0;
        self.ai_timer = 0.0;
        self.x_discrepancy = 0.0;
        self.y_discrepancy = 0.0;
        self.movement_consumed = 0;
        self.predicted_direction = Direction::None;
        self.predicted_direction_deadline_ms = 0;
    }

    pub fn turn(&mut self, direction: Direction) {
        if self.active && direction.is_some() {
            self.pointing = direction;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_slot_mapping() {
        assert_eq!(CharacterId::PinkBubbleGum.peer_slot(), None);
        assert_eq!(CharacterId::RedRover.peer_slot(), Some(0));
        assert_eq!(CharacterId::BlueLightning.peer_slot(), Some(2));
        assert_eq!(
            CharacterId::from_peer_slot(1),
            Some(CharacterId::GreenTree)
        );
        assert_eq!(CharacterId::from_peer_slot(3), None);
    }

    #[test]
    fn direction_wire_round_trip() {
        for value in 0..=4u8 {
            let direction = Direction::from_wire(value).unwrap();
            assert_eq!(direction.to_wire(), value);
        }
        assert_eq!(Direction::from_wire(5), None);
    }

    #[test]
    fn pointing_wire_round_trip() {
        for direction in [
            Direction::Right,
            Direction::Left,
            Direction::Up,
            Direction::Down,
        ] {
            let bits = direction.pointing_to_wire();
            assert!(bits < 4);
            assert_eq!(Direction::pointing_from_wire(bits), direction);
        }
    }

    #[test]
    fn alive_tracks_z() {
        let mut character = Character::new(CharacterId::RedRover);
        character.position.z = CHARACTER_ALIVE_Z;
        assert!(character.is_alive());
        character.position.z -= 1.0;
        assert!(!character.is_alive());
    }
}
