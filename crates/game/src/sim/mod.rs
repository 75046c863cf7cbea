pub mod ai;
pub mod character;
pub mod collision;
pub mod tick;
pub mod tile;
pub mod weapon;
pub mod world;

pub use ai::AiDifficulty;
pub use character::{Character, CharacterId, CharacterRole, Direction, NetRole};
pub use tick::{FixedTimestep, TICK_DT};
pub use tile::{Board, ColoredBy, Tile};
pub use weapon::Weapon;
pub use world::{SoundKind, World};

/// Initial downward nudge applied to a character or tile that starts
/// falling; anything below its alive plane keeps sinking on its own.
pub const OBJECT_FALLING_STEP: f32 = 1.0;
