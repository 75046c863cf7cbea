use glam::Vec3;

use super::character::CharacterId;

pub const TILE_ALIVE_Z: f32 = -25.0;
pub const TILE_TERMINATING_Z: f32 = -105.0;
pub const TILE_FALLING_SPEED: f32 = 25.4237;
pub const TILE_COUNT: usize = 64;

const GRAY_COLOR: [f32; 3] = [0.31, 0.31, 0.31];

/// Who painted a tile. Gray is the outer-ring destruction sweep; gray tiles
/// never crack and never credit a kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColoredBy {
    #[default]
    None,
    Player(CharacterId),
    Gray,
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub position: Vec3,
    pub color: [f32; 3],
    pub colored_by: ColoredBy,
    pub color_time: f32,
    pub cracked: bool,
    /// Seconds on the round clock; zero means unarmed.
    pub cracked_deadline: f32,
    pub in_play: bool,
    pub is_dead: bool,
    pub recovery_timer: f64,
    // Client-side fire prediction.
    pub predicted_color: Option<CharacterId>,
    pub predicted_color_time: f32,
}

fn default_color(index: usize) -> [f32; 3] {
    if ((index / 8) % 2) ^ (index % 2) != 0 {
        [0.8, 0.8, 0.8]
    } else {
        [0.682, 0.572, 0.329]
    }
}

impl Tile {
    fn starting(index: usize) -> Self {
        Self {
            position: Vec3::new(
                (index % 8) as f32 * 2.0,
                (index / 8) as f32 * 2.0,
                TILE_ALIVE_Z,
            ),
            color: default_color(index),
            colored_by: ColoredBy::None,
            color_time: 0.0,
            cracked: false,
            cracked_deadline: 0.0,
            in_play: true,
            is_dead: false,
            recovery_timer: 0.0,
            predicted_color: None,
            predicted_color_time: 0.0,
        }
    }

    pub fn clear_prediction(&mut self, index: usize) {
        if self.predicted_color.is_some() {
            self.predicted_color = None;
            self.predicted_color_time = 0.0;
            // Speculative paint and cracking go away together unless the
            // authoritative color landed in the meantime.
            if self.colored_by == ColoredBy::None {
                self.color = default_color(index);
                self.cracked = false;
                self.cracked_deadline = 0.0;
            }
        }
    }
}

/// The 8x8 board, addressed 0..=63 with row = index / 8, col = index % 8.
/// Neighbours are pure index arithmetic.
#[derive(Debug)]
pub struct Board {
    tiles: [Tile; TILE_COUNT],
}

impl Board {
    pub fn new() -> Self {
        Self {
            tiles: std::array::from_fn(Tile::starting),
        }
    }

    pub fn reset(&mut self) {
        self.tiles = std::array::from_fn(Tile::starting);
    }

    pub fn tile(&self, index: usize) -> &Tile {
        &self.tiles[index]
    }

    pub fn tile_mut(&mut self, index: usize) -> &mut Tile {
        &mut self.tiles[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub fn right_of(index: usize) -> Option<usize> {
        (index % 8 < 7).then(|| index + 1)
    }

    pub fn left_of(index: usize) -> Option<usize> {
        (index % 8 > 0).then(|| index - 1)
    }

    pub fn above(index: usize) -> Option<usize> {
        (index + 8 < TILE_COUNT).then(|| index + 8)
    }

    pub fn below(index: usize) -> Option<usize> {
        (index >= 8).then(|| index - 8)
    }

    pub fn neighbor(index: usize, direction: super::character::Direction) -> Option<usize> {
        use super::character::Direction;
        match direction {
            Direction::Right => Self::right_of(index),
            Direction::Left => Self::left_of(index),
            Direction::Up => Self::above(index),
            Direction::Down => Self::below(index),
            Direction::None => None,
        }
    }

    /// Restore a destroyed tile to its starting state.
    pub fn restore(&mut self, index: usize) {
        let tile = &mut self.tiles[index];
        tile.color = default_color(index);
        tile.colored_by = ColoredBy::None;
        tile.color_time = 0.0;
        tile.cracked = false;
        tile.cracked_deadline = 0.0;
        tile.position.z = TILE_ALIVE_Z;
        tile.in_play = true;
        tile.recovery_timer = 0.0;
    }

    /// Stone-gray coloring used by the outer-ring sweep.
    pub fn gray_out(&mut self, index: usize) {
        let tile = &mut self.tiles[index];
        tile.color = GRAY_COLOR;
        tile.colored_by = ColoredBy::Gray;
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Index<usize> for Board {
    type Output = Tile;
    fn index(&self, index: usize) -> &Tile {
        &self.tiles[index]
    }
}

impl std::ops::IndexMut<usize> for Board {
    fn index_mut(&mut self, index: usize) -> &mut Tile {
        &mut self.tiles[index]
    }
}

/// Outermost ring, swept first: top row right-to-left is the tail so the
/// collapse visually wraps around the board.
pub const OUTER_LAYER: [usize; 28] = [
    56, 57, 58, 59, 60, 61, 62, 63, // top row
    55, 47, 39, 31, 23, 15, 7, // right column
    6, 5, 4, 3, 2, 1, 0, // bottom row
    8, 16, 24, 32, 40, 48, // left column
];

/// Second ring, swept once the outer one has fully collapsed.
pub const SECOND_LAYER: [usize; 20] = [
    49, 50, 51, 52, 53, 54, // top
    46, 38, 30, 22, 14, // right
    13, 12, 11, 10, 9, // bottom
    17, 25, 33, 41, // left
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::character::Direction;

    #[test]
    fn neighbor_arithmetic() {
        assert_eq!(Board::right_of(0), Some(1));
        assert_eq!(Board::right_of(7), None);
        assert_eq!(Board::left_of(8), None);
        assert_eq!(Board::left_of(9), Some(8));
        assert_eq!(Board::above(56), None);
        assert_eq!(Board::above(48), Some(56));
        assert_eq!(Board::below(7), None);
        assert_eq!(Board::below(63), Some(55));
        assert_eq!(Board::neighbor(27, Direction::Up), Some(35));
        assert_eq!(Board::neighbor(27, Direction::None), None);
    }

    #[test]
    fn layers_cover_the_two_outer_rings() {
        let mut seen = [false; TILE_COUNT];
        for &index in OUTER_LAYER.iter().chain(SECOND_LAYER.iter()) {
            assert!(!seen[index], "tile {index} listed twice");
            seen[index] = true;
        }
        for index in 0..TILE_COUNT {
            let row = index / 8;
            let col = index % 8;
            let ring = row.min(col).min(7 - row).min(7 - col);
            assert_eq!(seen[index], ring < 2, "tile {index}");
        }
    }

    #[test]
    fn restore_clears_coloring() {
        let mut board = Board::new();
        board[10].colored_by = ColoredBy::Player(CharacterId::RedRover);
        board[10].cracked = true;
        board[10].in_play = false;
        board[10].position.z = TILE_ALIVE_Z - 4.0;
        board.restore(10);
        assert_eq!(board[10].colored_by, ColoredBy::None);
        assert!(!board[10].cracked);
        assert!(board[10].in_play);
        assert_eq!(board[10].position.z, TILE_ALIVE_Z);
    }
}
