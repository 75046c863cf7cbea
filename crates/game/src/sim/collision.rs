use super::character::{Character, Direction};
use super::tile::{Board, ColoredBy, TILE_COUNT};

/// Map a position to the tile it stands on. Tile centers sit on even
/// coordinates, so each center owns the two integer positions around it
/// (0 -> 0, 1 -> 1, 2 -> 1, 3 -> 2, ...).
pub fn tile_index_at(x: f32, y: f32) -> Option<usize> {
    let col = (x as i32 + 1) / 2;
    let row = (y as i32 + 1) / 2;
    if (0..8).contains(&col) && (0..8).contains(&row) {
        let index = (col + row * 8) as usize;
        debug_assert!(index < TILE_COUNT);
        Some(index)
    } else {
        None
    }
}

/// Whether `a`, moving toward `direction`, passes by `b` without contact.
pub fn character_clears(a: &Character, b: &Character, direction: Direction) -> bool {
    if a.lives == 0 || b.lives == 0 {
        return true;
    }
    // Different heights never collide.
    if a.position.z != b.position.z {
        return true;
    }

    let (ax, ay) = (a.position.x, a.position.y);
    let (bx, by) = (b.position.x, b.position.y);

    match direction {
        Direction::Up => !(ay < by && ax < bx + 0.8 && ax > bx - 0.8 && ay > by - 1.0),
        Direction::Down => !(ay > by && ax < bx + 0.8 && ax > bx - 0.8 && ay < by + 1.0),
        Direction::Right => !(ax < bx && ay < by + 0.8 && ay > by - 0.8 && ax > bx - 1.1),
        Direction::Left => !(ax > bx && ay < by + 0.8 && ay > by - 0.8 && ax < bx + 1.1),
        Direction::None => true,
    }
}

/// Whether the character stays on walkable ground moving toward `direction`.
/// A missing, fallen, dead, or self-colored neighbour tile stops the
/// character 0.7 units past its current tile center.
pub fn within_board(character: &Character, board: &Board, direction: Direction) -> bool {
    let Some(index) = tile_index_at(character.position.x, character.position.y) else {
        return false;
    };

    let blocked = |neighbor: Option<usize>| {
        neighbor.is_none_or(|n| {
            let tile = &board[n];
            !tile.in_play || tile.is_dead || tile.colored_by == ColoredBy::Player(character.id)
        })
    };

    let center = board[index].position;
    match direction {
        Direction::Left if blocked(Board::left_of(index)) => {
            character.position.x >= center.x - 0.7
        }
        Direction::Right if blocked(Board::right_of(index)) => {
            character.position.x <= center.x + 0.7
        }
        Direction::Down if blocked(Board::below(index)) => {
            character.position.y >= center.y - 0.7
        }
        Direction::Up if blocked(Board::above(index)) => {
            character.position.y <= center.y + 0.7
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::character::{CHARACTER_ALIVE_Z, CharacterId};

    fn character_at(id: CharacterId, x: f32, y: f32) -> Character {
        let mut c = Character::new(id);
        c.position = glam::Vec3::new(x, y, CHARACTER_ALIVE_Z);
        c.lives = 5;
        c
    }

    #[test]
    fn tile_index_mapping() {
        assert_eq!(tile_index_at(0.0, 0.0), Some(0));
        assert_eq!(tile_index_at(-0.7, 0.0), Some(0));
        assert_eq!(tile_index_at(2.0, 0.0), Some(1));
        assert_eq!(tile_index_at(14.0, 14.0), Some(63));
        assert_eq!(tile_index_at(3.0, 5.0), Some(2 + 3 * 8));
        assert_eq!(tile_index_at(17.0, 0.0), None);
    }

    #[test]
    fn characters_block_head_on() {
        let a = character_at(CharacterId::RedRover, 4.0, 4.0);
        let b = character_at(CharacterId::GreenTree, 4.9, 4.0);
        assert!(!character_clears(&a, &b, Direction::Right));
        assert!(character_clears(&a, &b, Direction::Left));
        // Far enough apart to pass.
        let c = character_at(CharacterId::GreenTree, 6.0, 4.0);
        assert!(character_clears(&a, &c, Direction::Right));
    }

    #[test]
    fn dead_characters_do_not_block() {
        let a = character_at(CharacterId::RedRover, 4.0, 4.0);
        let mut b = character_at(CharacterId::GreenTree, 4.5, 4.0);
        b.lives = 0;
        assert!(character_clears(&a, &b, Direction::Right));
    }

    #[test]
    fn board_edge_stops_movement() {
        let board = Board::new();
        let mut c = character_at(CharacterId::RedRover, 0.0, 0.0);
        assert!(within_board(&c, &board, Direction::Left));
        c.position.x = -0.75;
        assert!(!within_board(&c, &board, Direction::Left));
        c.position.x = 0.0;
        assert!(within_board(&c, &board, Direction::Right));
    }

    #[test]
    fn fallen_neighbor_stops_movement() {
        let mut board = Board::new();
        board[1].in_play = false;
        let mut c = character_at(CharacterId::RedRover, 0.5, 0.0);
        assert!(within_board(&c, &board, Direction::Right));
        c.position.x = 0.8;
        assert!(!within_board(&c, &board, Direction::Right));
    }

    #[test]
    fn own_colored_neighbor_stops_movement() {
        let mut board = Board::new();
        board[1].colored_by = ColoredBy::Player(CharacterId::RedRover);
        let c = character_at(CharacterId::RedRover, 0.8, 0.0);
        assert!(!within_board(&c, &board, Direction::Right));
        let other = character_at(CharacterId::GreenTree, 0.8, 0.0);
        assert!(within_board(&other, &board, Direction::Right));
    }
}
