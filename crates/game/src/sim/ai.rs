use rand::Rng;
use rand::rngs::SmallRng;

use super::character::{CharacterId, CharacterRole, Direction, NetRole};
use super::collision::{character_clears, tile_index_at, within_board};
use super::tile::ColoredBy;
use super::world::World;

/// How long a victim must have been alive, in seconds, before the AI will
/// shoot at them. Doubles as the odds of randomly holding fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiDifficulty {
    Easy,
    Medium,
    Hard,
}

impl AiDifficulty {
    pub fn threshold_secs(self) -> f32 {
        match self {
            AiDifficulty::Easy => 5.0,
            AiDifficulty::Medium => 3.0,
            AiDifficulty::Hard => 1.0,
        }
    }

    fn refusal(self) -> u32 {
        match self {
            AiDifficulty::Easy => 5,
            AiDifficulty::Medium => 3,
            AiDifficulty::Hard => 1,
        }
    }
}

fn perpendicular(rng: &mut SmallRng, direction: Direction) -> Direction {
    if matches!(direction, Direction::Up | Direction::Down) {
        if rng.gen_range(0..2) == 0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else {
        if rng.gen_range(0..2) == 0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

fn retarget(world: &mut World, id: CharacterId, now_secs: f32) {
    let direction = world.character(id).direction;
    let new_direction = perpendicular(&mut world.rng, direction);
    let timer = now_secs + world.rng.gen_range(0..2) as f32 + 1.0;
    let me = world.character_mut(id);
    me.direction = new_direction;
    me.ai_timer = timer;
}

#[derive(Clone, Copy)]
struct Rival {
    id: CharacterId,
    x: f32,
    y: f32,
    direction: Direction,
    role: CharacterRole,
    time_alive: f32,
    tile: Option<usize>,
}

fn rivals(world: &World, id: CharacterId) -> [Rival; 3] {
    let mut out = [Rival {
        id,
        x: 0.0,
        y: 0.0,
        direction: Direction::None,
        role: CharacterRole::Ai,
        time_alive: 0.0,
        tile: None,
    }; 3];
    let mut at = 0;
    for other in CharacterId::ALL {
        if other == id {
            continue;
        }
        let c = world.character(other);
        out[at] = Rival {
            id: other,
            x: c.position.x,
            y: c.position.y,
            direction: c.direction,
            role: c.role,
            time_alive: c.time_alive,
            tile: tile_index_at(c.position.x, c.position.y),
        };
        at += 1;
    }
    out
}

pub fn update_ai(world: &mut World, id: CharacterId, now_secs: f32) {
    {
        let me = world.character(id);
        if !me.is_alive() || me.role != CharacterRole::Ai || !me.active || me.lives == 0 {
            return;
        }
    }

    if world.character(id).direction == Direction::None
        || now_secs > world.character(id).ai_timer
    {
        retarget(world, id, now_secs);
    }

    steer_around_hazards(world, id, now_secs);

    // AI only opens fire once every remote seat is actually playing.
    let seats_filled = [
        CharacterId::RedRover,
        CharacterId::GreenTree,
        CharacterId::BlueLightning,
    ]
    .iter()
    .all(|&c| world.character(c).net_role == NetRole::Playing);
    if seats_filled {
        consider_firing(world, id, now_secs);
    }
}

fn steer_around_hazards(world: &mut World, id: CharacterId, now_secs: f32) {
    let direction = world.character(id).direction;
    if !within_board(world.character(id), &world.tiles, direction) {
        retarget(world, id, now_secs);
    }

    for rival in rivals(world, id) {
        let me = world.character(id);
        let colliding = !character_clears(me, world.character(rival.id), me.direction);
        let unyielding = rival.role != CharacterRole::Ai
            || matches!(
                (me.direction, rival.direction),
                (Direction::Down, Direction::Up)
                    | (Direction::Right, Direction::Left)
                    | (Direction::Up, Direction::Up)
                    | (Direction::Down, Direction::Down)
                    | (Direction::Right, Direction::Right)
                    | (Direction::Left, Direction::Left)
            );
        if colliding && unyielding {
            retarget(world, id, now_secs);
        }
    }

    // Run from the graying outer ring toward the board center.
    let me = world.character(id);
    let Some(tile) = tile_index_at(me.position.x, me.position.y) else {
        return;
    };
    if world.tiles[tile].colored_by != ColoredBy::Gray {
        return;
    }
    let row = tile / 8;
    let col = tile % 8;
    let escape = if row <= 1 {
        Direction::Up
    } else if row >= 6 {
        Direction::Down
    } else if col <= 1 {
        Direction::Right
    } else if col >= 6 {
        Direction::Left
    } else {
        return;
    };
    let standing = super::tile::Board::neighbor(tile, escape)
        .map(|n| !world.tiles[n].is_dead && world.tiles[n].in_play)
        .unwrap_or(false);
    if standing {
        world.character_mut(id).direction = escape;
    }
}

fn consider_firing(world: &mut World, id: CharacterId, now_secs: f32) {
    let difficulty = world.ai_difficulty;
    let threshold = difficulty.threshold_secs();

    {
        let me = world.character(id);
        if me.time_alive < threshold || me.weapon.animating || !world.game_has_started {
            return;
        }
    }

    let my_tile = {
        let me = world.character(id);
        tile_index_at(me.position.x, me.position.y)
    };
    let Some(my_tile) = my_tile else {
        return;
    };

    let rivals = rivals(world, id);
    if rivals.iter().any(|r| r.tile == Some(my_tile)) {
        return;
    }
    if world.tiles[my_tile].colored_by == ColoredBy::Gray {
        return;
    }
    if world.rng.gen_range(0..10) + 1 <= difficulty.refusal() {
        return;
    }

    let my_row = my_tile / 8;
    let my_col = my_tile % 8;
    let (mx, my) = {
        let me = world.character(id);
        (me.position.x, me.position.y)
    };

    for rival in rivals {
        if rival.time_alive < threshold {
            continue;
        }
        let Some(tile) = rival.tile else { continue };
        if tile / 8 == my_row {
            let attack = if mx > rival.x {
                Direction::Left
            } else {
                Direction::Right
            };
            if world.character(id).direction != attack {
                attack_toward(world, id, attack, now_secs);
            }
            return;
        }
        if tile % 8 == my_col {
            let attack = if my > rival.y {
                Direction::Down
            } else {
                Direction::Up
            };
            if world.character(id).direction != attack {
                attack_toward(world, id, attack, now_secs);
            }
            return;
        }
    }
}

fn attack_toward(world: &mut World, id: CharacterId, attack: Direction, now_secs: f32) {
    {
        let me = world.character_mut(id);
        me.turn(attack);
        me.direction = attack;
    }
    let (x, y, pointing) = {
        let me = world.character(id);
        (me.position.x, me.position.y, me.pointing)
    };
    world.prepare_fire(id, x, y, pointing, 0.0);
    retarget(world, id, now_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn perpendicular_turns() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..32 {
            let turned = perpendicular(&mut rng, Direction::Up);
            assert!(turned.is_horizontal());
            let turned = perpendicular(&mut rng, Direction::Left);
            assert!(!turned.is_horizontal() && turned.is_some());
        }
    }

    #[test]
    fn difficulty_thresholds() {
        assert_eq!(AiDifficulty::Easy.threshold_secs(), 5.0);
        assert_eq!(AiDifficulty::Medium.threshold_secs(), 3.0);
        assert_eq!(AiDifficulty::Hard.threshold_secs(), 1.0);
    }
}
