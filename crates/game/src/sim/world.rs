use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::net::MessageBody;

use super::OBJECT_FALLING_STEP;
use super::ai::{self, AiDifficulty};
use super::character::{
    CHARACTER_FALLING_SPEED, CHARACTER_TERMINATING_Z, Character, CharacterId, INITIAL_RECOVERY_DELAY,
    MAX_WIRE_KILLS, NetRole,
};
use super::character::CHARACTER_ALIVE_Z;
use super::collision::{character_clears, tile_index_at, within_board};
use super::tick::TICK_DT;
use super::tile::{
    Board, ColoredBy, OUTER_LAYER, SECOND_LAYER, TILE_ALIVE_Z, TILE_COUNT, TILE_FALLING_SPEED,
    TILE_TERMINATING_Z,
};

pub const FIRST_ROUND_COUNTDOWN: i32 = 5;
pub const LATER_ROUND_COUNTDOWN: i32 = 3;
const STATS_DELAY_SECS: i32 = 4;

pub const BEGIN_DESTROYING_TILES: f64 = 31.0 * TICK_DT;
pub const RECOVERY_DELAY_DELTA: f64 = 10.0 * TICK_DT;
pub const CHARACTER_REGAIN_MOVEMENT: f64 = 25.0 * TICK_DT;
pub const END_CHARACTER_ANIMATION: f64 = 71.0 * TICK_DT;
pub const TILE_SPAWN_TIME: f64 = 201.0 * TICK_DT;

const LAYER_COLOR_START: i32 = 100;
const LAYER_DEATH_START: i32 = 200;
const CHARACTER_SPAWN_TICKS: u32 = 2;
const CRACK_HOLD_SECS: f32 = 2.5;
const PREDICTED_COLOR_TTL_SECS: f32 = 1.0;
const ALPHA_FLASH_ITERATIONS: f32 = 3.0;
const ALPHA_FLUCTUATION: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    Shot,
    TileFalling,
    DyingStone,
}

/// Messages a tick wants on the wire. The session routes them through the
/// connection; the world itself never touches a queue.
#[derive(Debug, Clone)]
pub enum Outgoing {
    Broadcast {
        except: Option<CharacterId>,
        body: MessageBody,
    },
    ToServer(MessageBody),
}

#[derive(Debug, Default)]
pub struct TickEffects {
    pub outgoing: Vec<Outgoing>,
    pub sounds: Vec<SoundKind>,
}

impl TickEffects {
    pub fn clear(&mut self) {
        self.outgoing.clear();
        self.sounds.clear();
    }

    fn broadcast(&mut self, body: MessageBody) {
        self.outgoing.push(Outgoing::Broadcast { except: None, body });
    }

    fn broadcast_except(&mut self, except: CharacterId, body: MessageBody) {
        self.outgoing.push(Outgoing::Broadcast {
            except: Some(except),
            body,
        });
    }

    fn to_server(&mut self, body: MessageBody) {
        self.outgoing.push(Outgoing::ToServer(body));
    }
}

/// Progress of one outer-ring collapse layer. The timer idles at 0, counts
/// ticks once armed, and parks at -1 when the layer has fully fallen.
#[derive(Debug, Clone, Copy, Default)]
struct LayerState {
    color_index: i32,
    death_index: i32,
    timer: i32,
}

pub struct World {
    pub players: [Character; 4],
    pub tiles: Board,
    pub game_has_started: bool,
    pub should_reset: bool,
    pub winner: Option<CharacterId>,
    pub start_number: i32,
    pub ai_difficulty: AiDifficulty,
    pub local_character: Option<CharacterId>,
    pub(crate) rng: SmallRng,
    is_authority: bool,
    layers: [LayerState; 2],
    round_secs: f32,
    last_whole_second: i32,
    pending_winner: Option<CharacterId>,
    stats_timer: i32,
}

impl World {
    pub fn new(is_authority: bool, ai_difficulty: AiDifficulty) -> Self {
        Self::with_rng(is_authority, ai_difficulty, SmallRng::from_entropy())
    }

    pub fn with_seed(is_authority: bool, ai_difficulty: AiDifficulty, seed: u64) -> Self {
        Self::with_rng(is_authority, ai_difficulty, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(is_authority: bool, ai_difficulty: AiDifficulty, rng: SmallRng) -> Self {
        Self {
            players: CharacterId::ALL.map(Character::new),
            tiles: Board::new(),
            game_has_started: false,
            should_reset: false,
            winner: None,
            start_number: FIRST_ROUND_COUNTDOWN,
            ai_difficulty,
            local_character: None,
            rng,
            is_authority,
            layers: [LayerState::default(); 2],
            round_secs: 0.0,
            last_whole_second: 0,
            pending_winner: None,
            stats_timer: 0,
        }
    }

    pub fn is_authority(&self) -> bool {
        self.is_authority
    }

    pub fn character(&self, id: CharacterId) -> &Character {
        &self.players[id.index()]
    }

    pub fn character_mut(&mut self, id: CharacterId) -> &mut Character {
        &mut self.players[id.index()]
    }

    pub fn round_secs(&self) -> f32 {
        self.round_secs
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.lives > 0).count()
    }

    /// Fresh board, fresh characters. Scores, names and network roles carry
    /// over; the countdown restarts at 5 for the first round, 3 afterwards.
    pub fn init_round(&mut self, lives: u8, first_round: bool) {
        self.tiles.reset();
        for index in 0..self.players.len() {
            self.players[index].reset_round();
            self.players[index].lives = lives;
            if self.is_authority {
                self.spawn_character(index);
                let direction = super::character::Direction::from_wire(
                    self.rng.gen_range(1..5) as u8,
                )
                .unwrap_or(super::character::Direction::Right);
                self.players[index].direction = direction;
                self.players[index].turn(direction);
            } else {
                self.players[index].active = true;
            }
        }
        self.layers = [LayerState::default(); 2];
        self.round_secs = 0.0;
        self.last_whole_second = 0;
        self.pending_winner = None;
        self.stats_timer = 0;
        self.game_has_started = false;
        self.should_reset = false;
        self.winner = None;
        self.start_number = if first_round {
            FIRST_ROUND_COUNTDOWN
        } else {
            LATER_ROUND_COUNTDOWN
        };
    }

    fn spawn_character(&mut self, index: usize) {
        let occupied: Vec<usize> = self
            .players
            .iter()
            .filter_map(|p| tile_index_at(p.position.x, p.position.y))
            .collect();
        let candidates: Vec<usize> = (0..TILE_COUNT)
            .filter(|&t| {
                let tile = &self.tiles[t];
                tile.in_play
                    && tile.position.z >= TILE_ALIVE_Z
                    && tile.colored_by == ColoredBy::None
                    && !tile.is_dead
                    && !occupied.contains(&t)
            })
            .collect();
        let Some(&choice) = candidates.get(self.rng.gen_range(0..candidates.len().max(1)))
        else {
            return;
        };
        let player = &mut self.players[index];
        player.position.x = (choice % 8) as f32 * 2.0;
        player.position.y = (choice / 8) as f32 * 2.0;
        player.position.z = CHARACTER_ALIVE_Z;
        player.active = true;
        player.direction = super::character::Direction::None;
    }

    /// Stage a shot if the character may fire right now.
    pub fn prepare_fire(
        &mut self,
        id: CharacterId,
        x: f32,
        y: f32,
        direction: super::character::Direction,
        compensation: f32,
    ) {
        let character = self.character_mut(id);
        if character.active && !character.weapon.animating {
            character.weapon.prepare(x, y, direction, compensation);
        }
    }

    /// A player just ran out of lives (or might have): arm the outer-ring
    /// sweep while the round continues, or settle on a winner.
    pub fn note_elimination(&mut self, id: CharacterId) {
        if self.character(id).lives != 0 {
            return;
        }

        let alive: Vec<CharacterId> = CharacterId::ALL
            .iter()
            .copied()
            .filter(|&c| self.character(c).lives > 0)
            .collect();

        if alive.len() >= 2 {
            if self.layers[0].timer == 0 {
                self.layers[0].timer = 1;
            } else if self.layers[1].timer == 0 {
                self.layers[1].timer = 1;
            }
        } else if alive.len() == 1 {
            let mut winner = alive[0];
            // The survivor may itself be mid-fall; hand the win to whoever
            // is highest up in that case.
            let survivor = self.character(winner);
            let survivor_tile = tile_index_at(survivor.position.x, survivor.position.y);
            let doomed = survivor.lives == 1
                && survivor.position.z > CHARACTER_TERMINATING_Z
                && survivor_tile
                    .map(|t| self.tiles[t].position.z < TILE_ALIVE_Z)
                    .unwrap_or(false);
            if doomed {
                for contender in [
                    CharacterId::RedRover,
                    CharacterId::GreenTree,
                    CharacterId::BlueLightning,
                    CharacterId::PinkBubbleGum,
                ] {
                    if contender != winner
                        && self.character(contender).position.z
                            > self.character(winner).position.z
                    {
                        winner = contender;
                        break;
                    }
                }
            }
            if self.winner.is_none() && self.stats_timer == 0 {
                self.pending_winner = Some(winner);
                self.character_mut(winner).wins += 1;
                self.stats_timer = 1;
            }
        }
    }

    pub fn server_tick(&mut self, fx: &mut TickEffects) {
        debug_assert!(self.is_authority);
        let dt = TICK_DT as f32;
        self.advance_round_clock(fx);
        self.advance_time_alive(dt);
        let now_secs = self.round_secs;
        for id in CharacterId::ALL {
            ai::update_ai(self, id, now_secs);
        }
        self.fire_weapons(fx);
        self.move_characters(fx);
        self.advance_weapons(dt);
        self.kill_characters(fx);
        self.continue_falls(dt);
        self.collapse_tiles(dt);
        self.animate_weapons(fx);
        self.crack_tiles();
        self.recover_tiles(fx);
        self.layer_tick(0, fx);
        self.layer_tick(1, fx);
        self.recover_characters();
    }

    pub fn client_tick(&mut self, fx: &mut TickEffects) {
        debug_assert!(!self.is_authority);
        let dt = TICK_DT as f32;
        self.advance_round_clock(fx);
        self.advance_time_alive(dt);
        self.fire_weapons(fx);
        self.move_characters(fx);
        self.advance_weapons(dt);
        self.continue_falls(dt);
        self.clear_expired_predictions();
        self.collapse_tiles(dt);
        self.animate_weapons(fx);
        self.crack_tiles();
        self.layer_tick(0, fx);
        self.layer_tick(1, fx);
    }

    fn advance_round_clock(&mut self, fx: &mut TickEffects) {
        self.round_secs += TICK_DT as f32;
        if self.last_whole_second == self.round_secs as i32 {
            return;
        }
        self.last_whole_second = self.round_secs as i32;

        let all_seated = self.players.iter().all(|p| p.net_role != NetRole::Pending);
        if self.is_authority && !self.game_has_started && all_seated && self.start_number > 0 {
            self.start_number -= 1;
            fx.broadcast(MessageBody::GameStartNumber {
                value: self.start_number as u8,
            });
            if self.start_number == 0 {
                self.game_has_started = true;
            }
        }

        if self.stats_timer != 0 {
            self.stats_timer += 1;
            if self.stats_timer >= STATS_DELAY_SECS {
                self.winner = self.pending_winner;
            }
        }
    }

    fn advance_time_alive(&mut self, dt: f32) {
        for player in &mut self.players {
            if player.is_alive() {
                player.time_alive += dt;
            }
        }
    }

    fn fire_weapons(&mut self, fx: &mut TickEffects) {
        for id in CharacterId::ALL {
            let index = id.index();
            let can_start = {
                let c = &self.players[index];
                let restartable = !c.weapon.animating || !self.is_authority;
                self.game_has_started && restartable && c.weapon.fired && c.is_alive()
            };
            if can_start {
                let standing = {
                    let c = &self.players[index];
                    tile_index_at(c.position.x, c.position.y)
                        .map(|t| self.tiles[t].position.z == TILE_ALIVE_Z)
                        .unwrap_or(false)
                };
                if standing {
                    let (x, y, pointing) = {
                        let c = &self.players[index];
                        (c.position.x, c.position.y, c.pointing)
                    };
                    if self.is_authority {
                        fx.broadcast_except(
                            id,
                            MessageBody::FireUpdate {
                                x,
                                y,
                                character: id,
                                pointing,
                            },
                        );
                    } else if self.local_character == Some(id) {
                        fx.to_server(MessageBody::FireRequest);
                    }
                    let c = &mut self.players[index];
                    c.active = false;
                    c.weapon.visible = true;
                    c.weapon.animating = true;
                    c.animation_timer = 0.0;
                }
            }
            self.players[index].weapon.fired = false;
        }
    }

    fn move_characters(&mut self, fx: &mut TickEffects) {
        let dt = TICK_DT as f32;
        for id in CharacterId::ALL {
            let index = id.index();
            let direction = self.players[index].direction;
            if self.players[index].active {
                self.players[index].turn(direction);
                if direction.is_some() {
                    let me = &self.players[index];
                    let clear = within_board(me, &self.tiles, direction)
                        && CharacterId::ALL.iter().all(|&other| {
                            other == id
                                || character_clears(me, self.character(other), direction)
                        });
                    if clear {
                        let step = self.players[index].speed * dt;
                        let position = &mut self.players[index].position;
                        match direction {
                            super::character::Direction::Right => position.x += step,
                            super::character::Direction::Left => position.x -= step,
                            super::character::Direction::Up => position.y += step,
                            super::character::Direction::Down => position.y -= step,
                            super::character::Direction::None => {}
                        }
                    }
                }
            }
            if self.is_authority {
                let c = &self.players[index];
                fx.broadcast(MessageBody::Movement {
                    character: id,
                    x: c.position.x,
                    y: c.position.y,
                    direction: c.direction,
                    pointing: c.pointing,
                    dead: !c.is_alive(),
                });
            }
        }
    }

    fn advance_weapons(&mut self, dt: f32) {
        for player in &mut self.players {
            player.weapon.advance(dt);
        }
    }

    fn kill_characters(&mut self, fx: &mut TickEffects) {
        for id in CharacterId::ALL {
            let index = id.index();
            let Some(location) = tile_index_at(
                self.players[index].position.x,
                self.players[index].position.y,
            ) else {
                continue;
            };
            let sunk = self.tiles[location].position.z < TILE_ALIVE_Z;
            if !(sunk && self.players[index].is_alive()) {
                continue;
            }

            let lives = {
                let c = &mut self.players[index];
                c.active = false;
                c.time_alive = 0.0;
                c.lives = c.lives.saturating_sub(1);
                c.lives
            };
            fx.broadcast(MessageBody::PlayerKilled {
                character: id,
                lives,
            });
            self.note_elimination(id);

            if let ColoredBy::Player(killer) = self.tiles[location].colored_by {
                let kills = {
                    let k = self.character_mut(killer);
                    k.kills = (k.kills + 1).min(MAX_WIRE_KILLS);
                    k.kills
                };
                fx.broadcast(MessageBody::CharacterKills {
                    character: killer,
                    kills,
                });
            }

            self.players[index].position.z -= OBJECT_FALLING_STEP;
        }
    }

    fn continue_falls(&mut self, dt: f32) {
        for player in &mut self.players {
            if !player.is_alive() && player.position.z > CHARACTER_TERMINATING_Z {
                player.position.z -= CHARACTER_FALLING_SPEED * dt;
                player.recovery_timer = 1;
            }
        }
    }

    fn collapse_tiles(&mut self, dt: f32) {
        for t in 0..TILE_COUNT {
            let z = self.tiles[t].position.z;
            if z < TILE_ALIVE_Z && z >= TILE_TERMINATING_Z {
                self.tiles[t].position.z -= TILE_FALLING_SPEED * dt;
            }
        }
    }

    fn color_tile(&mut self, t: usize, counter: u32, id: CharacterId, fx: &mut TickEffects) {
        if !(self.tiles[t].in_play && self.tiles[t].colored_by == ColoredBy::None) {
            return;
        }
        let weapon_color = self.players[id.index()].weapon.color;
        let now = self.round_secs;
        let tile = &mut self.tiles[t];
        tile.color = weapon_color;
        tile.cracked_deadline = now + 0.05 * (counter + 1) as f32;
        if self.is_authority {
            tile.colored_by = ColoredBy::Player(id);
            tile.color_time = now;
            fx.broadcast(MessageBody::ColorTile {
                character: id,
                tile: t as u8,
            });
        } else {
            tile.predicted_color = Some(id);
            tile.predicted_color_time = now;
        }
    }

    fn animate_weapons(&mut self, fx: &mut TickEffects) {
        for id in CharacterId::ALL {
            let index = id.index();
            if !self.players[index].weapon.animating {
                continue;
            }
            if self.players[index].animation_timer == 0.0 {
                fx.sounds.push(SoundKind::Shot);
            }
            self.players[index].animation_timer += TICK_DT;

            if self.local_character == Some(id) {
                let c = &mut self.players[index];
                let chunk =
                    (END_CHARACTER_ANIMATION as f32 - c.weapon.compensation) / ALPHA_FLASH_ITERATIONS;
                let normalized = (c.animation_timer as f32 % chunk) / chunk;
                let displacement =
                    2.0 * ALPHA_FLUCTUATION * (normalized - (normalized + 0.5).floor()).abs();
                c.alpha = 1.0 - displacement;
            }

            if !self.players[index].colored_ray {
                let (ix, iy, direction) = {
                    let w = &self.players[index].weapon;
                    (w.initial_x, w.initial_y, w.direction)
                };
                if let Some(start) = tile_index_at(ix, iy) {
                    self.players[index].fired_from_tile = Some(start);
                    let mut counter = 0;
                    let mut cursor = start;
                    while let Some(next) = Board::neighbor(cursor, direction) {
                        self.color_tile(next, counter, id, fx);
                        counter += 1;
                        cursor = next;
                    }
                    self.players[index].colored_ray = true;
                }
            }

            let compensation = self.players[index].weapon.compensation as f64;

            if self.players[index].need_destroy_start
                && self.players[index].animation_timer >= BEGIN_DESTROYING_TILES - compensation
                && self.players[index].fired_from_tile.is_some()
            {
                self.players[index].destroy_cursor = self.players[index].fired_from_tile;
                self.players[index].need_destroy_start = false;
                self.players[index].weapon.visible = false;
            }

            if self.is_authority {
                if let Some(cursor) = self.players[index].destroy_cursor {
                    let direction = self.players[index].weapon.direction;
                    let next = Board::neighbor(cursor, direction);
                    self.players[index].destroy_cursor = next;
                    if let Some(t) = next {
                        if self.tiles[t].colored_by == ColoredBy::Player(id) {
                            self.tiles[t].in_play = false;
                            self.tiles[t].position.z -= OBJECT_FALLING_STEP;
                            fx.sounds.push(SoundKind::TileFalling);
                            fx.broadcast(MessageBody::TileFalling {
                                tile: t as u8,
                                dead: false,
                            });
                            // Earlier tiles in the ray get a larger head
                            // start, so they respawn in firing order.
                            self.tiles[t].recovery_timer = self.players[index].recovery_delay;
                            self.players[index].recovery_delay -= RECOVERY_DELAY_DELTA;
                        }
                    }
                }
            }

            if self.players[index].animation_timer >= CHARACTER_REGAIN_MOVEMENT - compensation
                && self.players[index].is_alive()
            {
                self.players[index].active = true;
            }

            if self.players[index].animation_timer >= END_CHARACTER_ANIMATION - compensation {
                let c = &mut self.players[index];
                c.weapon.animating = false;
                c.weapon.time_firing = 0.0;
                c.animation_timer = 0.0;
                c.alpha = 1.0;
                c.need_destroy_start = true;
                c.colored_ray = false;
                c.destroy_cursor = None;
                c.fired_from_tile = None;
                c.recovery_delay = INITIAL_RECOVERY_DELAY;
            }
        }
    }

    fn crack_tiles(&mut self) {
        let now = self.round_secs;
        for t in 0..TILE_COUNT {
            let tile = &mut self.tiles[t];
            if tile.cracked_deadline <= 0.0 {
                continue;
            }
            if !tile.cracked && now >= tile.cracked_deadline {
                tile.cracked = true;
            } else if tile.cracked && tile.in_play && now >= tile.cracked_deadline + CRACK_HOLD_SECS
            {
                tile.cracked = false;
                tile.cracked_deadline = 0.0;
            }
        }
    }

    fn recover_tiles(&mut self, fx: &mut TickEffects) {
        for t in 0..TILE_COUNT {
            if self.tiles[t].recovery_timer > 0.0 {
                self.tiles[t].recovery_timer += TICK_DT;
            }
            if self.tiles[t].recovery_timer >= TILE_SPAWN_TIME && !self.tiles[t].is_dead {
                self.tiles.restore(t);
                fx.broadcast(MessageBody::RecoverTile { tile: t as u8 });
            }
        }
    }

    fn layer_tick(&mut self, which: usize, fx: &mut TickEffects) {
        let indices: &'static [usize] = if which == 0 { &OUTER_LAYER } else { &SECOND_LAYER };
        let mut layer = self.layers[which];

        if layer.color_index != -1 && layer.timer > LAYER_COLOR_START {
            let t = indices[layer.color_index as usize];
            if self.tiles[t].colored_by == ColoredBy::None {
                self.tiles.gray_out(t);
                fx.sounds.push(SoundKind::DyingStone);
            } else {
                self.tiles[t].is_dead = true;
            }
            layer.color_index += 1;
            if layer.color_index as usize == indices.len() {
                layer.color_index = -1;
            }
        }

        if layer.death_index != -1 && layer.timer > LAYER_DEATH_START {
            let t = indices[layer.death_index as usize];
            if !self.tiles[t].is_dead {
                self.tiles[t].position.z -= OBJECT_FALLING_STEP;
                self.tiles[t].is_dead = true;
                fx.sounds.push(SoundKind::TileFalling);
                if self.is_authority {
                    fx.broadcast(MessageBody::TileFalling {
                        tile: t as u8,
                        dead: true,
                    });
                }
            }
            layer.death_index += 1;
            if layer.death_index as usize == indices.len() {
                layer.death_index = -1;
                layer.timer = -1;
            }
        }

        let advancing = if which == 0 {
            layer.timer > 0
        } else {
            layer.timer > 0 && self.layers[0].timer == -1
        };
        if advancing {
            layer.timer += 1;
        }

        self.layers[which] = layer;
    }

    fn recover_characters(&mut self) {
        for index in 0..self.players.len() {
            if self.players[index].lives == 0 {
                continue;
            }
            if self.players[index].recovery_timer > 0 {
                self.players[index].recovery_timer += 1;
            }
            if self.players[index].recovery_timer > CHARACTER_SPAWN_TICKS {
                self.spawn_character(index);
                self.players[index].active = true;
                self.players[index].recovery_timer = 0;
            }
        }
    }

    fn clear_expired_predictions(&mut self) {
        let now = self.round_secs;
        for t in 0..TILE_COUNT {
            let tile = &mut self.tiles[t];
            if tile.predicted_color.is_some()
                && now - tile.predicted_color_time >= PREDICTED_COLOR_TTL_SECS
            {
                tile.clear_prediction(t);
            }
        }
    }

    /// Clear every fire prediction this character placed on the board.
    pub fn clear_predictions_for(&mut self, id: CharacterId) {
        for t in 0..TILE_COUNT {
            if self.tiles[t].predicted_color == Some(id) {
                self.tiles[t].clear_prediction(t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::character::{CharacterRole, Direction};

    fn playing_world() -> World {
        let mut world = World::with_seed(true, AiDifficulty::Easy, 42);
        for player in &mut world.players {
            player.role = CharacterRole::Human;
            player.net_role = NetRole::Playing;
        }
        world.init_round(5, true);
        world
    }

    fn started_world() -> World {
        let mut world = playing_world();
        world.game_has_started = true;
        world.start_number = 0;
        world
    }

    fn place(world: &mut World, id: CharacterId, x: f32, y: f32) {
        let c = world.character_mut(id);
        c.position.x = x;
        c.position.y = y;
        c.position.z = CHARACTER_ALIVE_Z;
        c.active = true;
    }

    fn ticks_for(secs: f64) -> usize {
        (secs / TICK_DT).ceil() as usize
    }

    #[test]
    fn countdown_reaches_zero_and_starts_game() {
        let mut world = playing_world();
        let mut fx = TickEffects::default();
        let mut last = world.start_number;
        for _ in 0..ticks_for(7.0) {
            fx.clear();
            world.server_tick(&mut fx);
            assert!(world.start_number <= last);
            last = world.start_number;
        }
        assert_eq!(world.start_number, 0);
        assert!(world.game_has_started);
    }

    #[test]
    fn countdown_waits_for_pending_players() {
        let mut world = playing_world();
        world.players[1].net_role = NetRole::Pending;
        let mut fx = TickEffects::default();
        for _ in 0..ticks_for(4.0) {
            fx.clear();
            world.server_tick(&mut fx);
        }
        assert_eq!(world.start_number, FIRST_ROUND_COUNTDOWN);
        assert!(!world.game_has_started);
    }

    #[test]
    fn firing_colors_the_ray_and_destroys_in_order() {
        let mut world = started_world();
        // Park everyone on distinct tiles, shooter on the left edge of row 2.
        place(&mut world, CharacterId::PinkBubbleGum, 0.0, 4.0);
        place(&mut world, CharacterId::RedRover, 0.0, 14.0);
        place(&mut world, CharacterId::GreenTree, 6.0, 14.0);
        place(&mut world, CharacterId::BlueLightning, 12.0, 14.0);
        for player in &mut world.players {
            player.direction = Direction::None;
        }

        let shooter = CharacterId::PinkBubbleGum;
        world.character_mut(shooter).pointing = Direction::Right;
        world.prepare_fire(shooter, 0.0, 4.0, Direction::Right, 0.0);

        let mut fx = TickEffects::default();
        world.server_tick(&mut fx);

        // The whole ray to the right of tile 16 is colored at animation start.
        for t in 17..24 {
            assert_eq!(world.tiles[t].colored_by, ColoredBy::Player(shooter), "tile {t}");
        }
        assert!(!world.character(shooter).active);
        let colored: Vec<_> = fx
            .outgoing
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    Outgoing::Broadcast {
                        body: MessageBody::ColorTile { .. },
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(colored.len(), 7);

        // Movement returns before the first tile falls.
        for _ in 0..25 {
            fx.clear();
            world.server_tick(&mut fx);
        }
        assert!(world.character(shooter).active);
        assert!(world.tiles[17].in_play);

        // First destroyed tile appears once the destroy phase begins.
        for _ in 0..8 {
            fx.clear();
            world.server_tick(&mut fx);
        }
        assert!(!world.tiles[17].in_play);
        assert!(world.tiles[17].recovery_timer > 0.0);

        // Animation fully ends by 71 ticks.
        for _ in 0..40 {
            fx.clear();
            world.server_tick(&mut fx);
        }
        assert!(!world.character(shooter).weapon.animating);
        assert_eq!(world.character(shooter).animation_timer, 0.0);
    }

    #[test]
    fn standing_on_a_sunken_tile_kills_and_credits_the_killer() {
        let mut world = started_world();
        place(&mut world, CharacterId::PinkBubbleGum, 0.0, 0.0);
        place(&mut world, CharacterId::RedRover, 6.0, 6.0);
        place(&mut world, CharacterId::GreenTree, 8.0, 14.0);
        place(&mut world, CharacterId::BlueLightning, 12.0, 14.0);
        for player in &mut world.players {
            player.direction = Direction::None;
        }

        world.tiles[0].colored_by = ColoredBy::Player(CharacterId::RedRover);
        world.tiles[0].in_play = false;
        world.tiles[0].position.z = TILE_ALIVE_Z - 1.0;

        let mut fx = TickEffects::default();
        world.server_tick(&mut fx);

        let victim = world.character(CharacterId::PinkBubbleGum);
        assert_eq!(victim.lives, 4);
        assert!(!victim.is_alive());
        assert_eq!(world.character(CharacterId::RedRover).kills, 1);

        let killed = fx.outgoing.iter().any(|o| {
            matches!(
                o,
                Outgoing::Broadcast {
                    body: MessageBody::PlayerKilled {
                        character: CharacterId::PinkBubbleGum,
                        lives: 4,
                    },
                    ..
                }
            )
        });
        assert!(killed);
    }

    #[test]
    fn lives_never_go_negative() {
        let mut world = started_world();
        place(&mut world, CharacterId::PinkBubbleGum, 0.0, 0.0);
        world.character_mut(CharacterId::PinkBubbleGum).lives = 0;
        world
            .character_mut(CharacterId::PinkBubbleGum)
            .position
            .z = CHARACTER_ALIVE_Z;
        world.tiles[0].position.z = TILE_ALIVE_Z - 1.0;
        let mut fx = TickEffects::default();
        world.server_tick(&mut fx);
        assert_eq!(world.character(CharacterId::PinkBubbleGum).lives, 0);
    }

    #[test]
    fn elimination_with_survivors_arms_the_outer_sweep() {
        let mut world = started_world();
        world.character_mut(CharacterId::BlueLightning).lives = 0;
        world.note_elimination(CharacterId::BlueLightning);
        assert_eq!(world.layers[0].timer, 1);

        // A second elimination arms the second layer.
        world.character_mut(CharacterId::GreenTree).lives = 0;
        world.note_elimination(CharacterId::GreenTree);
        assert_eq!(world.layers[1].timer, 1);
    }

    #[test]
    fn outer_sweep_grays_then_drops_tiles() {
        let mut world = started_world();
        // Keep everyone off the outer rings and idle.
        place(&mut world, CharacterId::PinkBubbleGum, 4.0, 4.0);
        place(&mut world, CharacterId::RedRover, 6.0, 6.0);
        place(&mut world, CharacterId::GreenTree, 8.0, 8.0);
        place(&mut world, CharacterId::BlueLightning, 10.0, 10.0);
        for player in &mut world.players {
            player.direction = Direction::None;
            player.role = CharacterRole::Human;
        }
        world.character_mut(CharacterId::BlueLightning).lives = 0;
        world
            .character_mut(CharacterId::BlueLightning)
            .position
            .z = CHARACTER_ALIVE_Z - 5.0;
        world.note_elimination(CharacterId::BlueLightning);

        let mut fx = TickEffects::default();
        for _ in 0..(LAYER_COLOR_START as usize + 5) {
            fx.clear();
            world.server_tick(&mut fx);
        }
        assert_eq!(world.tiles[OUTER_LAYER[0]].colored_by, ColoredBy::Gray);
        assert!(world.tiles[OUTER_LAYER[0]].in_play);

        for _ in 0..(LAYER_DEATH_START - LAYER_COLOR_START) as usize {
            fx.clear();
            world.server_tick(&mut fx);
        }
        assert!(world.tiles[OUTER_LAYER[0]].is_dead);
        assert!(world.tiles[OUTER_LAYER[0]].position.z < TILE_ALIVE_Z);
    }

    #[test]
    fn destroyed_tiles_recover_after_the_spawn_delay() {
        let mut world = started_world();
        place(&mut world, CharacterId::PinkBubbleGum, 4.0, 4.0);
        place(&mut world, CharacterId::RedRover, 8.0, 8.0);
        place(&mut world, CharacterId::GreenTree, 10.0, 10.0);
        place(&mut world, CharacterId::BlueLightning, 12.0, 12.0);
        for player in &mut world.players {
            player.direction = Direction::None;
        }

        world.tiles[30].in_play = false;
        world.tiles[30].position.z = TILE_ALIVE_Z - 1.0;
        world.tiles[30].colored_by = ColoredBy::Player(CharacterId::RedRover);
        world.tiles[30].recovery_timer = f64::MIN_POSITIVE;

        let mut fx = TickEffects::default();
        let mut recovered_at = None;
        for tick in 0..ticks_for(4.0) {
            fx.clear();
            world.server_tick(&mut fx);
            let recovering = fx.outgoing.iter().any(|o| {
                matches!(
                    o,
                    Outgoing::Broadcast {
                        body: MessageBody::RecoverTile { tile: 30 },
                        ..
                    }
                )
            });
            if recovering {
                recovered_at = Some(tick);
                break;
            }
        }
        let recovered_at = recovered_at.expect("tile never recovered");
        assert!((199..=202).contains(&recovered_at), "tick {recovered_at}");
        assert!(world.tiles[30].in_play);
        assert_eq!(world.tiles[30].colored_by, ColoredBy::None);
    }

    #[test]
    fn cracked_tiles_are_always_player_colored() {
        let mut world = started_world();
        place(&mut world, CharacterId::PinkBubbleGum, 0.0, 4.0);
        place(&mut world, CharacterId::RedRover, 0.0, 14.0);
        place(&mut world, CharacterId::GreenTree, 6.0, 14.0);
        place(&mut world, CharacterId::BlueLightning, 12.0, 14.0);
        for player in &mut world.players {
            player.direction = Direction::None;
        }
        world.character_mut(CharacterId::PinkBubbleGum).pointing = Direction::Right;
        world.prepare_fire(
            CharacterId::PinkBubbleGum,
            0.0,
            4.0,
            Direction::Right,
            0.0,
        );

        let mut fx = TickEffects::default();
        for _ in 0..ticks_for(1.0) {
            fx.clear();
            world.server_tick(&mut fx);
            for (t, tile) in world.tiles.iter().enumerate() {
                if tile.cracked {
                    assert!(
                        matches!(tile.colored_by, ColoredBy::Player(_)),
                        "cracked tile {t} is not player-colored"
                    );
                }
            }
        }
        // The ray actually cracked something.
        assert!(world.tiles.iter().any(|tile| tile.cracked));
    }
}
