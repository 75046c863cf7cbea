use crate::sim::OBJECT_FALLING_STEP;
use crate::sim::character::{CHARACTER_ALIVE_Z, Character, Direction, INITIAL_CHARACTER_SPEED};

use super::connection::CharacterMovement;

/// Past this far off the authoritative path, snap instead of gliding.
pub const WARP_DISCREPANCY: f32 = 3.0;

/// Place `character` for the render time `render_ms`, which lies in
/// `[prev.tick_ms, next.tick_ms)`. A still-valid locally predicted
/// direction overrides the authoritative one; positional error is either
/// recorded as a discrepancy for gradual catch-up or warped away.
pub fn interpolate_character(
    character: &mut Character,
    half_ping_ms: u32,
    prev: &mut CharacterMovement,
    next: &CharacterMovement,
) {
    let alive = character.is_alive();
    let should_be_alive = !prev.dead;
    if !alive && !should_be_alive {
        return;
    }

    if should_be_alive != alive {
        character.active = should_be_alive;
    }

    let mut check_discrepancy = true;
    if character.predicted_direction_deadline_ms > 0 {
        // Allow for the round trip the prediction is racing against.
        let deadline = character.predicted_direction_deadline_ms + half_ping_ms * 3;
        if deadline >= prev.tick_ms {
            prev.direction = character.predicted_direction;
            prev.pointing = if character.predicted_direction.is_some() {
                character.predicted_direction
            } else {
                character.pointing
            };
            character.movement_consumed = 0;
            if deadline < next.tick_ms {
                character.predicted_direction_deadline_ms = 0;
            }
            check_discrepancy = false;
        }
    }

    if should_be_alive != alive {
        character.position.x = prev.x;
        character.position.y = prev.y;
        character.x_discrepancy = 0.0;
        character.y_discrepancy = 0.0;
    } else if check_discrepancy {
        if character.direction == prev.direction {
            character.movement_consumed += 1;
        }
        // Only trust the offset once the same direction has been confirmed
        // twice in a row.
        if character.movement_consumed >= 2 {
            let off_x = (character.position.x - prev.x).abs();
            let off_y = (character.position.y - prev.y).abs();
            if off_x >= WARP_DISCREPANCY || off_y >= WARP_DISCREPANCY {
                character.position.x = prev.x;
                character.position.y = prev.y;
                character.x_discrepancy = 0.0;
                character.y_discrepancy = 0.0;
            } else {
                character.x_discrepancy = prev.x - character.position.x;
                character.y_discrepancy = prev.y - character.position.y;
            }
            character.movement_consumed = 0;
        }
    } else {
        character.x_discrepancy = 0.0;
        character.y_discrepancy = 0.0;
    }

    if should_be_alive != alive {
        if should_be_alive {
            character.position.z = CHARACTER_ALIVE_Z;
        } else {
            character.position.z -= OBJECT_FALLING_STEP;
        }
    }

    character.direction = prev.direction;
    character.pointing = prev.pointing;
}

/// Walk toward the recorded discrepancy by a bounded step. Moving
/// characters catch up four times faster than idle ones, where a visible
/// correction would be obvious.
pub fn resolve_discrepancy(character: &mut Character, dt: f32) {
    let step = if character.direction == Direction::None {
        dt * INITIAL_CHARACTER_SPEED / 64.0
    } else {
        dt * INITIAL_CHARACTER_SPEED / 16.0
    };

    if character.x_discrepancy.abs() < step {
        character.x_discrepancy = 0.0;
    } else if character.x_discrepancy > 0.0 {
        character.position.x += step;
        character.x_discrepancy -= step;
    } else {
        character.position.x -= step;
        character.x_discrepancy += step;
    }

    if character.y_discrepancy.abs() < step {
        character.y_discrepancy = 0.0;
    } else if character.y_discrepancy > 0.0 {
        character.position.y += step;
        character.y_discrepancy -= step;
    } else {
        character.position.y -= step;
        character.y_discrepancy += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::character::CharacterId;

    fn movement(x: f32, y: f32, tick_ms: u32, dead: bool) -> CharacterMovement {
        CharacterMovement {
            x,
            y,
            direction: Direction::Right,
            pointing: Direction::Right,
            dead,
            tick_ms,
        }
    }

    fn alive_character() -> Character {
        let mut character = Character::new(CharacterId::GreenTree);
        character.lives = 5;
        character.active = true;
        character.position.z = CHARACTER_ALIVE_Z;
        character.direction = Direction::Right;
        character
    }

    #[test]
    fn discrepancy_recorded_after_two_confirmations() {
        let mut character = alive_character();
        character.position.x = 5.5;
        let mut prev = movement(5.0, 0.0, 9_600, false);
        let next = movement(7.0, 0.0, 9_800, false);

        interpolate_character(&mut character, 100, &mut prev, &next);
        assert_eq!(character.x_discrepancy, 0.0);
        let mut prev = movement(5.0, 0.0, 9_600, false);
        interpolate_character(&mut character, 100, &mut prev, &next);
        assert!((character.x_discrepancy - -0.5).abs() < 1e-5);
    }

    #[test]
    fn large_error_warps_instead() {
        let mut character = alive_character();
        character.position.x = 9.0;
        character.movement_consumed = 1;
        let mut prev = movement(5.0, 0.0, 9_600, false);
        let next = movement(7.0, 0.0, 9_800, false);

        interpolate_character(&mut character, 100, &mut prev, &next);
        assert_eq!(character.position.x, 5.0);
        assert_eq!(character.x_discrepancy, 0.0);
    }

    #[test]
    fn death_transition_warps_and_starts_falling() {
        let mut character = alive_character();
        character.position.x = 3.0;
        let mut prev = movement(5.0, 1.0, 9_600, true);
        let next = movement(5.0, 1.0, 9_800, true);

        interpolate_character(&mut character, 50, &mut prev, &next);
        assert!(!character.active);
        assert_eq!(character.position.x, 5.0);
        assert!(character.position.z < CHARACTER_ALIVE_Z);
    }

    #[test]
    fn revival_restores_alive_height() {
        let mut character = alive_character();
        character.position.z = CHARACTER_ALIVE_Z - 10.0;
        let mut prev = movement(2.0, 2.0, 9_600, false);
        let next = movement(2.0, 2.0, 9_800, false);

        interpolate_character(&mut character, 50, &mut prev, &next);
        assert!(character.active);
        assert_eq!(character.position.z, CHARACTER_ALIVE_Z);
        assert_eq!(character.position.x, 2.0);
    }

    #[test]
    fn valid_prediction_overrides_direction() {
        let mut character = alive_character();
        character.predicted_direction = Direction::Up;
        character.predicted_direction_deadline_ms = 9_500;
        let mut prev = movement(5.0, 0.0, 9_600, false);
        let next = movement(7.0, 0.0, 9_800, false);

        interpolate_character(&mut character, 50, &mut prev, &next);
        assert_eq!(character.direction, Direction::Up);
        assert_eq!(character.pointing, Direction::Up);
        // The prediction's validity ends before the next snapshot, so it
        // is disarmed after this frame.
        assert_eq!(character.predicted_direction_deadline_ms, 0);
    }

    #[test]
    fn catch_up_step_is_bounded() {
        let mut character = alive_character();
        character.direction = Direction::Right;
        character.x_discrepancy = 1.0;
        let dt = 0.0177;
        let start = character.position.x;
        resolve_discrepancy(&mut character, dt);
        let moved = character.position.x - start;
        let bound = dt * INITIAL_CHARACTER_SPEED / 16.0;
        assert!(moved <= bound + 1e-6);
        assert!(moved > 0.0);

        // Idle characters correct four times slower.
        character.direction = Direction::None;
        character.x_discrepancy = 1.0;
        let start = character.position.x;
        resolve_discrepancy(&mut character, dt);
        let idle_moved = character.position.x - start;
        assert!(idle_moved <= dt * INITIAL_CHARACTER_SPEED / 64.0 + 1e-6);
    }

    #[test]
    fn small_discrepancy_clears_without_overshoot() {
        let mut character = alive_character();
        character.direction = Direction::Right;
        character.x_discrepancy = 1e-4;
        let x = character.position.x;
        resolve_discrepancy(&mut character, 0.0177);
        assert_eq!(character.x_discrepancy, 0.0);
        assert_eq!(character.position.x, x);
    }
}
