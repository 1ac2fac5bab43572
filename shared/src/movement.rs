//! Player movement integrator.
//!
//! The server runs it once per tick when it owns player kinematics; the client
//! runs it every frame for prediction. Both must produce the same motion for
//! the same keys, so the per-tick damping is rescaled to the step length.

use crate::{Vec3, WorldConfig};
use serde::{Deserialize, Serialize};

/// Held state of the four movement keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputKeys {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputKeys {
    pub const NAMES: [&'static str; 4] = ["up", "down", "left", "right"];

    /// Sets a key by its wire name. Returns false for names outside the fixed set.
    pub fn set(&mut self, key: &str, pressed: bool) -> bool {
        match key {
            "up" => self.up = pressed,
            "down" => self.down = pressed,
            "left" => self.left = pressed,
            "right" => self.right = pressed,
            _ => return false,
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        match key {
            "up" => Some(self.up),
            "down" => Some(self.down),
            "left" => Some(self.left),
            "right" => Some(self.right),
            _ => None,
        }
    }

    /// Velocity the held keys ask for: `speed` along ±x / ±z, zero on an axis
    /// whose keys are both released or both held. "up" points towards -z.
    pub fn desired_velocity(&self, speed: f32) -> Vec3 {
        let mut desired = Vec3::ZERO;
        if self.left != self.right {
            desired.x = if self.right { speed } else { -speed };
        }
        if self.up != self.down {
            desired.z = if self.down { speed } else { -speed };
        }
        desired
    }
}

/// Advances one player by `dt` seconds from its held keys.
///
/// Axes with a desired component take it, then the whole velocity is damped
/// and integrated into position.
pub fn integrate_player(
    position: &mut Vec3,
    velocity: &mut Vec3,
    keys: &InputKeys,
    dt: f32,
    config: &WorldConfig,
) {
    let desired = keys.desired_velocity(config.player_speed);
    if desired.x != 0.0 {
        velocity.x = desired.x;
    }
    if desired.z != 0.0 {
        velocity.z = desired.z;
    }

    *velocity = velocity.scale(damping_for_step(dt, config));
    *position += velocity.scale(dt);
}

/// Damping factor for a step of `dt` seconds. Equals `player_damping` for a
/// full tick.
pub fn damping_for_step(dt: f32, config: &WorldConfig) -> f32 {
    config.player_damping.powf(dt / config.tick_secs())
}
