//! World tunables shared by server and client.
//!
//! Loads from JSON (every key optional, missing keys keep their default).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which side owns a player's kinematics.
///
/// Exactly one mode is active per server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MovementMode {
    /// The client reports its position every send interval and the server adopts it.
    #[default]
    Reported,
    /// The client reports key edges and the server integrates motion from them.
    Keys,
}

impl FromStr for MovementMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reported" => Ok(MovementMode::Reported),
            "keys" => Ok(MovementMode::Keys),
            other => Err(ConfigError::Invalid(format!(
                "unknown movement mode '{}', expected 'reported' or 'keys'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Edge length of a chunk in world units.
    pub chunk_size: f32,
    /// Chunks loaded in each direction around a player's chunk.
    pub load_radius: i32,
    pub fish_per_chunk: usize,
    pub fish_min_y: f32,
    pub fish_max_y: f32,
    /// Distance fish keep from their home chunk's edges.
    pub fish_margin: f32,
    pub fish_max_speed: f32,
    pub fish_max_vertical_speed: f32,
    /// Fish move `velocity * fish_drift_scale` per tick.
    pub fish_drift_scale: f32,
    /// Per-tick chance that a fish picks a new heading.
    pub wander_probability: f64,
    /// Simulated seconds after which a fish always picks a new heading.
    pub wander_interval_secs: f64,
    pub tick_millis: u64,
    pub player_speed: f32,
    /// Multiplicative drag applied to player velocity once per tick.
    pub player_damping: f32,
    pub movement_mode: MovementMode,
    /// Seeds the server's random source when set.
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16.0,
            load_radius: 2,
            fish_per_chunk: 3,
            fish_min_y: -6.0,
            fish_max_y: -1.0,
            fish_margin: 1.0,
            fish_max_speed: 2.0,
            fish_max_vertical_speed: 0.5,
            fish_drift_scale: 0.01,
            wander_probability: 0.02,
            wander_interval_secs: 5.0,
            tick_millis: 100,
            player_speed: 5.0,
            player_damping: 0.9,
            movement_mode: MovementMode::Reported,
            seed: None,
        }
    }
}

impl WorldConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Tick period in seconds, the Δt of one simulation step.
    pub fn tick_secs(&self) -> f32 {
        self.tick_millis as f32 / 1000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.chunk_size > 0.0 && self.chunk_size.is_finite()) {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.load_radius < 0 {
            return Err(ConfigError::Invalid("load_radius must not be negative".into()));
        }
        if self.tick_millis == 0 {
            return Err(ConfigError::Invalid("tick_millis must be positive".into()));
        }
        if !(self.fish_min_y.is_finite() && self.fish_max_y.is_finite()) {
            return Err(ConfigError::Invalid("fish depth band must be finite".into()));
        }
        if self.fish_max_y < self.fish_min_y {
            return Err(ConfigError::Invalid(
                "fish_max_y must not be below fish_min_y".into(),
            ));
        }
        // A fish clamped onto a chunk's far edge would floor into the next chunk.
        if !(self.fish_margin > 0.0) || self.fish_margin * 2.0 >= self.chunk_size {
            return Err(ConfigError::Invalid(
                "fish_margin must be positive and less than half a chunk".into(),
            ));
        }
        non_negative("fish_max_speed", self.fish_max_speed)?;
        non_negative("fish_max_vertical_speed", self.fish_max_vertical_speed)?;
        non_negative("fish_drift_scale", self.fish_drift_scale)?;
        non_negative("player_speed", self.player_speed)?;
        if !(self.wander_interval_secs >= 0.0 && self.wander_interval_secs.is_finite()) {
            return Err(ConfigError::Invalid(
                "wander_interval_secs must be finite and not negative".into(),
            ));
        }
        if !(self.player_damping > 0.0 && self.player_damping <= 1.0) {
            return Err(ConfigError::Invalid(
                "player_damping must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.wander_probability) {
            return Err(ConfigError::Invalid(
                "wander_probability must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be finite and not negative, got {}",
            name, value
        )))
    }
}
