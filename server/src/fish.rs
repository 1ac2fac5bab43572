//! Ambient fish: placement when a chunk loads and the per-tick wander step.
//!
//! All randomness comes from the caller's RNG so a seeded server replays the
//! same spawns and headings.

use crate::world::{FishEntity, WorldState};
use rand::Rng;
use shared::{ChunkCoord, FishSnapshot, Vec3, WorldConfig};

/// Inner bounds a fish of `chunk` is kept within: `(min, max)` per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FishBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl FishBounds {
    pub fn for_chunk(chunk: ChunkCoord, config: &WorldConfig) -> Self {
        let (min_x, max_x, min_z, max_z) = chunk.bounds(config.chunk_size);
        let margin = config.fish_margin;
        Self {
            min: Vec3::new(min_x + margin, config.fish_min_y, min_z + margin),
            max: Vec3::new(max_x - margin, config.fish_max_y, max_z - margin),
        }
    }

    pub fn contains(&self, position: Vec3) -> bool {
        (self.min.x..=self.max.x).contains(&position.x)
            && (self.min.y..=self.max.y).contains(&position.y)
            && (self.min.z..=self.max.z).contains(&position.z)
    }
}

pub fn random_velocity<R: Rng + ?Sized>(rng: &mut R, config: &WorldConfig) -> Vec3 {
    let horizontal = config.fish_max_speed;
    let vertical = config.fish_max_vertical_speed;
    Vec3::new(
        rng.gen_range(-horizontal..=horizontal),
        rng.gen_range(-vertical..=vertical),
        rng.gen_range(-horizontal..=horizontal),
    )
}

/// Places `fish_per_chunk` fish uniformly inside `chunk`'s inner bounds.
pub fn spawn_fish_for_chunk<R: Rng + ?Sized>(
    world: &mut WorldState,
    chunk: ChunkCoord,
    config: &WorldConfig,
    rng: &mut R,
) -> Vec<FishSnapshot> {
    let bounds = FishBounds::for_chunk(chunk, config);
    let mut spawned = Vec::with_capacity(config.fish_per_chunk);

    for _ in 0..config.fish_per_chunk {
        let position = Vec3::new(
            rng.gen_range(bounds.min.x..=bounds.max.x),
            rng.gen_range(bounds.min.y..=bounds.max.y),
            rng.gen_range(bounds.min.z..=bounds.max.z),
        );
        let velocity = random_velocity(rng, config);
        let fish_id = world.insert_fish(position, velocity, chunk);
        if let Some(fish) = world.fish.get(&fish_id) {
            spawned.push(fish.snapshot());
        }
    }

    spawned
}

/// One AI step: maybe pick a new heading, drift, then bounce off the home
/// chunk's inner bounds and the depth band.
pub fn step_fish<R: Rng + ?Sized>(
    fish: &mut FishEntity,
    now: f64,
    config: &WorldConfig,
    rng: &mut R,
) {
    let overdue = now - fish.last_direction_change >= config.wander_interval_secs;
    if overdue || rng.gen_bool(config.wander_probability) {
        fish.velocity = random_velocity(rng, config);
        fish.last_direction_change = now;
    }

    fish.position += fish.velocity.scale(config.fish_drift_scale);

    let bounds = FishBounds::for_chunk(fish.home_chunk, config);
    bounce_axis(&mut fish.position.x, &mut fish.velocity.x, bounds.min.x, bounds.max.x);
    bounce_axis(&mut fish.position.y, &mut fish.velocity.y, bounds.min.y, bounds.max.y);
    bounce_axis(&mut fish.position.z, &mut fish.velocity.z, bounds.min.z, bounds.max.z);
}

fn bounce_axis(position: &mut f32, velocity: &mut f32, min: f32, max: f32) {
    if *position <= min {
        *position = min;
        *velocity = velocity.abs();
    } else if *position >= max {
        *position = max;
        *velocity = -velocity.abs();
    }
}
