//! Types shared by the world server and the client: kinematic math, chunk
//! addressing, the JSON wire protocol, world tunables and the player
//! movement integrator that both sides run.

pub mod config;
pub mod movement;
pub mod protocol;

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

pub use config::{ConfigError, MovementMode, WorldConfig};
pub use movement::InputKeys;
pub use protocol::{ClientMessage, FishSnapshot, ProtocolError, ServerMessage};

/// Reported positions beyond this distance from the origin on either ground
/// axis are rejected. Keeps chunk coordinates and f32 precision well in range.
pub const WORLD_LIMIT: f32 = 1.0e6;

/// Position or velocity in world space. The ground plane is x/z, y is up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    pub fn scale(self, scalar: f32) -> Self {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Finite and within [`WORLD_LIMIT`] on the ground plane.
    pub fn within_world(self) -> bool {
        self.is_finite() && self.x.abs() <= WORLD_LIMIT && self.z.abs() <= WORLD_LIMIT
    }

    /// Moves `t` of the way towards `to`. `t` is clamped to [0, 1].
    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        self + (to - self).scale(t)
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        self.scale(rhs)
    }
}

/// Integer address of a square cell on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkCoord {
    pub const ORIGIN: Self = Self { cx: 0, cz: 0 };

    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// Chunk containing `position`, using floor division so negative
    /// coordinates land in negative chunks. Out-of-range values saturate.
    pub fn containing(position: Vec3, chunk_size: f32) -> Self {
        Self {
            cx: (position.x / chunk_size).floor() as i32,
            cz: (position.z / chunk_size).floor() as i32,
        }
    }

    /// The (2r+1)² block of chunks centred on this one, row-major.
    pub fn interest_block(self, radius: i32) -> Vec<ChunkCoord> {
        let mut block = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                block.push(ChunkCoord::new(
                    self.cx.saturating_add(dx),
                    self.cz.saturating_add(dz),
                ));
            }
        }
        block
    }

    /// True if `other` lies inside this chunk's interest block of `radius`.
    pub fn within_radius(self, other: ChunkCoord, radius: i32) -> bool {
        let radius = i64::from(radius);
        (i64::from(self.cx) - i64::from(other.cx)).abs() <= radius
            && (i64::from(self.cz) - i64::from(other.cz)).abs() <= radius
    }

    /// World-space x/z extent of the chunk as `(min_x, max_x, min_z, max_z)`.
    pub fn bounds(self, chunk_size: f32) -> (f32, f32, f32, f32) {
        let min_x = self.cx as f32 * chunk_size;
        let min_z = self.cz as f32 * chunk_size;
        (min_x, min_x + chunk_size, min_z, min_z + chunk_size)
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.cx, self.cz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec3_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(0.5, -1.0, 2.0);
        assert_eq!(a + b, Vec3::new(1.5, 1.0, 5.0));
        assert_eq!(a - b, Vec3::new(0.5, 3.0, 1.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_vec3_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert_approx_eq!(a.distance(b), 5.0, 1e-6);
    }

    #[test]
    fn test_vec3_lerp_clamps() {
        let a = Vec3::ZERO;
        let b = Vec3::new(2.0, 4.0, 6.0);
        assert_eq!(a.lerp(b, 0.5), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(a.lerp(b, 2.0), b);
        assert_eq!(a.lerp(b, -1.0), a);
    }

    #[test]
    fn test_chunk_of_position() {
        assert_eq!(
            ChunkCoord::containing(Vec3::new(20.0, 0.0, 0.0), 16.0),
            ChunkCoord::new(1, 0)
        );
        assert_eq!(
            ChunkCoord::containing(Vec3::new(15.999, 5.0, 15.999), 16.0),
            ChunkCoord::new(0, 0)
        );
    }

    #[test]
    fn test_chunk_of_negative_position_floors() {
        assert_eq!(
            ChunkCoord::containing(Vec3::new(-0.5, 0.0, -16.0), 16.0),
            ChunkCoord::new(-1, -1)
        );
        assert_eq!(
            ChunkCoord::containing(Vec3::new(-16.5, 0.0, 0.0), 16.0),
            ChunkCoord::new(-2, 0)
        );
    }

    #[test]
    fn test_interest_block_size_and_membership() {
        let center = ChunkCoord::new(3, -1);
        let block = center.interest_block(2);
        assert_eq!(block.len(), 25);
        assert!(block.contains(&ChunkCoord::new(1, -3)));
        assert!(block.contains(&ChunkCoord::new(5, 1)));
        assert!(!block.contains(&ChunkCoord::new(6, -1)));
        assert!(block.iter().all(|c| center.within_radius(*c, 2)));
    }

    #[test]
    fn test_extreme_positions_do_not_overflow_chunk_math() {
        let far = ChunkCoord::containing(Vec3::new(1e20, 0.0, -1e20), 16.0);
        assert_eq!(far, ChunkCoord::new(i32::MAX, i32::MIN));

        let block = far.interest_block(2);
        assert_eq!(block.len(), 25);
        assert!(block.iter().all(|c| far.within_radius(*c, 2)));
        assert!(!far.within_radius(ChunkCoord::new(i32::MIN, i32::MAX), 2));
    }

    #[test]
    fn test_within_world() {
        assert!(Vec3::new(WORLD_LIMIT, -50.0, -WORLD_LIMIT).within_world());
        assert!(!Vec3::new(1e20, 0.0, 0.0).within_world());
        assert!(!Vec3::new(0.0, 0.0, f32::NAN).within_world());
        assert!(!Vec3::new(0.0, f32::INFINITY, 0.0).within_world());
    }

    #[test]
    fn test_chunk_bounds() {
        let (min_x, max_x, min_z, max_z) = ChunkCoord::new(-1, 2).bounds(16.0);
        assert_eq!(min_x, -16.0);
        assert_eq!(max_x, 0.0);
        assert_eq!(min_z, 32.0);
        assert_eq!(max_z, 48.0);
    }
}
