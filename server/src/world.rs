//! World State Store: canonical kinematics of every player and fish.
//!
//! Owned by the server's event loop and handed by `&mut` to the tick. Message
//! handlers only touch the per-player input buffer, never kinematic fields.

use log::{info, warn};
use shared::protocol::{GameStateData, PlayerSnapshot};
use shared::{ChunkCoord, FishSnapshot, InputKeys, Vec3};
use std::collections::BTreeMap;

/// Latest client-submitted data for one player, consumed by the tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInput {
    pub keys: InputKeys,
    /// Position and optional velocity from the most recent `movement` message.
    pub reported: Option<(Vec3, Option<Vec3>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub client_id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub input: PlayerInput,
    pub chunk: ChunkCoord,
}

impl PlayerState {
    /// A player at the world origin with every key released.
    pub fn new(client_id: u32) -> Self {
        Self {
            client_id,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            input: PlayerInput::default(),
            chunk: ChunkCoord::ORIGIN,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot::new(self.position, self.velocity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FishEntity {
    pub fish_id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Chunk the fish spawned in. The fish never leaves it.
    pub home_chunk: ChunkCoord,
    /// Simulated time, in seconds, of the last heading change.
    pub last_direction_change: f64,
}

impl FishEntity {
    pub fn snapshot(&self) -> FishSnapshot {
        FishSnapshot {
            id: self.fish_id,
            position: self.position,
            velocity: self.velocity,
            chunk_x: self.home_chunk.cx,
            chunk_z: self.home_chunk.cz,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorldState {
    pub tick: u64,
    /// Simulated seconds since start, advanced by one tick period per tick.
    pub sim_time: f64,
    pub players: BTreeMap<u32, PlayerState>,
    pub fish: BTreeMap<u32, FishEntity>,
    next_fish_id: u32,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, client_id: u32) -> &PlayerState {
        info!("Added player {} at origin", client_id);
        self.players
            .entry(client_id)
            .or_insert_with(|| PlayerState::new(client_id))
    }

    pub fn remove_player(&mut self, client_id: u32) -> Option<PlayerState> {
        let removed = self.players.remove(&client_id);
        if removed.is_some() {
            info!("Removed player {}", client_id);
        }
        removed
    }

    /// Records a key edge in the player's input buffer. Returns false for an
    /// unknown player or a key outside the movement set.
    pub fn set_key(&mut self, client_id: u32, key: &str, pressed: bool) -> bool {
        match self.players.get_mut(&client_id) {
            Some(player) => player.input.keys.set(key, pressed),
            None => false,
        }
    }

    /// Records a reported position in the player's input buffer. Reports
    /// that are non-finite or outside the world limit are dropped.
    pub fn report_movement(
        &mut self,
        client_id: u32,
        position: Vec3,
        velocity: Option<Vec3>,
    ) -> bool {
        if !position.within_world() || velocity.is_some_and(|v| !v.is_finite()) {
            warn!(
                "Player {} reported out-of-range movement {:?} / {:?}",
                client_id, position, velocity
            );
            return false;
        }
        match self.players.get_mut(&client_id) {
            Some(player) => {
                player.input.reported = Some((position, velocity));
                true
            }
            None => false,
        }
    }

    /// Inserts a fish with a freshly issued id and returns the id.
    pub fn insert_fish(&mut self, position: Vec3, velocity: Vec3, home_chunk: ChunkCoord) -> u32 {
        let mut fish_id = self.next_fish_id;
        while self.fish.contains_key(&fish_id) {
            fish_id = fish_id.wrapping_add(1);
        }
        self.next_fish_id = fish_id.wrapping_add(1);
        self.fish.insert(
            fish_id,
            FishEntity {
                fish_id,
                position,
                velocity,
                home_chunk,
                last_direction_change: self.sim_time,
            },
        );
        fish_id
    }

    /// Removes every fish homed to `chunk` and returns their ids.
    pub fn remove_fish_in_chunk(&mut self, chunk: ChunkCoord) -> Vec<u32> {
        let doomed: Vec<u32> = self
            .fish
            .values()
            .filter(|fish| fish.home_chunk == chunk)
            .map(|fish| fish.fish_id)
            .collect();
        for fish_id in &doomed {
            self.fish.remove(fish_id);
        }
        doomed
    }

    pub fn fish_snapshots(&self) -> BTreeMap<u32, FishSnapshot> {
        self.fish
            .iter()
            .map(|(id, fish)| (*id, fish.snapshot()))
            .collect()
    }

    /// Full kinematic snapshot of every entity.
    pub fn snapshot(&self, timestamp: u64) -> GameStateData {
        GameStateData {
            timestamp,
            players: self
                .players
                .iter()
                .map(|(id, player)| (*id, player.snapshot()))
                .collect(),
            fish: self.fish_snapshots(),
        }
    }
}
