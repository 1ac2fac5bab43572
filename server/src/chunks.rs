//! Chunk Manager: per-client interest blocks and the reference-counted set of
//! loaded chunks they add up to.
//!
//! A chunk is loaded while at least one client's (2R+1)² block covers it.
//! Fish are spawned on the 0 → 1 transition of a chunk's count and despawned
//! on the 1 → 0 transition, so a chunk that stays loaded never spawns twice.

use crate::fish::spawn_fish_for_chunk;
use crate::world::WorldState;
use log::{debug, info};
use rand::Rng;
use shared::{ChunkCoord, FishSnapshot, WorldConfig};
use std::collections::{HashMap, HashSet};

/// What one interest change did to the global loaded set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkChange {
    /// Chunks that went from unloaded to loaded.
    pub loaded: Vec<ChunkCoord>,
    /// Chunks that went from loaded to unloaded.
    pub unloaded: Vec<ChunkCoord>,
    pub spawned: Vec<FishSnapshot>,
    pub despawned: Vec<u32>,
}

impl ChunkChange {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.unloaded.is_empty()
    }

    fn merge(&mut self, other: ChunkChange) {
        self.loaded.extend(other.loaded);
        self.unloaded.extend(other.unloaded);
        self.spawned.extend(other.spawned);
        self.despawned.extend(other.despawned);
    }
}

pub struct ChunkManager {
    /// Chunk each client's interest block is currently centred on.
    client_chunks: HashMap<u32, ChunkCoord>,
    /// Number of client blocks covering each loaded chunk.
    load_counts: HashMap<ChunkCoord, u32>,
    load_radius: i32,
}

impl ChunkManager {
    pub fn new(load_radius: i32) -> Self {
        Self {
            client_chunks: HashMap::new(),
            load_counts: HashMap::new(),
            load_radius,
        }
    }

    pub fn client_chunk(&self, client_id: u32) -> Option<ChunkCoord> {
        self.client_chunks.get(&client_id).copied()
    }

    pub fn is_loaded(&self, chunk: ChunkCoord) -> bool {
        self.load_counts.contains_key(&chunk)
    }

    pub fn loaded_chunks(&self) -> HashSet<ChunkCoord> {
        self.load_counts.keys().copied().collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.load_counts.len()
    }

    /// Re-centres `client_id`'s interest block on `new_chunk`, spawning and
    /// despawning fish for chunks that enter or leave the global loaded set.
    ///
    /// A client seen for the first time loads its whole block. An unchanged
    /// chunk is a no-op.
    pub fn update_client_chunk<R: Rng + ?Sized>(
        &mut self,
        client_id: u32,
        new_chunk: ChunkCoord,
        world: &mut WorldState,
        config: &WorldConfig,
        rng: &mut R,
    ) -> ChunkChange {
        let previous = self.client_chunks.insert(client_id, new_chunk);
        if previous == Some(new_chunk) {
            return ChunkChange::default();
        }

        let new_block: HashSet<ChunkCoord> =
            new_chunk.interest_block(self.load_radius).into_iter().collect();
        let old_block: HashSet<ChunkCoord> = previous
            .map(|chunk| chunk.interest_block(self.load_radius).into_iter().collect())
            .unwrap_or_default();

        let mut change = ChunkChange::default();

        // Row-major order keeps spawns reproducible under a seeded RNG.
        for chunk in new_chunk.interest_block(self.load_radius) {
            if old_block.contains(&chunk) {
                continue;
            }
            let count = self.load_counts.entry(chunk).or_insert(0);
            *count += 1;
            if *count == 1 {
                change.loaded.push(chunk);
                change
                    .spawned
                    .extend(self.spawn_entities_for_chunk(chunk, world, config, rng));
            }
        }

        if let Some(previous) = previous {
            for chunk in previous.interest_block(self.load_radius) {
                if !new_block.contains(&chunk) {
                    change.merge(self.release(chunk, world));
                }
            }
        }

        debug!("Client {} moved to chunk {}", client_id, new_chunk);
        if !change.loaded.is_empty() || !change.unloaded.is_empty() {
            info!(
                "{} chunks loaded, {} unloaded ({} live)",
                change.loaded.len(),
                change.unloaded.len(),
                self.loaded_count()
            );
        }
        change
    }

    /// Drops `client_id`'s interest block. Unknown clients are a no-op.
    pub fn remove_client(&mut self, client_id: u32, world: &mut WorldState) -> ChunkChange {
        let mut change = ChunkChange::default();
        if let Some(chunk) = self.client_chunks.remove(&client_id) {
            for chunk in chunk.interest_block(self.load_radius) {
                change.merge(self.release(chunk, world));
            }
        }
        change
    }

    /// Removes the interest of every client not in `live`.
    pub fn retain_clients<F>(&mut self, live: F, world: &mut WorldState) -> ChunkChange
    where
        F: Fn(u32) -> bool,
    {
        let stale: Vec<u32> = self
            .client_chunks
            .keys()
            .copied()
            .filter(|id| !live(*id))
            .collect();
        let mut change = ChunkChange::default();
        for client_id in stale {
            change.merge(self.remove_client(client_id, world));
        }
        change
    }

    pub fn spawn_entities_for_chunk<R: Rng + ?Sized>(
        &self,
        chunk: ChunkCoord,
        world: &mut WorldState,
        config: &WorldConfig,
        rng: &mut R,
    ) -> Vec<FishSnapshot> {
        let spawned = spawn_fish_for_chunk(world, chunk, config, rng);
        debug!("Spawned {} fish in chunk {}", spawned.len(), chunk);
        spawned
    }

    pub fn despawn_entities_for_chunk(&self, chunk: ChunkCoord, world: &mut WorldState) -> Vec<u32> {
        let removed = world.remove_fish_in_chunk(chunk);
        debug!("Despawned {} fish in chunk {}", removed.len(), chunk);
        removed
    }

    fn release(&mut self, chunk: ChunkCoord, world: &mut WorldState) -> ChunkChange {
        let mut change = ChunkChange::default();
        let remaining = match self.load_counts.get_mut(&chunk) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return change,
        };
        if remaining == 0 {
            self.load_counts.remove(&chunk);
            change.unloaded.push(chunk);
            change.despawned = self.despawn_entities_for_chunk(chunk, world);
        }
        change
    }
}
