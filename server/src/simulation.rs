//! The authoritative simulation step.
//!
//! `tick` is the only code that writes kinematic fields of the world or
//! touches the chunk manager. It reads each player's input buffer, so message
//! handlers running between ticks never race with it.

use crate::chunks::ChunkManager;
use crate::fish::step_fish;
use crate::world::WorldState;
use rand::Rng;
use shared::movement::integrate_player;
use shared::protocol::GameStateData;
use shared::{ChunkCoord, FishSnapshot, MovementMode, WorldConfig};
use std::collections::HashSet;

/// Everything a tick produced that has to go out on the wire.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Players whose interest block was loaded for the first time this tick.
    pub joined: Vec<u32>,
    /// Clients whose chunk changed this tick, with their new chunk.
    pub chunk_updates: Vec<(u32, ChunkCoord)>,
    pub spawned: Vec<FishSnapshot>,
    pub despawned: Vec<u32>,
    pub snapshot: GameStateData,
}

/// Runs one fixed-period step and returns the snapshot of its end state.
pub fn tick<R: Rng + ?Sized>(
    world: &mut WorldState,
    chunks: &mut ChunkManager,
    config: &WorldConfig,
    rng: &mut R,
    timestamp: u64,
) -> TickReport {
    let dt = config.tick_secs();
    let mut report = TickReport::default();

    world.tick += 1;
    world.sim_time += dt as f64;

    // Players who disconnected since the last tick no longer hold chunks.
    let live: HashSet<u32> = world.players.keys().copied().collect();
    let departed = chunks.retain_clients(|id| live.contains(&id), world);
    report.despawned.extend(departed.despawned);

    // 1. Player motion.
    for player in world.players.values_mut() {
        match config.movement_mode {
            MovementMode::Keys => {
                let keys = player.input.keys;
                integrate_player(&mut player.position, &mut player.velocity, &keys, dt, config);
            }
            MovementMode::Reported => {
                if let Some((position, velocity)) = player.input.reported {
                    let implied = (position - player.position).scale(1.0 / dt);
                    player.velocity = velocity.unwrap_or(implied);
                    player.position = position;
                }
            }
        }
    }

    // 2. Chunk membership.
    let client_ids: Vec<u32> = world.players.keys().copied().collect();
    for client_id in client_ids {
        let Some(player) = world.players.get_mut(&client_id) else {
            continue;
        };
        let chunk = ChunkCoord::containing(player.position, config.chunk_size);
        let changed = chunk != player.chunk;
        player.chunk = chunk;

        let joining = chunks.client_chunk(client_id).is_none();
        if !joining && !changed {
            continue;
        }

        let change = chunks.update_client_chunk(client_id, chunk, world, config, rng);
        report.spawned.extend(change.spawned);
        report.despawned.extend(change.despawned);
        if joining {
            report.joined.push(client_id);
        }
        if changed {
            report.chunk_updates.push((client_id, chunk));
        }
    }

    // 3. Fish wander and drift.
    let now = world.sim_time;
    for fish in world.fish.values_mut() {
        step_fish(fish, now, config, rng);
    }

    // 4. Snapshot.
    report.snapshot = world.snapshot(timestamp);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::Vec3;

    struct Sim {
        world: WorldState,
        chunks: ChunkManager,
        config: WorldConfig,
        rng: StdRng,
    }

    impl Sim {
        fn new(config: WorldConfig) -> Self {
            Self {
                world: WorldState::new(),
                chunks: ChunkManager::new(config.load_radius),
                config,
                rng: StdRng::seed_from_u64(21),
            }
        }

        fn step(&mut self) -> TickReport {
            tick(
                &mut self.world,
                &mut self.chunks,
                &self.config,
                &mut self.rng,
                0,
            )
        }

        /// Adds a player and runs the tick that loads its chunks.
        fn connect(&mut self, client_id: u32) -> TickReport {
            self.world.add_player(client_id);
            self.step()
        }
    }

    #[test]
    fn test_new_player_loads_origin_block_on_next_tick() {
        let mut sim = Sim::new(WorldConfig::default());
        let report = sim.connect(0);

        assert_eq!(report.joined, vec![0]);
        assert!(report.chunk_updates.is_empty());
        assert_eq!(report.spawned.len(), 25 * sim.config.fish_per_chunk);
        assert_eq!(report.snapshot.fish.len(), 25 * sim.config.fish_per_chunk);
        assert_eq!(sim.chunks.client_chunk(0), Some(ChunkCoord::ORIGIN));

        let next = sim.step();
        assert!(next.joined.is_empty());
        assert!(next.spawned.is_empty());
    }

    #[test]
    fn test_reported_movement_changes_chunk_once() {
        let mut sim = Sim::new(WorldConfig::default());
        sim.connect(0);

        sim.world.report_movement(0, Vec3::new(20.0, 0.0, 0.0), None);
        let first = sim.step();
        assert_eq!(first.chunk_updates, vec![(0, ChunkCoord::new(1, 0))]);
        assert_eq!(first.spawned.len(), 5 * sim.config.fish_per_chunk);
        assert!(first.spawned.iter().all(|f| f.chunk_x == 3));

        sim.world.report_movement(0, Vec3::new(20.0, 0.0, 0.0), None);
        let second = sim.step();
        assert!(second.chunk_updates.is_empty());
        assert!(second.spawned.is_empty());
    }

    #[test]
    fn test_movement_before_first_tick_joins_at_reported_chunk() {
        let mut sim = Sim::new(WorldConfig::default());
        sim.world.add_player(0);
        sim.world.report_movement(0, Vec3::new(-40.0, 0.0, 0.0), None);

        let report = sim.step();

        assert_eq!(report.joined, vec![0]);
        assert_eq!(report.chunk_updates, vec![(0, ChunkCoord::new(-3, 0))]);
        assert!(!sim.chunks.is_loaded(ChunkCoord::ORIGIN));
    }

    #[test]
    fn test_far_out_report_leaves_player_in_place() {
        let mut sim = Sim::new(WorldConfig::default());
        sim.connect(0);
        sim.world.report_movement(0, Vec3::new(5.0, 0.0, 5.0), None);
        sim.step();

        sim.world.report_movement(0, Vec3::new(1e20, 0.0, 0.0), None);
        let report = sim.step();

        assert!(report.chunk_updates.is_empty());
        assert!(report.spawned.is_empty());
        assert_eq!(sim.world.players[&0].position, Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(sim.chunks.client_chunk(0), Some(ChunkCoord::ORIGIN));
    }

    #[test]
    fn test_reported_velocity_is_adopted_or_implied() {
        let mut sim = Sim::new(WorldConfig::default());
        sim.connect(0);

        sim.world
            .report_movement(0, Vec3::new(1.0, 0.0, 0.0), Some(Vec3::new(3.0, 0.0, 0.0)));
        sim.step();
        assert_eq!(sim.world.players[&0].velocity, Vec3::new(3.0, 0.0, 0.0));

        sim.world.report_movement(0, Vec3::new(1.5, 0.0, 0.0), None);
        sim.step();
        let velocity = sim.world.players[&0].velocity;
        assert_approx_eq!(velocity.x, 5.0, 1e-3);
    }

    #[test]
    fn test_key_mode_integrates_from_keys() {
        let config = WorldConfig {
            movement_mode: MovementMode::Keys,
            ..WorldConfig::default()
        };
        let mut sim = Sim::new(config);
        sim.connect(0);
        sim.world.set_key(0, "right", true);
        sim.world.report_movement(0, Vec3::new(100.0, 0.0, 0.0), None);

        sim.step();

        let player = &sim.world.players[&0];
        assert_approx_eq!(player.velocity.x, 4.5, 1e-5);
        assert_approx_eq!(player.position.x, 0.45, 1e-5);
    }

    #[test]
    fn test_key_mode_crosses_chunk_boundary() {
        let config = WorldConfig {
            movement_mode: MovementMode::Keys,
            ..WorldConfig::default()
        };
        let mut sim = Sim::new(config);
        sim.connect(0);
        sim.world.set_key(0, "left", true);

        let mut updates = Vec::new();
        for _ in 0..5 {
            updates.extend(sim.step().chunk_updates);
        }

        assert_eq!(updates, vec![(0, ChunkCoord::new(-1, 0))]);
    }

    #[test]
    fn test_disconnected_player_releases_chunks_next_tick() {
        let mut sim = Sim::new(WorldConfig::default());
        sim.connect(0);
        sim.world.remove_player(0);

        let report = sim.step();

        assert_eq!(sim.chunks.loaded_count(), 0);
        assert!(sim.world.fish.is_empty());
        assert!(report.snapshot.fish.is_empty());
        assert!(report.snapshot.players.is_empty());
        assert_eq!(report.despawned.len(), 25 * sim.config.fish_per_chunk);
    }

    #[test]
    fn test_snapshot_reflects_end_of_tick_state() {
        let mut sim = Sim::new(WorldConfig::default());
        sim.world.add_player(0);
        sim.world.add_player(1);

        let report = sim.step();

        assert_eq!(report.joined, vec![0, 1]);
        assert_eq!(report.snapshot.players.len(), 2);
        assert_eq!(report.snapshot.fish.len(), sim.world.fish.len());
        for (id, fish) in &sim.world.fish {
            assert_eq!(report.snapshot.fish[id].position, fish.position);
        }
        assert_eq!(sim.world.tick, 1);
    }

    #[test]
    fn test_fish_stay_home_across_many_ticks() {
        let mut sim = Sim::new(WorldConfig::default());
        sim.connect(0);

        for _ in 0..500 {
            let report = sim.step();
            for fish in report.snapshot.fish.values() {
                assert_eq!(
                    ChunkCoord::containing(fish.position, sim.config.chunk_size),
                    fish.home_chunk()
                );
            }
        }
    }

    #[test]
    fn test_seeded_simulation_is_reproducible() {
        let run = || {
            let mut sim = Sim::new(WorldConfig::default());
            sim.connect(0);
            sim.world.report_movement(0, Vec3::new(40.0, 0.0, -20.0), None);
            for _ in 0..50 {
                sim.step();
            }
            sim.world.snapshot(0)
        };
        assert_eq!(run(), run());
    }
}
