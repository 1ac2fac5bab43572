//! Client-side reconciliation: local prediction plus smoothing of remote entities.
//!
//! Network messages only move *targets*. Displayed state changes in `frame`,
//! once per render frame, so a snapshot arriving mid-frame never causes a
//! visible jump on its own.

use log::{debug, info};
use shared::protocol::GameStateData;
use shared::{ChunkCoord, ClientMessage, FishSnapshot, InputKeys, ServerMessage, Vec3, WorldConfig};
use shared::movement::integrate_player;
use std::collections::HashMap;
use std::time::Duration;

/// Tunables for prediction and smoothing
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// How often the predicted position is reported to the server
    pub send_interval: Duration,
    /// Local divergence beyond which the prediction is snapped to the server
    pub correction_threshold: f32,
    /// Remote divergence beyond which smoothing is skipped
    pub snap_threshold: f32,
    /// Exponential smoothing rate, per second
    pub smoothing_rate: f32,
    /// Fraction of the smoothed velocity added to the displayed position each second
    pub velocity_lead: f32,
    /// Remaining distance below which a remote entity lands on its target
    pub settle_epsilon: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(50),
            correction_threshold: 5.0,
            snap_threshold: 10.0,
            smoothing_rate: 10.0,
            velocity_lead: 0.1,
            settle_epsilon: 1e-4,
        }
    }
}

impl ReconcileConfig {
    /// Fraction of the remaining gap closed in a frame of `dt` seconds.
    pub fn smoothing_alpha(&self, dt: f32) -> f32 {
        1.0 - (-self.smoothing_rate * dt).exp()
    }
}

/// The locally controlled player, driven by prediction.
#[derive(Debug, Clone, Default)]
pub struct LocalPlayer {
    pub position: Vec3,
    pub velocity: Vec3,
    pub keys: InputKeys,
}

/// A remote player or fish as displayed, chasing the latest authoritative values.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub position: Vec3,
    pub velocity: Vec3,
    pub target_position: Vec3,
    pub target_velocity: Vec3,
    pub chunk: ChunkCoord,
}

impl RemoteEntity {
    pub fn new(position: Vec3, velocity: Vec3, chunk: ChunkCoord) -> Self {
        Self {
            position,
            velocity,
            target_position: position,
            target_velocity: velocity,
            chunk,
        }
    }

    pub fn retarget(&mut self, position: Vec3, velocity: Vec3, chunk: ChunkCoord) {
        self.target_position = position;
        self.target_velocity = velocity;
        self.chunk = chunk;
    }

    /// Moves the displayed state one frame toward the target.
    pub fn step(&mut self, dt: f32, config: &ReconcileConfig) {
        let gap = self.target_position - self.position;
        if gap.length() > config.snap_threshold {
            self.position = self.target_position;
            self.velocity = self.target_velocity;
            return;
        }

        let alpha = config.smoothing_alpha(dt);
        self.velocity = self.velocity.lerp(self.target_velocity, alpha);
        self.position += gap.scale(alpha) + self.velocity.scale(config.velocity_lead * dt);

        if (self.target_position - self.position).length() < config.settle_epsilon {
            self.position = self.target_position;
        }
        if (self.target_velocity - self.velocity).length() < config.settle_epsilon {
            self.velocity = self.target_velocity;
        }
    }

    pub fn is_settled(&self) -> bool {
        self.position == self.target_position && self.velocity == self.target_velocity
    }
}

/// Per-client view of the world built from server messages.
pub struct ReconciliationEngine {
    config: ReconcileConfig,
    world: WorldConfig,

    client_id: Option<u32>,
    local: LocalPlayer,
    current_chunk: ChunkCoord,
    confirmed_chunk: Option<ChunkCoord>,
    players: HashMap<u32, RemoteEntity>,
    fish: HashMap<u32, RemoteEntity>,

    // Statistics
    corrections: u32,
    snapshots: u64,
    last_timestamp: u64,
}

impl ReconciliationEngine {
    pub fn new(config: ReconcileConfig, world: WorldConfig) -> Self {
        Self {
            config,
            world,
            client_id: None,
            local: LocalPlayer::default(),
            current_chunk: ChunkCoord::ORIGIN,
            confirmed_chunk: None,
            players: HashMap::new(),
            fish: HashMap::new(),
            corrections: 0,
            snapshots: 0,
            last_timestamp: 0,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn world_config(&self) -> &WorldConfig {
        &self.world
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn local(&self) -> &LocalPlayer {
        &self.local
    }

    pub fn current_chunk(&self) -> ChunkCoord {
        self.current_chunk
    }

    /// Last chunk the server confirmed with `chunkUpdate`.
    pub fn confirmed_chunk(&self) -> Option<ChunkCoord> {
        self.confirmed_chunk
    }

    pub fn players(&self) -> &HashMap<u32, RemoteEntity> {
        &self.players
    }

    pub fn fish(&self) -> &HashMap<u32, RemoteEntity> {
        &self.fish
    }

    pub fn corrections(&self) -> u32 {
        self.corrections
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    /// Whether `chunk` is inside the block around this client's own chunk.
    pub fn is_loaded(&self, chunk: ChunkCoord) -> bool {
        self.current_chunk.within_radius(chunk, self.world.load_radius)
    }

    pub fn set_keys(&mut self, keys: InputKeys) {
        self.local.keys = keys;
    }

    /// Forgets everything learned from the previous connection.
    pub fn reset(&mut self) {
        self.client_id = None;
        self.confirmed_chunk = None;
        self.players.clear();
        self.fish.clear();
    }

    /// Folds one server message into the targets.
    pub fn apply_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Welcome { id } => {
                info!("Assigned client id {}", id);
                self.reset();
                self.client_id = Some(id);
                self.local = LocalPlayer {
                    keys: self.local.keys,
                    ..LocalPlayer::default()
                };
                self.current_chunk = ChunkCoord::ORIGIN;
            }
            ServerMessage::FishInit { fish } => {
                self.fish.clear();
                for snapshot in fish.values() {
                    self.upsert_fish(snapshot);
                }
                debug!("fishInit: holding {} of {} fish", self.fish.len(), fish.len());
            }
            ServerMessage::FishSpawn { fish } => {
                self.upsert_fish(&fish);
            }
            ServerMessage::GameState { data } => {
                self.apply_snapshot(&data);
            }
            ServerMessage::ChunkUpdate { chunk_x, chunk_z } => {
                let chunk = ChunkCoord::new(chunk_x, chunk_z);
                debug!("Server confirmed chunk {}", chunk);
                self.confirmed_chunk = Some(chunk);
            }
        }
    }

    fn upsert_fish(&mut self, snapshot: &FishSnapshot) {
        let chunk = snapshot.home_chunk();
        if !self.is_loaded(chunk) {
            return;
        }
        self.fish
            .entry(snapshot.id)
            .and_modify(|fish| fish.retarget(snapshot.position, snapshot.velocity, chunk))
            .or_insert_with(|| RemoteEntity::new(snapshot.position, snapshot.velocity, chunk));
    }

    /// Applies an authoritative snapshot: corrects the local player if it has
    /// drifted too far and retargets everything else.
    pub fn apply_snapshot(&mut self, data: &GameStateData) {
        self.snapshots += 1;
        self.last_timestamp = data.timestamp;

        for (&id, snapshot) in &data.players {
            let position = snapshot.position();
            let velocity = snapshot.velocity();

            if Some(id) == self.client_id {
                let divergence = position.distance(self.local.position);
                if divergence > self.config.correction_threshold {
                    debug!("Correcting local player, off by {:.2}", divergence);
                    self.local.position = position;
                    self.local.velocity = velocity;
                    self.corrections += 1;
                    self.refresh_chunk();
                }
                continue;
            }

            let chunk = ChunkCoord::containing(position, self.world.chunk_size);
            if !self.is_loaded(chunk) {
                self.players.remove(&id);
                continue;
            }
            self.players
                .entry(id)
                .and_modify(|player| player.retarget(position, velocity, chunk))
                .or_insert_with(|| RemoteEntity::new(position, velocity, chunk));
        }
        self.players.retain(|id, _| data.players.contains_key(id));

        for snapshot in data.fish.values() {
            self.upsert_fish(snapshot);
        }
        self.fish.retain(|id, _| data.fish.contains_key(id));
    }

    /// Advances one render frame of `dt` seconds.
    pub fn frame(&mut self, dt: f32) {
        let keys = self.local.keys;
        integrate_player(
            &mut self.local.position,
            &mut self.local.velocity,
            &keys,
            dt,
            &self.world,
        );
        self.refresh_chunk();

        for player in self.players.values_mut() {
            player.step(dt, &self.config);
        }
        for fish in self.fish.values_mut() {
            fish.step(dt, &self.config);
        }
    }

    /// Recomputes the local chunk and tears down entities that fell out of the block.
    fn refresh_chunk(&mut self) {
        let chunk = ChunkCoord::containing(self.local.position, self.world.chunk_size);
        if chunk == self.current_chunk {
            return;
        }
        self.current_chunk = chunk;

        let radius = self.world.load_radius;
        let before = self.players.len() + self.fish.len();
        self.players.retain(|_, p| chunk.within_radius(p.chunk, radius));
        self.fish.retain(|_, f| chunk.within_radius(f.chunk, radius));
        let dropped = before - self.players.len() - self.fish.len();
        if dropped > 0 {
            debug!("Entered chunk {}, dropped {} entities", chunk, dropped);
        }
    }

    /// The periodic position report for the server.
    pub fn movement_message(&self) -> ClientMessage {
        ClientMessage::Movement {
            position: self.local.position,
            velocity: Some(self.local.velocity),
        }
    }
}
