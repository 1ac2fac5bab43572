//! # Reef Server Library
//!
//! The authoritative half of a shared underwater world. Players swim around
//! a wide plane divided into square chunks; ambient fish live in the
//! chunks near at least one player and disappear when nobody is close.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server owns every player position and every fish. It advances the
//! world in fixed ticks and broadcasts the resulting snapshot to all
//! connected clients, which correct their own predictions against it.
//!
//! ### Interest Management
//! Each player keeps a square block of chunks around it loaded. Chunks are
//! reference counted across players, so fish are spawned exactly once when a
//! chunk's first observer arrives and despawned when its last one leaves.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! Connection tasks only decode websocket frames and forward them over a
//! channel. One loop applies those events and runs the tick, so the world,
//! the chunk manager and the registry are never shared between tasks.
//!
//! ### Input Buffering
//! Client messages only record intent (a reported position or a held key).
//! Positions are written exclusively by the tick, which makes the order of
//! message arrival inside a tick irrelevant.
//!
//! ## Module Organization
//!
//! - `registry`: live connections and client id issuance
//! - `world`: players, fish and the per-tick snapshot
//! - `fish`: fish placement and the wander step
//! - `chunks`: reference-counted chunk loading
//! - `simulation`: the tick sequence
//! - `broadcast`: JSON text frames out to clients
//! - `network`: websocket accept loop and the main server loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::WorldConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", WorldConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod chunks;
pub mod fish;
pub mod network;
pub mod registry;
pub mod simulation;
pub mod world;
