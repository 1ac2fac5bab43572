//! # Reef Client Library
//!
//! The client half of the shared world: it predicts the local player from
//! keyboard input, smooths everything else toward the server's snapshots and
//! draws a top-down debug view.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! The local player moves every render frame with the same integrator the
//! server uses, without waiting for confirmation. The predicted position is
//! reported to the server on a fixed send interval.
//!
//! ### Correction
//! When a snapshot places the local player further than a fixed threshold
//! from the prediction, the prediction is snapped to the server's value.
//! Smaller differences are ignored.
//!
//! ### Smoothing
//! Remote players and fish are never drawn at the raw snapshot position.
//! Each frame their displayed state closes a frame-time-scaled fraction of the
//! gap to the latest snapshot, with a snap for large jumps.
//!
//! ### Local Interest
//! Only entities in the chunk block around the local player are kept. Moving
//! into a new chunk tears down whatever fell out of the block.
//!
//! ## Module Organization
//!
//! - `reconcile`: prediction, correction and smoothing
//! - `input`: keyboard sampling and `keyPress` edge detection
//! - `network`: websocket task with fixed-delay reconnect
//! - `rendering`: the debug view
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{self, ClientEvent, NetworkConfig};
//! use client::reconcile::{ReconcileConfig, ReconciliationEngine};
//! use shared::WorldConfig;
//! use std::time::Duration;
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let mut handle = network::spawn(
//!     runtime.handle(),
//!     NetworkConfig {
//!         url: "ws://127.0.0.1:8080".to_string(),
//!         send_interval: Duration::from_millis(50),
//!         reconnect_delay: Duration::from_secs(3),
//!     },
//! );
//! let mut engine = ReconciliationEngine::new(ReconcileConfig::default(), WorldConfig::default());
//!
//! loop {
//!     while let Some(event) = handle.try_recv() {
//!         if let ClientEvent::Message(message) = event {
//!             engine.apply_message(message);
//!         }
//!     }
//!     engine.frame(1.0 / 60.0);
//!     handle.set_movement(engine.movement_message());
//! }
//! ```

pub mod input;
pub mod network;
pub mod reconcile;
pub mod rendering;
