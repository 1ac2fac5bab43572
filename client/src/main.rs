use clap::Parser;
use client::input::InputManager;
use client::network::{self, ClientEvent, NetworkConfig};
use client::reconcile::{ReconcileConfig, ReconciliationEngine};
use client::rendering::{RenderConfig, Renderer};
use log::{error, info};
use macroquad::prelude::*;
use shared::WorldConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server websocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Seconds to wait before reconnecting after the connection drops
    #[arg(short = 'r', long, default_value = "3")]
    reconnect_secs: u64,

    /// JSON file with world settings; must match the server's
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Pixels per world unit
    #[arg(long, default_value = "6.0")]
    zoom: f32,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Reef".to_owned(),
        window_width: 800,
        window_height: 600,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let world = match &args.config {
        Some(path) => match WorldConfig::load(path) {
            Ok(world) => world,
            Err(e) => {
                error!("Could not load {}: {}", path.display(), e);
                return;
            }
        },
        None => WorldConfig::default(),
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start the network runtime: {}", e);
            return;
        }
    };

    let reconcile = ReconcileConfig::default();
    info!("Connecting to: {}", args.server);
    info!("Controls: WASD or arrow keys to swim, G toggles the chunk grid");

    let mut handle = network::spawn(
        runtime.handle(),
        NetworkConfig {
            url: args.server.clone(),
            send_interval: reconcile.send_interval,
            reconnect_delay: Duration::from_secs(args.reconnect_secs),
        },
    );

    let mut engine = ReconciliationEngine::new(reconcile, world);
    let mut input = InputManager::new();
    let renderer = Renderer::new(args.zoom);
    let mut connected = false;
    let mut show_grid = true;

    loop {
        // Network events only retarget; displayed state moves in `frame`.
        while let Some(event) = handle.try_recv() {
            match event {
                ClientEvent::Connected => {
                    connected = true;
                    input.reset();
                }
                ClientEvent::Message(message) => engine.apply_message(message),
                ClientEvent::Disconnected => {
                    connected = false;
                    engine.reset();
                }
            }
        }

        let frame = input.poll();
        if frame.toggle_grid {
            show_grid = !show_grid;
        }
        if connected {
            for edge in frame.edges {
                handle.send(edge);
            }
        }
        engine.set_keys(frame.keys);

        engine.frame(get_frame_time());
        handle.set_movement(engine.movement_message());

        renderer.render(
            &engine,
            RenderConfig {
                connected,
                show_grid,
            },
        );

        next_frame().await;
    }
}
