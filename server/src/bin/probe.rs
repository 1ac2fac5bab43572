//! Headless client for poking at a running server.
//!
//! Connects, then walks east in a straight line reporting its position, and
//! prints a one-line summary of every message it receives.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{ClientMessage, ServerMessage, Vec3};
use std::time::Duration;
use tokio::time::{interval, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server websocket URL
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    /// Walking speed in units per second
    #[clap(long, default_value = "8.0")]
    speed: f32,
    /// How long to walk before disconnecting, in seconds
    #[clap(short, long, default_value = "10")]
    duration: u64,
}

fn describe(message: &ServerMessage) -> String {
    match message {
        ServerMessage::Welcome { id } => format!("welcome: client id {}", id),
        ServerMessage::FishInit { fish } => format!("fishInit: {} fish", fish.len()),
        ServerMessage::FishSpawn { fish } => format!(
            "fishSpawn: fish {} in chunk ({}, {})",
            fish.id, fish.chunk_x, fish.chunk_z
        ),
        ServerMessage::GameState { data } => format!(
            "gameState: t={} players={} fish={}",
            data.timestamp,
            data.players.len(),
            data.fish.len()
        ),
        ServerMessage::ChunkUpdate { chunk_x, chunk_z } => {
            format!("chunkUpdate: now in ({}, {})", chunk_x, chunk_z)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Connecting to {}", args.url);
    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let reader = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match ServerMessage::decode(&text) {
                    Ok(ServerMessage::GameState { .. }) => {}
                    Ok(message) => println!("{}", describe(&message)),
                    Err(e) => println!("Undecodable frame: {}", e),
                },
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let step = Duration::from_millis(50);
    let velocity = Vec3::new(args.speed, 0.0, 0.0);
    let mut position = Vec3::ZERO;
    let mut send_interval = interval(step);
    let steps = args.duration * 1000 / step.as_millis() as u64;

    for _ in 0..steps {
        send_interval.tick().await;
        position += velocity.scale(step.as_secs_f32());
        let movement = ClientMessage::Movement {
            position,
            velocity: Some(velocity),
        };
        write.send(Message::Text(movement.encode()?)).await?;
    }

    println!("Stopped at x = {:.1}", position.x);
    write.close().await?;
    sleep(Duration::from_millis(200)).await;
    reader.abort();

    Ok(())
}
