//! Server network layer: websocket connections and the tick loop that owns the world

use crate::broadcast::{broadcast, send_to};
use crate::chunks::ChunkManager;
use crate::registry::{ConnectionRegistry, OUTBOUND_CAPACITY};
use crate::simulation;
use crate::world::WorldState;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ClientMessage, MovementMode, ProtocolError, ServerMessage, WorldConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// A socket write that takes longer than this ends the connection.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Events sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    /// Handshake finished; the loop answers on `reply` with the issued id.
    Connected {
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
        reply: oneshot::Sender<u32>,
    },
    /// A decoded message from a registered client.
    Received {
        client_id: u32,
        message: ClientMessage,
    },
    Disconnected {
        client_id: u32,
    },
}

/// Main server coordinating connections and the world simulation.
///
/// Connection tasks never touch the world. They forward events over a channel
/// and this struct applies them between ticks, so the registry, the world and
/// the chunk manager have a single owner.
pub struct Server {
    listener: Arc<TcpListener>,
    config: WorldConfig,
    registry: ConnectionRegistry,
    world: WorldState,
    chunks: ChunkManager,
    rng: StdRng,

    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: WorldConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let listener = Arc::new(TcpListener::bind(addr).await?);
        info!("Server listening on {}", listener.local_addr()?);

        let rng = match config.seed {
            Some(seed) => {
                info!("World seeded with {}", seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            chunks: ChunkManager::new(config.load_radius),
            config,
            registry: ConnectionRegistry::new(),
            world: WorldState::new(),
            rng,
            event_tx,
            event_rx,
        })
    }

    /// Address actually bound, useful when listening on port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns task that accepts TCP connections and hands each to its own task
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(stream, addr, event_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Applies one connection event to the registry and input buffers
    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connected {
                addr,
                sender,
                reply,
            } => {
                let client_id = self.registry.register(addr, sender);
                self.world.add_player(client_id);
                send_to(&self.registry, client_id, &ServerMessage::Welcome { id: client_id });

                if reply.send(client_id).is_err() {
                    warn!("Client {} went away during handshake", client_id);
                    self.drop_client(client_id);
                }
            }

            NetworkEvent::Received { client_id, message } => {
                if !self.registry.contains(client_id) {
                    debug!("Ignoring message from unregistered client {}", client_id);
                    return;
                }
                self.apply_message(client_id, message);
            }

            NetworkEvent::Disconnected { client_id } => {
                self.drop_client(client_id);
            }
        }
    }

    fn apply_message(&mut self, client_id: u32, message: ClientMessage) {
        match (message, self.config.movement_mode) {
            (ClientMessage::Movement { position, velocity }, MovementMode::Reported) => {
                self.world.report_movement(client_id, position, velocity);
            }
            (ClientMessage::KeyPress { key, pressed }, MovementMode::Keys) => {
                if !self.world.set_key(client_id, &key, pressed) {
                    warn!("Client {} pressed unknown key '{}'", client_id, key);
                }
            }
            (ClientMessage::Unrecognized, _) => {
                warn!("Client {} sent an unrecognized message type", client_id);
            }
            (message, mode) => {
                debug!(
                    "Client {}: ignoring {:?} in {:?} movement mode",
                    client_id, message, mode
                );
            }
        }
    }

    /// Unregisters a client and drops its player. Its chunks are released on
    /// the next tick.
    fn drop_client(&mut self, client_id: u32) {
        self.registry.unregister(client_id);
        self.world.remove_player(client_id);
    }

    /// Advances the world one tick and sends everything it produced
    fn run_tick(&mut self) {
        let started = Instant::now();
        let report = simulation::tick(
            &mut self.world,
            &mut self.chunks,
            &self.config,
            &mut self.rng,
            timestamp_millis(),
        );

        for &client_id in &report.joined {
            let init = ServerMessage::FishInit {
                fish: report.snapshot.fish.clone(),
            };
            send_to(&self.registry, client_id, &init);
        }

        for &(client_id, chunk) in &report.chunk_updates {
            debug!("Client {} entered chunk {}", client_id, chunk);
            let update = ServerMessage::ChunkUpdate {
                chunk_x: chunk.cx,
                chunk_z: chunk.cz,
            };
            send_to(&self.registry, client_id, &update);
        }

        // Joined clients already got these fish in their fishInit.
        for fish in report.spawned {
            broadcast(&self.registry, &ServerMessage::FishSpawn { fish }, &report.joined);
        }

        if !self.registry.is_empty() {
            broadcast(
                &self.registry,
                &ServerMessage::GameState {
                    data: report.snapshot,
                },
                &[],
            );
        }

        for client_id in self.registry.stalled() {
            warn!("Dropping client {}: outbound queue full", client_id);
            self.drop_client(client_id);
        }

        let elapsed = started.elapsed();
        if elapsed > self.config.tick_duration() {
            warn!(
                "Tick {} took {:.1}ms, longer than the {}ms period",
                self.world.tick,
                elapsed.as_secs_f64() * 1000.0,
                self.config.tick_millis
            );
        }

        // Periodic monitoring
        if self.world.tick % 50 == 0 && !self.registry.is_empty() {
            debug!(
                "Tick {}: {} clients, {} chunks loaded, {} fish",
                self.world.tick,
                self.registry.len(),
                self.chunks.loaded_count(),
                self.world.fish.len()
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started: {}ms ticks, {:?} movement",
            self.config.tick_millis, self.config.movement_mode
        );

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick();
                },
            }
        }

        Ok(())
    }
}

/// Drives one websocket connection: registers it, forwards decoded frames to
/// the main loop and writes queued frames back out.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("Websocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
    let (reply_tx, reply_rx) = oneshot::channel();
    let connected = NetworkEvent::Connected {
        addr,
        sender: out_tx,
        reply: reply_tx,
    };
    if event_tx.send(connected).is_err() {
        return;
    }
    let client_id = match reply_rx.await {
        Ok(client_id) => client_id,
        Err(_) => return,
    };

    // Runs until the registry drops the sender, the socket fails or a write stalls.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match timeout(WRITE_TIMEOUT, write.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Write to client {} failed: {}", client_id, e);
                    return;
                }
                Err(_) => {
                    warn!("Write to client {} timed out", client_id);
                    return;
                }
            }
        }
        let _ = timeout(WRITE_TIMEOUT, write.close()).await;
    });

    loop {
        let frame = tokio::select! {
            frame = read.next() => frame,
            _ = &mut writer => {
                debug!("Writer for client {} finished, closing", client_id);
                break;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => match ClientMessage::decode(&text) {
                Ok(message) => {
                    if event_tx
                        .send(NetworkEvent::Received { client_id, message })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!("Dropping frame from client {}: {}", client_id, e),
            },
            Some(Ok(Message::Binary(_))) => {
                warn!(
                    "Dropping frame from client {}: {}",
                    client_id,
                    ProtocolError::BinaryFrame
                );
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("Connection error for client {}: {}", client_id, e);
                break;
            }
        }
    }

    writer.abort();
    let _ = event_tx.send(NetworkEvent::Disconnected { client_id });
}

fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis()
        .min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ChunkCoord, Vec3};

    async fn test_server(mode: MovementMode) -> Server {
        let config = WorldConfig {
            movement_mode: mode,
            seed: Some(5),
            ..WorldConfig::default()
        };
        tokio_test::assert_ok!(Server::new("127.0.0.1:0", config).await)
    }

    fn connect(server: &mut Server) -> (u32, mpsc::Receiver<Message>) {
        let (sender, outbound) = mpsc::channel(OUTBOUND_CAPACITY);
        let (reply, mut reply_rx) = oneshot::channel();
        server.handle_event(NetworkEvent::Connected {
            addr: "127.0.0.1:40000".parse().unwrap(),
            sender,
            reply,
        });
        (reply_rx.try_recv().unwrap(), outbound)
    }

    fn drain(outbound: &mut mpsc::Receiver<Message>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(Message::Text(text)) = outbound.try_recv() {
            messages.push(ServerMessage::decode(&text).unwrap());
        }
        messages
    }

    #[tokio::test]
    async fn test_connect_sends_welcome_then_fish_init_on_tick() {
        let mut server = test_server(MovementMode::Reported).await;
        let (client_id, mut outbound) = connect(&mut server);

        assert_eq!(client_id, 0);
        assert_eq!(drain(&mut outbound), vec![ServerMessage::Welcome { id: 0 }]);

        server.run_tick();
        let messages = drain(&mut outbound);
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            ServerMessage::FishInit { fish } => {
                assert_eq!(fish.len(), 25 * server.config.fish_per_chunk);
            }
            other => panic!("expected fishInit, got {:?}", other),
        }
        assert!(matches!(messages[1], ServerMessage::GameState { .. }));
    }

    #[tokio::test]
    async fn test_existing_client_hears_spawns_for_newcomer() {
        let mut server = test_server(MovementMode::Reported).await;
        let (a, mut outbound_a) = connect(&mut server);
        server.run_tick();
        drain(&mut outbound_a);

        server.handle_event(NetworkEvent::Received {
            client_id: a,
            message: ClientMessage::Movement {
                position: Vec3::new(-40.0, 0.0, 0.0),
                velocity: None,
            },
        });
        let (_, mut outbound_b) = connect(&mut server);
        server.run_tick();

        let to_a = drain(&mut outbound_a);
        let spawns = to_a
            .iter()
            .filter(|m| matches!(m, ServerMessage::FishSpawn { .. }))
            .count();
        assert!(to_a.contains(&ServerMessage::ChunkUpdate {
            chunk_x: -3,
            chunk_z: 0
        }));
        // a's move loads five new columns, b loads the whole origin block.
        assert!(spawns > 0);

        let to_b = drain(&mut outbound_b);
        assert!(matches!(to_b[0], ServerMessage::Welcome { id: 1 }));
        assert!(matches!(to_b[1], ServerMessage::FishInit { .. }));
        assert!(!to_b
            .iter()
            .any(|m| matches!(m, ServerMessage::FishSpawn { .. })));
    }

    #[tokio::test]
    async fn test_inactive_mode_messages_are_ignored() {
        let mut server = test_server(MovementMode::Keys).await;
        let (client_id, _outbound) = connect(&mut server);

        server.handle_event(NetworkEvent::Received {
            client_id,
            message: ClientMessage::Movement {
                position: Vec3::new(30.0, 0.0, 0.0),
                velocity: None,
            },
        });
        server.run_tick();

        assert_eq!(server.world.players[&client_id].position, Vec3::ZERO);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_and_releases_chunks() {
        let mut server = test_server(MovementMode::Reported).await;
        let (client_id, _outbound) = connect(&mut server);
        server.run_tick();
        assert!(server.chunks.is_loaded(ChunkCoord::ORIGIN));

        server.handle_event(NetworkEvent::Disconnected { client_id });
        assert!(!server.registry.contains(client_id));
        assert!(!server.world.players.contains_key(&client_id));

        server.run_tick();
        assert_eq!(server.chunks.loaded_count(), 0);
        assert!(server.world.fish.is_empty());
    }

    #[tokio::test]
    async fn test_messages_from_unknown_clients_are_dropped() {
        let mut server = test_server(MovementMode::Keys).await;
        server.handle_event(NetworkEvent::Received {
            client_id: 42,
            message: ClientMessage::KeyPress {
                key: "up".to_string(),
                pressed: true,
            },
        });
        assert!(server.world.players.is_empty());
    }

    #[tokio::test]
    async fn test_client_that_stops_reading_is_dropped() {
        let mut server = test_server(MovementMode::Reported).await;
        let (reader, mut outbound_reader) = connect(&mut server);
        let (idle, _outbound_idle) = connect(&mut server);

        for _ in 0..OUTBOUND_CAPACITY + 1 {
            server.run_tick();
            drain(&mut outbound_reader);
        }

        assert!(server.registry.contains(reader));
        assert!(!server.registry.contains(idle));
        assert!(!server.world.players.contains_key(&idle));

        server.run_tick();
        assert!(server.chunks.client_chunk(idle).is_none());
    }

    #[tokio::test]
    async fn test_far_out_movement_does_not_stop_the_tick() {
        let mut server = test_server(MovementMode::Reported).await;
        let (client_id, mut outbound) = connect(&mut server);
        server.run_tick();

        server.handle_event(NetworkEvent::Received {
            client_id,
            message: ClientMessage::Movement {
                position: Vec3::new(1e20, 0.0, 0.0),
                velocity: None,
            },
        });
        server.run_tick();

        assert_eq!(server.world.players[&client_id].position, Vec3::ZERO);
        assert!(drain(&mut outbound)
            .iter()
            .any(|m| matches!(m, ServerMessage::GameState { .. })));
    }

    #[tokio::test]
    async fn test_dropped_reply_unregisters_client() {
        let mut server = test_server(MovementMode::Reported).await;
        let (sender, _outbound) = mpsc::channel(OUTBOUND_CAPACITY);
        let (reply, reply_rx) = oneshot::channel();
        drop(reply_rx);

        server.handle_event(NetworkEvent::Connected {
            addr: "127.0.0.1:40001".parse().unwrap(),
            sender,
            reply,
        });

        assert!(server.registry.is_empty());
        assert!(server.world.players.is_empty());
    }
}
